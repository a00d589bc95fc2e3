use crate::cpu_state::{check_len, validate_masses};
use crate::error::Result;
use rayon::prelude::*;
use simulation_common::{SimParams, Vec3};

// Smaller ensembles are evaluated serially.
const PARALLEL_THRESHOLD: usize = 64;

/// Stateless direct-summation Newtonian gravity (G = 1).
///
/// Massless tracers feel the field of the massive particles but never
/// contribute to it; the inner loops only visit massive particles.
///
/// `softening` adds `ε²` to every squared separation; `ε = 0` is the bare
/// Newtonian kernel and coincident particles then yield Inf/NaN.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Gravity {
    pub softening: f64,
    pub parallel: bool,
}

impl Gravity {
    pub fn new(softening: f64, parallel: bool) -> Self {
        Self { softening, parallel }
    }

    pub fn from_params(params: &SimParams) -> Self {
        Self::new(params.softening, params.parallel)
    }

    /// Acceleration of every particle due to all massive particles.
    pub fn acceleration(&self, position: &[Vec3], mass: &[f64]) -> Result<Vec<Vec3>> {
        check_len("masses", position.len(), mass.len())?;
        validate_masses(mass)?;
        let mut out = vec![Vec3::zero(); position.len()];
        self.accumulate(position, mass, &mut out);
        Ok(out)
    }

    /// Fills `out` with the acceleration field. Lengths are the caller's responsibility.
    pub(crate) fn accumulate(&self, position: &[Vec3], mass: &[f64], out: &mut [Vec3]) {
        let massive = massive_indices(mass);
        let eps2 = self.softening * self.softening;

        let field_at = |i: usize| {
            let xi = position[i];
            let mut acc = Vec3::zero();
            for &j in &massive {
                if j == i {
                    continue;
                }
                let dx = xi - position[j];
                let (_, inv_r3) = kernel(dx, eps2);
                acc += dx * (-mass[j] * inv_r3);
            }
            acc
        };

        // Each output slot is written by exactly one task; inputs are shared read-only.
        if self.parallel && position.len() >= PARALLEL_THRESHOLD {
            out.par_iter_mut().enumerate().for_each(|(i, a)| *a = field_at(i));
        } else {
            out.iter_mut().enumerate().for_each(|(i, a)| *a = field_at(i));
        }
    }

    /// Total potential energy, each unordered massive pair counted once.
    pub fn potential_energy(&self, position: &[Vec3], mass: &[f64]) -> Result<f64> {
        check_len("masses", position.len(), mass.len())?;
        validate_masses(mass)?;
        let massive = massive_indices(mass);
        let eps2 = self.softening * self.softening;

        let row = |k: usize| {
            let i = massive[k];
            let mut phi = 0.0;
            for &j in &massive[k + 1..] {
                let (inv_r, _) = kernel(position[i] - position[j], eps2);
                phi -= mass[j] * inv_r;
            }
            mass[i] * phi
        };

        // Rows may be computed concurrently, but the reduction stays sequential
        // so the total is bitwise reproducible.
        let rows: Vec<f64> = if self.parallel && position.len() >= PARALLEL_THRESHOLD {
            (0..massive.len()).into_par_iter().map(row).collect()
        } else {
            (0..massive.len()).map(row).collect()
        };
        Ok(rows.iter().sum())
    }
}

/// Returns `(1/r, 1/r³)` for separation `dx` with squared softening `eps2`.
#[inline(always)]
fn kernel(dx: Vec3, eps2: f64) -> (f64, f64) {
    let r2 = dx.length_squared() + eps2;
    let inv_r = 1.0 / r2.sqrt();
    (inv_r, inv_r * inv_r * inv_r)
}

fn massive_indices(mass: &[f64]) -> Vec<usize> {
    mass.iter().enumerate().filter(|(_, &m)| m > 0.0).map(|(i, _)| i).collect()
}

/// Acceleration field with the bare Newtonian kernel.
pub fn acceleration(position: &[Vec3], mass: &[f64]) -> Result<Vec<Vec3>> {
    Gravity::default().acceleration(position, mass)
}

/// Potential energy with the bare Newtonian kernel.
pub fn potential_energy(position: &[Vec3], mass: &[f64]) -> Result<f64> {
    Gravity::default().potential_energy(position, mass)
}
