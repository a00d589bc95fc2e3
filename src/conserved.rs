use crate::cpu_state::check_ensemble;
use crate::error::Result;
use crate::forces::Gravity;
use simulation_common::{ConservedRecord, Vec3};

/// Energy, momentum and angular momentum of one instantaneous state.
///
/// Purely diagnostic; nothing here feeds back into the integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConservedQuantities {
    pub kinetic_energy: f64,
    pub potential_energy: f64,
    pub momentum: Vec3,
    pub angular_momentum: Vec3,
}

impl ConservedQuantities {
    /// Reduces the ensemble in index order; `gravity` supplies the potential.
    pub fn measure(position: &[Vec3], velocity: &[Vec3], mass: &[f64], gravity: &Gravity) -> Result<Self> {
        check_ensemble(position, velocity, mass)?;

        let mut kinetic_energy = 0.0;
        let mut momentum = Vec3::zero();
        let mut angular_momentum = Vec3::zero();
        for ((x, v), &m) in position.iter().zip(velocity).zip(mass) {
            kinetic_energy += 0.5 * m * v.length_squared();
            momentum += *v * m;
            angular_momentum += x.cross(*v) * m;
        }
        let potential_energy = gravity.potential_energy(position, mass)?;

        Ok(Self { kinetic_energy, potential_energy, momentum, angular_momentum })
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy + self.potential_energy
    }

    pub fn to_record(&self, time: f64) -> ConservedRecord {
        ConservedRecord {
            time,
            kinetic_energy: self.kinetic_energy,
            potential_energy: self.potential_energy,
            momentum_x: self.momentum.x,
            momentum_y: self.momentum.y,
            momentum_z: self.momentum.z,
            angular_momentum_x: self.angular_momentum.x,
            angular_momentum_y: self.angular_momentum.y,
            angular_momentum_z: self.angular_momentum.z,
        }
    }
}

/// Conserved quantities with the bare Newtonian potential.
pub fn conserved(position: &[Vec3], velocity: &[Vec3], mass: &[f64]) -> Result<ConservedQuantities> {
    ConservedQuantities::measure(position, velocity, mass, &Gravity::default())
}

/// Deviation of the current quantities from a baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConservationDrift {
    /// Relative energy error |E - E0| / |E0|, or absolute when E0 is ~0.
    pub energy_error: f64,
    pub momentum_error: Vec3,
    pub angular_momentum_error: Vec3,
}

impl ConservationDrift {
    pub fn is_violated(&self, energy_tol: f64, momentum_tol: f64, angular_momentum_tol: f64) -> bool {
        self.energy_error > energy_tol
            || self.momentum_error.length() > momentum_tol
            || self.angular_momentum_error.length() > angular_momentum_tol
    }
}

/// Remembers the quantities of the initial state and measures drift against them.
#[derive(Debug, Clone, Copy)]
pub struct ConservationMonitor {
    baseline: ConservedQuantities,
}

impl ConservationMonitor {
    pub fn new(baseline: ConservedQuantities) -> Self {
        Self { baseline }
    }

    pub fn baseline(&self) -> &ConservedQuantities {
        &self.baseline
    }

    pub fn check(&self, current: &ConservedQuantities) -> ConservationDrift {
        let e0 = self.baseline.total_energy();
        let de = (current.total_energy() - e0).abs();
        let energy_error = if e0.abs() > 1e-12 { de / e0.abs() } else { de };

        ConservationDrift {
            energy_error,
            momentum_error: current.momentum - self.baseline.momentum,
            angular_momentum_error: current.angular_momentum - self.baseline.angular_momentum,
        }
    }
}

/// Running statistics of the total energy (Welford's algorithm).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyStatistics {
    count: u64,
    mean: f64,
    m2: f64,
    initial: f64,
    max_relative_deviation: f64,
}

impl EnergyStatistics {
    pub fn push(&mut self, energy: f64) {
        if self.count == 0 {
            self.initial = energy;
        }
        self.count += 1;
        let delta = energy - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (energy - self.mean);

        let scale = if self.initial.abs() > 1e-12 { self.initial.abs() } else { 1.0 };
        let deviation = (energy - self.initial).abs() / scale;
        if deviation > self.max_relative_deviation {
            self.max_relative_deviation = deviation;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation; 0 for fewer than two samples.
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }

    pub fn max_relative_deviation(&self) -> f64 {
        self.max_relative_deviation
    }
}
