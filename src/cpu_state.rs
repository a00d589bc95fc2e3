use crate::error::{Result, SimulationError};
use crate::forces::Gravity;
use crate::integrator::leapfrog_in_place;
use simulation_common::{Snapshot, Vec3};

/// Holds the particle ensemble as parallel arrays on the CPU.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleState {
    pub time: f64,
    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    /// Acceleration field belonging to `positions`; refreshed by every step.
    pub accelerations: Vec<Vec3>,
    pub masses: Vec<f64>,
}

impl ParticleState {
    /// Creates a state at `time = 0` and evaluates its initial acceleration field.
    pub fn new(positions: Vec<Vec3>, velocities: Vec<Vec3>, masses: Vec<f64>, gravity: &Gravity) -> Result<Self> {
        check_ensemble(&positions, &velocities, &masses)?;
        let accelerations = gravity.acceleration(&positions, &masses)?;
        Ok(Self { time: 0.0, positions, velocities, accelerations, masses })
    }

    pub fn num_particles(&self) -> usize {
        self.masses.len()
    }

    /// Advances this state by one kick-drift-kick step, reusing its buffers.
    pub fn advance(&mut self, dt: f64, gravity: &Gravity) -> Result<()> {
        validate_timestep(dt)?;
        check_ensemble(&self.positions, &self.velocities, &self.masses)?;
        check_len("accelerations", self.positions.len(), self.accelerations.len())?;

        leapfrog_in_place(
            &mut self.positions,
            &mut self.velocities,
            &mut self.accelerations,
            &self.masses,
            dt,
            gravity,
        );
        self.time += dt;
        Ok(())
    }

    /// Index of the first particle whose position, velocity or acceleration is not finite.
    pub fn first_non_finite(&self) -> Option<usize> {
        (0..self.num_particles()).find(|&i| {
            !(self.positions[i].is_finite() && self.velocities[i].is_finite() && self.accelerations[i].is_finite())
        })
    }

    pub fn to_snapshot(&self, index: u32) -> Snapshot {
        Snapshot {
            index,
            time: self.time,
            positions: self.positions.clone(),
            velocities: self.velocities.clone(),
            masses: self.masses.clone(),
        }
    }
}

pub(crate) fn check_len(array: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(SimulationError::LengthMismatch { array, expected, found });
    }
    Ok(())
}

/// Rejects negative or NaN masses. Zero is a valid (tracer) mass.
pub(crate) fn validate_masses(masses: &[f64]) -> Result<()> {
    match masses.iter().position(|m| !(*m >= 0.0)) {
        Some(index) => Err(SimulationError::NegativeMass { index, mass: masses[index] }),
        None => Ok(()),
    }
}

pub(crate) fn validate_timestep(dt: f64) -> Result<()> {
    if dt > 0.0 && dt.is_finite() {
        Ok(())
    } else {
        Err(SimulationError::InvalidTimestep(dt))
    }
}

/// Checks that positions, velocities and masses describe one ensemble of N particles.
pub fn check_ensemble(positions: &[Vec3], velocities: &[Vec3], masses: &[f64]) -> Result<()> {
    check_len("velocities", positions.len(), velocities.len())?;
    check_len("masses", positions.len(), masses.len())?;
    validate_masses(masses)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> ParticleState {
        ParticleState::new(
            vec![Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)],
            vec![Vec3::new(0.0, -0.5, 0.0), Vec3::new(0.0, 0.5, 0.0)],
            vec![1.0, 1.0],
            &Gravity::default(),
        )
        .unwrap()
    }

    #[test]
    fn new_evaluates_initial_accelerations() {
        let state = pair();
        // Separation 2, unit masses: |a| = 1/4, pointing at the partner.
        assert_eq!(state.accelerations[0], Vec3::new(0.25, 0.0, 0.0));
        assert_eq!(state.accelerations[1], Vec3::new(-0.25, 0.0, 0.0));
        assert_eq!(state.time, 0.0);
    }

    #[test]
    fn new_rejects_mismatched_lengths() {
        let err = ParticleState::new(
            vec![Vec3::zero(), Vec3::new(1.0, 0.0, 0.0)],
            vec![Vec3::zero()],
            vec![1.0, 1.0],
            &Gravity::default(),
        )
        .unwrap_err();
        assert_eq!(err, SimulationError::LengthMismatch { array: "velocities", expected: 2, found: 1 });
    }

    #[test]
    fn new_rejects_negative_mass() {
        let err = ParticleState::new(
            vec![Vec3::zero(), Vec3::new(1.0, 0.0, 0.0)],
            vec![Vec3::zero(); 2],
            vec![1.0, -2.0],
            &Gravity::default(),
        )
        .unwrap_err();
        assert_eq!(err, SimulationError::NegativeMass { index: 1, mass: -2.0 });
    }

    #[test]
    fn advance_moves_time_forward() {
        let mut state = pair();
        state.advance(0.1, &Gravity::default()).unwrap();
        state.advance(0.1, &Gravity::default()).unwrap();
        assert!((state.time - 0.2).abs() < 1e-15);
        assert_eq!(state.first_non_finite(), None);
    }

    #[test]
    fn advance_rejects_bad_timestep_without_touching_state() {
        let mut state = pair();
        let before = state.clone();
        assert_eq!(state.advance(-0.1, &Gravity::default()), Err(SimulationError::InvalidTimestep(-0.1)));
        assert_eq!(state.advance(0.0, &Gravity::default()), Err(SimulationError::InvalidTimestep(0.0)));
        assert_eq!(state, before);
    }

    #[test]
    fn coincident_particles_are_reported_as_non_finite() {
        let state = ParticleState::new(
            vec![Vec3::zero(), Vec3::zero()],
            vec![Vec3::zero(); 2],
            vec![1.0, 1.0],
            &Gravity::default(),
        )
        .unwrap();
        assert_eq!(state.first_non_finite(), Some(0));
    }

    #[test]
    fn snapshot_copies_the_ensemble() {
        let state = pair();
        let snapshot = state.to_snapshot(3);
        assert_eq!(snapshot.index, 3);
        assert_eq!(snapshot.positions, state.positions);
        assert_eq!(snapshot.massive_indices().count(), 2);
    }
}
