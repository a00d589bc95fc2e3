use thiserror::Error;

/// Failures detected by the engine itself.
///
/// Malformed input is rejected before any arithmetic happens. A singularity
/// is only reported by the driver, after a step has already produced a
/// non-finite value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("time step must be finite and strictly positive, got {0}")]
    InvalidTimestep(f64),

    #[error("{array} has {found} entries but the ensemble has {expected} positions")]
    LengthMismatch {
        array: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("particle {index} has negative mass {mass}")]
    NegativeMass { index: usize, mass: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("numerical singularity at step {step}: particle {particle} has a non-finite state (coincident particles?)")]
    Singularity { step: u64, particle: usize },
}

pub type Result<T> = std::result::Result<T, SimulationError>;
