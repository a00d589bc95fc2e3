use serde::{Deserialize, Serialize};

/// Simulation parameters derived from the configuration, used frequently during simulation steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    // Time
    pub dt: f64,
    pub total_steps: u64,
    pub output_interval_steps: u64,

    // Gravity
    pub softening: f64,
    pub parallel: bool,

    // Diagnostics
    pub energy_tolerance: f64,
}
