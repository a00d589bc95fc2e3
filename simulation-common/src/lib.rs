pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{SimulationConfig, GalaxyConfig, TimingConfig, GravityConfig, DiagnosticsConfig, OutputConfig};
pub use sim_params::SimParams;
pub use snapshot::{Snapshot, ConservedRecord, CONSERVED_HEADER};
pub use vecmath::Vec3;
