pub mod conserved;
pub mod cpu_state;
pub mod error;
pub mod forces;
pub mod initial;
pub mod integrator;
pub mod output;
pub mod simulation;

pub use conserved::{conserved, ConservationDrift, ConservationMonitor, ConservedQuantities, EnergyStatistics};
pub use cpu_state::ParticleState;
pub use error::SimulationError;
pub use forces::{acceleration, potential_energy, Gravity};
pub use initial::initialise;
pub use integrator::integrate_step;
pub use output::{FileOutput, MemoryOutput, OutputSink};
pub use simulation::{GalaxySimulation, RunSummary};
