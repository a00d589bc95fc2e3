use anyhow::Result;
use std::time::Instant;
use log::{info, debug, error};

use galaxy_engine::{FileOutput, GalaxySimulation};
use simulation_common::SimulationConfig;

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting Galaxy Engine...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = SimulationConfig::load(&config_path)?;
    info!("Loaded configuration from {}", config_path);

    if config.gravity.parallel {
        info!("Using {} Rayon threads for force evaluation.", rayon::current_num_threads());
    }

    // --- Initialize Simulation ---
    let mut sim = GalaxySimulation::new(config)?;
    info!("State initialized with {} particles.", sim.current_particle_count());
    debug!("Simulation Parameters: {:#?}", sim.params());

    let mut output = FileOutput::create(&sim.config().output)?;

    // --- Simulation Loop ---
    let start_time = Instant::now();
    let summary = match sim.run(&mut output) {
        Ok(summary) => summary,
        Err(e) => {
            error!("Run aborted: {:#}", e);
            return Err(e);
        }
    };

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds: {} steps, t = {:.2}, {} snapshots.",
        total_duration.as_secs_f64(),
        summary.steps,
        summary.final_time,
        summary.snapshots_written
    );
    info!(
        "Total energy: mean {:.8e}, std {:.3e}, max relative deviation {:.3e}",
        summary.energy.mean(),
        summary.energy.std_dev(),
        summary.energy.max_relative_deviation()
    );

    info!("Simulation Complete.");
    Ok(())
}
