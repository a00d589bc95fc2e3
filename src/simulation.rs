use crate::conserved::{ConservationMonitor, ConservedQuantities, EnergyStatistics};
use crate::cpu_state::ParticleState;
use crate::error::SimulationError;
use crate::forces::Gravity;
use crate::initial::initialise;
use crate::output::OutputSink;
use anyhow::{Context, Result};
use log::{debug, info, trace, warn};
use simulation_common::{SimParams, SimulationConfig};
use std::time::Instant;

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub steps: u64,
    pub final_time: f64,
    pub snapshots_written: u32,
    pub energy: EnergyStatistics,
}

/// Owns the particle state and drives it through the configured number of steps.
pub struct GalaxySimulation {
    /// The simulation configuration, including initial conditions and parameters.
    config: SimulationConfig,
    params: SimParams,
    gravity: Gravity,
    /// The simulation state; replaced in place every step.
    state: ParticleState,
    /// Number of completed physics steps.
    current_step: u64,
    monitor: ConservationMonitor,
}

impl GalaxySimulation {
    /// Creates a new simulation from the two-galaxy initial conditions in `config`.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();
        let gravity = Gravity::from_params(&params);
        let state = initialise(&config.galaxies, &gravity)?;
        Self::with_state(config, state)
    }

    /// Creates a simulation from an externally prepared ensemble.
    pub fn with_state(config: SimulationConfig, state: ParticleState) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();
        let gravity = Gravity::from_params(&params);
        let baseline = ConservedQuantities::measure(&state.positions, &state.velocities, &state.masses, &gravity)?;
        if let Some(particle) = state.first_non_finite() {
            return Err(SimulationError::Singularity { step: 0, particle }.into());
        }

        Ok(Self {
            config,
            params,
            gravity,
            state,
            current_step: 0,
            monitor: ConservationMonitor::new(baseline),
        })
    }

    /// Advances the simulation by one physics timestep (`dt`).
    pub fn step(&mut self) -> std::result::Result<(), SimulationError> {
        let step = self.current_step + 1;
        self.state.advance(self.params.dt, &self.gravity)?;
        // Steps are counted from 1 so the reported index names the step that failed.
        if let Some(particle) = self.state.first_non_finite() {
            return Err(SimulationError::Singularity { step, particle });
        }
        self.current_step = step;
        Ok(())
    }

    pub fn conserved(&self) -> std::result::Result<ConservedQuantities, SimulationError> {
        ConservedQuantities::measure(&self.state.positions, &self.state.velocities, &self.state.masses, &self.gravity)
    }

    /// Runs the full schedule, emitting snapshots and conserved rows to `output`.
    pub fn run(&mut self, output: &mut dyn OutputSink) -> Result<RunSummary> {
        let total_steps = self.params.total_steps;
        let record_interval_steps = self.params.output_interval_steps;
        info!(
            "Starting simulation loop for {} steps (dt = {}), snapshot every {} steps.",
            total_steps, self.params.dt, record_interval_steps
        );

        // --- Refuse to resume from a failed step ---
        if let Some(particle) = self.state.first_non_finite() {
            let step = self.current_step + 1;
            return Err(SimulationError::Singularity { step, particle })
                .with_context(|| format!("Simulation step {} failed", step));
        }
        debug!("Baseline total energy {:.8e}", self.monitor.baseline().total_energy());

        let mut energy = EnergyStatistics::default();
        let mut snapshot_index = 0u32;

        // --- Initial Snapshot (time = 0) ---
        output.record_snapshot(&self.state.to_snapshot(snapshot_index))?;
        snapshot_index += 1;
        let initial = self.conserved()?;
        energy.push(initial.total_energy());
        output.record_conserved(&initial.to_record(self.state.time))?;

        let start_time = Instant::now();
        for _ in 0..total_steps {
            let step_start_time = Instant::now();
            self.step().with_context(|| format!("Simulation step {} failed", self.current_step + 1))?;
            let step = self.current_step;

            let quantities = self.conserved()?;
            energy.push(quantities.total_energy());
            output.record_conserved(&quantities.to_record(self.state.time))?;

            let is_record_step = step % record_interval_steps == 0;
            let is_last_step = step == total_steps;
            if is_record_step || is_last_step {
                output.record_snapshot(&self.state.to_snapshot(snapshot_index))?;
                snapshot_index += 1;

                let drift = self.monitor.check(&quantities);
                info!(
                    "Step [{}/{}] (t = {:.2}) | dE/E = {:.3e} | |dP| = {:.3e} | |dL| = {:.3e} | Elapsed: {:.2} s",
                    step,
                    total_steps,
                    self.state.time,
                    drift.energy_error,
                    drift.momentum_error.length(),
                    drift.angular_momentum_error.length(),
                    start_time.elapsed().as_secs_f64()
                );
                if drift.energy_error > self.params.energy_tolerance {
                    warn!(
                        "Relative energy error {:.3e} exceeds tolerance {:.1e} at step {}.",
                        drift.energy_error, self.params.energy_tolerance, step
                    );
                }
            } else {
                trace!("Step [{}/{}] completed in {:.3} ms", step, total_steps, step_start_time.elapsed().as_secs_f64() * 1000.0);
            }
        }
        output.finish()?;

        debug!(
            "Energy statistics: mean {:.8e}, std {:.3e}, max relative deviation {:.3e}",
            energy.mean(),
            energy.std_dev(),
            energy.max_relative_deviation()
        );
        Ok(RunSummary {
            steps: self.current_step,
            final_time: self.state.time,
            snapshots_written: snapshot_index,
            energy,
        })
    }

    pub fn state(&self) -> &ParticleState {
        &self.state
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    pub fn current_particle_count(&self) -> usize {
        self.state.num_particles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemoryOutput;
    use simulation_common::Vec3;

    fn short_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.galaxies.number_of_rings = 2;
        config.timing.dt = 0.01;
        config.timing.dt_out = 0.5;
        config.timing.t_max = 2.0;
        config
    }

    #[test]
    fn run_emits_initial_periodic_and_final_output() {
        let mut sim = GalaxySimulation::new(short_config()).unwrap();
        assert_eq!(sim.current_particle_count(), 2 + 2 * (12 + 18));
        let mut output = MemoryOutput::default();
        let summary = sim.run(&mut output).unwrap();

        assert_eq!(summary.steps, 200);
        assert!((summary.final_time - 2.0).abs() < 1e-9);
        // t = 0, 0.5, 1.0, 1.5, 2.0
        assert_eq!(summary.snapshots_written, 5);
        assert_eq!(output.snapshots.len(), 5);
        assert_eq!(output.records.len(), 201);
        assert_eq!(output.records[0].time, 0.0);
        assert_eq!(output.snapshots.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert!(summary.energy.max_relative_deviation() < 1e-6);
    }

    #[test]
    fn last_step_is_always_recorded() {
        let mut config = short_config();
        config.timing.dt_out = 0.7;
        config.timing.t_max = 1.0;
        let mut sim = GalaxySimulation::new(config).unwrap();
        let mut output = MemoryOutput::default();
        sim.run(&mut output).unwrap();
        // Steps 70 and 100, plus the initial state.
        assert_eq!(output.snapshots.len(), 3);
        assert!((output.snapshots[2].time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn massless_particles_may_overlap() {
        // Tracers exert no force, so passing through each other is harmless.
        let state = ParticleState::new(
            vec![Vec3::new(-0.5, 0.0, 0.0), Vec3::new(0.5, 0.0, 0.0)],
            vec![Vec3::new(0.5, 0.0, 0.0), Vec3::new(-0.5, 0.0, 0.0)],
            vec![0.0, 0.0],
            &Gravity::default(),
        )
        .unwrap();
        let mut config = short_config();
        config.timing.dt = 0.25;
        let mut sim = GalaxySimulation::with_state(config, state).unwrap();
        for _ in 0..4 {
            sim.step().unwrap();
        }
        assert_eq!(sim.current_step(), 4);
        assert_eq!(sim.state().positions[0], sim.state().positions[1]);
    }

    #[test]
    fn coincident_massive_particles_abort_the_run() {
        let state = ParticleState {
            time: 0.0,
            positions: vec![Vec3::new(-0.5, 0.0, 0.0), Vec3::new(0.5, 0.0, 0.0)],
            velocities: vec![Vec3::new(2.0, 0.0, 0.0), Vec3::new(-2.0, 0.0, 0.0)],
            accelerations: vec![Vec3::zero(); 2],
            masses: vec![1.0, 1.0],
        };
        let mut config = short_config();
        config.timing.dt = 0.25;
        let mut sim = GalaxySimulation::with_state(config, state).unwrap();
        // Drift by dt * v_half = 0.25 * 2 lands both particles on the origin.
        let err = sim.step().unwrap_err();
        assert_eq!(err, SimulationError::Singularity { step: 1, particle: 0 });
        assert_eq!(sim.current_step(), 0);

        // A failed simulation must not write its non-finite state anywhere.
        let mut output = MemoryOutput::default();
        let err = sim.run(&mut output).unwrap_err();
        assert!(format!("{:#}", err).contains("Simulation step 1 failed"));
        assert_eq!(
            err.downcast_ref::<SimulationError>(),
            Some(&SimulationError::Singularity { step: 1, particle: 0 })
        );
        assert!(output.snapshots.is_empty());
        assert!(output.records.is_empty());
    }

    #[test]
    fn monitor_baseline_is_the_initial_state() {
        let sim = GalaxySimulation::new(short_config()).unwrap();
        let initial = sim.conserved().unwrap();
        assert_eq!(sim.monitor.baseline(), &initial);
    }
}
