use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::SimParams;
use std::path::Path;

// Two galaxy centers on a bound Keplerian orbit, each carrying rings of tracers
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GalaxyConfig {
    pub mass1: f64,
    pub mass2: f64,
    pub eccentricity: f64,
    pub minimum_distance: f64,
    /// Inclination of both disks, in degrees.
    pub inclination_deg: f64,
    pub number_of_rings: u32,
    pub ring_spacing: f64,
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TimingConfig {
    pub dt: f64,
    /// Simulated time between two particle snapshots.
    pub dt_out: f64,
    pub t_max: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GravityConfig {
    /// Plummer softening length; 0 keeps the bare Newtonian kernel.
    #[serde(default)]
    pub softening: f64,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DiagnosticsConfig {
    /// Relative energy error above which the driver warns.
    #[serde(default = "default_energy_tolerance")]
    pub energy_tolerance: f64,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub output_directory: String,
    pub filename_prefix: String,
    #[serde(default = "default_true")]
    pub save_snapshots_csv: bool,
    #[serde(default = "default_true")]
    pub save_conserved: bool,
    /// Aggregated snapshot archive: "json", "bincode", "messagepack". None skips it.
    #[serde(default)]
    pub format: Option<String>,
}

fn default_parallel() -> bool {
    true
}

fn default_energy_tolerance() -> f64 {
    1e-3
}

fn default_true() -> bool {
    true
}

impl Default for GravityConfig {
    fn default() -> Self {
        GravityConfig { softening: 0.0, parallel: default_parallel() }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        DiagnosticsConfig { energy_tolerance: default_energy_tolerance() }
    }
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub galaxies: GalaxyConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub gravity: GravityConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    pub output: OutputConfig,
}

impl Default for SimulationConfig {
    /// The classic interacting-galaxies setup: equal masses, e = 0.6, periastron 25.
    fn default() -> Self {
        SimulationConfig {
            galaxies: GalaxyConfig {
                mass1: 1.0,
                mass2: 1.0,
                eccentricity: 0.6,
                minimum_distance: 25.0,
                inclination_deg: 60.0,
                number_of_rings: 5,
                ring_spacing: 3.0,
            },
            timing: TimingConfig { dt: 0.01, dt_out: 10.0, t_max: 2000.0 },
            gravity: GravityConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            output: OutputConfig {
                output_directory: "output".to_string(),
                filename_prefix: "nbody".to_string(),
                save_snapshots_csv: true,
                save_conserved: true,
                format: Some("bincode".to_string()),
            },
        }
    }
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let g = &self.galaxies;
        if !(g.mass1 > 0.0 && g.mass2 > 0.0) {
            anyhow::bail!("mass1 and mass2 must be positive (got {} and {}).", g.mass1, g.mass2);
        }
        if !(0.0..1.0).contains(&g.eccentricity) {
            anyhow::bail!("eccentricity must lie in [0, 1) for a bound orbit (got {}).", g.eccentricity);
        }
        if !(g.minimum_distance > 0.0) {
            anyhow::bail!("minimum_distance must be positive.");
        }
        if g.number_of_rings > 0 && !(g.ring_spacing > 0.0) {
            anyhow::bail!("ring_spacing must be positive when rings are requested.");
        }

        let t = &self.timing;
        if !(t.dt > 0.0 && t.dt.is_finite()) {
            anyhow::bail!("dt must be a positive finite number (got {}).", t.dt);
        }
        if !(t.dt_out > 0.0) {
            anyhow::bail!("dt_out must be positive.");
        }
        if !(t.t_max >= 0.0 && t.t_max.is_finite()) {
            anyhow::bail!("t_max must be a non-negative finite number.");
        }

        if !(self.gravity.softening >= 0.0 && self.gravity.softening.is_finite()) {
            anyhow::bail!("softening must be a non-negative finite number.");
        }
        if self.output.filename_prefix.is_empty() {
            anyhow::bail!("filename_prefix must not be empty.");
        }
        Ok(())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let dt = self.timing.dt;
        let total_steps = (self.timing.t_max / dt).ceil() as u64;
        // Snapshot cadence snaps to whole steps; never below one step.
        let output_interval_steps = ((self.timing.dt_out / dt).round() as u64).max(1);

        SimParams {
            dt,
            total_steps,
            output_interval_steps,
            softening: self.gravity.softening,
            parallel: self.gravity.parallel,
            energy_tolerance: self.diagnostics.energy_tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[galaxies]
mass1 = 1.0
mass2 = 1.0
eccentricity = 0.6
minimum_distance = 25.0
inclination_deg = 60.0
number_of_rings = 5
ring_spacing = 3.0

[timing]
dt = 0.01
dt_out = 10.0
t_max = 2000.0

[output]
output_directory = "output"
filename_prefix = "nbody"
"#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = SimulationConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.gravity, GravityConfig::default());
        assert_eq!(config.gravity.softening, 0.0);
        assert_eq!(config.diagnostics.energy_tolerance, 1e-3);
        assert!(config.output.save_snapshots_csv);
        assert_eq!(config.output.format, None);
        assert_eq!(config.galaxies, SimulationConfig::default().galaxies);
    }

    #[test]
    fn derives_step_counts() {
        let params = SimulationConfig::default().get_sim_params();
        assert_eq!(params.total_steps, 200_000);
        assert_eq!(params.output_interval_steps, 1000);
        assert_eq!(params.dt, 0.01);
    }

    #[test]
    fn output_interval_never_zero() {
        let mut config = SimulationConfig::default();
        config.timing.dt_out = 0.001;
        assert_eq!(config.get_sim_params().output_interval_steps, 1);
    }

    #[test]
    fn rejects_non_positive_timestep() {
        let text = MINIMAL.replace("dt = 0.01", "dt = 0.0");
        let err = SimulationConfig::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("dt must be"));
    }

    #[test]
    fn rejects_unbound_orbit() {
        let mut config = SimulationConfig::default();
        config.galaxies.eccentricity = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_softening() {
        let mut config = SimulationConfig::default();
        config.gravity.softening = -0.1;
        assert!(config.validate().is_err());
    }
}
