use crate::cpu_state::ParticleState;
use crate::error::{Result, SimulationError};
use crate::forces::Gravity;
use log::{debug, info};
use simulation_common::{GalaxyConfig, Vec3};
use std::f64::consts::PI;

// Ring k (0-based) holds 12 + 6k tracers.
const BASE_RING_PARTICLES: usize = 12;
const RING_PARTICLE_INCREMENT: usize = 6;

/// Semi-major axis of the relative orbit.
pub fn semi_major_axis(config: &GalaxyConfig) -> f64 {
    config.minimum_distance / (1.0 - config.eccentricity)
}

/// Apastron separation of the two centers.
pub fn apastron_distance(config: &GalaxyConfig) -> f64 {
    semi_major_axis(config) * (1.0 + config.eccentricity)
}

/// Period of the two-body orbit, `2π sqrt(a³ / M)` with G = 1.
pub fn orbital_period(config: &GalaxyConfig) -> f64 {
    let a = semi_major_axis(config);
    2.0 * PI * (a * a * a / (config.mass1 + config.mass2)).sqrt()
}

/// Number of tracers in one galaxy.
pub fn tracers_per_galaxy(number_of_rings: u32) -> usize {
    (0..number_of_rings as usize).map(|k| BASE_RING_PARTICLES + RING_PARTICLE_INCREMENT * k).sum()
}

/// Builds two disk galaxies on a bound Keplerian orbit.
///
/// Each galaxy is a massive center surrounded by rings of massless tracers on
/// circular orbits. The binary starts at apastron with its center of mass at
/// rest at the origin. Particle order: the two centers, then the tracers of
/// galaxy 1, then galaxy 2.
pub fn initialise(config: &GalaxyConfig, gravity: &Gravity) -> Result<ParticleState> {
    validate(config)?;
    info!("Setting up initial conditions");

    let mass_total = config.mass1 + config.mass2;
    let a = semi_major_axis(config);
    let radius = apastron_distance(config);

    // --- Galaxy Centers ---
    // Centers sit on the x axis with the center of mass at the origin.
    let center1 = Vec3::new(-radius * config.mass2 / mass_total, 0.0, 0.0);
    let center2 = Vec3::new(radius * config.mass1 / mass_total, 0.0, 0.0);

    // Relative speed at apastron from the specific angular momentum sqrt(a (1 - e²) M).
    let v0 = (a * (1.0 - config.eccentricity * config.eccentricity) * mass_total).sqrt() / radius;
    let velocity1 = Vec3::new(0.0, -v0 * config.mass2 / mass_total, 0.0);
    let velocity2 = Vec3::new(0.0, v0 * config.mass1 / mass_total, 0.0);
    debug!("Apastron separation {:.4}, relative speed {:.6}", radius, v0);

    // --- Tracer Rings ---
    let inclination = config.inclination_deg.to_radians();
    let per_galaxy = tracers_per_galaxy(config.number_of_rings);
    let n = 2 + 2 * per_galaxy;

    let mut positions = Vec::with_capacity(n);
    let mut velocities = Vec::with_capacity(n);
    let mut masses = Vec::with_capacity(n);

    positions.extend([center1, center2]);
    velocities.extend([velocity1, velocity2]);
    masses.extend([config.mass1, config.mass2]);

    for (center, velocity, mass) in [(center1, velocity1, config.mass1), (center2, velocity2, config.mass2)] {
        add_rings(&mut positions, &mut velocities, center, velocity, mass, inclination, config);
    }
    masses.resize(n, 0.0);

    info!("Created {} particles ({} tracers per galaxy)", n, per_galaxy);
    ParticleState::new(positions, velocities, masses, gravity)
}

fn add_rings(
    positions: &mut Vec<Vec3>,
    velocities: &mut Vec<Vec3>,
    center: Vec3,
    center_velocity: Vec3,
    center_mass: f64,
    inclination: f64,
    config: &GalaxyConfig,
) {
    let (sin_i, cos_i) = inclination.sin_cos();
    for k in 0..config.number_of_rings as usize {
        let r = (k + 1) as f64 * config.ring_spacing;
        let n_phi = BASE_RING_PARTICLES + RING_PARTICLE_INCREMENT * k;
        // Keplerian circular speed around the center.
        let v_phi = (center_mass / r).sqrt();
        let d_phi = 2.0 * PI / n_phi as f64;
        debug!("Ring r = {}, n_phi = {}, d_phi = {:.5}", r, n_phi, d_phi);

        for j in 0..n_phi {
            let (sin_phi, cos_phi) = (j as f64 * d_phi).sin_cos();
            // Ring in the xy plane, tilted about the y axis.
            let offset = Vec3::new(r * cos_phi * cos_i, r * sin_phi, -r * cos_phi * sin_i);
            let speed = Vec3::new(-v_phi * sin_phi * cos_i, v_phi * cos_phi, v_phi * sin_phi * sin_i);
            positions.push(center + offset);
            velocities.push(center_velocity + speed);
        }
    }
}

fn validate(config: &GalaxyConfig) -> Result<()> {
    let invalid = |msg: String| Err(SimulationError::InvalidConfig(msg));
    if !(config.mass1 > 0.0 && config.mass2 > 0.0) {
        return invalid(format!("galaxy masses must be positive, got {} and {}", config.mass1, config.mass2));
    }
    if !(0.0..1.0).contains(&config.eccentricity) {
        return invalid(format!("eccentricity must lie in [0, 1), got {}", config.eccentricity));
    }
    if !(config.minimum_distance > 0.0) {
        return invalid(format!("minimum_distance must be positive, got {}", config.minimum_distance));
    }
    if config.number_of_rings > 0 && !(config.ring_spacing > 0.0) {
        return invalid(format!("ring_spacing must be positive, got {}", config.ring_spacing));
    }
    Ok(())
}
