use serde::{Serialize, Deserialize};
use crate::vecmath::Vec3;

/// A snapshot of the particle ensemble at a specific time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Sequential output index; 0 is the initial condition.
    pub index: u32,
    pub time: f64,
    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub masses: Vec<f64>,
}

impl Snapshot {
    pub fn particle_count(&self) -> usize {
        self.masses.len()
    }

    /// Iterates the indices of particles with nonzero mass (the galaxy centers).
    pub fn massive_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.masses.iter().enumerate().filter(|(_, &m)| m > 0.0).map(|(i, _)| i)
    }
}

/// Column names of the conserved-quantity log, in file order.
pub const CONSERVED_HEADER: [&str; 9] = [
    "time",
    "kinetic_energy",
    "potential_energy",
    "momentum_x",
    "momentum_y",
    "momentum_z",
    "angular_momentum_x",
    "angular_momentum_y",
    "angular_momentum_z",
];

/// One row of the conserved-quantity log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConservedRecord {
    pub time: f64,
    pub kinetic_energy: f64,
    pub potential_energy: f64,
    pub momentum_x: f64,
    pub momentum_y: f64,
    pub momentum_z: f64,
    pub angular_momentum_x: f64,
    pub angular_momentum_y: f64,
    pub angular_momentum_z: f64,
}

impl ConservedRecord {
    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy + self.potential_energy
    }

    /// Values in `CONSERVED_HEADER` order.
    pub fn values(&self) -> [f64; 9] {
        [
            self.time,
            self.kinetic_energy,
            self.potential_energy,
            self.momentum_x,
            self.momentum_y,
            self.momentum_z,
            self.angular_momentum_x,
            self.angular_momentum_y,
            self.angular_momentum_z,
        ]
    }
}
