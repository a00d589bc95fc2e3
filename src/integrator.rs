use crate::cpu_state::{check_ensemble, check_len, validate_timestep};
use crate::error::Result;
use crate::forces::Gravity;
use simulation_common::Vec3;

/// Advances `(position, velocity, acceleration)` by one fixed kick-drift-kick
/// (velocity-Verlet) step of size `dt`.
///
/// The second half-kick uses the acceleration evaluated at the drifted
/// positions, and that field is handed back for the next step's first kick.
///
/// Inputs are left untouched; the next state is returned. Non-finite values
/// from a singular configuration pass through unchanged.
pub fn integrate_step(
    position: &[Vec3],
    velocity: &[Vec3],
    acceleration: &[Vec3],
    mass: &[f64],
    dt: f64,
    gravity: &Gravity,
) -> Result<(Vec<Vec3>, Vec<Vec3>, Vec<Vec3>)> {
    validate_timestep(dt)?;
    check_ensemble(position, velocity, mass)?;
    check_len("accelerations", position.len(), acceleration.len())?;

    let mut position = position.to_vec();
    let mut velocity = velocity.to_vec();
    let mut acceleration = acceleration.to_vec();
    leapfrog_in_place(&mut position, &mut velocity, &mut acceleration, mass, dt, gravity);
    Ok((position, velocity, acceleration))
}

/// The step itself, on caller-owned buffers whose lengths were already checked.
pub(crate) fn leapfrog_in_place(
    position: &mut [Vec3],
    velocity: &mut [Vec3],
    acceleration: &mut [Vec3],
    mass: &[f64],
    dt: f64,
    gravity: &Gravity,
) {
    let half_dt = 0.5 * dt;

    // Kick: v_n+1/2 = v_n + (dt/2) a_n
    for (v, a) in velocity.iter_mut().zip(acceleration.iter()) {
        *v += *a * half_dt;
    }

    // Drift: x_n+1 = x_n + dt v_n+1/2
    for (x, v) in position.iter_mut().zip(velocity.iter()) {
        *x += *v * dt;
    }

    // a_n+1 from x_n+1
    gravity.accumulate(position, mass, acceleration);

    // Kick: v_n+1 = v_n+1/2 + (dt/2) a_n+1
    for (v, a) in velocity.iter_mut().zip(acceleration.iter()) {
        *v += *a * half_dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;
    use crate::forces::acceleration;
    use approx::assert_relative_eq;

    fn binary() -> (Vec<Vec3>, Vec<Vec3>, Vec<f64>) {
        // Circular orbit of two unit masses at separation 2: v = sqrt(M / r) / 2 per body.
        let v = (2.0f64 / 2.0).sqrt() / 2.0;
        (
            vec![Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)],
            vec![Vec3::new(0.0, -v, 0.0), Vec3::new(0.0, v, 0.0)],
            vec![1.0, 1.0],
        )
    }

    #[test]
    fn free_particles_drift_in_straight_lines() {
        let position = vec![Vec3::new(1.0, 2.0, 3.0)];
        let velocity = vec![Vec3::new(0.5, 0.0, -1.0)];
        let (x, v, a) = integrate_step(&position, &velocity, &[Vec3::zero()], &[1.0], 2.0, &Gravity::default()).unwrap();
        assert_eq!(x[0], Vec3::new(2.0, 2.0, 1.0));
        assert_eq!(v[0], velocity[0]);
        assert_eq!(a[0], Vec3::zero());
    }

    #[test]
    fn uses_updated_acceleration_for_second_kick() {
        // Tracer at rest next to a unit mass: after one step the second kick
        // must come from the field at the drifted position.
        let position = vec![Vec3::zero(), Vec3::new(1.0, 0.0, 0.0)];
        let velocity = vec![Vec3::zero(), Vec3::zero()];
        let mass = vec![1.0, 0.0];
        let a0 = acceleration(&position, &mass).unwrap();
        let dt = 0.1;
        let (x, v, a) = integrate_step(&position, &velocity, &a0, &mass, dt, &Gravity::default()).unwrap();

        let v_half = a0[1] * (0.5 * dt);
        let x1 = position[1] + v_half * dt;
        let a1 = acceleration(&x, &mass).unwrap();
        assert_eq!(x[1], x1);
        assert_eq!(a, a1);
        assert_eq!(v[1], v_half + a1[1] * (0.5 * dt));
        assert_ne!(a1[1], a0[1]);
    }

    #[test]
    fn step_is_deterministic() {
        let (position, velocity, mass) = binary();
        let a0 = acceleration(&position, &mass).unwrap();
        let run = || {
            let (mut x, mut v, mut a) = (position.clone(), velocity.clone(), a0.clone());
            for _ in 0..4 {
                (x, v, a) = integrate_step(&x, &v, &a, &mass, 0.01, &Gravity::default()).unwrap();
            }
            (x, v, a)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn step_is_time_reversible() {
        let (position, velocity, mass) = binary();
        let gravity = Gravity::default();
        let a0 = acceleration(&position, &mass).unwrap();
        let (mut x, mut v, mut a) = (position.clone(), velocity.clone(), a0);
        for _ in 0..100 {
            (x, v, a) = integrate_step(&x, &v, &a, &mass, 0.05, &gravity).unwrap();
        }
        let mut v_back: Vec<Vec3> = v.iter().map(|v| -*v).collect();
        for _ in 0..100 {
            (x, v_back, a) = integrate_step(&x, &v_back, &a, &mass, 0.05, &gravity).unwrap();
        }
        for i in 0..2 {
            assert_relative_eq!(x[i].distance(position[i]), 0.0, epsilon = 1e-9);
            assert_relative_eq!((-v_back[i]).distance(velocity[i]), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn circular_orbit_keeps_its_radius() {
        let (position, velocity, mass) = binary();
        let gravity = Gravity::default();
        let a0 = acceleration(&position, &mass).unwrap();
        let (mut x, mut v, mut a) = (position, velocity, a0);
        for _ in 0..1000 {
            (x, v, a) = integrate_step(&x, &v, &a, &mass, 0.01, &gravity).unwrap();
            assert_relative_eq!(x[0].distance(x[1]), 2.0, max_relative = 1e-4);
        }
    }

    #[test]
    fn rejects_invalid_timestep() {
        let (position, velocity, mass) = binary();
        let a0 = acceleration(&position, &mass).unwrap();
        for dt in [0.0, -0.01, f64::NAN, f64::INFINITY] {
            let err = integrate_step(&position, &velocity, &a0, &mass, dt, &Gravity::default()).unwrap_err();
            assert!(matches!(err, SimulationError::InvalidTimestep(_)));
        }
    }

    #[test]
    fn rejects_mismatched_arrays() {
        let (position, velocity, mass) = binary();
        let err = integrate_step(&position, &velocity, &[Vec3::zero()], &mass, 0.01, &Gravity::default()).unwrap_err();
        assert_eq!(err, SimulationError::LengthMismatch { array: "accelerations", expected: 2, found: 1 });
        let err = integrate_step(&position, &velocity[..1], &[Vec3::zero(); 2], &mass, 0.01, &Gravity::default()).unwrap_err();
        assert_eq!(err, SimulationError::LengthMismatch { array: "velocities", expected: 2, found: 1 });
    }

    #[test]
    fn singularities_propagate_as_non_finite_values() {
        let position = vec![Vec3::zero(), Vec3::zero()];
        let velocity = vec![Vec3::zero(); 2];
        let mass = vec![1.0, 1.0];
        let (x, v, a) = integrate_step(&position, &velocity, &[Vec3::zero(); 2], &mass, 0.01, &Gravity::default()).unwrap();
        assert_eq!(x, position);
        assert!(!a[0].is_finite());
        assert!(!v[0].is_finite());
    }
}
