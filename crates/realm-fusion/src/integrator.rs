use glam::Vec3;
use realm_config::FusionConfig;

/// Turns noisy linear acceleration into a bounded, self-braking velocity.
///
/// Not a Kalman filter: a hand-tuned dampen-then-brake feedback per axis.
/// Acceleration that opposes the current velocity is amplified, acceleration
/// that would speed us up is weakened the closer we are to `max_velocity`,
/// and a continuous braking term pulls velocity back to zero.
#[derive(Debug, Clone, Copy)]
pub struct AccelerationIntegrator {
    max_velocity: f32,
    braking_convergence: f32,
    max_brake_distance: f32,
}

impl AccelerationIntegrator {
    pub fn new(max_velocity: f32, braking_convergence: f32, max_brake_distance: f32) -> Self {
        Self {
            max_velocity,
            braking_convergence,
            max_brake_distance,
        }
    }

    pub fn from_config(config: &FusionConfig) -> Self {
        Self::new(
            config.max_velocity,
            config.braking_convergence,
            config.max_brake_distance,
        )
    }

    /// Velocity change for one axis.
    ///
    /// `acceleration` in m/s^2, `velocity` in m/s, `interval` in seconds.
    /// `brake_factor` >= 1 scales the braking term, see [`Self::brake_factor`].
    pub fn dampen(&self, acceleration: f32, velocity: f32, interval: f32, brake_factor: f32) -> f32 {
        let increment = acceleration * interval;
        let correction = (velocity.abs() / self.max_velocity).min(1.0);

        // Zero counts as positive on both sides.
        let opposing = (acceleration >= 0.0) != (velocity >= 0.0);
        let dampened = if opposing {
            increment * (1.0 + correction)
        } else {
            increment * (1.0 - correction)
        };

        let braking = velocity
            * interval
            * (1.0 + acceleration.abs())
            * self.braking_convergence
            * brake_factor;
        // Braking alone never reverses the direction of travel.
        let braking = braking.abs().min(velocity.abs()).copysign(velocity);

        dampened - braking
    }

    /// Extra braking when the dead-reckoned position has drifted away from
    /// the tracker: 1 with no divergence, up to 2 at `max_brake_distance`.
    pub fn brake_factor(&self, divergence: Option<f32>) -> f32 {
        match divergence {
            Some(distance) if distance.is_finite() => {
                1.0 + (distance.abs() / self.max_brake_distance).min(1.0)
            }
            _ => 1.0,
        }
    }

    /// Apply one world-frame acceleration sample to `velocity`.
    pub fn integrate(&self, velocity: &mut Vec3, acceleration: Vec3, interval: f32, brake_factor: f32) {
        velocity.x += self.dampen(acceleration.x, velocity.x, interval, brake_factor);
        velocity.y += self.dampen(acceleration.y, velocity.y, interval, brake_factor);
        velocity.z += self.dampen(acceleration.z, velocity.z, interval, brake_factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn integrator() -> AccelerationIntegrator {
        AccelerationIntegrator::new(2.0, 1.5, 100.0)
    }

    #[test]
    fn at_rest_acts_like_plain_integration() {
        let delta = integrator().dampen(1.0, 0.0, 0.01, 1.0);
        assert_abs_diff_eq!(delta, 0.01, epsilon = 1e-7);
    }

    #[test]
    fn opposing_acceleration_is_amplified() {
        let integrator = integrator();
        // Moving at half the ceiling.
        let braking = 1.0 * 0.01 * 2.0 * 1.5;
        let reinforcing = integrator.dampen(1.0, 1.0, 0.01, 1.0);
        let opposing = integrator.dampen(-1.0, 1.0, 0.01, 1.0);
        assert_abs_diff_eq!(reinforcing, 0.01 * 0.5 - braking, epsilon = 1e-6);
        assert_abs_diff_eq!(opposing, -0.01 * 1.5 - braking, epsilon = 1e-6);
    }

    #[test]
    fn zero_velocity_counts_as_positive() {
        let integrator = integrator();
        // Negative acceleration from rest opposes a "positive" zero velocity,
        // correction is zero so the increment passes through unchanged.
        assert_abs_diff_eq!(integrator.dampen(-2.0, 0.0, 0.1, 1.0), -0.2, epsilon = 1e-6);
    }

    #[test]
    fn braking_decays_velocity_without_reversing() {
        let integrator = AccelerationIntegrator::new(2.0, 50.0, 100.0);
        let mut velocity = Vec3::new(1.0, -0.5, 0.0);
        integrator.integrate(&mut velocity, Vec3::ZERO, 0.1, 2.0);
        assert_eq!(velocity, Vec3::ZERO);

        let integrator = self::integrator();
        let mut velocity = Vec3::new(1.0, -0.5, 0.0);
        for _ in 0..300 {
            let before = velocity;
            integrator.integrate(&mut velocity, Vec3::ZERO, 0.016, 1.0);
            assert!(velocity.x <= before.x && velocity.x >= 0.0);
            assert!(velocity.y >= before.y && velocity.y <= 0.0);
        }
        assert!(velocity.length() < 0.01);
    }

    #[test]
    fn velocity_stays_bounded_under_constant_acceleration() {
        let integrator = integrator();
        let acceleration = 5.0;
        let interval = 0.016;
        let step = acceleration * interval;

        let mut velocity = 0.0;
        for _ in 0..5_000 {
            velocity += integrator.dampen(acceleration, velocity, interval, 1.0);
            assert!(velocity <= integrator.max_velocity + step);
        }
        assert!(velocity < integrator.max_velocity);
        assert!(velocity > 0.0);
    }

    #[test]
    fn divergence_increases_braking() {
        let integrator = integrator();
        assert_eq!(integrator.brake_factor(None), 1.0);
        assert_eq!(integrator.brake_factor(Some(0.0)), 1.0);
        assert_abs_diff_eq!(integrator.brake_factor(Some(50.0)), 1.5, epsilon = 1e-6);
        assert_eq!(integrator.brake_factor(Some(500.0)), 2.0);
        assert_eq!(integrator.brake_factor(Some(f32::NAN)), 1.0);

        let loose = integrator.dampen(0.0, 1.0, 0.016, 1.0);
        let hard = integrator.dampen(0.0, 1.0, 0.016, 2.0);
        assert!(hard < loose);
    }
}
