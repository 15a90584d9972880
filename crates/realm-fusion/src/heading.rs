//! Heading (rotation about world up) helpers.
//!
//! World frame is right-handed with Y up. A camera with identity orientation
//! looks down -Z. Headings are degrees, counter-clockwise seen from above.

use glam::{Quat, Vec3};
use realm_config::HoldingMode;

/// Orientation of a handheld device from its tilt angles (degrees).
///
/// The device reports intrinsic Tait-Bryan angles in Z-X'-Y'' order, which in
/// our Y-up frame become Y-X-Z. The camera looks out of the back of the
/// device rather than the top, hence the -90 deg X rotation, and the screen's
/// own rotation is undone last.
pub fn orientation_from_tilt(alpha: f32, beta: f32, gamma: f32, screen_rotation: f32) -> Quat {
    let device = Quat::from_rotation_y(alpha.to_radians())
        * Quat::from_rotation_x(beta.to_radians())
        * Quat::from_rotation_z(-gamma.to_radians());
    let camera = Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2);
    let screen = Quat::from_rotation_z(-screen_rotation.to_radians());
    (device * camera * screen).normalize()
}

/// Heading of an orientation in `[0, 360)`.
///
/// Projects the view direction onto the horizontal plane. When looking
/// straight up or down the device's up axis stands in for it.
pub fn heading_from_orientation(q: Quat) -> f32 {
    let mut forward = q * Vec3::NEG_Z;
    if forward.x * forward.x + forward.z * forward.z < 1e-8 {
        let up = q * Vec3::Y;
        forward = if forward.y < 0.0 { up } else { -up };
    }
    normalize_heading((-forward.x).atan2(-forward.z).to_degrees())
}

/// Pure rotation about world up.
pub fn heading_quaternion(degrees: f32) -> Quat {
    Quat::from_rotation_y(degrees.to_radians())
}

/// Shortest signed equivalent of an angle, in `(-180, 180]`.
pub fn minimal_signed_delta(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Signed rotation that takes heading `from` to heading `to`.
pub fn heading_delta(from: f32, to: f32) -> f32 {
    minimal_signed_delta(to - from)
}

/// Wrap into `[0, 360)`.
pub fn normalize_heading(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Convert a clockwise compass reading into a world heading.
///
/// Held in landscape the compass is skewed by the device pitch, in the
/// direction of the roll.
pub fn compass_heading(compass: f32, beta: f32, gamma: f32, holding: HoldingMode) -> f32 {
    let measured = match holding {
        HoldingMode::Landscape => compass + if gamma > 0.0 { beta } else { -beta },
        HoldingMode::Portrait => compass,
    };
    normalize_heading(360.0 - normalize_heading(measured))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn signed_delta_wraps_around_north() {
        assert_abs_diff_eq!(heading_delta(350.0, 10.0), 20.0, epsilon = 1e-4);
        assert_abs_diff_eq!(heading_delta(10.0, 350.0), -20.0, epsilon = 1e-4);
        assert_eq!(minimal_signed_delta(180.0), 180.0);
        assert_eq!(minimal_signed_delta(-180.0), 180.0);
        assert_eq!(minimal_signed_delta(720.0), 0.0);
    }

    #[test]
    fn signed_delta_property_over_grid() {
        let mut a = 0.0_f32;
        while a < 360.0 {
            let mut b = 0.0_f32;
            while b < 360.0 {
                let d = heading_delta(a, b);
                assert!(d > -180.0 && d <= 180.0, "delta({a}, {b}) = {d}");
                let landed = normalize_heading(a + d);
                let err = minimal_signed_delta(landed - b).abs();
                assert!(err < 1e-3, "{a} + {d} != {b}");
                b += 7.5;
            }
            a += 5.0;
        }
    }

    #[test]
    fn upright_device_is_identity() {
        let q = orientation_from_tilt(0.0, 90.0, 0.0, 0.0);
        assert!(q.angle_between(Quat::IDENTITY) < 1e-4);
    }

    #[test]
    fn alpha_turns_heading_when_upright() {
        for alpha in [0.0_f32, 45.0, 90.0, 200.0, 315.0] {
            let q = orientation_from_tilt(alpha, 90.0, 0.0, 0.0);
            assert_abs_diff_eq!(
                minimal_signed_delta(heading_from_orientation(q) - alpha),
                0.0,
                epsilon = 1e-3
            );
        }
    }

    #[test]
    fn screen_rotation_rolls_about_view_axis() {
        let q = orientation_from_tilt(30.0, 90.0, 0.0, 90.0);
        let forward = q * Vec3::NEG_Z;
        let expected = heading_quaternion(30.0) * Vec3::NEG_Z;
        assert!(forward.distance(expected) < 1e-4);
        // Up now points sideways: the horizon stays level but the screen is turned.
        let up = q * Vec3::Y;
        assert_abs_diff_eq!(up.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn heading_round_trip() {
        let q = orientation_from_tilt(90.0, 90.0, 0.0, 0.0);
        let heading = heading_from_orientation(q);
        let back = heading_from_orientation(heading_quaternion(heading));
        assert_abs_diff_eq!(heading, 90.0, epsilon = 1e-3);
        assert_abs_diff_eq!(back, heading, epsilon = 1e-3);
    }

    #[test]
    fn heading_composes_additively() {
        let q = orientation_from_tilt(20.0, 70.0, 10.0, 0.0);
        let base = heading_from_orientation(q);
        let turned = heading_from_orientation(heading_quaternion(45.0) * q);
        assert_abs_diff_eq!(heading_delta(base, turned), 45.0, epsilon = 1e-3);
    }

    #[test]
    fn heading_defined_when_looking_down() {
        let q = heading_quaternion(60.0) * Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        assert_abs_diff_eq!(heading_from_orientation(q), 60.0, epsilon = 1e-3);
        let q = heading_quaternion(60.0) * Quat::from_rotation_x(std::f32::consts::FRAC_PI_2);
        assert_abs_diff_eq!(heading_from_orientation(q), 60.0, epsilon = 1e-3);
    }

    #[test]
    fn compass_is_counter_clockwise() {
        assert_abs_diff_eq!(
            compass_heading(90.0, 0.0, 0.0, HoldingMode::Portrait),
            270.0,
            epsilon = 1e-4
        );
        assert_eq!(compass_heading(0.0, 0.0, 0.0, HoldingMode::Portrait), 0.0);
        // Landscape adds pitch toward the roll side.
        assert_abs_diff_eq!(
            compass_heading(90.0, 10.0, 5.0, HoldingMode::Landscape),
            260.0,
            epsilon = 1e-4
        );
        assert_abs_diff_eq!(
            compass_heading(90.0, 10.0, -5.0, HoldingMode::Landscape),
            280.0,
            epsilon = 1e-4
        );
    }
}
