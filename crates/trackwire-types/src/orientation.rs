//! Orientation reconstruction for the three encodings seen on the wire.
//!
//! - Euler angles in degrees, applied Z first, then Y, then X
//!   (`Rz * Ry * Rx`; azimuth, elevation, roll)
//! - row-major 3x3 rotation matrices
//! - quaternions sent as `x y z w`
//!
//! All constructors return a normalized quaternion. Degenerate input (zero
//! quaternion, non-finite values) falls back to identity rather than
//! propagating NaN into published state.

use glam::{DMat3, DQuat, DVec3};

/// Normalize `q`, or return identity when it has no usable length.
pub fn normalize_or_identity(q: DQuat) -> DQuat {
    let len = q.length();
    if len.is_finite() && len > 1e-12 {
        q / len
    } else {
        DQuat::IDENTITY
    }
}

/// Compose azimuth (about Z), elevation (about Y) and roll (about X).
pub fn from_euler_zyx_deg(azimuth: f64, elevation: f64, roll: f64) -> DQuat {
    let q = DQuat::from_rotation_z(azimuth.to_radians())
        * DQuat::from_rotation_y(elevation.to_radians())
        * DQuat::from_rotation_x(roll.to_radians());
    normalize_or_identity(q)
}

/// Recover `(azimuth, elevation, roll)` in degrees from a quaternion.
///
/// Inverse of [`from_euler_zyx_deg`] away from the elevation = ±90° singularity.
pub fn to_euler_zyx_deg(q: DQuat) -> [f64; 3] {
    let m = DMat3::from_quat(normalize_or_identity(q));
    // Row-major element (row, col) is m.col(col)[row].
    let r00 = m.x_axis.x;
    let r10 = m.x_axis.y;
    let r20 = m.x_axis.z;
    let r21 = m.y_axis.z;
    let r22 = m.z_axis.z;
    let elevation = (-r20).clamp(-1.0, 1.0).asin();
    let azimuth = r10.atan2(r00);
    let roll = r21.atan2(r22);
    [azimuth.to_degrees(), elevation.to_degrees(), roll.to_degrees()]
}

/// Build a quaternion from a row-major rotation matrix.
pub fn from_row_major(m: &[f64; 9]) -> DQuat {
    if m.iter().any(|v| !v.is_finite()) {
        return DQuat::IDENTITY;
    }
    let mat = DMat3::from_cols_array(m).transpose();
    normalize_or_identity(DQuat::from_mat3(&mat))
}

/// Row-major rotation matrix of `q`.
pub fn to_row_major(q: DQuat) -> [f64; 9] {
    DMat3::from_quat(normalize_or_identity(q))
        .transpose()
        .to_cols_array()
}

/// Quaternion sent as four components in `x y z w` order.
pub fn from_xyzw(x: f64, y: f64, z: f64, w: f64) -> DQuat {
    normalize_or_identity(DQuat::from_xyzw(x, y, z, w))
}

/// Angular velocity that rotates `from` into `to` over `dt_s` seconds.
///
/// Returns zero for non-positive `dt_s`. The shorter of the two equivalent
/// rotations is used.
pub fn angular_velocity_between(from: DQuat, to: DQuat, dt_s: f64) -> DVec3 {
    if !dt_s.is_finite() || dt_s <= 0.0 {
        return DVec3::ZERO;
    }
    let delta = normalize_or_identity(to * from.conjugate());
    rotation_vector(delta) / dt_s
}

/// Angular velocity from a per-interval rotation `delta` applied every `dt_s`.
pub fn angular_velocity_from_delta(delta: DQuat, dt_s: f64) -> DVec3 {
    if !dt_s.is_finite() || dt_s <= 0.0 {
        return DVec3::ZERO;
    }
    rotation_vector(normalize_or_identity(delta)) / dt_s
}

fn rotation_vector(q: DQuat) -> DVec3 {
    let q = if q.w < 0.0 { -q } else { q };
    let v = DVec3::new(q.x, q.y, q.z);
    let s = v.length();
    if s < 1e-15 {
        DVec3::ZERO
    } else {
        // atan2 keeps precision for the tiny per-frame rotations of fast trackers.
        v / s * (2.0 * s.atan2(q.w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn quat_close(a: DQuat, b: DQuat) -> bool {
        // q and -q are the same rotation.
        a.dot(b).abs() > 1.0 - 1e-9
    }

    #[test]
    fn test_euler_azimuth_only_rotates_about_z() {
        let q = from_euler_zyx_deg(90.0, 0.0, 0.0);
        let v = q * DVec3::X;
        assert!((v - DVec3::Y).length() < 1e-9);
    }

    #[test]
    fn test_euler_order_is_z_then_y_then_x() {
        let q = from_euler_zyx_deg(30.0, 20.0, 10.0);
        let expected = DQuat::from_rotation_z(30f64.to_radians())
            * DQuat::from_rotation_y(20f64.to_radians())
            * DQuat::from_rotation_x(10f64.to_radians());
        assert!(quat_close(q, expected));
    }

    #[test]
    fn test_euler_round_trip() {
        let angles = [-120.0, 35.0, 170.0];
        let back = to_euler_zyx_deg(from_euler_zyx_deg(angles[0], angles[1], angles[2]));
        for (a, b) in angles.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-9, "{a} != {b}");
        }
    }

    #[test]
    fn test_row_major_round_trip() {
        let q = DQuat::from_axis_angle(DVec3::new(1.0, 2.0, 3.0).normalize(), 1.1);
        let m = to_row_major(q);
        assert!(quat_close(from_row_major(&m), q));
    }

    #[test]
    fn test_row_major_layout() {
        // 90 degrees about Z maps X onto Y: first column of R is (0, 1, 0).
        let m = to_row_major(DQuat::from_rotation_z(FRAC_PI_2));
        assert!(m[0].abs() < 1e-12);
        assert!((m[3] - 1.0).abs() < 1e-12);
        assert!((m[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs_fall_back_to_identity() {
        assert_eq!(from_xyzw(0.0, 0.0, 0.0, 0.0), DQuat::IDENTITY);
        assert_eq!(from_row_major(&[f64::NAN; 9]), DQuat::IDENTITY);
    }

    #[test]
    fn test_angular_velocity_between() {
        let from = DQuat::IDENTITY;
        let to = DQuat::from_rotation_z(0.1);
        let w = angular_velocity_between(from, to, 0.01);
        assert!((w - DVec3::new(0.0, 0.0, 10.0)).length() < 1e-9);
        assert_eq!(angular_velocity_between(from, to, 0.0), DVec3::ZERO);
    }

    #[test]
    fn test_angular_velocity_takes_short_path() {
        let from = DQuat::IDENTITY;
        let to = -DQuat::from_rotation_x(0.2);
        let w = angular_velocity_between(from, to, 1.0);
        assert!((w - DVec3::new(0.2, 0.0, 0.0)).length() < 1e-9);
    }
}
