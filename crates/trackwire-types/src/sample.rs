//! Published tracker state.

use glam::{DQuat, DVec3};

/// Position and orientation of one tracked body as decoded from the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: DVec3,
    pub orientation: DQuat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
        }
    }
}

impl Pose {
    pub fn new(position: DVec3, orientation: DQuat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Mirror the pose into the opposite handedness.
    ///
    /// Position z and the quaternion x and y components are negated together;
    /// applying this twice yields the original pose.
    pub fn invert_z(self) -> Self {
        let q = self.orientation;
        Self {
            position: DVec3::new(self.position.x, self.position.y, -self.position.z),
            orientation: DQuat::from_xyzw(-q.x, -q.y, q.z, q.w),
        }
    }
}

/// Velocities carried explicitly by a wire format.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WireVelocity {
    /// Linear velocity in wire units per second.
    pub linear: DVec3,
    /// Angular velocity vector (axis scaled by rad/s).
    pub angular: DVec3,
}

/// Last-known state of one logical tracker.
///
/// Orientation is always normalized before a sample is published.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSample {
    pub position: DVec3,
    pub orientation: DQuat,
    pub velocity: DVec3,
    pub angular_velocity: DVec3,
    /// Monotonic arrival time, see [`crate::monotonic_now_ns`].
    pub timestamp_ns: u64,
}

impl Default for TrackerSample {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            timestamp_ns: 0,
        }
    }
}

impl TrackerSample {
    /// A sample at rest at `pose`, received at `timestamp_ns`.
    pub fn at_rest(pose: Pose, timestamp_ns: u64) -> Self {
        Self {
            position: pose.position,
            orientation: crate::orientation::normalize_or_identity(pose.orientation),
            velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            timestamp_ns,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.orientation)
    }
}
