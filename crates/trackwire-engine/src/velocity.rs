//! Finite-difference velocity estimation.
//!
//! Formats that carry no velocities get them estimated from consecutive
//! poses of the same logical tracker. The first sample after (re)activation
//! is at rest; a tracker (re)activates on its first sample, after a gap
//! longer than the reset gap, and after [`VelocityEstimator::reset`].

use std::time::Duration;
use trackwire_types::orientation::{angular_velocity_between, normalize_or_identity};
use trackwire_types::{DVec3, Pose, TrackerSample, WireVelocity};

#[derive(Debug, Clone, Copy)]
struct Previous {
    pose: Pose,
    timestamp_ns: u64,
    velocity: DVec3,
    angular_velocity: DVec3,
}

/// Per-tracker velocity state.
#[derive(Debug, Clone)]
pub struct VelocityEstimator {
    previous: Vec<Option<Previous>>,
    /// Last velocity the wire reported; once set, poses keep it instead of
    /// being differentiated.
    wire: Vec<Option<WireVelocity>>,
    reset_gap_ns: u64,
}

impl VelocityEstimator {
    pub fn new(trackers: usize, reset_gap: Duration) -> Self {
        Self {
            previous: vec![None; trackers],
            wire: vec![None; trackers],
            reset_gap_ns: u64::try_from(reset_gap.as_nanos()).unwrap_or(u64::MAX),
        }
    }

    /// Forget every tracker's history.
    pub fn reset(&mut self) {
        self.previous.fill(None);
        self.wire.fill(None);
    }

    /// Sample for a new pose of tracker `index` received at `now_ns`.
    ///
    /// `wire` overrides estimation when the record carried velocities. A
    /// second pose sharing the previous timestamp repeats the previous
    /// velocity and leaves the differencing baseline in place.
    pub fn sample(
        &mut self,
        index: usize,
        pose: Pose,
        wire: Option<WireVelocity>,
        now_ns: u64,
    ) -> TrackerSample {
        let pose = Pose::new(pose.position, normalize_or_identity(pose.orientation));
        let mut sample = TrackerSample::at_rest(pose, now_ns);

        if let Some(slot) = self.wire.get_mut(index)
            && let Some(v) = wire
        {
            *slot = Some(v);
        }

        let previous = self.previous.get(index).copied().flatten();
        match self.wire.get(index).copied().flatten() {
            Some(v) => {
                sample.velocity = v.linear;
                sample.angular_velocity = v.angular;
            }
            None => {
                if let Some(prev) = previous
                    && let Some(dt_ns) = now_ns.checked_sub(prev.timestamp_ns)
                    && dt_ns <= self.reset_gap_ns
                {
                    if dt_ns == 0 {
                        sample.velocity = prev.velocity;
                        sample.angular_velocity = prev.angular_velocity;
                        return sample;
                    }
                    let dt_s = Duration::from_nanos(dt_ns).as_secs_f64();
                    sample.velocity = (pose.position - prev.pose.position) / dt_s;
                    sample.angular_velocity =
                        angular_velocity_between(prev.pose.orientation, pose.orientation, dt_s);
                }
            }
        }

        if let Some(slot) = self.previous.get_mut(index) {
            *slot = Some(Previous {
                pose,
                timestamp_ns: now_ns,
                velocity: sample.velocity,
                angular_velocity: sample.angular_velocity,
            });
        }
        sample
    }

    /// Apply a velocity-only record to an existing sample.
    pub fn apply_wire(
        &mut self,
        index: usize,
        base: TrackerSample,
        wire: WireVelocity,
        now_ns: u64,
    ) -> TrackerSample {
        if let Some(slot) = self.wire.get_mut(index) {
            *slot = Some(wire);
        }
        TrackerSample {
            velocity: wire.linear,
            angular_velocity: wire.angular,
            timestamp_ns: now_ns,
            ..base
        }
    }

    pub fn is_tracking(&self, index: usize) -> bool {
        self.previous.get(index).copied().flatten().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackwire_types::DQuat;

    const MS: u64 = 1_000_000;

    fn estimator() -> VelocityEstimator {
        VelocityEstimator::new(2, Duration::from_millis(100))
    }

    fn at(x: f64) -> Pose {
        Pose::new(DVec3::new(x, 0.0, 0.0), DQuat::IDENTITY)
    }

    #[test]
    fn test_first_sample_is_at_rest() {
        let mut est = estimator();
        let s = est.sample(0, at(1.0), None, 10 * MS);
        assert_eq!(s.velocity, DVec3::ZERO);
        assert_eq!(s.angular_velocity, DVec3::ZERO);
        assert!(est.is_tracking(0));
        assert!(!est.is_tracking(1));
    }

    #[test]
    fn test_linear_and_angular_difference() {
        let mut est = estimator();
        est.sample(0, at(0.0), None, 0);
        let turned = Pose::new(DVec3::new(0.5, 0.0, 0.0), DQuat::from_rotation_z(0.1));
        let s = est.sample(0, turned, None, 50 * MS);
        assert!((s.velocity - DVec3::new(10.0, 0.0, 0.0)).length() < 1e-9);
        assert!((s.angular_velocity - DVec3::new(0.0, 0.0, 2.0)).length() < 1e-6);
    }

    #[test]
    fn test_gap_and_reset_restart_estimation() {
        let mut est = estimator();
        est.sample(0, at(0.0), None, 0);
        let s = est.sample(0, at(1.0), None, 200 * MS);
        assert_eq!(s.velocity, DVec3::ZERO);

        let s = est.sample(0, at(2.0), None, 210 * MS);
        assert!(s.velocity.x > 0.0);

        est.reset();
        let s = est.sample(0, at(3.0), None, 220 * MS);
        assert_eq!(s.velocity, DVec3::ZERO);
    }

    #[test]
    fn test_same_timestamp_repeats_last_velocity() {
        let mut est = estimator();
        est.sample(0, at(0.0), None, 0);
        let first = est.sample(0, at(0.01), None, 10 * MS);
        let second = est.sample(0, at(0.02), None, 10 * MS);
        assert!((first.velocity.x - 1.0).abs() < 1e-9);
        assert_eq!(second.velocity, first.velocity);
        assert_eq!(second.position.x, 0.02);

        // Baseline stays at the first pose of the earlier timestamp.
        let next = est.sample(0, at(0.03), None, 20 * MS);
        assert!((next.velocity.x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_wire_velocity_wins_over_estimate() {
        let mut est = estimator();
        let wire = WireVelocity {
            linear: DVec3::new(0.0, 1.0, 0.0),
            angular: DVec3::new(0.0, 0.0, 0.5),
        };
        let base = est.sample(1, at(0.0), None, 0);
        let s = est.apply_wire(1, base, wire, MS);
        assert_eq!(s.velocity, wire.linear);
        assert_eq!(s.position, base.position);

        let s = est.sample(1, at(5.0), None, 2 * MS);
        assert_eq!(s.velocity, wire.linear);
        assert_eq!(s.angular_velocity, wire.angular);
    }

    #[test]
    fn test_out_of_range_index_still_yields_a_sample() {
        let mut est = estimator();
        let s = est.sample(9, at(1.0), None, 0);
        assert_eq!(s.position.x, 1.0);
        assert!(!est.is_tracking(9));
    }

    proptest::proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(256))]

        #[test]
        fn prop_constant_motion_is_recovered(
            vx in -10.0f64..10.0,
            vy in -10.0f64..10.0,
            wz in -3.0f64..3.0,
            step_ms in 1u64..50,
        ) {
            let mut est = estimator();
            let dt = step_ms as f64 / 1000.0;
            let samples: Vec<TrackerSample> = (0..4u64)
                .map(|i| {
                    let t = i as f64 * dt;
                    let pose = Pose::new(
                        DVec3::new(vx * t, vy * t, 0.0),
                        DQuat::from_rotation_z(wz * t),
                    );
                    est.sample(0, pose, None, i * step_ms * MS)
                })
                .collect();
            let last = samples[3];
            proptest::prop_assert!((last.velocity - DVec3::new(vx, vy, 0.0)).length() < 1e-6);
            proptest::prop_assert!((last.angular_velocity.z - wz).abs() < 1e-6);
        }
    }
}
