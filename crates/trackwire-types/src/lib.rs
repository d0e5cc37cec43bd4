//! Shared data model for the trackwire protocol layer.
//!
//! Every tracker backend decodes its wire format into the same small set of
//! `Copy` types defined here:
//!
//! - [`TrackerSample`]: the published pose, velocities and arrival time of one
//!   logical tracker
//! - [`DeviceRecord`]: one decoded wire record, before the wire id has been
//!   mapped to a logical index
//! - [`FormatTag`]: the report format a record came from, used to keep wire id
//!   namespaces of multiplexed formats apart
//! - [`orientation`]: Euler, matrix and quaternion reconstruction helpers
//!
//! None of these types allocate, so decoders can fill them in the hot path.

#![deny(static_mut_refs)]

pub mod clock;
pub mod format;
pub mod orientation;
pub mod record;
pub mod sample;

pub use clock::monotonic_now_ns;
pub use format::FormatTag;
pub use record::{ButtonBits, DeviceRecord, MAX_RECORD_BUTTONS, MAX_RECORD_VALUATORS, Valuators};
pub use sample::{Pose, TrackerSample, WireVelocity};

pub use glam::{DMat3, DQuat, DVec3};
