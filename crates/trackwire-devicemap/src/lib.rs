//! Mapping from wire-level identifiers to logical device indices.
//!
//! A device configuration declares its logical devices as a list of
//! [`LogicalDeviceSpec`]s. [`DeviceIdMap::build`] validates the list once,
//! assigns contiguous tracker, button and valuator ranges in declaration
//! order, and produces an immutable table that resolves a
//! `(format, wire id)` pair in constant time.
//!
//! Wire ids that were never configured resolve to `None`; callers drop such
//! records without treating them as errors.

#![deny(static_mut_refs)]

pub mod error;
pub mod map;
pub mod spec;

pub use error::{DeviceMapError, DeviceMapResult};
pub use map::{DEFAULT_MAX_WIRE_ID, DeviceIdMap, LogicalDevice, MAX_TABLE_WIRE_ID};
pub use spec::LogicalDeviceSpec;
