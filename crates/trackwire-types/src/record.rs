//! Decoded wire records.
//!
//! A [`DeviceRecord`] is what a decoder produces for one body/station/sensor
//! before the wire id is resolved to logical indices. Records are `Copy` and
//! fixed-size so decoders can append them to a reused batch without touching
//! the allocator.

use crate::format::FormatTag;
use crate::sample::{Pose, WireVelocity};

/// Most buttons a single record can carry.
pub const MAX_RECORD_BUTTONS: usize = 64;

/// Most valuators a single record can carry.
pub const MAX_RECORD_VALUATORS: usize = 8;

/// Button states carried by a record.
///
/// `mask` selects which of the device's buttons the record speaks for; a
/// full report sets the low `count` bits, a single change event sets one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonBits {
    pub bits: u64,
    pub mask: u64,
}

impl ButtonBits {
    /// A full report of the low `count` buttons.
    pub fn full(bits: u64, count: usize) -> Self {
        let mask = low_mask(count);
        Self {
            bits: bits & mask,
            mask,
        }
    }

    /// A change of a single button.
    pub fn single(index: usize, pressed: bool) -> Self {
        if index >= MAX_RECORD_BUTTONS {
            return Self::default();
        }
        let mask = 1u64 << index;
        Self {
            bits: if pressed { mask } else { 0 },
            mask,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// `Some(pressed)` when the record carries button `index`.
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= MAX_RECORD_BUTTONS || self.mask & (1u64 << index) == 0 {
            None
        } else {
            Some(self.bits & (1u64 << index) != 0)
        }
    }

    /// Indices and states of every button carried.
    pub fn iter(&self) -> impl Iterator<Item = (usize, bool)> + '_ {
        (0..MAX_RECORD_BUTTONS).filter_map(move |i| self.get(i).map(|b| (i, b)))
    }
}

fn low_mask(count: usize) -> u64 {
    if count >= MAX_RECORD_BUTTONS {
        u64::MAX
    } else {
        (1u64 << count) - 1
    }
}

/// Valuator values carried by a record, starting at device-relative `first`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Valuators {
    values: [f64; MAX_RECORD_VALUATORS],
    len: u8,
    first: u16,
}

impl Valuators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values for channels `first..first + values.len()`, truncated to
    /// [`MAX_RECORD_VALUATORS`].
    pub fn from_slice(first: u16, values: &[f64]) -> Self {
        let mut out = Self {
            first,
            ..Self::default()
        };
        for &v in values.iter().take(MAX_RECORD_VALUATORS) {
            out.push(v);
        }
        out
    }

    /// Append a value; returns `false` once the record is full.
    pub fn push(&mut self, value: f64) -> bool {
        match self.values.get_mut(usize::from(self.len)) {
            Some(slot) => {
                *slot = value;
                self.len += 1;
                true
            }
            None => false,
        }
    }

    pub fn first(&self) -> u16 {
        self.first
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[f64] {
        self.values.get(..self.len()).unwrap_or(&[])
    }
}

/// One decoded wire record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceRecord {
    /// Identifier the device uses on the wire for this body/station/sensor.
    pub wire_id: u32,
    /// Namespace of `wire_id` when the transport multiplexes several
    /// layouts; `None` means the decoder's default namespace.
    pub format: Option<FormatTag>,
    /// Tracker slot within the logical device (0 for the body itself,
    /// 1.. for fingers and other sub-bodies).
    pub sub_index: u8,
    pub pose: Option<Pose>,
    /// Velocities when the wire carries them; otherwise the publisher
    /// estimates them.
    pub velocity: Option<WireVelocity>,
    pub buttons: ButtonBits,
    pub valuators: Valuators,
}

impl DeviceRecord {
    pub fn new(wire_id: u32, format: Option<FormatTag>) -> Self {
        Self {
            wire_id,
            format,
            ..Self::default()
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn with_buttons(mut self, buttons: ButtonBits) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_valuators(mut self, valuators: Valuators) -> Self {
        self.valuators = valuators;
        self
    }

    pub fn with_sub_index(mut self, sub_index: u8) -> Self {
        self.sub_index = sub_index;
        self
    }

    /// Mirror pose and wire velocities into the opposite handedness.
    pub fn mirror_z(&mut self) {
        self.pose = self.pose.map(Pose::invert_z);
        if let Some(v) = self.velocity.as_mut() {
            v.linear.z = -v.linear.z;
            v.angular.x = -v.angular.x;
            v.angular.y = -v.angular.y;
        }
    }

    /// Whether the record carries anything worth publishing.
    pub fn is_empty(&self) -> bool {
        self.pose.is_none()
            && self.velocity.is_none()
            && self.buttons.is_empty()
            && self.valuators.is_empty()
    }
}
