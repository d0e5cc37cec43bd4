//! Moves decoded records into the state sink.

use crate::velocity::VelocityEstimator;
use std::sync::Arc;
use std::time::Duration;
use trackwire_atomic::{StateWriter, StreamCounters};
use trackwire_devicemap::{DeviceIdMap, LogicalDevice};
use trackwire_protocol::WireFormat;
use trackwire_types::{DeviceRecord, FormatTag};

/// Wire id namespace of records that carry no format tag.
pub fn default_format_tag(format: WireFormat) -> FormatTag {
    match format {
        WireFormat::Ascii | WireFormat::Binary => FormatTag::Body6d,
        WireFormat::Station => FormatTag::Station,
        WireFormat::Remote => FormatTag::Remote,
        WireFormat::Relay => FormatTag::Relay,
        WireFormat::Inertial => FormatTag::Inertial,
    }
}

/// Writes records through a [`DeviceIdMap`] into a [`StateWriter`].
#[derive(Debug)]
pub struct Publisher {
    map: Arc<DeviceIdMap>,
    default_format: FormatTag,
    writer: StateWriter,
    velocity: VelocityEstimator,
    counters: Arc<StreamCounters>,
}

impl Publisher {
    pub fn new(
        map: Arc<DeviceIdMap>,
        format: WireFormat,
        writer: StateWriter,
        velocity_reset_gap: Duration,
        counters: Arc<StreamCounters>,
    ) -> Self {
        let velocity = VelocityEstimator::new(map.tracker_count(), velocity_reset_gap);
        Self {
            map,
            default_format: default_format_tag(format),
            writer,
            velocity,
            counters,
        }
    }

    /// Stage every mappable record; returns how many were staged.
    pub fn publish(&mut self, records: &[DeviceRecord], now_ns: u64) -> usize {
        let mut staged = 0;
        let mut unmapped = 0;
        for record in records {
            let Some(device) = self.map.resolve(self.default_format, record).copied() else {
                unmapped += 1;
                tracing::trace!(
                    wire_id = record.wire_id,
                    format = ?record.format.unwrap_or(self.default_format),
                    "dropping record for unmapped wire id"
                );
                continue;
            };
            if self.stage(&device, record, now_ns) {
                staged += 1;
            }
        }
        self.counters.add_records(u64::try_from(staged).unwrap_or(u64::MAX));
        if unmapped > 0 {
            self.counters.add_unmapped(unmapped);
        }
        staged
    }

    fn stage(&mut self, device: &LogicalDevice, record: &DeviceRecord, now_ns: u64) -> bool {
        let mut touched = false;

        if let Some(index) = device.tracker(record.sub_index) {
            match (record.pose, record.velocity) {
                (Some(pose), wire) => {
                    let sample = self.velocity.sample(index, pose, wire, now_ns);
                    touched |= self.writer.set_tracker_state(index, sample);
                }
                (None, Some(wire)) => {
                    if let Some(base) = self.writer.tracker(index).copied() {
                        let sample = self.velocity.apply_wire(index, base, wire, now_ns);
                        touched |= self.writer.set_tracker_state(index, sample);
                    }
                }
                (None, None) => {}
            }
        }

        for (i, pressed) in record.buttons.iter() {
            if let Some(index) = device.button(i) {
                touched |= self.writer.set_button_state(index, pressed);
            }
        }

        let first = usize::from(record.valuators.first());
        for (k, value) in record.valuators.as_slice().iter().enumerate() {
            if let Some(index) = device.valuator(first + k) {
                touched |= self.writer.set_valuator_state(index, *value);
            }
        }
        touched
    }

    /// Publish staged state if anything changed; returns the new generation.
    pub fn commit(&mut self) -> Option<u64> {
        if !self.writer.is_dirty() {
            return None;
        }
        self.counters.inc_commits();
        Some(self.writer.commit())
    }

    /// Restart velocity estimation for every tracker.
    pub fn reset_velocities(&mut self) {
        self.velocity.reset();
    }

    pub fn map(&self) -> &Arc<DeviceIdMap> {
        &self.map
    }
}
