//! Dense wire id lookup tables.

use crate::error::{DeviceMapError, DeviceMapResult};
use crate::spec::LogicalDeviceSpec;
use std::collections::HashSet;
use trackwire_types::{DeviceRecord, FormatTag};

/// Highest wire id accepted by [`DeviceIdMap::build`].
pub const DEFAULT_MAX_WIRE_ID: u32 = 4095;

/// Hard ceiling for [`DeviceIdMap::build_with_max`]; larger limits are clamped.
pub const MAX_TABLE_WIRE_ID: u32 = 65_535;

const UNMAPPED: i32 = -1;

/// Resolved index ranges of one logical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalDevice {
    /// Position in declaration order.
    pub index: usize,
    pub format: FormatTag,
    pub wire_id: u32,
    pub tracker_base: usize,
    pub trackers: usize,
    pub button_base: usize,
    pub buttons: usize,
    pub valuator_base: usize,
    pub valuators: usize,
}

fn offset(base: usize, count: usize, i: usize) -> Option<usize> {
    (i < count).then_some(base + i)
}

impl LogicalDevice {
    /// Global tracker index of tracker slot `sub_index`.
    pub fn tracker(&self, sub_index: u8) -> Option<usize> {
        offset(self.tracker_base, self.trackers, usize::from(sub_index))
    }

    /// Global button index of device button `i`.
    pub fn button(&self, i: usize) -> Option<usize> {
        offset(self.button_base, self.buttons, i)
    }

    /// Global valuator index of device valuator `i`.
    pub fn valuator(&self, i: usize) -> Option<usize> {
        offset(self.valuator_base, self.valuators, i)
    }
}

/// Immutable `(format, wire id)` to [`LogicalDevice`] table.
#[derive(Debug, Clone)]
pub struct DeviceIdMap {
    devices: Vec<LogicalDevice>,
    names: Vec<String>,
    tables: [Vec<i32>; FormatTag::COUNT],
    trackers: usize,
    buttons: usize,
    valuators: usize,
}

impl DeviceIdMap {
    /// Build the table with wire ids limited to [`DEFAULT_MAX_WIRE_ID`].
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or duplicate name, a wire id used twice
    /// within one format, or a wire id above the maximum.
    pub fn build(specs: &[LogicalDeviceSpec]) -> DeviceMapResult<Self> {
        Self::build_with_max(specs, DEFAULT_MAX_WIRE_ID)
    }

    /// Build the table with wire ids limited to `max_wire_id`.
    ///
    /// # Errors
    ///
    /// See [`DeviceIdMap::build`].
    pub fn build_with_max(specs: &[LogicalDeviceSpec], max_wire_id: u32) -> DeviceMapResult<Self> {
        let max_wire_id = max_wire_id.min(MAX_TABLE_WIRE_ID);
        let mut names = Vec::with_capacity(specs.len());
        let mut seen_names = HashSet::with_capacity(specs.len());
        let mut next_id: [Option<u32>; FormatTag::COUNT] = [None; FormatTag::COUNT];
        let mut assigned: Vec<(FormatTag, u32)> = Vec::with_capacity(specs.len());

        for (index, spec) in specs.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(DeviceMapError::EmptyName { index });
            }
            if !seen_names.insert(spec.name.as_str()) {
                return Err(DeviceMapError::DuplicateName(spec.name.clone()));
            }
            let slot = spec.format.index();
            let highest = next_id.get(slot).copied().flatten();
            let wire_id = match spec.wire_id {
                Some(id) => id,
                None => highest.map_or(0, |h| h.saturating_add(1)),
            };
            if wire_id > max_wire_id {
                return Err(DeviceMapError::WireIdTooLarge {
                    name: spec.name.clone(),
                    wire_id,
                    max: max_wire_id,
                });
            }
            if let Some(h) = next_id.get_mut(slot) {
                *h = Some(h.map_or(wire_id, |h| h.max(wire_id)));
            }
            assigned.push((spec.format, wire_id));
            names.push(spec.name.clone());
        }

        let mut tables: [Vec<i32>; FormatTag::COUNT] = std::array::from_fn(|_| Vec::new());
        for (table, highest) in tables.iter_mut().zip(next_id) {
            if let Some(h) = highest
                && let Ok(h) = usize::try_from(h)
            {
                *table = vec![UNMAPPED; h + 1];
            }
        }

        let mut devices = Vec::with_capacity(specs.len());
        let (mut trackers, mut buttons, mut valuators) = (0usize, 0usize, 0usize);
        for (index, (spec, &(format, wire_id))) in specs.iter().zip(&assigned).enumerate() {
            let entry = tables
                .get_mut(format.index())
                .and_then(|t| usize::try_from(wire_id).ok().and_then(|i| t.get_mut(i)));
            match entry {
                Some(entry) if *entry == UNMAPPED => {
                    *entry = i32::try_from(index).unwrap_or(UNMAPPED);
                }
                _ => return Err(DeviceMapError::DuplicateWireId { format, wire_id }),
            }
            let device = LogicalDevice {
                index,
                format,
                wire_id,
                tracker_base: trackers,
                trackers: usize::from(spec.trackers),
                button_base: buttons,
                buttons: usize::from(spec.buttons),
                valuator_base: valuators,
                valuators: usize::from(spec.valuators),
            };
            trackers += device.trackers;
            buttons += device.buttons;
            valuators += device.valuators;
            tracing::debug!(
                name = %spec.name,
                %format,
                wire_id,
                tracker_base = device.tracker_base,
                "mapped logical device"
            );
            devices.push(device);
        }

        tracing::info!(
            devices = devices.len(),
            trackers,
            buttons,
            valuators,
            "device map built"
        );
        Ok(Self {
            devices,
            names,
            tables,
            trackers,
            buttons,
            valuators,
        })
    }

    /// Device configured for `wire_id` in `format`, if any.
    pub fn lookup(&self, format: FormatTag, wire_id: u32) -> Option<&LogicalDevice> {
        let slot = *self
            .tables
            .get(format.index())?
            .get(usize::try_from(wire_id).ok()?)?;
        self.devices.get(usize::try_from(slot).ok()?)
    }

    /// Device a decoded record belongs to; records without a format tag use
    /// `default_format`.
    pub fn resolve(&self, default_format: FormatTag, record: &DeviceRecord) -> Option<&LogicalDevice> {
        self.lookup(record.format.unwrap_or(default_format), record.wire_id)
    }

    pub fn by_name(&self, name: &str) -> Option<&LogicalDevice> {
        let index = self.names.iter().position(|n| n == name)?;
        self.devices.get(index)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn devices(&self) -> &[LogicalDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Total tracker slots across all devices.
    pub fn tracker_count(&self) -> usize {
        self.trackers
    }

    pub fn button_count(&self) -> usize {
        self.buttons
    }

    pub fn valuator_count(&self) -> usize {
        self.valuators
    }
}
