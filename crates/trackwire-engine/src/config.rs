//! Per-device configuration.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use trackwire_devicemap::{DEFAULT_MAX_WIRE_ID, DeviceIdMap, LogicalDeviceSpec, MAX_TABLE_WIRE_ID};
use trackwire_protocol::sync::{DEFAULT_MAX_LINE, MAX_STATIONS};
use trackwire_protocol::{DecoderOptions, StationLayout, StationTable, WireFormat};

/// Largest accepted transport read buffer.
pub const MAX_READ_BUFFER: usize = 1 << 20;

/// Extra fields one station of a sentinel-framed tracker appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationConfig {
    pub station: u8,
    #[serde(default)]
    pub buttons: bool,
    /// Valuator bytes after the pose, 0 to 2.
    #[serde(default)]
    pub valuators: u8,
}

/// Everything needed to run one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Device name; used for the poll thread name and log fields.
    pub name: String,
    pub format: WireFormat,
    pub devices: Vec<LogicalDeviceSpec>,
    /// Station layouts; only meaningful for [`WireFormat::Station`].
    pub stations: Vec<StationConfig>,
    /// Mirror every pose into the opposite handedness.
    pub invert_z: bool,
    /// Upper bound of one blocking transport read; cancellation is observed
    /// at least this often.
    pub read_timeout: Duration,
    /// Deadline for side-channel requests.
    pub reply_timeout: Duration,
    /// Samples further apart than this restart velocity estimation.
    pub velocity_reset_gap: Duration,
    /// Longest accepted ASCII record body.
    pub max_line: usize,
    /// Transport read buffer size.
    pub read_buffer: usize,
    /// Only accept relay messages from this sender.
    pub relay_sender: Option<String>,
    /// Highest wire id the device map accepts.
    pub max_wire_id: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "device".to_string(),
            format: WireFormat::Ascii,
            devices: Vec::new(),
            stations: Vec::new(),
            invert_z: false,
            read_timeout: Duration::from_millis(100),
            reply_timeout: Duration::from_secs(2),
            velocity_reset_gap: Duration::from_millis(250),
            max_line: DEFAULT_MAX_LINE,
            read_buffer: 4096,
            relay_sender: None,
            max_wire_id: DEFAULT_MAX_WIRE_ID,
        }
    }
}

impl DeviceConfig {
    pub fn new(name: impl Into<String>, format: WireFormat) -> Self {
        Self {
            name: name.into(),
            format,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_device(mut self, spec: LogicalDeviceSpec) -> Self {
        self.devices.push(spec);
        self
    }

    #[must_use]
    pub fn with_station(mut self, station: u8, buttons: bool, valuators: u8) -> Self {
        self.stations.push(StationConfig {
            station,
            buttons,
            valuators,
        });
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_invert_z(mut self, invert_z: bool) -> Self {
        self.invert_z = invert_z;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if any value is out of range.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name must not be empty"));
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::invalid("read_timeout must be greater than 0"));
        }
        if self.reply_timeout.is_zero() {
            return Err(ConfigError::invalid("reply_timeout must be greater than 0"));
        }
        if self.velocity_reset_gap.is_zero() {
            return Err(ConfigError::invalid(
                "velocity_reset_gap must be greater than 0",
            ));
        }
        if self.max_line == 0 {
            return Err(ConfigError::invalid("max_line must be greater than 0"));
        }
        if self.read_buffer == 0 || self.read_buffer > MAX_READ_BUFFER {
            return Err(ConfigError::invalid(format!(
                "read_buffer must be between 1 and {MAX_READ_BUFFER}"
            )));
        }
        if self.max_wire_id > MAX_TABLE_WIRE_ID {
            return Err(ConfigError::invalid(format!(
                "max_wire_id must be at most {MAX_TABLE_WIRE_ID}"
            )));
        }
        for station in &self.stations {
            if usize::from(station.station) >= MAX_STATIONS {
                return Err(ConfigError::invalid(format!(
                    "station {} is out of range (0..{MAX_STATIONS})",
                    station.station
                )));
            }
            if station.valuators > 2 {
                return Err(ConfigError::invalid(format!(
                    "station {} declares {} valuators, at most 2 are supported",
                    station.station, station.valuators
                )));
            }
        }
        if !self.stations.is_empty() && self.format != WireFormat::Station {
            tracing::warn!(
                device = %self.name,
                format = %self.format,
                "station layouts are ignored for this format"
            );
        }
        Ok(())
    }

    /// Framer and decoder settings derived from this configuration.
    pub fn decoder_options(&self) -> DecoderOptions {
        let stations = self
            .stations
            .iter()
            .fold(StationTable::new(), |table, s| {
                table.with_station(s.station, StationLayout::new(s.buttons, s.valuators))
            });
        DecoderOptions {
            stations,
            max_line: self.max_line,
            relay_sender: self.relay_sender.clone(),
        }
    }

    /// Build the device map for the configured logical devices.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DeviceMap`] when the device list is
    /// inconsistent.
    pub fn device_map(&self) -> ConfigResult<DeviceIdMap> {
        Ok(DeviceIdMap::build_with_max(&self.devices, self.max_wire_id)?)
    }
}
