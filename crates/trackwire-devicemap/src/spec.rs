//! Configured logical devices.

use serde::{Deserialize, Serialize};
use trackwire_types::FormatTag;

fn one() -> u16 {
    1
}

/// One logical device as declared in configuration.
///
/// `trackers` is the number of tracker slots the device occupies: 1 for a
/// plain body, more for a hand whose fingers publish as extra trackers, 0
/// for devices that only carry buttons or valuators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogicalDeviceSpec {
    pub name: String,
    pub format: FormatTag,
    /// Wire id; assigned automatically when absent.
    #[serde(default)]
    pub wire_id: Option<u32>,
    #[serde(default = "one")]
    pub trackers: u16,
    #[serde(default)]
    pub buttons: u16,
    #[serde(default)]
    pub valuators: u16,
}

impl LogicalDeviceSpec {
    pub fn new(name: impl Into<String>, format: FormatTag) -> Self {
        Self {
            name: name.into(),
            format,
            wire_id: None,
            trackers: 1,
            buttons: 0,
            valuators: 0,
        }
    }

    #[must_use]
    pub fn with_wire_id(mut self, wire_id: u32) -> Self {
        self.wire_id = Some(wire_id);
        self
    }

    #[must_use]
    pub fn with_trackers(mut self, trackers: u16) -> Self {
        self.trackers = trackers;
        self
    }

    #[must_use]
    pub fn with_buttons(mut self, buttons: u16) -> Self {
        self.buttons = buttons;
        self
    }

    #[must_use]
    pub fn with_valuators(mut self, valuators: u16) -> Self {
        self.valuators = valuators;
        self
    }
}
