//! Report format tags.
//!
//! A transport can multiplex several record layouts whose wire ids live in
//! separate namespaces (body 0 and flystick 0 of an optical tracker are
//! different objects). The tag keeps those namespaces apart in the device map.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Record layout a wire id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    /// Position-only markers (`3d`).
    Marker3d,
    /// Standard 6DOF bodies (`6d` lines and fixed binary records).
    Body6d,
    /// Flysticks (`6df` and `6df2` lines).
    Flystick,
    /// Measurement tools (`6dmt` lines).
    MeasurementTool,
    /// Tracked hands with fingers (`gl` lines).
    Hand,
    /// Stations of a sentinel-framed hybrid tracker.
    Station,
    /// Hand controller reports.
    Remote,
    /// Sensors relayed over a network tracking connection.
    Relay,
    /// Head-mounted inertial units reporting packed motion samples.
    Inertial,
}

impl FormatTag {
    /// Number of distinct tags.
    pub const COUNT: usize = 9;

    /// All tags, in [`FormatTag::index`] order.
    pub const ALL: [FormatTag; Self::COUNT] = [
        FormatTag::Marker3d,
        FormatTag::Body6d,
        FormatTag::Flystick,
        FormatTag::MeasurementTool,
        FormatTag::Hand,
        FormatTag::Station,
        FormatTag::Remote,
        FormatTag::Relay,
        FormatTag::Inertial,
    ];

    /// Dense index used by per-format lookup tables.
    pub const fn index(self) -> usize {
        match self {
            FormatTag::Marker3d => 0,
            FormatTag::Body6d => 1,
            FormatTag::Flystick => 2,
            FormatTag::MeasurementTool => 3,
            FormatTag::Hand => 4,
            FormatTag::Station => 5,
            FormatTag::Remote => 6,
            FormatTag::Relay => 7,
            FormatTag::Inertial => 8,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FormatTag::Marker3d => "marker3d",
            FormatTag::Body6d => "body6d",
            FormatTag::Flystick => "flystick",
            FormatTag::MeasurementTool => "measurement_tool",
            FormatTag::Hand => "hand",
            FormatTag::Station => "station",
            FormatTag::Remote => "remote",
            FormatTag::Relay => "relay",
            FormatTag::Inertial => "inertial",
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
