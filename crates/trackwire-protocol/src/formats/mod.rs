//! Record decoders, one per wire format.
//!
//! A device picks its format once from configuration; [`WireFormat`] then
//! builds the matching framer and decoder. Dispatch happens through the
//! [`AnyDecoder`] enum, matching on the variant for every call.

pub mod ascii;
pub mod binary;
pub mod inertial;
pub mod relay;
pub mod remote;
pub mod station;

use crate::decode::{DecodeStatus, DeviceContext, RecordBatch, RecordDecoder};
use crate::sync::{
    AnyFramer, DEFAULT_MAX_LINE, DatagramFramer, Frame, KeywordFramer, LengthFramer,
    SentinelFramer, StationTable,
};
use serde::{Deserialize, Serialize};

pub use ascii::AsciiDecoder;
pub use binary::BinaryDecoder;
pub use inertial::InertialDecoder;
pub use relay::RelayDecoder;
pub use remote::RemoteDecoder;
pub use station::StationDecoder;

/// Wire format a device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Tagged ASCII lines from an optical tracker.
    Ascii,
    /// Fixed little-endian body records, one datagram each.
    Binary,
    /// Sentinel-framed station records.
    Station,
    /// Hand-controller input reports.
    Remote,
    /// Length-prefixed network relay messages.
    Relay,
    /// Inertial sensor reports.
    Inertial,
}

/// Per-device settings the framers and decoders need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderOptions {
    pub stations: StationTable,
    pub max_line: usize,
    pub relay_sender: Option<String>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            stations: StationTable::new(),
            max_line: DEFAULT_MAX_LINE,
            relay_sender: None,
        }
    }
}

impl WireFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            WireFormat::Ascii => "ascii",
            WireFormat::Binary => "binary",
            WireFormat::Station => "station",
            WireFormat::Remote => "remote",
            WireFormat::Relay => "relay",
            WireFormat::Inertial => "inertial",
        }
    }

    /// Whether each transport read is a complete record.
    pub const fn is_datagram(self) -> bool {
        matches!(
            self,
            WireFormat::Binary | WireFormat::Remote | WireFormat::Inertial
        )
    }

    pub fn framer(self, options: &DecoderOptions) -> AnyFramer {
        match self {
            WireFormat::Ascii => AnyFramer::Keyword(KeywordFramer::new(options.max_line)),
            WireFormat::Station => AnyFramer::Sentinel(SentinelFramer::new(options.stations)),
            WireFormat::Relay => AnyFramer::Length(LengthFramer::new()),
            WireFormat::Binary | WireFormat::Remote | WireFormat::Inertial => {
                AnyFramer::Datagram(DatagramFramer::new())
            }
        }
    }

    pub fn decoder(self, options: &DecoderOptions) -> AnyDecoder {
        match self {
            WireFormat::Ascii => AnyDecoder::Ascii(AsciiDecoder::new()),
            WireFormat::Binary => AnyDecoder::Binary(BinaryDecoder::new()),
            WireFormat::Station => AnyDecoder::Station(StationDecoder::new(options.stations)),
            WireFormat::Remote => AnyDecoder::Remote(RemoteDecoder::new()),
            WireFormat::Relay => AnyDecoder::Relay(RelayDecoder::new(options.relay_sender.clone())),
            WireFormat::Inertial => AnyDecoder::Inertial(InertialDecoder::new()),
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime-selected decoder.
#[derive(Debug)]
pub enum AnyDecoder {
    Ascii(AsciiDecoder),
    Binary(BinaryDecoder),
    Station(StationDecoder),
    Remote(RemoteDecoder),
    Relay(RelayDecoder),
    Inertial(InertialDecoder),
}

impl RecordDecoder for AnyDecoder {
    /// Decode with the selected format, mirroring new records when the
    /// device uses the opposite handedness.
    fn decode(
        &mut self,
        frame: Frame<'_>,
        ctx: &mut DeviceContext,
        batch: &mut RecordBatch,
    ) -> DecodeStatus {
        let start = batch.len();
        let status = match self {
            AnyDecoder::Ascii(d) => d.decode(frame, ctx, batch),
            AnyDecoder::Binary(d) => d.decode(frame, ctx, batch),
            AnyDecoder::Station(d) => d.decode(frame, ctx, batch),
            AnyDecoder::Remote(d) => d.decode(frame, ctx, batch),
            AnyDecoder::Relay(d) => d.decode(frame, ctx, batch),
            AnyDecoder::Inertial(d) => d.decode(frame, ctx, batch),
        };
        if ctx.invert_z {
            for record in batch.records_mut().iter_mut().skip(start) {
                record.mirror_z();
            }
        }
        status
    }

    fn reset(&mut self) {
        match self {
            AnyDecoder::Ascii(d) => d.reset(),
            AnyDecoder::Binary(d) => d.reset(),
            AnyDecoder::Station(d) => d.reset(),
            AnyDecoder::Remote(d) => d.reset(),
            AnyDecoder::Relay(d) => d.reset(),
            AnyDecoder::Inertial(d) => d.reset(),
        }
    }
}
