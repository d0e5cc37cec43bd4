//! Sentinel-framed station records of inertial/acoustic hybrid trackers.
//!
//! After the `\r\n0<station><filler>` preamble each record carries
//! `f32 pos[3]; f32 euler_deg[3]` (azimuth, elevation, roll), then a button
//! byte when the station has buttons, then up to two valuator bytes. Which
//! extras a station sends is configured, see [`StationTable`].

use crate::cursor::{Cursor, CursorResult, ReportWriter};
use crate::decode::{DecodeStatus, DeviceContext, RecordBatch, RecordDecoder};
use crate::sync::{Frame, FrameKind, StationLayout, StationTable, station_to_char};
use trackwire_types::orientation::{from_euler_zyx_deg, to_euler_zyx_deg};
use trackwire_types::{ButtonBits, DVec3, DeviceRecord, FormatTag, Pose};

/// Buttons in a station button byte.
pub const STATION_BUTTONS: usize = 8;

/// Map a raw valuator byte to `-1.0..=1.0` around 127.
pub fn station_valuator(raw: u8) -> f64 {
    ((f64::from(raw) - 127.0) / 127.0).clamp(-1.0, 1.0)
}

/// Inverse of [`station_valuator`], rounded to the nearest byte.
pub fn station_valuator_raw(value: f64) -> u8 {
    (value.clamp(-1.0, 1.0) * 127.0 + 127.0).round() as u8
}

#[derive(Debug, Default)]
pub struct StationDecoder {
    table: StationTable,
}

impl StationDecoder {
    pub fn new(table: StationTable) -> Self {
        Self { table }
    }

    fn read(layout: StationLayout, record: &mut DeviceRecord, body: &[u8]) -> CursorResult<()> {
        let mut cursor = Cursor::new(body);
        let position = DVec3::from_array(cursor.read_f32x3_le()?);
        let [azimuth, elevation, roll] = cursor.read_f32x3_le()?;
        let orientation = from_euler_zyx_deg(azimuth, elevation, roll);
        record.pose = Some(Pose::new(position, orientation));
        if layout.buttons {
            record.buttons = ButtonBits::full(u64::from(cursor.read_u8()?), STATION_BUTTONS);
        }
        for _ in 0..layout.valuators {
            record.valuators.push(station_valuator(cursor.read_u8()?));
        }
        Ok(())
    }
}

impl RecordDecoder for StationDecoder {
    fn decode(
        &mut self,
        frame: Frame<'_>,
        ctx: &mut DeviceContext,
        batch: &mut RecordBatch,
    ) -> DecodeStatus {
        let FrameKind::Station(station) = frame.kind else {
            return DecodeStatus::Resync;
        };
        let Some(layout) = self.table.layout(station) else {
            return DecodeStatus::Resync;
        };
        let mut record = DeviceRecord::new(u32::from(station), Some(FormatTag::Station));
        match Self::read(layout, &mut record, frame.bytes) {
            Ok(()) => {
                batch.push(record);
                DecodeStatus::Complete
            }
            Err(error) => {
                tracing::trace!(device = %ctx.name, station, %error, "station record cut short");
                DecodeStatus::Truncated
            }
        }
    }
}

/// One station record including its preamble.
pub fn encode_station(
    station: u8,
    layout: StationLayout,
    pose: &Pose,
    buttons: u8,
    valuators: &[f64],
) -> Vec<u8> {
    let mut w = ReportWriter::with_capacity(5 + layout.body_len());
    w.write_bytes(&[b'\r', b'\n', b'0', station_to_char(station).unwrap_or(b'0'), b' ']);
    for v in pose.position.to_array() {
        w.write_f32_le(v as f32);
    }
    for v in to_euler_zyx_deg(pose.orientation) {
        w.write_f32_le(v as f32);
    }
    if layout.buttons {
        w.write_u8(buttons);
    }
    for i in 0..usize::from(layout.valuators) {
        w.write_u8(station_valuator_raw(valuators.get(i).copied().unwrap_or(0.0)));
    }
    w.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{SentinelFramer, feed};
    use trackwire_types::DQuat;

    fn table() -> StationTable {
        StationTable::new()
            .with_station(1, StationLayout::new(false, 0))
            .with_station(2, StationLayout::new(true, 2))
    }

    fn decode_stream(input: &[u8]) -> Vec<DeviceRecord> {
        let mut framer = SentinelFramer::new(table());
        let mut decoder = StationDecoder::new(table());
        let mut ctx = DeviceContext::new("hybrid");
        let mut batch = RecordBatch::new();
        let mut out = Vec::new();
        let mut pos = 0;
        while let Some(frame) = feed(&mut framer, input, &mut pos) {
            batch.clear();
            assert_eq!(decoder.decode(frame, &mut ctx, &mut batch), DecodeStatus::Complete);
            out.extend_from_slice(batch.records());
        }
        out
    }

    #[test]
    fn test_valuator_mapping() {
        assert_eq!(station_valuator(127), 0.0);
        assert_eq!(station_valuator(0), -1.0);
        assert_eq!(station_valuator(254), 1.0);
        assert_eq!(station_valuator(255), 1.0);
        assert_eq!(station_valuator_raw(0.5), 191);
    }

    #[test]
    fn test_round_trip_with_buttons_and_valuators() {
        let pose = Pose::new(
            DVec3::new(1.25, -0.5, 2.0),
            DQuat::from_rotation_z(0.3) * DQuat::from_rotation_y(-0.2),
        );
        let mut input = encode_station(1, StationLayout::new(false, 0), &pose, 0, &[]);
        let layout = StationLayout::new(true, 2);
        input.extend(encode_station(2, layout, &pose, 0b101, &[1.0, -1.0]));
        let records = decode_stream(&input);
        assert_eq!(records.len(), 2);

        let r = records[1];
        assert_eq!(r.wire_id, 2);
        assert_eq!(r.format, Some(FormatTag::Station));
        assert_eq!(r.buttons, ButtonBits::full(0b101, 8));
        assert_eq!(r.valuators.as_slice(), &[1.0, -1.0]);
        let got = r.pose.unwrap_or_default();
        assert!((got.position - pose.position).length() < 1e-6);
        assert!(got.orientation.dot(pose.orientation).abs() > 1.0 - 1e-9);
        assert!(records[0].buttons.is_empty());
    }

    #[test]
    fn test_short_body_is_truncated() {
        let mut decoder = StationDecoder::new(table());
        let mut batch = RecordBatch::new();
        let frame = Frame {
            kind: FrameKind::Station(2),
            bytes: &[0u8; 25],
        };
        let status = decoder.decode(frame, &mut DeviceContext::default(), &mut batch);
        assert_eq!(status, DecodeStatus::Truncated);
        assert!(batch.records().is_empty());
    }
}
