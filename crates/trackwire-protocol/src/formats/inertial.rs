//! Head-mounted inertial unit reports.
//!
//! ```text
//! u8  report_id = 0x01
//! u8  sample_count
//! u16 timestamp        (LE)
//! u16 last_command_id  (LE)
//! i16 temperature      (LE, 1/100 degC)
//! 3 x 16-byte motion sample
//! i16 magnetometer[3]  (LE, 1e-4 gauss)
//! ```
//!
//! A report buffers up to three motion samples; only the newest is
//! published.

use crate::bits::{MOTION_BLOCK_LEN, MotionSample};
use crate::cursor::{Cursor, CursorResult, ReportWriter};
use crate::decode::{DecodeStatus, DeviceContext, RecordBatch, RecordDecoder};
use crate::sync::Frame;
use trackwire_types::{DeviceRecord, FormatTag, Valuators};

pub const INERTIAL_REPORT_ID: u8 = 0x01;
pub const INERTIAL_REPORT_LEN: usize = 8 + 3 * MOTION_BLOCK_LEN + 6;
pub const MAX_BUFFERED_SAMPLES: usize = 3;

/// Raw motion units (1e-4 m/s^2, 1e-4 rad/s, 1e-4 gauss) to SI.
const MOTION_SCALE: f64 = 1e-4;
const TEMPERATURE_SCALE: f64 = 0.01;

pub const VALUATOR_ACCEL: u16 = 0;
pub const VALUATOR_GYRO: u16 = 3;
pub const VALUATOR_MAG: u16 = 6;
pub const VALUATOR_TEMPERATURE: u16 = 9;

/// Contents of one sensor report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InertialReport {
    pub sample_count: u8,
    pub timestamp: u16,
    pub command_id: u16,
    pub temperature: i16,
    pub samples: [MotionSample; MAX_BUFFERED_SAMPLES],
    pub magnetometer: [i16; 3],
}

impl InertialReport {
    pub fn decode(bytes: &[u8]) -> CursorResult<Option<Self>> {
        let mut c = Cursor::new(bytes);
        if c.read_u8()? != INERTIAL_REPORT_ID {
            return Ok(None);
        }
        let mut report = Self {
            sample_count: c.read_u8()?,
            timestamp: c.read_u16_le()?,
            command_id: c.read_u16_le()?,
            temperature: c.read_i16_le()?,
            ..Self::default()
        };
        for sample in &mut report.samples {
            *sample = MotionSample::decode(c.take(MOTION_BLOCK_LEN)?)?;
        }
        for axis in &mut report.magnetometer {
            *axis = c.read_i16_le()?;
        }
        Ok(Some(report))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = ReportWriter::with_capacity(INERTIAL_REPORT_LEN);
        w.write_u8(INERTIAL_REPORT_ID)
            .write_u8(self.sample_count)
            .write_bytes(&self.timestamp.to_le_bytes())
            .write_bytes(&self.command_id.to_le_bytes())
            .write_i16_le(self.temperature);
        for sample in &self.samples {
            w.write_bytes(&sample.encode());
        }
        for &axis in &self.magnetometer {
            w.write_i16_le(axis);
        }
        w.into_inner()
    }

    /// Most recent valid sample, if any.
    pub fn latest(&self) -> Option<&MotionSample> {
        let valid = usize::from(self.sample_count).min(MAX_BUFFERED_SAMPLES);
        valid.checked_sub(1).and_then(|i| self.samples.get(i))
    }
}

fn scaled(raw: [i32; 3]) -> [f64; 3] {
    raw.map(|v| f64::from(v) * MOTION_SCALE)
}

#[derive(Debug, Default)]
pub struct InertialDecoder;

impl InertialDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl RecordDecoder for InertialDecoder {
    fn decode(
        &mut self,
        frame: Frame<'_>,
        ctx: &mut DeviceContext,
        batch: &mut RecordBatch,
    ) -> DecodeStatus {
        let report = match InertialReport::decode(frame.bytes) {
            Ok(Some(report)) => report,
            Ok(None) => return DecodeStatus::Truncated,
            Err(error) => {
                tracing::trace!(device = %ctx.name, %error, "inertial report cut short");
                return DecodeStatus::Truncated;
            }
        };
        let Some(sample) = report.latest() else {
            return DecodeStatus::Complete;
        };

        let mut motion = Valuators::from_slice(VALUATOR_ACCEL, &scaled(sample.accel));
        for v in scaled(sample.gyro) {
            motion.push(v);
        }
        batch.push(DeviceRecord::new(0, Some(FormatTag::Inertial)).with_valuators(motion));

        let mag = report.magnetometer.map(|v| f64::from(v) * MOTION_SCALE);
        let mut environment = Valuators::from_slice(VALUATOR_MAG, &mag);
        environment.push(f64::from(report.temperature) * TEMPERATURE_SCALE);
        batch.push(DeviceRecord::new(0, Some(FormatTag::Inertial)).with_valuators(environment));
        DecodeStatus::Complete
    }
}
