//! Fixed-layout little-endian body records, one datagram per frame.
//!
//! ```text
//! u32 frame
//! i32 count
//! count x { u32 id; f32 quality; f32 pos[3]; f32 euler_deg[3]; f32 matrix[9] }
//! ```
//!
//! Orientation is taken from the row-major matrix; the Euler angles are
//! redundant and ignored.

use crate::cursor::{Cursor, CursorResult, ReportWriter};
use crate::decode::{DecodeStatus, DeviceContext, RecordBatch, RecordDecoder};
use crate::sync::Frame;
use trackwire_types::orientation::{from_row_major, to_euler_zyx_deg, to_row_major};
use trackwire_types::{DVec3, DeviceRecord, FormatTag, Pose};

/// Size of one body entry.
pub const BINARY_BODY_LEN: usize = 4 + 4 + 12 + 12 + 36;

const BINARY_HEADER_LEN: usize = 8;

#[derive(Debug, Default)]
pub struct BinaryDecoder;

impl BinaryDecoder {
    pub fn new() -> Self {
        Self
    }
}

fn read_body(cursor: &mut Cursor<'_>) -> CursorResult<(u32, f32, Pose)> {
    let mut ahead = *cursor;
    let id = ahead.read_u32_le()?;
    let quality = ahead.read_f32_le()?;
    let position = DVec3::from_array(ahead.read_f32x3_le()?);
    ahead.skip(12)?;
    let mut m = [0.0; 9];
    for v in &mut m {
        *v = f64::from(ahead.read_f32_le()?);
    }
    *cursor = ahead;
    Ok((id, quality, Pose::new(position, from_row_major(&m))))
}

impl RecordDecoder for BinaryDecoder {
    fn decode(
        &mut self,
        frame: Frame<'_>,
        ctx: &mut DeviceContext,
        batch: &mut RecordBatch,
    ) -> DecodeStatus {
        let mut cursor = Cursor::new(frame.bytes);
        let (Ok(frame_number), Ok(count)) = (cursor.read_u32_le(), cursor.read_i32_le()) else {
            return DecodeStatus::Truncated;
        };
        ctx.frame_number = Some(u64::from(frame_number));
        let Ok(count) = usize::try_from(count) else {
            tracing::trace!(device = %ctx.name, count, "negative body count");
            return DecodeStatus::Truncated;
        };
        for _ in 0..count {
            match read_body(&mut cursor) {
                Ok((id, quality, pose)) => {
                    if quality >= 0.0 {
                        batch.push(DeviceRecord::new(id, Some(FormatTag::Body6d)).with_pose(pose));
                    }
                }
                Err(error) => {
                    tracing::trace!(device = %ctx.name, %error, "binary record cut short");
                    return DecodeStatus::Truncated;
                }
            }
        }
        DecodeStatus::Complete
    }
}

/// A body as written by [`encode_binary`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryBody {
    pub id: u32,
    pub quality: f32,
    pub pose: Pose,
}

pub fn encode_binary(frame_number: u32, bodies: &[BinaryBody]) -> Vec<u8> {
    let mut w = ReportWriter::with_capacity(BINARY_HEADER_LEN + bodies.len() * BINARY_BODY_LEN);
    w.write_u32_le(frame_number)
        .write_i32_le(i32::try_from(bodies.len()).unwrap_or(i32::MAX));
    for b in bodies {
        w.write_u32_le(b.id).write_f32_le(b.quality);
        for v in b.pose.position.to_array() {
            w.write_f32_le(v as f32);
        }
        for v in to_euler_zyx_deg(b.pose.orientation) {
            w.write_f32_le(v as f32);
        }
        for v in to_row_major(b.pose.orientation) {
            w.write_f32_le(v as f32);
        }
    }
    w.into_inner()
}
