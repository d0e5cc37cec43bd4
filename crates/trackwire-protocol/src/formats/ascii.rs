//! Tagged ASCII tracker output.
//!
//! ```text
//! fr 21753
//! ts 39596.024831
//! 6dcal 2
//! 3d 1 [12 1.000][-12.1 35.0 1050.2]
//! 6d 1 [0 1.000][326.0 -101.7 -6.1 -175.7 -27.1 -3.5][0.88 -0.06 -0.47 ...]
//! 6df 1 [0 1.000 20][326.0 -101.7 -6.1][0.88 -0.06 -0.47 ...]
//! 6df2 2 1 [0 1.000 6 2][326.0 -101.7 -6.1][0.88 ...][5 -0.50 0.25]
//! 6dmt 1 [0 1.000 1][326.0 -101.7 -6.1][0.88 ...]
//! gl 1 [0 1.000 1 3][...][...] [x y z][r0..r8][ro rm ri a1 a2] ...
//! ```
//!
//! A malformed body abandons the rest of its line only; records decoded
//! earlier on the same line are kept.

use crate::decode::{DecodeStatus, DeviceContext, RecordBatch, RecordDecoder};
use crate::sync::{AsciiTag, Frame, FrameKind};
use crate::tokenizer::{TokenError, Tokenizer};
use trackwire_types::orientation::{from_euler_zyx_deg, from_row_major, to_row_major};
use trackwire_types::{ButtonBits, DQuat, DVec3, DeviceRecord, FormatTag, Pose, Valuators};

/// Buttons reported by `6df` and `6dmt` bodies.
pub const FLYSTICK_BUTTONS: usize = 8;

/// Most fingers per hand.
pub const MAX_FINGERS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
enum LineError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("group of {found} values where {expected} were expected")]
    GroupSize { found: usize, expected: &'static str },
    #[error("count {0} out of range")]
    Count(u64),
}

type LineResult<T> = Result<T, LineError>;

#[derive(Debug, Default)]
pub struct AsciiDecoder;

impl AsciiDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl RecordDecoder for AsciiDecoder {
    fn decode(
        &mut self,
        frame: Frame<'_>,
        ctx: &mut DeviceContext,
        batch: &mut RecordBatch,
    ) -> DecodeStatus {
        let FrameKind::Line(tag) = frame.kind else {
            return DecodeStatus::Resync;
        };
        let mut tok = Tokenizer::new(frame.bytes);
        let result = match tag {
            AsciiTag::Frame => read_frame_number(&mut tok, ctx),
            AsciiTag::Timestamp => read_timestamp(&mut tok, ctx),
            AsciiTag::Calibration => Ok(()),
            AsciiTag::Marker3d => decode_markers(&mut tok, batch),
            AsciiTag::Body6d => decode_bodies(&mut tok, batch),
            AsciiTag::Flystick => decode_flysticks(&mut tok, batch),
            AsciiTag::Flystick2 => decode_flysticks2(&mut tok, batch),
            AsciiTag::MeasurementTool => decode_tools(&mut tok, batch),
            AsciiTag::Glove => decode_gloves(&mut tok, batch),
        };
        match result {
            Ok(()) => DecodeStatus::Complete,
            Err(error) => {
                tracing::trace!(
                    device = %ctx.name,
                    tag = tag.as_str(),
                    %error,
                    "abandoning rest of line"
                );
                DecodeStatus::Truncated
            }
        }
    }
}

fn read_frame_number(tok: &mut Tokenizer<'_>, ctx: &mut DeviceContext) -> LineResult<()> {
    ctx.frame_number = Some(tok.read_unsigned_int()?);
    Ok(())
}

fn read_timestamp(tok: &mut Tokenizer<'_>, ctx: &mut DeviceContext) -> LineResult<()> {
    ctx.wire_time = Some(tok.read_float()?);
    Ok(())
}

fn read_count(tok: &mut Tokenizer<'_>) -> LineResult<usize> {
    let n = tok.read_unsigned_int()?;
    usize::try_from(n)
        .ok()
        .filter(|&n| n <= crate::decode::BATCH_CAPACITY)
        .ok_or(LineError::Count(n))
}

fn read_id(tok: &mut Tokenizer<'_>) -> LineResult<u32> {
    let id = tok.read_unsigned_int()?;
    u32::try_from(id).ok().ok_or(LineError::Count(id))
}

/// `[x y z ...]` followed by an optional 9-value rotation matrix.
///
/// The first group holds position (3), position and Euler angles (6) or
/// position and matrix (12). A following group is only taken as the matrix
/// when it holds exactly nine values; anything else is left for the caller.
fn read_pose(tok: &mut Tokenizer<'_>) -> LineResult<Pose> {
    let mut g = [0.0; 12];
    let n = tok.read_float_group(&mut g)?;
    let position = DVec3::new(g[0], g[1], g[2]);
    let mut orientation = match n {
        3 => DQuat::IDENTITY,
        6 => from_euler_zyx_deg(g[3], g[4], g[5]),
        12 => {
            let mut m = [0.0; 9];
            m.copy_from_slice(&g[3..12]);
            from_row_major(&m)
        }
        found => {
            return Err(LineError::GroupSize {
                found,
                expected: "3, 6 or 12",
            });
        }
    };
    let save = tok.position();
    let mut m = [0.0; 9];
    match tok.read_float_group(&mut m) {
        Ok(9) => orientation = from_row_major(&m),
        _ => tok.rewind(save),
    }
    Ok(Pose::new(position, orientation))
}

fn read_exact_group(
    tok: &mut Tokenizer<'_>,
    out: &mut [f64],
    expected: &'static str,
) -> LineResult<()> {
    let found = tok.read_float_group(out)?;
    if found == out.len() {
        Ok(())
    } else {
        Err(LineError::GroupSize { found, expected })
    }
}

fn decode_markers(tok: &mut Tokenizer<'_>, batch: &mut RecordBatch) -> LineResult<()> {
    for _ in 0..read_count(tok)? {
        tok.expect_char('[')?;
        let id = read_id(tok)?;
        let _quality = tok.read_float()?;
        tok.expect_char(']')?;
        let mut p = [0.0; 3];
        read_exact_group(tok, &mut p, "3")?;
        let pose = Pose::new(DVec3::from_array(p), DQuat::IDENTITY);
        batch.push(DeviceRecord::new(id, Some(FormatTag::Marker3d)).with_pose(pose));
    }
    Ok(())
}

fn decode_bodies(tok: &mut Tokenizer<'_>, batch: &mut RecordBatch) -> LineResult<()> {
    for _ in 0..read_count(tok)? {
        tok.expect_char('[')?;
        let id = read_id(tok)?;
        let quality = tok.read_float()?;
        tok.expect_char(']')?;
        let pose = read_pose(tok)?;
        if quality >= 0.0 {
            batch.push(DeviceRecord::new(id, Some(FormatTag::Body6d)).with_pose(pose));
        }
    }
    Ok(())
}

/// Hat bits of an 8-bit flystick button word as joystick axes.
pub fn flystick_joystick(bits: u64) -> (f64, f64) {
    let bit = |n: u32| bits & (1 << n) != 0;
    let x = if bit(5) {
        -1.0
    } else if bit(7) {
        1.0
    } else {
        0.0
    };
    let y = if bit(4) {
        -1.0
    } else if bit(6) {
        1.0
    } else {
        0.0
    };
    (x, y)
}

/// Untracked flysticks still report their buttons; only the pose is withheld.
fn tracked(record: DeviceRecord, quality: f64, pose: Pose) -> DeviceRecord {
    if quality >= 0.0 {
        record.with_pose(pose)
    } else {
        record
    }
}

fn decode_flysticks(tok: &mut Tokenizer<'_>, batch: &mut RecordBatch) -> LineResult<()> {
    for _ in 0..read_count(tok)? {
        tok.expect_char('[')?;
        let id = read_id(tok)?;
        let quality = tok.read_float()?;
        let bits = tok.read_unsigned_int()?;
        tok.expect_char(']')?;
        let pose = read_pose(tok)?;
        let (x, y) = flystick_joystick(bits);
        let record = DeviceRecord::new(id, Some(FormatTag::Flystick))
            .with_buttons(ButtonBits::full(bits, FLYSTICK_BUTTONS))
            .with_valuators(Valuators::from_slice(0, &[x, y]));
        batch.push(tracked(record, quality, pose));
    }
    Ok(())
}

fn decode_flysticks2(tok: &mut Tokenizer<'_>, batch: &mut RecordBatch) -> LineResult<()> {
    let _configured = tok.read_unsigned_int()?;
    for _ in 0..read_count(tok)? {
        tok.expect_char('[')?;
        let id = read_id(tok)?;
        let quality = tok.read_float()?;
        let buttons = read_count(tok)?;
        let controls = read_count(tok)?;
        tok.expect_char(']')?;
        let pose = read_pose(tok)?;

        tok.expect_char('[')?;
        let mut bits = 0u64;
        for word in 0..buttons.div_ceil(32) {
            let value = tok.read_unsigned_int()? & 0xFFFF_FFFF;
            if word < 2 {
                bits |= value << (32 * word);
            }
        }
        let mut valuators = Valuators::new();
        for _ in 0..controls {
            valuators.push(tok.read_float()?);
        }
        tok.expect_char(']')?;

        let record = DeviceRecord::new(id, Some(FormatTag::Flystick))
            .with_buttons(ButtonBits::full(bits, buttons))
            .with_valuators(valuators);
        batch.push(tracked(record, quality, pose));
    }
    Ok(())
}

fn decode_tools(tok: &mut Tokenizer<'_>, batch: &mut RecordBatch) -> LineResult<()> {
    for _ in 0..read_count(tok)? {
        tok.expect_char('[')?;
        let id = read_id(tok)?;
        let quality = tok.read_float()?;
        let bits = tok.read_unsigned_int()?;
        tok.expect_char(']')?;
        let pose = read_pose(tok)?;
        let record = DeviceRecord::new(id, Some(FormatTag::MeasurementTool))
            .with_buttons(ButtonBits::full(bits, FLYSTICK_BUTTONS));
        batch.push(tracked(record, quality, pose));
    }
    Ok(())
}

fn decode_gloves(tok: &mut Tokenizer<'_>, batch: &mut RecordBatch) -> LineResult<()> {
    for _ in 0..read_count(tok)? {
        tok.expect_char('[')?;
        let id = read_id(tok)?;
        let quality = tok.read_float()?;
        let _side = tok.read_int()?;
        let fingers = read_count(tok)?;
        tok.expect_char(']')?;
        if fingers > MAX_FINGERS {
            return Err(LineError::Count(u64::try_from(fingers).unwrap_or(u64::MAX)));
        }
        let hand = read_pose(tok)?;
        if quality >= 0.0 {
            batch.push(DeviceRecord::new(id, Some(FormatTag::Hand)).with_pose(hand));
        }
        for finger in 0..fingers {
            // Finger poses are relative to the hand.
            let local = read_pose(tok)?;
            let mut joints = [0.0; 5];
            read_exact_group(tok, &mut joints, "5")?;
            if quality >= 0.0 {
                let pose = Pose::new(
                    hand.position + hand.orientation * local.position,
                    hand.orientation * local.orientation,
                );
                let sub_index = u8::try_from(finger + 1).unwrap_or(u8::MAX);
                batch.push(
                    DeviceRecord::new(id, Some(FormatTag::Hand))
                        .with_sub_index(sub_index)
                        .with_pose(pose),
                );
            }
        }
    }
    Ok(())
}

/// A body as written by [`encode_line`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsciiBody {
    pub id: u32,
    pub quality: f64,
    pub pose: Pose,
    /// Button word (`6df`, `6dmt`).
    pub buttons: u64,
    /// Button count (`6df2`).
    pub button_count: usize,
    /// Controller values (`6df2`).
    pub controls: Valuators,
    /// Finger poses relative to the hand (`gl`).
    pub fingers: [Option<Pose>; MAX_FINGERS],
}

impl AsciiBody {
    pub fn new(id: u32, pose: Pose) -> Self {
        Self {
            id,
            quality: 1.0,
            pose,
            buttons: 0,
            button_count: 0,
            controls: Valuators::new(),
            fingers: [None; MAX_FINGERS],
        }
    }
}

fn write_position_and_matrix(out: &mut String, pose: &Pose) {
    let p = pose.position;
    out.push_str(&format!("[{} {} {}][", p.x, p.y, p.z));
    for (i, v) in to_row_major(pose.orientation).iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{v}"));
    }
    out.push(']');
}

/// Render one output line (without terminator) for `tag`.
pub fn encode_line(tag: AsciiTag, bodies: &[AsciiBody]) -> String {
    let mut out = String::with_capacity(64 + bodies.len() * 160);
    out.push_str(tag.as_str());
    if tag == AsciiTag::Flystick2 {
        out.push_str(&format!(" {}", bodies.len()));
    }
    out.push_str(&format!(" {}", bodies.len()));
    for b in bodies {
        out.push(' ');
        match tag {
            AsciiTag::Marker3d => {
                let p = b.pose.position;
                out.push_str(&format!("[{} {}][{} {} {}]", b.id, b.quality, p.x, p.y, p.z));
            }
            AsciiTag::Flystick | AsciiTag::MeasurementTool => {
                out.push_str(&format!("[{} {} {}]", b.id, b.quality, b.buttons));
                write_position_and_matrix(&mut out, &b.pose);
            }
            AsciiTag::Flystick2 => {
                let controls = b.controls.as_slice();
                out.push_str(&format!(
                    "[{} {} {} {}]",
                    b.id,
                    b.quality,
                    b.button_count,
                    controls.len()
                ));
                write_position_and_matrix(&mut out, &b.pose);
                out.push('[');
                let words = b.button_count.div_ceil(32);
                for word in 0..words {
                    let value = u32::try_from(word)
                        .ok()
                        .and_then(|w| w.checked_mul(32))
                        .and_then(|shift| b.buttons.checked_shr(shift))
                        .unwrap_or(0)
                        & 0xFFFF_FFFF;
                    out.push_str(&format!("{}{value}", if word > 0 { " " } else { "" }));
                }
                for (i, c) in controls.iter().enumerate() {
                    out.push_str(&format!("{}{c}", if words > 0 || i > 0 { " " } else { "" }));
                }
                out.push(']');
            }
            AsciiTag::Glove => {
                let fingers: Vec<Pose> = b.fingers.iter().flatten().copied().collect();
                out.push_str(&format!("[{} {} 1 {}]", b.id, b.quality, fingers.len()));
                write_position_and_matrix(&mut out, &b.pose);
                for f in &fingers {
                    write_position_and_matrix(&mut out, f);
                    out.push_str("[20 25 30 10 5]");
                }
            }
            AsciiTag::Body6d | AsciiTag::Frame | AsciiTag::Timestamp | AsciiTag::Calibration => {
                out.push_str(&format!("[{} {}]", b.id, b.quality));
                write_position_and_matrix(&mut out, &b.pose);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{KeywordFramer, feed};

    fn decode_all(input: &[u8]) -> (Vec<DeviceRecord>, Vec<DecodeStatus>, DeviceContext) {
        let mut framer = KeywordFramer::default();
        let mut decoder = AsciiDecoder::new();
        let mut ctx = DeviceContext::new("dtrack");
        let mut batch = RecordBatch::new();
        let mut statuses = Vec::new();
        let mut records = Vec::new();
        let mut pos = 0;
        while let Some(frame) = feed(&mut framer, input, &mut pos) {
            batch.clear();
            statuses.push(decoder.decode(frame, &mut ctx, &mut batch));
            records.extend_from_slice(batch.records());
        }
        (records, statuses, ctx)
    }

    fn close(a: DVec3, b: DVec3) -> bool {
        (a - b).length() < 1e-9
    }

    #[test]
    fn test_frame_and_timestamp_update_context() {
        let (records, statuses, ctx) = decode_all(b"fr 21753\r\nts 39596.024831\r\n6dcal 2\r\n");
        assert!(records.is_empty());
        assert_eq!(statuses, vec![DecodeStatus::Complete; 3]);
        assert_eq!(ctx.frame_number, Some(21753));
        assert!((ctx.wire_time.unwrap_or_default() - 39596.024831).abs() < 1e-9);
    }

    #[test]
    fn test_body_with_euler_and_matrix() {
        let line = b"6d 1 [3 1.000][10.0 20.0 30.0 90.0 0.0 0.0][0 -1 0 1 0 0 0 0 1]\n";
        let (records, statuses, _) = decode_all(line);
        assert_eq!(statuses, vec![DecodeStatus::Complete]);
        assert_eq!(records.len(), 1);
        let r = records[0];
        assert_eq!(r.wire_id, 3);
        assert_eq!(r.format, Some(FormatTag::Body6d));
        let pose = r.pose.unwrap_or_default();
        assert!(close(pose.position, DVec3::new(10.0, 20.0, 30.0)));
        assert!(close(pose.orientation * DVec3::X, DVec3::Y));
    }

    #[test]
    fn test_body_with_euler_only() {
        let (records, _, _) = decode_all(b"6d 2 [0 1.0][0 0 0 90 0 0] [1 1.0][1 2 3 0 0 0]\n");
        assert_eq!(records.len(), 2);
        let q = records[0].pose.unwrap_or_default().orientation;
        assert!(close(q * DVec3::X, DVec3::Y));
        assert_eq!(records[1].wire_id, 1);
    }

    #[test]
    fn test_untracked_body_is_skipped() {
        let (records, statuses, _) =
            decode_all(b"6d 2 [0 -1.000][0 0 0 0 0 0] [1 0.5][1 2 3 0 0 0]\n");
        assert_eq!(statuses, vec![DecodeStatus::Complete]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].wire_id, 1);
    }

    #[test]
    fn test_malformed_body_keeps_earlier_records() {
        let (records, statuses, _) =
            decode_all(b"6d 3 [0 1.0][1 2 3 0 0 0] [1 1.0 [4 5 6 0 0 0]\nfr 9\n");
        assert_eq!(statuses, vec![DecodeStatus::Truncated, DecodeStatus::Complete]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].wire_id, 0);
    }

    #[test]
    fn test_wrong_group_size_truncates() {
        let (records, statuses, _) = decode_all(b"6d 1 [0 1.0][1 2 3 4]\n");
        assert!(records.is_empty());
        assert_eq!(statuses, vec![DecodeStatus::Truncated]);
    }

    #[test]
    fn test_flystick_buttons_and_joystick() {
        let line = b"6df 1 [1 1.000 161][1 2 3][1 0 0 0 1 0 0 0 1]\n";
        let (records, _, _) = decode_all(line);
        let r = records[0];
        assert_eq!(r.format, Some(FormatTag::Flystick));
        assert_eq!(r.buttons.get(0), Some(true));
        assert_eq!(r.buttons.get(5), Some(true));
        assert_eq!(r.buttons.get(7), Some(true));
        // Bit 5 wins over bit 7 on the x axis.
        assert_eq!(r.valuators.as_slice(), &[-1.0, 0.0]);
    }

    #[test]
    fn test_untracked_flystick_keeps_buttons() {
        let line = b"6df 1 [1 -1.000 1][0 0 0][1 0 0 0 1 0 0 0 1]\n";
        let (records, _, _) = decode_all(line);
        assert_eq!(records.len(), 1);
        assert!(records[0].pose.is_none());
        assert_eq!(records[0].buttons.get(0), Some(true));
    }

    #[test]
    fn test_flystick2_words_and_controls() {
        let line = b"6df2 2 1 [0 1.000 6 2][1 2 3][1 0 0 0 1 0 0 0 1][33 -0.5 0.25]\n";
        let (records, statuses, _) = decode_all(line);
        assert_eq!(statuses, vec![DecodeStatus::Complete]);
        let r = records[0];
        assert_eq!(r.buttons.mask, 0b11_1111);
        assert_eq!(r.buttons.bits, 33);
        assert_eq!(r.valuators.as_slice(), &[-0.5, 0.25]);
    }

    #[test]
    fn test_glove_fingers_in_room_frame() {
        let line = b"gl 1 [2 1.0 1 1][10 0 0][0 -1 0 1 0 0 0 0 1] [1 0 0][1 0 0 0 1 0 0 0 1][1 2 3 4 5]\n";
        let (records, statuses, _) = decode_all(line);
        assert_eq!(statuses, vec![DecodeStatus::Complete]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sub_index, 1);
        let finger = records[1].pose.unwrap_or_default();
        assert!(close(finger.position, DVec3::new(10.0, 1.0, 0.0)));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let pose = Pose::new(
            DVec3::new(-12.5, 400.25, 1000.0),
            DQuat::from_axis_angle(DVec3::new(1.0, -2.0, 0.5).normalize(), 0.7),
        );
        let mut stick = AsciiBody::new(4, pose);
        stick.buttons = 0b1001;
        stick.button_count = 4;
        stick.controls = Valuators::from_slice(0, &[0.5, -0.25]);
        let mut hand = AsciiBody::new(1, pose);
        hand.fingers[0] = Some(Pose::new(DVec3::new(20.0, 0.0, 0.0), DQuat::IDENTITY));

        let mut input = String::new();
        for (tag, body) in [
            (AsciiTag::Body6d, AsciiBody::new(7, pose)),
            (AsciiTag::Flystick2, stick),
            (AsciiTag::MeasurementTool, stick),
            (AsciiTag::Glove, hand),
        ] {
            input.push_str(&encode_line(tag, &[body]));
            input.push_str("\r\n");
        }
        let (records, statuses, _) = decode_all(input.as_bytes());
        assert!(statuses.iter().all(|s| *s == DecodeStatus::Complete));
        assert_eq!(records.len(), 5);
        for r in &records[..4] {
            let got = r.pose.unwrap_or_default();
            assert!(close(got.position, pose.position));
            assert!(got.orientation.dot(pose.orientation).abs() > 1.0 - 1e-12);
        }
        assert_eq!(records[1].buttons, ButtonBits::full(0b1001, 4));
        assert_eq!(records[1].valuators.as_slice(), &[0.5, -0.25]);
        assert_eq!(records[2].buttons.bits, 0b1001);
    }
}
