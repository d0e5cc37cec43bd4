//! Hand controller input reports and output commands.
//!
//! Every input report starts with its report type and two core button bytes.
//! Depending on the type it then carries accelerometer bytes, an extension
//! payload, or a reply to an earlier memory read or write. Extension bytes
//! arrive obfuscated and are decoded as a nunchuk.
//!
//! | Type | Payload after buttons |
//! |---|---|
//! | `0x20` | flags, 2 reserved, battery |
//! | `0x21` | size/error, address, 16 data bytes |
//! | `0x22` | acknowledged report, error |
//! | `0x30` | none |
//! | `0x31` | accel[3] |
//! | `0x32` | ext[8] |
//! | `0x35` | accel[3], ext[16] |
//! | `0x37` | accel[3], ir[10], ext[6] |

use crate::bits::{deobfuscate_in_place, obfuscate};
use crate::cursor::{Cursor, CursorResult, ReportWriter};
use crate::decode::{DecodeStatus, DeviceContext, RecordBatch, RecordDecoder, Reply};
use crate::error::{CommandError, CommandResult};
use crate::sync::Frame;
use trackwire_types::{ButtonBits, DeviceRecord, FormatTag, Valuators};

pub const REPORT_STATUS: u8 = 0x20;
pub const REPORT_READ_REPLY: u8 = 0x21;
pub const REPORT_ACK: u8 = 0x22;
pub const REPORT_BUTTONS: u8 = 0x30;
pub const REPORT_BUTTONS_ACCEL: u8 = 0x31;
pub const REPORT_BUTTONS_EXT8: u8 = 0x32;
pub const REPORT_BUTTONS_ACCEL_EXT16: u8 = 0x35;
pub const REPORT_BUTTONS_ACCEL_IR_EXT6: u8 = 0x37;
pub const REPORT_INTERLEAVED_A: u8 = 0x3E;
pub const REPORT_INTERLEAVED_B: u8 = 0x3F;

const OUT_REPORTING_MODE: u8 = 0x12;
const OUT_STATUS_REQUEST: u8 = 0x15;
const OUT_WRITE_MEMORY: u8 = 0x16;
const OUT_READ_MEMORY: u8 = 0x17;

/// Transaction header some transports prepend to input reports.
pub const INPUT_HEADER: u8 = 0xA1;

/// Valid bits of the core button word.
pub const CORE_BUTTON_MASK: u16 = 0x1F9F;
pub const CORE_BUTTONS: usize = 16;
pub const BUTTON_Z: usize = 16;
pub const BUTTON_C: usize = 17;

pub const VALUATOR_ACCEL: u16 = 0;
pub const VALUATOR_STICK: u16 = 3;
pub const VALUATOR_NUNCHUK_ACCEL: u16 = 5;
pub const VALUATOR_BATTERY: u16 = 8;

/// Accelerometer calibration block in EEPROM.
pub const CALIBRATION_ADDRESS: u16 = 0x0016;
pub const CALIBRATION_LEN: u16 = 10;

/// Writing zero here enables the obfuscated extension encoding.
pub const EXTENSION_INIT_ADDRESS: u32 = 0x00A4_0040;

const FLAG_EXTENSION: u8 = 0x02;
const BATTERY_FULL: f64 = 200.0;
const NUNCHUK_ACCEL_ZERO: f64 = 512.0;
const NUNCHUK_ACCEL_ONE_G: f64 = 204.0;
const READ_REPLY_DATA: usize = 16;
const MAX_WRITE: usize = 16;

/// Accelerometer zero and one-g points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelCalibration {
    pub zero: [u8; 3],
    pub gravity: [u8; 3],
}

impl Default for AccelCalibration {
    fn default() -> Self {
        Self {
            zero: [0x80; 3],
            gravity: [0x9A; 3],
        }
    }
}

impl AccelCalibration {
    /// Parse the EEPROM calibration block; `None` when it is too short.
    pub fn from_block(data: &[u8]) -> Option<Self> {
        let zero = data.get(0..3)?.try_into().ok()?;
        let gravity = data.get(4..7)?.try_into().ok()?;
        Some(Self { zero, gravity })
    }

    /// Raw accelerometer bytes in g.
    pub fn scale(&self, raw: [u8; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (i, v) in out.iter_mut().enumerate() {
            let zero = f64::from(self.zero[i]);
            let span = f64::from(self.gravity[i]) - zero;
            let span = if span.abs() < 1.0 { 1.0 } else { span };
            *v = (f64::from(raw[i]) - zero) / span;
        }
        out
    }
}

/// Decoded nunchuk extension state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Nunchuk {
    pub stick: [u8; 2],
    /// 10-bit accelerometer readings.
    pub accel: [u16; 3],
    pub c: bool,
    pub z: bool,
}

impl Nunchuk {
    /// Decode six de-obfuscated extension bytes.
    pub fn decode(ext: &[u8; 6]) -> Self {
        let lsb = ext[5];
        let axis = |msb: u8, shift: u8| (u16::from(msb) << 2) | u16::from((lsb >> shift) & 0x03);
        Self {
            stick: [ext[0], ext[1]],
            accel: [axis(ext[2], 2), axis(ext[3], 4), axis(ext[4], 6)],
            // Buttons are active low.
            z: lsb & 0x01 == 0,
            c: lsb & 0x02 == 0,
        }
    }

    /// Plain extension bytes; see [`Nunchuk::encode_obfuscated`] for the wire form.
    pub fn encode(&self) -> [u8; 6] {
        // Each 10-bit axis splits into its top eight bits and two low bits.
        let [ax, ay, az] = self.accel.map(|v| {
            let [hi, lo] = ((v & 0x3FF) << 6).to_be_bytes();
            (hi, lo >> 6)
        });
        let lsb = (u8::from(!self.z))
            | (u8::from(!self.c) << 1)
            | (ax.1 << 2)
            | (ay.1 << 4)
            | (az.1 << 6);
        [self.stick[0], self.stick[1], ax.0, ay.0, az.0, lsb]
    }

    pub fn encode_obfuscated(&self) -> [u8; 6] {
        self.encode().map(obfuscate)
    }

    /// Stick x/y in `-1.0..=1.0`.
    pub fn stick_axes(&self) -> [f64; 2] {
        self.stick
            .map(|v| ((f64::from(v) - 128.0) / 127.0).clamp(-1.0, 1.0))
    }

    /// Accelerometer in g.
    pub fn accel_g(&self) -> [f64; 3] {
        self.accel
            .map(|v| (f64::from(v) - NUNCHUK_ACCEL_ZERO) / NUNCHUK_ACCEL_ONE_G)
    }
}

/// Decodes hand-controller input reports.
///
/// Remembers whether an extension is attached (from status reports) and the
/// accelerometer calibration (from a read of [`CALIBRATION_ADDRESS`]).
#[derive(Debug, Default)]
pub struct RemoteDecoder {
    calibration: AccelCalibration,
    extension: Option<bool>,
}

impl RemoteDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calibration(&self) -> AccelCalibration {
        self.calibration
    }

    /// `None` until the first status report.
    pub fn extension_attached(&self) -> Option<bool> {
        self.extension
    }

    fn accel(&self, c: &mut Cursor<'_>, record: &mut DeviceRecord) -> CursorResult<()> {
        let raw: [u8; 3] = [c.read_u8()?, c.read_u8()?, c.read_u8()?];
        record.valuators = Valuators::from_slice(VALUATOR_ACCEL, &self.calibration.scale(raw));
        Ok(())
    }

    fn extension(&self, ext: &[u8], record: &mut DeviceRecord) {
        if self.extension == Some(false) {
            return;
        }
        let Some(mut bytes) = ext.get(..6).and_then(|s| <[u8; 6]>::try_from(s).ok()) else {
            return;
        };
        deobfuscate_in_place(&mut bytes);
        let nunchuk = Nunchuk::decode(&bytes);

        let mut bits = record.buttons.bits;
        bits |= u64::from(nunchuk.z) << BUTTON_Z;
        bits |= u64::from(nunchuk.c) << BUTTON_C;
        record.buttons = ButtonBits::full(bits, BUTTON_C + 1);

        if record.valuators.is_empty() {
            record.valuators = Valuators::from_slice(VALUATOR_STICK, &[]);
        }
        for v in nunchuk.stick_axes().into_iter().chain(nunchuk.accel_g()) {
            record.valuators.push(v);
        }
    }

    fn decode_report(
        &mut self,
        report: u8,
        c: &mut Cursor<'_>,
        batch: &mut RecordBatch,
    ) -> CursorResult<DecodeStatus> {
        let word = c.read_u16_be()? & CORE_BUTTON_MASK;
        let mut record = DeviceRecord::new(0, Some(FormatTag::Remote))
            .with_buttons(ButtonBits::full(u64::from(word), CORE_BUTTONS));

        match report {
            REPORT_STATUS => {
                let flags = c.read_u8()?;
                c.skip(2)?;
                let battery = c.read_u8()?;
                let attached = flags & FLAG_EXTENSION != 0;
                if self.extension != Some(attached) {
                    tracing::debug!(attached, "extension state changed");
                }
                self.extension = Some(attached);
                let level = (f64::from(battery) / BATTERY_FULL).min(1.0);
                record.valuators = Valuators::from_slice(VALUATOR_BATTERY, &[level]);
            }
            REPORT_READ_REPLY => {
                let size_error = c.read_u8()?;
                let address = c.read_u16_be()?;
                let payload = c.take(READ_REPLY_DATA)?;
                let mut data = [0u8; READ_REPLY_DATA];
                data.copy_from_slice(payload);
                let error = size_error & 0x0F;
                let len = (size_error >> 4) + 1;
                if error == 0 && address == CALIBRATION_ADDRESS {
                    if let Some(calibration) = AccelCalibration::from_block(&data) {
                        self.calibration = calibration;
                    }
                }
                batch.set_reply(Reply::Data {
                    address,
                    error,
                    len,
                    data,
                });
            }
            REPORT_ACK => {
                let acked = c.read_u8()?;
                let error = c.read_u8()?;
                batch.set_reply(Reply::Ack {
                    report: acked,
                    error,
                });
            }
            REPORT_BUTTONS => {}
            REPORT_BUTTONS_ACCEL => self.accel(c, &mut record)?,
            REPORT_BUTTONS_EXT8 => {
                let ext = c.take(8)?;
                self.extension(ext, &mut record);
            }
            REPORT_BUTTONS_ACCEL_EXT16 => {
                self.accel(c, &mut record)?;
                let ext = c.take(16)?;
                self.extension(ext, &mut record);
            }
            REPORT_BUTTONS_ACCEL_IR_EXT6 => {
                self.accel(c, &mut record)?;
                c.skip(10)?;
                let ext = c.take(6)?;
                self.extension(ext, &mut record);
            }
            _ => return Ok(DecodeStatus::Truncated),
        }
        batch.push(record);
        Ok(DecodeStatus::Complete)
    }
}

impl RecordDecoder for RemoteDecoder {
    fn decode(
        &mut self,
        frame: Frame<'_>,
        ctx: &mut DeviceContext,
        batch: &mut RecordBatch,
    ) -> DecodeStatus {
        let bytes = match frame.bytes.split_first() {
            Some((&INPUT_HEADER, rest)) => rest,
            _ => frame.bytes,
        };
        let mut c = Cursor::new(bytes);
        let Ok(report) = c.read_u8() else {
            return DecodeStatus::Truncated;
        };
        if matches!(report, REPORT_INTERLEAVED_A | REPORT_INTERLEAVED_B) {
            return DecodeStatus::Complete;
        }
        match self.decode_report(report, &mut c, batch) {
            Ok(DecodeStatus::Truncated) => {
                tracing::trace!(device = %ctx.name, report, "unknown report type");
                DecodeStatus::Truncated
            }
            Ok(status) => status,
            Err(error) => {
                tracing::trace!(device = %ctx.name, report, %error, "report cut short");
                DecodeStatus::Truncated
            }
        }
    }

    fn reset(&mut self) {
        self.extension = None;
    }
}

/// Address space of a memory request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySpace {
    Eeprom,
    Registers,
}

impl MemorySpace {
    fn flag(self) -> u8 {
        match self {
            MemorySpace::Eeprom => 0x00,
            MemorySpace::Registers => 0x04,
        }
    }
}

fn address_bytes(address: u32) -> CommandResult<[u8; 3]> {
    if address > 0x00FF_FFFF {
        return Err(CommandError::AddressOutOfRange { address });
    }
    let [_, a, b, c] = address.to_be_bytes();
    Ok([a, b, c])
}

/// Output report requesting `size` bytes at `address`.
pub fn read_memory_request(space: MemorySpace, address: u32, size: u16) -> CommandResult<[u8; 7]> {
    if size == 0 {
        return Err(CommandError::EmptyRead);
    }
    let [a, b, c] = address_bytes(address)?;
    let [s0, s1] = size.to_be_bytes();
    Ok([OUT_READ_MEMORY, space.flag(), a, b, c, s0, s1])
}

/// Output report writing up to 16 bytes at `address`.
pub fn write_memory_request(
    space: MemorySpace,
    address: u32,
    data: &[u8],
) -> CommandResult<[u8; 22]> {
    if data.len() > MAX_WRITE {
        return Err(CommandError::WriteTooLong { len: data.len() });
    }
    let Ok(len) = u8::try_from(data.len()) else {
        return Err(CommandError::WriteTooLong { len: data.len() });
    };
    let [a, b, c] = address_bytes(address)?;
    let mut out = [0u8; 22];
    out[..6].copy_from_slice(&[OUT_WRITE_MEMORY, space.flag(), a, b, c, len]);
    out[6..6 + data.len()].copy_from_slice(data);
    Ok(out)
}

/// Output report selecting the input report type the device streams.
pub fn reporting_mode_request(report: u8, continuous: bool) -> [u8; 3] {
    [OUT_REPORTING_MODE, if continuous { 0x04 } else { 0x00 }, report]
}

pub fn status_request() -> [u8; 2] {
    [OUT_STATUS_REQUEST, 0x00]
}

/// Input report of type `report` with the given payload sections.
///
/// `accel` is written for types that carry it, `ext` is written as is
/// (already obfuscated) and padded to the size the type carries.
pub fn encode_input_report(report: u8, buttons: u16, accel: [u8; 3], ext: &[u8]) -> Vec<u8> {
    let mut w = ReportWriter::with_capacity(22);
    w.write_u8(report).write_u16_be(buttons);
    let (has_accel, ir, ext_len) = match report {
        REPORT_BUTTONS_ACCEL => (true, 0, 0),
        REPORT_BUTTONS_EXT8 => (false, 0, 8),
        REPORT_BUTTONS_ACCEL_EXT16 => (true, 0, 16),
        REPORT_BUTTONS_ACCEL_IR_EXT6 => (true, 10, 6),
        _ => (false, 0, 0),
    };
    if has_accel {
        w.write_bytes(&accel);
    }
    w.write_bytes(&[0xFF; 10][..ir]);
    for i in 0..ext_len {
        w.write_u8(ext.get(i).copied().unwrap_or(0));
    }
    w.into_inner()
}

pub fn encode_status_report(buttons: u16, extension: bool, battery: u8) -> Vec<u8> {
    let flags = if extension { FLAG_EXTENSION } else { 0 };
    let mut w = ReportWriter::with_capacity(7);
    w.write_u8(REPORT_STATUS)
        .write_u16_be(buttons)
        .write_bytes(&[flags, 0, 0, battery]);
    w.into_inner()
}

pub fn encode_read_reply(buttons: u16, address: u16, error: u8, data: &[u8]) -> Vec<u8> {
    let len = u8::try_from(data.len().clamp(1, READ_REPLY_DATA)).unwrap_or(1);
    let mut w = ReportWriter::with_capacity(22);
    w.write_u8(REPORT_READ_REPLY)
        .write_u16_be(buttons)
        .write_u8(((len - 1) << 4) | (error & 0x0F))
        .write_u16_be(address);
    for i in 0..READ_REPLY_DATA {
        w.write_u8(data.get(i).copied().unwrap_or(0));
    }
    w.into_inner()
}

pub fn encode_ack(buttons: u16, report: u8, error: u8) -> Vec<u8> {
    let mut w = ReportWriter::with_capacity(5);
    w.write_u8(REPORT_ACK)
        .write_u16_be(buttons)
        .write_u8(report)
        .write_u8(error);
    w.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::FrameKind;

    fn decode(decoder: &mut RemoteDecoder, bytes: &[u8]) -> (DecodeStatus, RecordBatch) {
        let mut batch = RecordBatch::new();
        let frame = Frame {
            kind: FrameKind::Datagram,
            bytes,
        };
        let status = decoder.decode(frame, &mut DeviceContext::new("remote"), &mut batch);
        (status, batch)
    }

    fn nunchuk() -> Nunchuk {
        Nunchuk {
            stick: [255, 128],
            accel: [512, 716, 308],
            c: true,
            z: false,
        }
    }

    #[test]
    fn test_core_buttons_are_masked() {
        let mut d = RemoteDecoder::new();
        let (status, batch) = decode(&mut d, &encode_input_report(REPORT_BUTTONS, 0xFFFF, [0; 3], &[]));
        assert_eq!(status, DecodeStatus::Complete);
        let r = batch.records()[0];
        assert_eq!(r.buttons.bits, u64::from(CORE_BUTTON_MASK));
        assert_eq!(r.buttons.mask, 0xFFFF);
    }

    #[test]
    fn test_transaction_header_is_skipped() {
        let mut d = RemoteDecoder::new();
        let mut bytes = vec![INPUT_HEADER];
        bytes.extend(encode_input_report(REPORT_BUTTONS, 0x0008, [0; 3], &[]));
        let (status, batch) = decode(&mut d, &bytes);
        assert_eq!(status, DecodeStatus::Complete);
        assert_eq!(batch.records()[0].buttons.get(3), Some(true));
    }

    #[test]
    fn test_accel_uses_default_calibration() {
        let mut d = RemoteDecoder::new();
        let bytes = encode_input_report(REPORT_BUTTONS_ACCEL, 0, [0x80, 0x9A, 0x66], &[]);
        let (_, batch) = decode(&mut d, &bytes);
        let v = batch.records()[0].valuators;
        assert_eq!(v.first(), VALUATOR_ACCEL);
        assert_eq!(v.as_slice(), &[0.0, 1.0, -1.0]);
    }

    #[test]
    fn test_nunchuk_round_trip_through_obfuscation() {
        let mut d = RemoteDecoder::new();
        let n = nunchuk();
        let bytes = encode_input_report(
            REPORT_BUTTONS_ACCEL_EXT16,
            0,
            [0x80; 3],
            &n.encode_obfuscated(),
        );
        let (status, batch) = decode(&mut d, &bytes);
        assert_eq!(status, DecodeStatus::Complete);
        let r = batch.records()[0];
        assert_eq!(r.buttons.get(BUTTON_C), Some(true));
        assert_eq!(r.buttons.get(BUTTON_Z), Some(false));
        let v = r.valuators.as_slice();
        assert_eq!(v.len(), 8);
        assert_eq!(v[3], 1.0);
        assert!(v[4].abs() < 1e-12);
        assert_eq!(&v[5..], &[0.0, 1.0, -1.0]);
    }

    #[test]
    fn test_nunchuk_only_report_starts_at_stick() {
        let mut d = RemoteDecoder::new();
        let bytes = encode_input_report(REPORT_BUTTONS_EXT8, 0, [0; 3], &nunchuk().encode_obfuscated());
        let (_, batch) = decode(&mut d, &bytes);
        let v = batch.records()[0].valuators;
        assert_eq!(v.first(), VALUATOR_STICK);
        assert_eq!(v.len(), 5);
    }

    #[test]
    fn test_nunchuk_bytes_round_trip() {
        let n = nunchuk();
        assert_eq!(Nunchuk::decode(&n.encode()), n);
    }

    #[test]
    fn test_nunchuk_accel_splits_into_high_and_low_bits() {
        let n = Nunchuk {
            stick: [1, 2],
            accel: [0x3FF, 0x001, 0x402],
            c: true,
            z: false,
        };
        assert_eq!(n.encode(), [1, 2, 0xFF, 0x00, 0x00, 0b1001_1101]);
        assert_eq!(Nunchuk::decode(&n.encode()).accel, [0x3FF, 0x001, 0x002]);
    }

    #[test]
    fn test_detached_extension_is_ignored() {
        let mut d = RemoteDecoder::new();
        let (_, batch) = decode(&mut d, &encode_status_report(0, false, 100));
        assert_eq!(d.extension_attached(), Some(false));
        let battery = batch.records()[0].valuators;
        assert_eq!(battery.first(), VALUATOR_BATTERY);
        assert_eq!(battery.as_slice(), &[0.5]);

        let bytes = encode_input_report(REPORT_BUTTONS_ACCEL_IR_EXT6, 0, [0x80; 3], &nunchuk().encode_obfuscated());
        let (_, batch) = decode(&mut d, &bytes);
        let r = batch.records()[0];
        assert_eq!(r.valuators.len(), 3);
        assert_eq!(r.buttons.get(BUTTON_C), None);
    }

    #[test]
    fn test_read_reply_and_calibration() {
        let mut d = RemoteDecoder::new();
        let block = [0x70, 0x70, 0x70, 0x00, 0x90, 0x90, 0x90, 0x00, 0x00, 0x00];
        let (status, batch) = decode(&mut d, &encode_read_reply(0, CALIBRATION_ADDRESS, 0, &block));
        assert_eq!(status, DecodeStatus::Complete);
        let reply = batch.reply();
        assert!(matches!(reply, Some(Reply::Data { address: 0x16, error: 0, len: 10, .. })));
        assert_eq!(reply.map(|r| r.data().to_vec()), Some(block.to_vec()));
        assert_eq!(d.calibration().zero, [0x70; 3]);
        assert_eq!(d.calibration().gravity, [0x90; 3]);
    }

    #[test]
    fn test_read_reply_error_nibble() {
        let mut d = RemoteDecoder::new();
        let (_, batch) = decode(&mut d, &encode_read_reply(0, CALIBRATION_ADDRESS, 8, &[0; 16]));
        assert_eq!(batch.reply().map(|r| r.error()), Some(8));
        assert_eq!(d.calibration(), AccelCalibration::default());
    }

    #[test]
    fn test_ack() {
        let mut d = RemoteDecoder::new();
        let (_, batch) = decode(&mut d, &encode_ack(0, OUT_WRITE_MEMORY, 3));
        assert_eq!(
            batch.reply(),
            Some(Reply::Ack {
                report: OUT_WRITE_MEMORY,
                error: 3
            })
        );
    }

    #[test]
    fn test_unknown_and_short_reports() {
        let mut d = RemoteDecoder::new();
        assert_eq!(decode(&mut d, &[0x3D, 0, 0]).0, DecodeStatus::Truncated);
        assert_eq!(decode(&mut d, &[REPORT_BUTTONS_ACCEL, 0, 0, 0x80]).0, DecodeStatus::Truncated);
        assert_eq!(decode(&mut d, &[REPORT_INTERLEAVED_A, 1, 2]).0, DecodeStatus::Complete);
        assert_eq!(decode(&mut d, &[]).0, DecodeStatus::Truncated);
    }

    #[test]
    fn test_command_builders() -> CommandResult<()> {
        assert_eq!(
            read_memory_request(MemorySpace::Eeprom, u32::from(CALIBRATION_ADDRESS), CALIBRATION_LEN)?,
            [0x17, 0x00, 0x00, 0x00, 0x16, 0x00, 0x0A]
        );
        let write = write_memory_request(MemorySpace::Registers, EXTENSION_INIT_ADDRESS, &[0x00])?;
        assert_eq!(&write[..7], &[0x16, 0x04, 0xA4, 0x00, 0x40, 0x01, 0x00]);
        assert_eq!(
            write_memory_request(MemorySpace::Registers, 0, &[0; 17]),
            Err(CommandError::WriteTooLong { len: 17 })
        );
        assert_eq!(
            read_memory_request(MemorySpace::Eeprom, 0x0100_0000, 1),
            Err(CommandError::AddressOutOfRange { address: 0x0100_0000 })
        );
        assert_eq!(reporting_mode_request(REPORT_BUTTONS_ACCEL_EXT16, true), [0x12, 0x04, 0x35]);
        assert_eq!(status_request(), [0x15, 0x00]);
        Ok(())
    }
}
