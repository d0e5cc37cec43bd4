//! Network tracking relay messages.
//!
//! Every message has a 24-byte big-endian header
//! (`u32 total_len; u32 sec; u32 usec; u32 sender; i32 type; pad4`) followed by
//! the payload padded to a multiple of 8. Negative type codes are system
//! messages; non-negative codes only gain a meaning once a type description
//! has bound them to one of the known type names for the session.

use crate::cursor::{Cursor, CursorResult, ReportWriter};
use crate::decode::{DecodeStatus, DeviceContext, RecordBatch, RecordDecoder};
use crate::error::{RelayError, RelayResult};
use crate::sync::{Frame, MAX_MESSAGE_PAYLOAD, RELAY_HEADER_LEN};
use trackwire_types::orientation::{angular_velocity_from_delta, from_xyzw};
use trackwire_types::{
    ButtonBits, DQuat, DVec3, DeviceRecord, FormatTag, MAX_RECORD_VALUATORS, Pose, Valuators,
    WireVelocity,
};

pub const SENDER_DESCRIPTION: i32 = -1;
pub const TYPE_DESCRIPTION: i32 = -2;
pub const UDP_DESCRIPTION: i32 = -3;
pub const LOG_DESCRIPTION: i32 = -4;
pub const DISCONNECT: i32 = -5;

pub const POSE_TYPE_NAME: &str = "vrpn_Tracker Pos_Quat";
pub const VELOCITY_TYPE_NAME: &str = "vrpn_Tracker Velocity";
pub const BUTTON_TYPE_NAME: &str = "vrpn_Button Change";
pub const ANALOG_TYPE_NAME: &str = "vrpn_Analog Channel";

/// Most channels an analog message may carry.
pub const MAX_ANALOG_CHANNELS: usize = 128;

/// Longest sender or type name, excluding the terminating NUL.
pub const MAX_NAME_LEN: usize = 127;

/// Sender and type ids at or above this are not tracked.
const MAX_TABLE_ID: usize = 4096;

const POSE_PAYLOAD_LEN: usize = 8 + 3 * 8 + 4 * 8;
const VELOCITY_PAYLOAD_LEN: usize = POSE_PAYLOAD_LEN + 8;
const BUTTON_PAYLOAD_LEN: usize = 8;

/// Meaning a type code has been bound to for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    Pose,
    Velocity,
    Button,
    Analog,
    #[default]
    Unknown,
}

impl MessageKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            POSE_TYPE_NAME => MessageKind::Pose,
            VELOCITY_TYPE_NAME => MessageKind::Velocity,
            BUTTON_TYPE_NAME => MessageKind::Button,
            ANALOG_TYPE_NAME => MessageKind::Analog,
            _ => MessageKind::Unknown,
        }
    }

    pub fn type_name(self) -> Option<&'static str> {
        match self {
            MessageKind::Pose => Some(POSE_TYPE_NAME),
            MessageKind::Velocity => Some(VELOCITY_TYPE_NAME),
            MessageKind::Button => Some(BUTTON_TYPE_NAME),
            MessageKind::Analog => Some(ANALOG_TYPE_NAME),
            MessageKind::Unknown => None,
        }
    }
}

/// Fixed header fields of a relay message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayHeader {
    pub sec: u32,
    pub usec: u32,
    pub sender: u32,
    pub type_code: i32,
}

impl RelayHeader {
    pub fn new(sender: u32, type_code: i32) -> Self {
        Self {
            sender,
            type_code,
            ..Self::default()
        }
    }

    pub fn at(mut self, sec: u32, usec: u32) -> Self {
        self.sec = sec;
        self.usec = usec;
        self
    }

    /// Wire time in seconds.
    pub fn seconds(&self) -> f64 {
        f64::from(self.sec) + f64::from(self.usec) * 1e-6
    }
}

fn table_slot<T: Default + Clone>(table: &mut Vec<T>, id: usize) -> Option<&mut T> {
    if id >= MAX_TABLE_ID {
        return None;
    }
    if table.len() <= id {
        table.resize(id + 1, T::default());
    }
    table.get_mut(id)
}

/// Decodes relay messages for one connection.
///
/// With a sender filter only messages from senders whose description matches
/// it are decoded. A filter `name@host` also matches the bare `name`.
#[derive(Debug, Default)]
pub struct RelayDecoder {
    sender_filter: Option<String>,
    types: Vec<MessageKind>,
    accepted: Vec<bool>,
}

impl RelayDecoder {
    pub fn new(sender_filter: Option<String>) -> Self {
        Self {
            sender_filter,
            ..Self::default()
        }
    }

    /// Meaning currently bound to `type_code`.
    pub fn message_kind(&self, type_code: i32) -> MessageKind {
        usize::try_from(type_code)
            .ok()
            .and_then(|i| self.types.get(i).copied())
            .unwrap_or_default()
    }

    fn sender_matches(&self, name: &str) -> bool {
        match &self.sender_filter {
            None => true,
            Some(filter) => {
                let bare = filter.split('@').next().unwrap_or(filter);
                name == filter || name == bare
            }
        }
    }

    fn accepts(&self, sender: u32) -> bool {
        self.sender_filter.is_none()
            || usize::try_from(sender)
                .ok()
                .and_then(|i| self.accepted.get(i).copied())
                .unwrap_or(false)
    }

    fn describe(&mut self, header: RelayHeader, payload: &[u8]) -> CursorResult<()> {
        let name = read_name(&mut Cursor::new(payload))?;
        let Ok(id) = usize::try_from(header.sender) else {
            return Ok(());
        };
        if header.type_code == SENDER_DESCRIPTION {
            let accepted = self.sender_matches(&name);
            tracing::debug!(sender = id, name = %name, accepted, "relay sender described");
            if let Some(slot) = table_slot(&mut self.accepted, id) {
                *slot = accepted;
            }
        } else {
            let kind = MessageKind::from_name(&name);
            tracing::debug!(type_code = id, name = %name, ?kind, "relay type described");
            if let Some(slot) = table_slot(&mut self.types, id) {
                *slot = kind;
            }
        }
        Ok(())
    }

    fn forget_session(&mut self) {
        self.types.clear();
        self.accepted.clear();
    }
}

fn read_name(c: &mut Cursor<'_>) -> CursorResult<String> {
    let len = c.read_u32_be()?;
    let raw = c.take(usize::try_from(len).unwrap_or(usize::MAX))?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(raw.get(..end).unwrap_or(raw)).into_owned())
}

/// Split a framed message into its header and unpadded payload.
fn split_message(bytes: &[u8]) -> CursorResult<(RelayHeader, &[u8])> {
    let mut c = Cursor::new(bytes);
    let total = c.read_u32_be()?;
    let header = RelayHeader {
        sec: c.read_u32_be()?,
        usec: c.read_u32_be()?,
        sender: c.read_u32_be()?,
        type_code: c.read_i32_be()?,
    };
    c.skip(RELAY_HEADER_LEN - 20)?;
    let payload_len = usize::try_from(total)
        .unwrap_or(usize::MAX)
        .saturating_sub(RELAY_HEADER_LEN);
    Ok((header, c.take(payload_len)?))
}

fn read_vec3(c: &mut Cursor<'_>) -> CursorResult<DVec3> {
    Ok(DVec3::new(c.read_f64_be()?, c.read_f64_be()?, c.read_f64_be()?))
}

fn read_quat(c: &mut Cursor<'_>) -> CursorResult<DQuat> {
    let [x, y, z, w] = [c.read_f64_be()?, c.read_f64_be()?, c.read_f64_be()?, c.read_f64_be()?];
    Ok(from_xyzw(x, y, z, w))
}

fn read_sensor(c: &mut Cursor<'_>) -> CursorResult<Option<u32>> {
    let sensor = c.read_i32_be()?;
    c.skip(4)?;
    Ok(u32::try_from(sensor).ok())
}

/// Decode the payload of a non-system message into the batch.
///
/// `Ok(false)` means the payload has the wrong shape for its kind.
fn decode_payload(kind: MessageKind, payload: &[u8], batch: &mut RecordBatch) -> CursorResult<bool> {
    let mut c = Cursor::new(payload);
    match kind {
        MessageKind::Pose => {
            if payload.len() != POSE_PAYLOAD_LEN {
                return Ok(false);
            }
            let Some(sensor) = read_sensor(&mut c)? else {
                return Ok(false);
            };
            let pose = Pose::new(read_vec3(&mut c)?, read_quat(&mut c)?);
            batch.push(DeviceRecord::new(sensor, Some(FormatTag::Relay)).with_pose(pose));
        }
        MessageKind::Velocity => {
            if payload.len() != VELOCITY_PAYLOAD_LEN {
                return Ok(false);
            }
            let Some(sensor) = read_sensor(&mut c)? else {
                return Ok(false);
            };
            let linear = read_vec3(&mut c)?;
            let delta = read_quat(&mut c)?;
            let dt = c.read_f64_be()?;
            let mut record = DeviceRecord::new(sensor, Some(FormatTag::Relay));
            record.velocity = Some(WireVelocity {
                linear,
                angular: angular_velocity_from_delta(delta, dt),
            });
            batch.push(record);
        }
        MessageKind::Button => {
            if payload.len() != BUTTON_PAYLOAD_LEN {
                return Ok(false);
            }
            let Ok(button) = usize::try_from(c.read_i32_be()?) else {
                return Ok(false);
            };
            let state = c.read_i32_be()?;
            let buttons = ButtonBits::single(button, state & 1 == 1);
            batch.push(DeviceRecord::new(0, Some(FormatTag::Relay)).with_buttons(buttons));
        }
        MessageKind::Analog => {
            // The channel count travels as a double; it must agree with the
            // number of values that follow it.
            let declared = c.read_f64_be()?;
            let Some(count) = (payload.len() % 8 == 0)
                .then(|| (payload.len() / 8).checked_sub(1))
                .flatten()
                .filter(|&n| n <= MAX_ANALOG_CHANNELS)
            else {
                return Ok(false);
            };
            if u32::try_from(count).map(f64::from) != Ok(declared) {
                return Ok(false);
            }
            let mut first = 0usize;
            while first < count {
                let n = (count - first).min(MAX_RECORD_VALUATORS);
                let Ok(start) = u16::try_from(first) else {
                    return Ok(false);
                };
                let mut values = Valuators::from_slice(start, &[]);
                for _ in 0..n {
                    values.push(c.read_f64_be()?);
                }
                batch.push(DeviceRecord::new(0, Some(FormatTag::Relay)).with_valuators(values));
                first += n;
            }
        }
        MessageKind::Unknown => {}
    }
    Ok(true)
}

impl RecordDecoder for RelayDecoder {
    fn decode(
        &mut self,
        frame: Frame<'_>,
        ctx: &mut DeviceContext,
        batch: &mut RecordBatch,
    ) -> DecodeStatus {
        let (header, payload) = match split_message(frame.bytes) {
            Ok(parts) => parts,
            Err(error) => {
                tracing::trace!(device = %ctx.name, %error, "relay message cut short");
                return DecodeStatus::Truncated;
            }
        };
        ctx.wire_time = Some(header.seconds());

        let result = match header.type_code {
            SENDER_DESCRIPTION | TYPE_DESCRIPTION => self.describe(header, payload).map(|()| true),
            UDP_DESCRIPTION | LOG_DESCRIPTION => Ok(true),
            DISCONNECT => {
                tracing::debug!(device = %ctx.name, "relay peer disconnected");
                self.forget_session();
                Ok(true)
            }
            code if code < 0 => Ok(true),
            code => {
                if !self.accepts(header.sender) {
                    return DecodeStatus::Complete;
                }
                decode_payload(self.message_kind(code), payload, batch)
            }
        };
        match result {
            Ok(true) => DecodeStatus::Complete,
            Ok(false) => {
                tracing::trace!(
                    device = %ctx.name,
                    type_code = header.type_code,
                    len = payload.len(),
                    "relay payload has unexpected shape"
                );
                DecodeStatus::Truncated
            }
            Err(error) => {
                tracing::trace!(device = %ctx.name, %error, "relay payload cut short");
                DecodeStatus::Truncated
            }
        }
    }
}

/// A complete message: header, payload and padding.
pub fn encode_message(header: RelayHeader, payload: &[u8]) -> RelayResult<Vec<u8>> {
    if payload.len() > MAX_MESSAGE_PAYLOAD {
        return Err(RelayError::PayloadTooLarge { len: payload.len() });
    }
    let total = RELAY_HEADER_LEN + payload.len();
    let Ok(total_field) = u32::try_from(total) else {
        return Err(RelayError::PayloadTooLarge { len: payload.len() });
    };
    let mut w = ReportWriter::with_capacity(total + 8);
    w.write_u32_be(total_field)
        .write_u32_be(header.sec)
        .write_u32_be(header.usec)
        .write_u32_be(header.sender)
        .write_i32_be(header.type_code)
        .pad_to(8)
        .write_bytes(payload)
        .pad_to(8);
    Ok(w.into_inner())
}

fn description(header: RelayHeader, name: &str) -> RelayResult<Vec<u8>> {
    if name.len() > MAX_NAME_LEN {
        return Err(RelayError::NameTooLong { len: name.len() });
    }
    let Ok(name_field) = u32::try_from(name.len() + 1) else {
        return Err(RelayError::NameTooLong { len: name.len() });
    };
    let mut w = ReportWriter::with_capacity(name.len() + 5);
    w.write_u32_be(name_field)
        .write_bytes(name.as_bytes())
        .write_u8(0);
    encode_message(header, w.as_slice())
}

pub fn encode_sender_description(sender: u32, name: &str) -> RelayResult<Vec<u8>> {
    description(RelayHeader::new(sender, SENDER_DESCRIPTION), name)
}

/// Bind `type_code` to `name` for the rest of the session.
pub fn encode_type_description(type_code: u32, name: &str) -> RelayResult<Vec<u8>> {
    description(RelayHeader::new(type_code, TYPE_DESCRIPTION), name)
}

pub fn encode_disconnect() -> RelayResult<Vec<u8>> {
    encode_message(RelayHeader::new(0, DISCONNECT), &[])
}

pub fn pose_payload(sensor: i32, pose: &Pose) -> Vec<u8> {
    let mut w = ReportWriter::with_capacity(POSE_PAYLOAD_LEN);
    w.write_i32_be(sensor).pad_to(8);
    for v in pose.position.to_array() {
        w.write_f64_be(v);
    }
    for v in pose.orientation.to_array() {
        w.write_f64_be(v);
    }
    w.into_inner()
}

/// Velocity payload; `delta` is the rotation applied every `dt` seconds.
pub fn velocity_payload(sensor: i32, linear: DVec3, delta: DQuat, dt: f64) -> Vec<u8> {
    let mut w = ReportWriter::with_capacity(VELOCITY_PAYLOAD_LEN);
    w.write_i32_be(sensor).pad_to(8);
    for v in linear.to_array() {
        w.write_f64_be(v);
    }
    for v in delta.to_array() {
        w.write_f64_be(v);
    }
    w.write_f64_be(dt);
    w.into_inner()
}

pub fn button_payload(button: i32, pressed: bool) -> Vec<u8> {
    let mut w = ReportWriter::with_capacity(BUTTON_PAYLOAD_LEN);
    w.write_i32_be(button).write_i32_be(i32::from(pressed));
    w.into_inner()
}

pub fn analog_payload(channels: &[f64]) -> RelayResult<Vec<u8>> {
    let too_many = RelayError::TooManyChannels {
        count: channels.len(),
        max: MAX_ANALOG_CHANNELS,
    };
    if channels.len() > MAX_ANALOG_CHANNELS {
        return Err(too_many);
    }
    let Ok(count) = u32::try_from(channels.len()) else {
        return Err(too_many);
    };
    let mut w = ReportWriter::with_capacity(8 * (channels.len() + 1));
    w.write_f64_be(f64::from(count));
    for &v in channels {
        w.write_f64_be(v);
    }
    Ok(w.into_inner())
}
