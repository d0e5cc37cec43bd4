//! Decoder contract shared by every wire format.

use crate::sync::Frame;
use trackwire_types::DeviceRecord;

/// Records a batch holds without reallocating.
pub const BATCH_CAPACITY: usize = 256;

/// Outcome of decoding one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The whole frame was understood.
    Complete,
    /// The frame ended early or was malformed part way; records decoded
    /// before that point are still in the batch.
    Truncated,
    /// The frame makes no sense at this position; framing must restart.
    Resync,
}

/// Side-channel reply carried by an input report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Memory read data.
    Data {
        address: u16,
        error: u8,
        len: u8,
        data: [u8; 16],
    },
    /// Acknowledgment of an output report.
    Ack { report: u8, error: u8 },
}

impl Reply {
    /// Device error code; zero means success.
    pub fn error(&self) -> u8 {
        match self {
            Reply::Data { error, .. } | Reply::Ack { error, .. } => *error,
        }
    }

    /// Payload of a data reply; empty for acknowledgments.
    pub fn data(&self) -> &[u8] {
        match self {
            Reply::Data { len, data, .. } => data.get(..usize::from(*len)).unwrap_or(data),
            Reply::Ack { .. } => &[],
        }
    }
}

/// Reusable output of a decode call.
#[derive(Debug)]
pub struct RecordBatch {
    records: Vec<DeviceRecord>,
    reply: Option<Reply>,
}

impl Default for RecordBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordBatch {
    pub fn new() -> Self {
        Self {
            records: Vec::with_capacity(BATCH_CAPACITY),
            reply: None,
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.reply = None;
    }

    /// Append a record; records beyond [`BATCH_CAPACITY`] are dropped.
    pub fn push(&mut self, record: DeviceRecord) -> bool {
        if self.records.len() >= BATCH_CAPACITY {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [DeviceRecord] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.reply.is_none()
    }

    pub fn set_reply(&mut self, reply: Reply) {
        self.reply = Some(reply);
    }

    pub fn reply(&self) -> Option<Reply> {
        self.reply
    }

    pub fn take_reply(&mut self) -> Option<Reply> {
        self.reply.take()
    }
}

/// Per-device decode state passed explicitly into every decode call.
#[derive(Debug, Clone, Default)]
pub struct DeviceContext {
    /// Device name for log fields.
    pub name: String,
    /// Mirror every decoded pose into the opposite handedness.
    pub invert_z: bool,
    /// Last frame counter reported by the device.
    pub frame_number: Option<u64>,
    /// Last device timestamp, in seconds.
    pub wire_time: Option<f64>,
}

impl DeviceContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_invert_z(mut self, invert_z: bool) -> Self {
        self.invert_z = invert_z;
        self
    }
}

/// Decodes located frames into device records.
pub trait RecordDecoder {
    fn decode(
        &mut self,
        frame: Frame<'_>,
        ctx: &mut DeviceContext,
        batch: &mut RecordBatch,
    ) -> DecodeStatus;

    /// Forget per-stream state after a loss of sync.
    fn reset(&mut self) {}
}
