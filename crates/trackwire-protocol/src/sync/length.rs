use super::{Frame, FrameKind, Framer, SyncCounts, SyncState};

/// Header size on the wire: five 32-bit fields padded to 24 bytes.
pub const RELAY_HEADER_LEN: usize = 24;

/// Largest unpadded payload accepted.
pub const MAX_MESSAGE_PAYLOAD: usize = 64 * 1024;

/// Lowest type code in use (system messages are negative).
const MIN_TYPE_CODE: i32 = -5;

/// Upper bound on session type codes; anything higher is taken as garbage.
const MAX_TYPE_CODE: i32 = 4096;

/// `len` rounded up to a multiple of 8.
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(8) * 8
}

/// Frames length-prefixed relay messages.
///
/// The first header field is the big-endian total length (header plus
/// unpadded payload). A header with an implausible length or type code is
/// treated as a loss of sync; the framer then slides forward one byte at a
/// time until a plausible header appears.
#[derive(Debug)]
pub struct LengthFramer {
    buf: Vec<u8>,
    need: usize,
    header_ok: bool,
    complete: bool,
    sync: SyncState,
    counts: SyncCounts,
}

impl Default for LengthFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LengthFramer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(RELAY_HEADER_LEN + 1024),
            need: RELAY_HEADER_LEN,
            header_ok: false,
            complete: false,
            sync: SyncState::Resyncing,
            counts: SyncCounts::default(),
        }
    }

    fn lose_sync(&mut self) {
        if self.sync == SyncState::Synchronized {
            self.sync = SyncState::Resyncing;
            self.counts.resyncs += 1;
            tracing::trace!("relay framer lost sync");
        }
    }

    /// Wire size of the message described by the buffered header.
    fn message_len(&self) -> Option<usize> {
        let field = |at: usize| -> Option<[u8; 4]> { self.buf.get(at..at + 4)?.try_into().ok() };
        let total = usize::try_from(u32::from_be_bytes(field(0)?)).ok()?;
        let type_code = i32::from_be_bytes(field(16)?);
        let payload = total.checked_sub(RELAY_HEADER_LEN)?;
        if payload > MAX_MESSAGE_PAYLOAD || !(MIN_TYPE_CODE..MAX_TYPE_CODE).contains(&type_code) {
            return None;
        }
        Some(RELAY_HEADER_LEN + padded_len(payload))
    }
}

impl Framer for LengthFramer {
    fn push(&mut self, byte: u8) -> bool {
        if self.complete {
            self.buf.clear();
            self.need = RELAY_HEADER_LEN;
            self.header_ok = false;
            self.complete = false;
        }
        self.buf.push(byte);
        if self.buf.len() < self.need {
            return false;
        }
        if !self.header_ok {
            match self.message_len() {
                Some(len) => {
                    self.header_ok = true;
                    self.need = len;
                }
                None => {
                    self.lose_sync();
                    self.buf.remove(0);
                    return false;
                }
            }
            if self.buf.len() < self.need {
                return false;
            }
        }
        self.complete = true;
        self.sync = SyncState::Synchronized;
        true
    }

    fn frame(&self) -> Frame<'_> {
        Frame {
            kind: FrameKind::Message,
            bytes: &self.buf,
        }
    }

    fn state(&self) -> SyncState {
        self.sync
    }

    fn resync(&mut self) {
        self.buf.clear();
        self.need = RELAY_HEADER_LEN;
        self.header_ok = false;
        self.complete = false;
        self.lose_sync();
    }

    fn take_counts(&mut self) -> SyncCounts {
        std::mem::take(&mut self.counts)
    }
}
