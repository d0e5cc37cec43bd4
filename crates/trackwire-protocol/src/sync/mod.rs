//! Frame synchronization.
//!
//! A framer turns an unstructured byte stream into record frames. Bytes are
//! pushed one at a time; when a full record has been located the framer
//! exposes it as a [`Frame`] borrowing its internal buffer until the next
//! push. Loss of synchronization is handled inside the framer: it is counted
//! and the framer scans forward, it is never reported as an error.
//!
//! | Framer | Boundary |
//! |---|---|
//! | [`KeywordFramer`] | line starting with a known ASCII tag |
//! | [`SentinelFramer`] | `\r\n0<station><filler>` preamble, configured body length |
//! | [`LengthFramer`] | big-endian total length in the header |
//! | [`DatagramFramer`] | one transport read |

mod datagram;
mod keyword;
mod length;
mod sentinel;

pub use datagram::DatagramFramer;
pub use keyword::{AsciiTag, DEFAULT_MAX_LINE, KeywordFramer};
pub use length::{LengthFramer, MAX_MESSAGE_PAYLOAD, RELAY_HEADER_LEN, padded_len};
pub use sentinel::{
    MAX_STATIONS, STATION_POSE_LEN, SentinelFramer, StationLayout, StationTable,
    station_from_char, station_to_char,
};

/// Whether a framer currently trusts its record boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    Synchronized,
    /// Scanning for the next boundary; the initial state.
    #[default]
    Resyncing,
}

/// What a frame contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Body of an ASCII line, tag stripped.
    Line(AsciiTag),
    /// Body of a station record, preamble stripped.
    Station(u8),
    /// A complete length-prefixed message including its header.
    Message,
    /// One transport read.
    Datagram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub kind: FrameKind,
    pub bytes: &'a [u8],
}

/// Recovery events since the last [`Framer::take_counts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncCounts {
    /// Transitions from synchronized to resyncing.
    pub resyncs: u64,
    /// Records skipped because their layout is not configured.
    pub skipped: u64,
}

/// A push-based stream framer.
pub trait Framer {
    /// Feed one byte; `true` when a frame is ready in [`Framer::frame`].
    fn push(&mut self, byte: u8) -> bool;

    /// The frame completed by the last `push` that returned `true`.
    fn frame(&self) -> Frame<'_>;

    fn state(&self) -> SyncState;

    /// Drop any partial record and scan for the next boundary.
    fn resync(&mut self);

    fn take_counts(&mut self) -> SyncCounts;
}

/// Push bytes from `input[*pos..]` until a frame completes.
pub fn feed<'s, F: Framer>(framer: &'s mut F, input: &[u8], pos: &mut usize) -> Option<Frame<'s>> {
    while let Some(&byte) = input.get(*pos) {
        *pos += 1;
        if framer.push(byte) {
            return Some(framer.frame());
        }
    }
    None
}

/// Runtime-selected framer.
#[derive(Debug)]
pub enum AnyFramer {
    Keyword(KeywordFramer),
    Sentinel(SentinelFramer),
    Length(LengthFramer),
    Datagram(DatagramFramer),
}

impl AnyFramer {
    /// Next frame from `input[*pos..]`, advancing `pos`.
    ///
    /// Stream framers consume bytes until a record completes or the input is
    /// exhausted; partial records carry over to the next call. The datagram
    /// framer returns the rest of `input` as one frame.
    pub fn feed<'s>(&'s mut self, input: &'s [u8], pos: &mut usize) -> Option<Frame<'s>> {
        match self {
            AnyFramer::Keyword(f) => feed(f, input, pos),
            AnyFramer::Sentinel(f) => feed(f, input, pos),
            AnyFramer::Length(f) => feed(f, input, pos),
            AnyFramer::Datagram(f) => f.take_frame(input, pos),
        }
    }

    pub fn state(&self) -> SyncState {
        match self {
            AnyFramer::Keyword(f) => f.state(),
            AnyFramer::Sentinel(f) => f.state(),
            AnyFramer::Length(f) => f.state(),
            AnyFramer::Datagram(f) => f.state(),
        }
    }

    pub fn resync(&mut self) {
        match self {
            AnyFramer::Keyword(f) => f.resync(),
            AnyFramer::Sentinel(f) => f.resync(),
            AnyFramer::Length(f) => f.resync(),
            AnyFramer::Datagram(f) => f.resync(),
        }
    }

    pub fn take_counts(&mut self) -> SyncCounts {
        match self {
            AnyFramer::Keyword(f) => f.take_counts(),
            AnyFramer::Sentinel(f) => f.take_counts(),
            AnyFramer::Length(f) => f.take_counts(),
            AnyFramer::Datagram(f) => f.take_counts(),
        }
    }
}
