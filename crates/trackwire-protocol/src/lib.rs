//! Frame synchronization and record decoding for streaming tracking devices.
//!
//! The crate is I/O free: a poll loop hands it bytes, a framer from [`sync`]
//! locates record boundaries, and a decoder from [`formats`] turns each frame
//! into [`trackwire_types::DeviceRecord`]s appended to a reused
//! [`RecordBatch`].
//!
//! ```text
//! bytes -> AnyFramer::feed -> Frame -> AnyDecoder::decode -> RecordBatch
//! ```
//!
//! Malformed input never produces an error value. Framers recover from lost
//! synchronization on their own and count it; decoders report partial
//! bodies through [`DecodeStatus`]. The only fallible APIs are the message
//! builders used to talk back to devices.

#![deny(static_mut_refs)]

pub mod bits;
pub mod cursor;
pub mod decode;
pub mod error;
pub mod formats;
pub mod sync;
pub mod tokenizer;

pub use cursor::{Cursor, CursorResult, OutOfRange, ReportWriter};
pub use decode::{
    BATCH_CAPACITY, DecodeStatus, DeviceContext, RecordBatch, RecordDecoder, Reply,
};
pub use error::{CommandError, CommandResult, RelayError, RelayResult};
pub use formats::{AnyDecoder, DecoderOptions, WireFormat};
pub use sync::{
    AnyFramer, Frame, FrameKind, Framer, StationLayout, StationTable, SyncCounts, SyncState,
};
