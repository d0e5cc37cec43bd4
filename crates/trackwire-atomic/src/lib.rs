//! # trackwire-atomic
//!
//! Publication primitives shared between a device poll thread and its
//! consumers.
//!
//! - [`sink`]: a single writer stages tracker, button and valuator state and
//!   commits it as one generation; readers copy whole generations, so a
//!   snapshot never mixes values from two commits
//! - [`counters`]: relaxed atomic counters for stream health (records,
//!   resyncs, truncated bodies, unmapped ids, commits, bytes)
//!
//! ```rust
//! use trackwire_atomic::{StateFrame, state_sink};
//! use trackwire_types::TrackerSample;
//!
//! let (mut writer, reader) = state_sink(2, 4, 1);
//! writer.set_tracker_state(1, TrackerSample::default());
//! writer.set_button_state(3, true);
//! writer.commit();
//!
//! let mut frame = StateFrame::new(0, 0, 0);
//! reader.snapshot_into(&mut frame);
//! assert_eq!(frame.generation, 1);
//! assert!(frame.buttons[3]);
//! ```

#![deny(static_mut_refs)]

pub mod counters;
pub mod sink;

pub use counters::{StreamCounters, StreamSnapshot};
pub use sink::{StateFrame, StateReader, StateWriter, state_sink};
