//! Per-device poll loop for streaming tracking devices.
//!
//! [`DeviceLink::start`] takes a [`DeviceConfig`] and a [`ByteSource`],
//! builds the device map, the state sink and the format's framer and
//! decoder, and runs them on a dedicated thread:
//!
//! ```text
//! ByteSource::read -> framer -> decoder -> Publisher -> StateWriter::commit
//!        ^                          |
//!        |                      Reply
//!  RequestChannel <-----------------+
//! ```
//!
//! Consumers read published state through [`trackwire_atomic::StateReader`]
//! and observe the loop's lifecycle through [`LinkEvent`]s.

#![deny(static_mut_refs)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod poll;
pub mod publish;
pub mod request;
pub mod source;
pub mod velocity;

pub use cancel::CancelToken;
pub use config::{DeviceConfig, MAX_READ_BUFFER, StationConfig};
pub use error::{
    ConfigError, ConfigResult, PollError, PollResult, RequestError, RequestResult,
};
pub use poll::{DeviceLink, LinkEvent, LoopState};
pub use publish::{Publisher, default_format_tag};
pub use request::RequestChannel;
pub use source::{ByteSource, Responder, ScriptHandle, ScriptedSource, SourceError, SourceResult};
pub use velocity::VelocityEstimator;
