//! Engine error types.

use crate::source::SourceError;
use thiserror::Error;
use trackwire_devicemap::DeviceMapError;

/// Invalid device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid device map: {0}")]
    DeviceMap(#[from] DeviceMapError),
}

impl ConfigError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

/// Why a poll loop could not start or ended abnormally.
#[derive(Debug, Clone, Error)]
pub enum PollError {
    #[error("Transport failed: {0}")]
    Transport(#[from] SourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to spawn poll thread: {0}")]
    Spawn(String),

    #[error("Poll thread panicked")]
    ThreadPanicked,
}

/// Failure of a single side-channel request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("No reply within the deadline")]
    Timeout,

    #[error("Request cancelled: poll loop stopped")]
    Cancelled,

    /// The device answered with a nonzero error code.
    #[error("Device reported error status {status}")]
    Device { status: u8 },

    #[error("Failed to send request: {0}")]
    Transport(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type PollResult<T> = Result<T, PollError>;
pub type RequestResult<T> = Result<T, RequestError>;
