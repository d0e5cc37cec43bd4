//! Errors raised while building outgoing messages.
//!
//! Incoming data never produces these: decoders report malformed input
//! through [`crate::DecodeStatus`].

/// Hand-controller command construction errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Memory writes carry at most 16 bytes
    #[error("Memory write of {len} bytes exceeds the 16 byte limit")]
    WriteTooLong { len: usize },

    /// Addresses are 24 bits wide
    #[error("Address {address:#x} does not fit in 24 bits")]
    AddressOutOfRange { address: u32 },

    /// Reads of zero bytes are rejected by the device
    #[error("Memory read size must be non-zero")]
    EmptyRead,
}

/// Relay message construction errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Analog message with {count} channels exceeds the limit of {max}")]
    TooManyChannels { count: usize, max: usize },

    #[error("Description name of {len} bytes is too long")]
    NameTooLong { len: usize },

    #[error("Payload of {len} bytes exceeds the message limit")]
    PayloadTooLarge { len: usize },
}

pub type CommandResult<T> = Result<T, CommandError>;
pub type RelayResult<T> = Result<T, RelayError>;
