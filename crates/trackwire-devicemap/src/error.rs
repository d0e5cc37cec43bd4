//! Device map construction errors.

use thiserror::Error;
use trackwire_types::FormatTag;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceMapError {
    /// Every logical device needs a name.
    #[error("Logical device {index} has an empty name")]
    EmptyName { index: usize },

    #[error("Duplicate logical device name: {0}")]
    DuplicateName(String),

    /// Two devices claim the same wire id in the same format namespace.
    #[error("Wire id {wire_id} is used twice for format {format}")]
    DuplicateWireId { format: FormatTag, wire_id: u32 },

    /// The id does not fit the dense lookup table.
    #[error("Wire id {wire_id} of '{name}' exceeds the maximum of {max}")]
    WireIdTooLarge { name: String, wire_id: u32, max: u32 },
}

pub type DeviceMapResult<T> = Result<T, DeviceMapError>;
