//! Error kinds produced by the wire protocol layer.
//!
//! These correspond 1:1 to the semantic error kinds in the device
//! communication core: encoder/validation failures, frame-addressing
//! failures, and response parse failures. None of these variants carry
//! transport state — I/O errors live in `busylight_dispatch::DispatchError`.

/// Everything that can go wrong building or interpreting a command.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    /// Encoder rejected user input: an out-of-range character, a missing
    /// required field, an odd-length hex plane, or an otherwise malformed
    /// parameter.
    #[error("bad parameter: {0}")]
    BadParam(String),

    /// The requested operation isn't defined for the target hardware model.
    #[error("operation not supported for hardware model {model:?}")]
    UnsupportedForModel {
        /// The model the caller targeted.
        model: crate::model::HardwareModel,
    },

    /// A text payload contained an illegal embedded byte (`ESC` or `EOT`).
    #[error("text parameter contains illegal character(s)")]
    BadText,

    /// A direct-serial payload contained the `EOT` (`0x04`) terminator.
    #[error("payload cannot contain the EOT (0x04) terminator")]
    BadPayload,

    /// An RS-485 frame was requested with an empty target list.
    #[error("command with no target device addresses cannot be framed")]
    NoTargets,

    /// More than 63 target addresses were supplied for one RS-485 frame.
    #[error("number of target addresses ({0}) exceeds the maximum of 63")]
    TooManyTargets(usize),

    /// A target or global address fell outside `[0, 63]`.
    #[error("address {0} out of range [0, 63]")]
    AddressOutOfRange(u8),

    /// A device status-query reply did not conform to the expected grammar.
    #[error("query response could not be parsed: {0}")]
    ParseError(String),
}
