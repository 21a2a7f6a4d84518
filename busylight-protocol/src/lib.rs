//! Wire protocol core for the busylight/readerboard device fleet.
//!
//! This crate implements the parts of the system that never touch a byte of
//! I/O: the RS-485 escape codec, the direct-serial and RS-485 frame
//! builders, the per-operation command encoders, and the status-query
//! response parser. Everything here is a pure function over `&[u8]` /
//! `Vec<u8>`; transport, concurrency, and device/network configuration live
//! in `busylight-dispatch`.
//!
//! # Project organisation
//!  * `busylight-protocol` - this crate: wire grammar, no I/O.
//!  * `busylight-dispatch` - network table, per-network mutex, serial
//!    transports, dispatcher.
//!  * `busylightd` - daemon binary wiring the above together.

pub mod command;
pub mod error;
pub mod escape;
pub mod frame;
pub mod model;
pub mod response;

pub use error::ProtocolError;

/// Re-exports of the types most callers need.
pub mod prelude {
    pub use crate::command::{Encoded, Operation, QueryOperation};
    pub use crate::error::ProtocolError;
    pub use crate::model::{
        BaudRate, DeviceStatus, DiscreteLedStatus, EepromKind, HardwareModel, LedSequence,
        ModelClass,
    };
}
