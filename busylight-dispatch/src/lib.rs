//! Network configuration, serial transports, and the command dispatcher
//! that sits above `busylight_protocol`.
//!
//! This crate owns everything the wire-protocol layer deliberately avoids:
//! reading a configuration file, opening and serialising access to serial
//! ports, and grouping/dispatching a caller's target list across them.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod network;

pub use config::ConfigData;
pub use dispatcher::{Dispatcher, QueryOutcome};
pub use error::DispatchError;
pub use network::{DirectSerialTransport, Network, Rs485Transport, Transport};
