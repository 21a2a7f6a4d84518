//! Error kinds produced above the wire-protocol layer: configuration and
//! transport attach/transmit/receive failures. Unknown device/network
//! lookups are per-target warnings with an error-count increment (see
//! `dispatcher::Dispatcher::resolve_and_group`), not typed errors.

/// Everything that can go wrong dispatching a command or attaching a
/// network.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The wire-protocol layer rejected an encode or frame-build request.
    #[error(transparent)]
    Protocol(#[from] busylight_protocol::ProtocolError),

    /// A network's transport doesn't support an operation its caller
    /// asked for (currently: receiving replies over RS-485).
    #[error("{0}")]
    UnsupportedTransport(String),

    /// The port is not attached (detached, or attach never succeeded).
    #[error("network {0:?} port is not open")]
    PortNotOpen(String),

    /// A read or write on an attached port failed.
    #[error("I/O error on network {network:?}: {source}")]
    Io {
        /// The network the error occurred on.
        network: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A blocking read exceeded its configured timeout.
    #[error("timed out waiting for a reply on network {0:?}")]
    IoTimeout(String),

    /// A received reply could not be parsed.
    #[error("device on network {network:?} sent an unparseable reply: {source}")]
    Parse {
        /// The network the reply was received on.
        network: String,
        /// The underlying parse error.
        #[source]
        source: busylight_protocol::ProtocolError,
    },

    /// Configuration file could not be read or deserialized.
    #[error("configuration error: {0}")]
    Config(String),

    /// Device discovery (directory scan) found no matching port.
    #[error("network {network:?}: unable to open any device matching /{pattern}/ in {dir}")]
    NoMatchingDevice {
        /// The network the scan was for.
        network: String,
        /// The directory scanned.
        dir: String,
        /// The regular expression used.
        pattern: String,
    },
}
