//! Serial transports and the per-network synchronisation primitive.
//!
//! A `Network` owns exactly one open serial port (or none, if not yet
//! attached) behind a `Mutex`, guaranteeing that only one frame is ever
//! in flight on that wire at a time. Two transport flavors implement the
//! same capability bundle: `DirectSerialTransport` (one peer,
//! newline-terminated replies, a generous read timeout) and
//! `Rs485Transport` (shared bus, binary addressing, no receive path).

use std::io::Read;
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use regex::Regex;

use crate::config::{NetworkDescription, NetworkType, PortLocator};
use crate::error::DispatchError;

const MAX_RESPONSE_LENGTH: usize = 1024;
const PORT_BUSY_RETRY: Duration = Duration::from_millis(250);
const DIRECT_READ_TIMEOUT: Duration = Duration::from_secs(60);
const RS485_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// The capability bundle a transport exposes to the dispatcher: attach,
/// write, and (where supported) read-until-newline.
pub trait Transport: Send {
    /// Open the underlying serial port, retrying indefinitely on
    /// port-busy. Any other open failure is terminal.
    fn attach(&mut self, path: &str, baud_rate: u32) -> Result<(), DispatchError>;

    /// Close the port, if open. Idempotent.
    fn detach(&mut self);

    /// Whether the port is currently open.
    fn is_open(&self) -> bool;

    /// Write `frame` and drain the output buffer.
    fn write(&mut self, frame: &[u8]) -> Result<(), DispatchError>;

    /// Read bytes up to (but not including) a terminating newline, bounded
    /// by `MAX_RESPONSE_LENGTH` and this transport's read timeout. Returns
    /// `UnsupportedTransport` for transports with no receive path.
    fn read_until_newline(&mut self) -> Result<Vec<u8>, DispatchError>;
}

fn open_port_with_retry(
    network_id: &str,
    path: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn serialport::SerialPort>, DispatchError> {
    loop {
        match serialport::new(path, baud_rate).timeout(timeout).open() {
            Ok(port) => return Ok(port),
            Err(e) if e.kind == serialport::ErrorKind::Io(std::io::ErrorKind::WouldBlock) => {
                log::info!("network {network_id:?} device {path} is busy; retrying...");
                thread::sleep(PORT_BUSY_RETRY);
            }
            Err(e) => {
                return Err(DispatchError::Io {
                    network: network_id.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, e),
                })
            }
        }
    }
}

fn resolve_device_path(network_id: &str, locator: &PortLocator) -> Result<String, DispatchError> {
    match locator {
        PortLocator::Fixed(path) => Ok(path.clone()),
        PortLocator::Scan { dir, pattern } => {
            log::info!("network {network_id:?}: searching for available device port in {dir}...");
            let re = Regex::new(pattern).map_err(|e| {
                DispatchError::Config(format!("invalid device_regexp {pattern:?}: {e}"))
            })?;
            let entries = std::fs::read_dir(dir).map_err(|e| DispatchError::Io {
                network: network_id.to_string(),
                source: e,
            })?;
            for entry in entries {
                let entry = entry.map_err(|e| DispatchError::Io {
                    network: network_id.to_string(),
                    source: e,
                })?;
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    continue;
                }
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if re.is_match(&name) {
                    let path = Path::new(dir).join(name.as_ref());
                    return Ok(path.to_string_lossy().into_owned());
                }
            }
            Err(DispatchError::NoMatchingDevice {
                network: network_id.to_string(),
                dir: dir.clone(),
                pattern: pattern.clone(),
            })
        }
    }
}

fn read_until_newline(
    network_id: &str,
    port: &mut dyn serialport::SerialPort,
) -> Result<Vec<u8>, DispatchError> {
    let mut out = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        match port.read(&mut buf) {
            Ok(0) => {
                return Err(DispatchError::Io {
                    network: network_id.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "EOF reading from device"),
                })
            }
            Ok(n) => {
                for &b in &buf[..n] {
                    if out.len() >= MAX_RESPONSE_LENGTH {
                        return Err(DispatchError::Io {
                            network: network_id.to_string(),
                            source: std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                format!("read more than max {MAX_RESPONSE_LENGTH} bytes from device"),
                            ),
                        });
                    }
                    if b == b'\n' {
                        return Ok(out);
                    }
                    out.push(b);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                return Err(DispatchError::IoTimeout(network_id.to_string()))
            }
            Err(e) => {
                return Err(DispatchError::Io {
                    network: network_id.to_string(),
                    source: e,
                })
            }
        }
    }
}

/// One device per USB-serial port: newline-terminated replies, a 60s read
/// timeout (a missing reply is fatal on a single-peer link).
pub struct DirectSerialTransport {
    id: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl DirectSerialTransport {
    /// A detached transport for network `id`.
    pub fn new(id: impl Into<String>) -> Self {
        DirectSerialTransport {
            id: id.into(),
            port: None,
        }
    }
}

impl Transport for DirectSerialTransport {
    fn attach(&mut self, path: &str, baud_rate: u32) -> Result<(), DispatchError> {
        self.detach();
        self.port = Some(open_port_with_retry(
            &self.id,
            path,
            baud_rate,
            DIRECT_READ_TIMEOUT,
        )?);
        log::info!("network {:?}: USB direct connection opened on {path}", self.id);
        Ok(())
    }

    fn detach(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), DispatchError> {
        let port = self.port.as_deref_mut().ok_or_else(|| DispatchError::PortNotOpen(self.id.clone()))?;
        log::debug!("-> {frame:?}");
        std::io::Write::write_all(port, frame).map_err(|e| DispatchError::Io {
            network: self.id.clone(),
            source: e,
        })?;
        port.flush().map_err(|e| DispatchError::Io {
            network: self.id.clone(),
            source: e,
        })
    }

    fn read_until_newline(&mut self) -> Result<Vec<u8>, DispatchError> {
        let port = self.port.as_deref_mut().ok_or_else(|| DispatchError::PortNotOpen(self.id.clone()))?;
        read_until_newline(&self.id, port)
    }
}

/// Shared RS-485 multi-drop bus: write-only in this core (§6 - replies over
/// RS-485 are out of scope), with a 1s read timeout reserved for a future
/// receive path.
pub struct Rs485Transport {
    id: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl Rs485Transport {
    /// A detached transport for network `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Rs485Transport {
            id: id.into(),
            port: None,
        }
    }
}

impl Transport for Rs485Transport {
    fn attach(&mut self, path: &str, baud_rate: u32) -> Result<(), DispatchError> {
        self.detach();
        self.port = Some(open_port_with_retry(
            &self.id,
            path,
            baud_rate,
            RS485_READ_TIMEOUT,
        )?);
        log::info!("network {:?}: RS-485 network opened on {path}", self.id);
        Ok(())
    }

    fn detach(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), DispatchError> {
        let port = self.port.as_deref_mut().ok_or_else(|| DispatchError::PortNotOpen(self.id.clone()))?;
        std::io::Write::write_all(port, frame).map_err(|e| DispatchError::Io {
            network: self.id.clone(),
            source: e,
        })?;
        port.flush().map_err(|e| DispatchError::Io {
            network: self.id.clone(),
            source: e,
        })
    }

    fn read_until_newline(&mut self) -> Result<Vec<u8>, DispatchError> {
        Err(DispatchError::UnsupportedTransport(
            "receive not implemented for RS-485 networks".to_string(),
        ))
    }
}

/// One configured transport, with its own port-serialising mutex. The
/// mutex is acquired for the full span of a transmit (and, for
/// reply-bearing operations, the following receive); never held across two
/// unrelated groups.
pub struct Network {
    /// The configuration key this network was built from.
    pub id: String,
    /// RS-485 or direct-serial.
    pub kind: NetworkType,
    /// The broadcast address in `[0,15]`.
    pub global_address: u8,
    locator: PortLocator,
    baud_rate: u32,
    transport: Mutex<Box<dyn Transport>>,
}

impl Network {
    /// Build a detached network from its configuration entry.
    pub fn new(id: String, desc: &NetworkDescription, global_address: u8) -> Self {
        let transport: Box<dyn Transport> = match desc.connection_type {
            NetworkType::Rs485 => Box::new(Rs485Transport::new(id.clone())),
            NetworkType::UsbDirect => Box::new(DirectSerialTransport::new(id.clone())),
        };
        Network {
            id,
            kind: desc.connection_type,
            global_address,
            locator: desc.locator(),
            baud_rate: desc.baud_rate,
            transport: Mutex::new(transport),
        }
    }

    /// Build a network around an already-constructed transport, bypassing
    /// configuration-driven discovery. Useful for injecting a fake
    /// transport in tests.
    pub fn with_transport(
        id: String,
        kind: NetworkType,
        global_address: u8,
        transport: Box<dyn Transport>,
    ) -> Self {
        Network {
            id,
            kind,
            global_address,
            locator: PortLocator::Fixed(String::new()),
            baud_rate: 0,
            transport: Mutex::new(transport),
        }
    }

    /// Resolve this network's device path (fixed, or scanning its
    /// directory) and open the port, retrying on port-busy.
    pub fn attach(&self) -> Result<(), DispatchError> {
        let path = resolve_device_path(&self.id, &self.locator)?;
        let mut transport = self.transport.lock().expect("network mutex poisoned");
        transport.attach(&path, self.baud_rate)
    }

    /// Close the port, if open.
    pub fn detach(&self) {
        let mut transport = self.transport.lock().expect("network mutex poisoned");
        transport.detach();
    }

    /// Whether the port is currently open.
    pub fn is_open(&self) -> bool {
        self.transport.lock().expect("network mutex poisoned").is_open()
    }

    /// Acquire the network's mutex, write `frame`, and (if `expect_reply`)
    /// read a newline-terminated reply. Returns `None` when `expect_reply`
    /// is false.
    pub fn transmit(
        &self,
        frame: &[u8],
        expect_reply: bool,
    ) -> Result<Option<Vec<u8>>, DispatchError> {
        let mut transport = self.transport.lock().expect("network mutex poisoned");
        transport.write(frame)?;
        if !expect_reply {
            return Ok(None);
        }
        transport.read_until_newline().map(Some)
    }
}
