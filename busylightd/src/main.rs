//! Daemon binary: load the network/device configuration, attach every
//! configured transport, and optionally run a startup diagnostic probe.
//!
//! The HTTP façade that would sit in front of the dispatcher - one URL per
//! operation, form parameters passed straight through to the encoder - is
//! out of scope here; this binary stops at "the dispatcher is attached and
//! ready to receive requests from some caller".

use std::path::PathBuf;
use std::process::ExitCode;

use busylight_dispatch::{ConfigData, Dispatcher};
use busylight_protocol::command::QueryOperation;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "busylightd", about = "Busylight/readerboard device communication daemon")]
struct Cli {
    /// Path to the JSON network/device configuration file.
    #[arg(long)]
    config: PathBuf,

    /// After attaching, query every configured device and log its
    /// reported status, then exit.
    #[arg(long)]
    probe: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match ConfigData::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let dispatcher = Dispatcher::new(config);

    if let Err(e) = dispatcher.attach_all() {
        log::error!("fatal: {e}");
        return ExitCode::FAILURE;
    }

    if cli.probe {
        probe_devices(&dispatcher);
    } else {
        log::info!("all networks attached; ready to dispatch requests");
    }

    ExitCode::SUCCESS
}

/// Query every configured device and log what it reports, flagging any
/// mismatch between configuration and self-reported identity. Errors
/// querying one device don't stop the probe of the rest.
fn probe_devices(dispatcher: &Dispatcher) {
    for network in dispatcher.networks() {
        log::info!(
            "network {:?}: kind={:?}; open={}",
            network.id,
            network.kind,
            network.is_open()
        );
    }

    for (&addr, dev) in dispatcher.devices() {
        log::info!(
            "device address {addr}: type={:?}; net={:?} ({}; s/n={:?})",
            dev.device_type,
            dev.network_id,
            dev.description,
            dev.serial
        );

        let (errors, result) = dispatcher.dispatch_query(&[addr], QueryOperation::Query);
        if errors > 0 {
            log::warn!("device {addr}: probe query reported {errors} error(s)");
        }
        match result {
            Ok(busylight_dispatch::QueryOutcome::Status(status)) => {
                log_probed_status(addr, dev, dispatcher.global_address(), &status);
            }
            Ok(busylight_dispatch::QueryOutcome::LedStatus(_)) => {
                log::warn!("device {addr}: Query unexpectedly returned a status-only reply");
            }
            Err(e) => log::error!("device {addr}: probe query failed: {e}"),
        }
    }
}

/// Log a probed device's full status, then flag every self-reported/
/// configured mismatch as a warning: hardware model class, own address,
/// global address, and serial number. None of these abort the probe of
/// the remaining devices.
fn log_probed_status(
    addr: u8,
    dev: &busylight_dispatch::config::DeviceDescription,
    configured_global_address: u8,
    status: &busylight_protocol::model::DeviceStatus,
) {
    log::info!(
        "| model class {:?}; address {:?}; global {:?}; usb {}; rs485 {}; eeprom {:?}; hw {}; fw {}; s/n {}",
        status.model_class,
        status.address,
        status.global_address,
        status.usb_baud.0,
        status.rs485_baud.0,
        status.eeprom,
        status.hardware_revision,
        status.firmware_revision,
        status.serial,
    );
    log::info!(
        "| status lights on={:?}; flasher running={}; strober running={}",
        String::from_utf8_lossy(&status.leds.status_lights),
        status.leds.flasher.running,
        status.leds.strober.running,
    );
    for (i, plane) in status.planes.iter().enumerate() {
        log::info!("| plane #{i}: {}", hex_encode(plane));
    }

    if status.model_class != dev.device_type.expected_model_class() {
        log::warn!(
            "device {addr}: identifies as a {:?} device rev {} but configured as {:?}!",
            status.model_class,
            status.hardware_revision,
            dev.device_type,
        );
    }
    if let Some(reported) = status.address {
        if reported != addr {
            log::warn!("device {addr}: reports address {reported} but configured as {addr}!");
        }
    }
    if let Some(reported) = status.global_address {
        if reported != configured_global_address {
            log::warn!(
                "device {addr}: reports global address {reported} but configured as {configured_global_address}!"
            );
        }
    }
    if !dev.serial.is_empty() && status.serial != dev.serial {
        log::warn!(
            "device {addr}: reports serial number {:?} but configured as {:?}!",
            status.serial,
            dev.serial,
        );
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_encode_matches_known_values() {
        assert_eq!(hex_encode(&[0xab, 0x01, 0xff]), "ab01ff");
    }
}
