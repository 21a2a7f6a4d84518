//! The network scheduler/dispatcher (C4): resolve the global address,
//! group targets by `(network, model)`, and emit one frame per group.

use std::collections::HashMap;

use busylight_protocol::command::{Encoded, Operation, QueryOperation};
use busylight_protocol::frame::{DirectFrame, Rs485Frame};
use busylight_protocol::model::{DeviceStatus, DiscreteLedStatus, HardwareModel};
use busylight_protocol::response;

use crate::config::{ConfigData, DeviceDescription, NetworkType};
use crate::error::DispatchError;
use crate::network::Network;

/// The parsed reply to either reply-bearing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Reply to `Query`: the full device status.
    Status(DeviceStatus),
    /// Reply to `QueryStatus`: discrete-LED status only.
    LedStatus(DiscreteLedStatus),
}

/// Grouping key: a device's host network plus its hardware model. Devices
/// sharing both are encoded and framed together as one group.
type GroupKey = (String, HardwareModel);

/// Owns the network table and device table built from configuration, and
/// exposes the fire-and-forget and reply-bearing dispatcher entry points.
pub struct Dispatcher {
    networks: HashMap<String, Network>,
    devices: HashMap<u8, DeviceDescription>,
    global_address: u8,
}

impl Dispatcher {
    /// Build a (detached) dispatcher from a loaded configuration.
    pub fn new(config: ConfigData) -> Self {
        let mut networks = HashMap::with_capacity(config.networks.len());
        for (id, desc) in &config.networks {
            networks.insert(
                id.clone(),
                Network::new(id.clone(), desc, config.global_address),
            );
        }
        Dispatcher {
            networks,
            devices: config.devices,
            global_address: config.global_address,
        }
    }

    /// Build a dispatcher around an already-constructed network table,
    /// bypassing configuration-driven attach. Useful for injecting fake
    /// transports (see `Network::with_transport`) in tests.
    pub fn with_networks(
        networks: HashMap<String, Network>,
        devices: HashMap<u8, DeviceDescription>,
        global_address: u8,
    ) -> Self {
        Dispatcher {
            networks,
            devices,
            global_address,
        }
    }

    /// Attach every configured network's port. Inability to open any
    /// device matching a network's discovery pattern is fatal to startup,
    /// so the first failure aborts the whole attach pass.
    pub fn attach_all(&self) -> Result<(), DispatchError> {
        for network in self.networks.values() {
            network.attach()?;
        }
        Ok(())
    }

    /// Detach every network's port.
    pub fn detach_all(&self) {
        for network in self.networks.values() {
            network.detach();
        }
    }

    /// Iterate the configured networks, for diagnostic/probe logging.
    pub fn networks(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    /// Iterate the configured devices, for diagnostic/probe logging.
    pub fn devices(&self) -> impl Iterator<Item = (&u8, &DeviceDescription)> {
        self.devices.iter()
    }

    /// The configured "all devices" broadcast address, for diagnostic/probe
    /// logging against a device's self-reported global address.
    pub fn global_address(&self) -> u8 {
        self.global_address
    }

    /// Resolve the global address to "every configured device", then
    /// partition the (possibly expanded) target list into `(network,
    /// model)` groups, preserving caller order within each group. IDs
    /// absent from configuration are skipped with an error-count
    /// increment rather than aborting the whole request.
    fn resolve_and_group(&self, targets: &[u8]) -> (Vec<(GroupKey, Vec<u8>)>, usize) {
        let resolved: Vec<u8> = if targets.contains(&self.global_address) {
            let mut all: Vec<u8> = self.devices.keys().copied().collect();
            all.sort_unstable();
            all
        } else {
            targets.to_vec()
        };

        let mut groups: Vec<(GroupKey, Vec<u8>)> = Vec::new();
        let mut index: HashMap<GroupKey, usize> = HashMap::new();
        let mut error_count = 0usize;

        for id in resolved {
            match self.devices.get(&id) {
                Some(dev) => {
                    let key = (dev.network_id.clone(), dev.device_type);
                    match index.get(&key) {
                        Some(&i) => groups[i].1.push(id),
                        None => {
                            index.insert(key.clone(), groups.len());
                            groups.push((key, vec![id]));
                        }
                    }
                }
                None => {
                    log::warn!("dispatch: unknown device address {id}");
                    error_count += 1;
                }
            }
        }
        (groups, error_count)
    }

    fn frame_for(
        network: &Network,
        targets: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, DispatchError> {
        match network.kind {
            NetworkType::Rs485 => {
                Rs485Frame::build(targets, payload, network.global_address).map_err(Into::into)
            }
            NetworkType::UsbDirect => DirectFrame::build(payload).map_err(Into::into),
        }
    }

    /// The all-lights-off fallback ladder: when the frame builder's
    /// one-byte shortcut can't express the resolved targets (multi-target
    /// or high-address RS-485), try `Off`, then
    /// `Clear`, sending the first one that both encodes and frames
    /// successfully. This always succeeds in practice since `Off` is
    /// defined for every model, but a future model gate could change that,
    /// so both are attempted before giving up.
    fn emit_all_off(
        &self,
        network: &Network,
        model: HardwareModel,
        targets: &[u8],
        fallback: &[u8],
    ) -> Result<(), DispatchError> {
        match network.kind {
            NetworkType::UsbDirect => {
                let frame = DirectFrame::build_all_off(fallback);
                network.transmit(&frame, false)?;
                Ok(())
            }
            NetworkType::Rs485 => {
                if let Ok(frame) = Rs485Frame::build_all_off(targets) {
                    network.transmit(&frame, false)?;
                    return Ok(());
                }
                for ladder_op in [Operation::Off, Operation::Clear] {
                    let Ok(Encoded::Normal(payload)) = ladder_op.encode(model) else {
                        continue;
                    };
                    let Ok(frame) = Rs485Frame::build(targets, &payload, network.global_address)
                    else {
                        continue;
                    };
                    if network.transmit(&frame, false).is_ok() {
                        return Ok(());
                    }
                }
                Err(DispatchError::UnsupportedTransport(format!(
                    "all-off fallback ladder exhausted for targets {targets:?}"
                )))
            }
        }
    }

    fn emit_command_group(
        &self,
        network: &Network,
        model: HardwareModel,
        targets: &[u8],
        op: &Operation,
    ) -> Result<(), DispatchError> {
        match op.encode(model)? {
            Encoded::Normal(payload) => {
                let frame = Self::frame_for(network, targets, &payload)?;
                network.transmit(&frame, false)?;
                Ok(())
            }
            Encoded::AllOff { fallback } => self.emit_all_off(network, model, targets, &fallback),
        }
    }

    /// Fire-and-forget entry point: run `op` against every resolved
    /// target, returning the total number of groups (and unknown-device
    /// lookups) that failed.
    pub fn dispatch_fire_and_forget(&self, targets: &[u8], op: &Operation) -> usize {
        let (groups, mut error_count) = self.resolve_and_group(targets);
        for ((network_id, model), group_targets) in groups {
            let Some(network) = self.networks.get(&network_id) else {
                log::warn!("dispatch: group references unknown network {network_id:?}");
                error_count += 1;
                continue;
            };
            if let Err(e) = self.emit_command_group(network, model, &group_targets, op) {
                log::warn!("dispatch: group on network {network_id:?} failed: {e}");
                error_count += 1;
            }
        }
        error_count
    }

    fn emit_query_group(
        &self,
        network: &Network,
        targets: &[u8],
        query: QueryOperation,
    ) -> Result<QueryOutcome, DispatchError> {
        let payload = query.encode();
        let frame = Self::frame_for(network, targets, &payload)?;
        let reply = network
            .transmit(&frame, true)?
            .expect("reply-bearing transmit always returns Some");
        match query {
            QueryOperation::Query => response::parse_query(&reply)
                .map(QueryOutcome::Status)
                .map_err(|source| DispatchError::Parse {
                    network: network.id.clone(),
                    source,
                }),
            QueryOperation::QueryStatus => response::parse_query_status(&reply)
                .map(QueryOutcome::LedStatus)
                .map_err(|source| DispatchError::Parse {
                    network: network.id.clone(),
                    source,
                }),
        }
    }

    /// Reply-bearing entry point: run `query` against every resolved
    /// target and return the first successful parsed result, or the first
    /// error encountered if every group failed, along with the total error
    /// count across all groups (including unknown-device lookups).
    pub fn dispatch_query(
        &self,
        targets: &[u8],
        query: QueryOperation,
    ) -> (usize, Result<QueryOutcome, DispatchError>) {
        let (groups, mut error_count) = self.resolve_and_group(targets);
        let mut first_result: Option<Result<QueryOutcome, DispatchError>> = None;

        for ((network_id, _model), group_targets) in groups {
            let Some(network) = self.networks.get(&network_id) else {
                error_count += 1;
                continue;
            };
            let outcome = self.emit_query_group(network, &group_targets, query);
            match &outcome {
                Ok(_) => {
                    if first_result.is_none() || matches!(first_result, Some(Err(_))) {
                        first_result = Some(outcome);
                    }
                }
                Err(e) => {
                    log::warn!("dispatch: query group on network {network_id:?} failed: {e}");
                    error_count += 1;
                    if first_result.is_none() {
                        first_result = Some(outcome);
                    }
                }
            }
        }

        let result = first_result.unwrap_or_else(|| {
            Err(DispatchError::UnsupportedTransport(
                "no target resolved to any configured device".to_string(),
            ))
        });
        (error_count, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkDescription;
    use std::collections::HashMap;

    fn make_config() -> ConfigData {
        let mut networks = HashMap::new();
        networks.insert(
            "bus1".to_string(),
            NetworkDescription {
                connection_type: NetworkType::Rs485,
                device: "/dev/ttyUSB0".to_string(),
                device_dir: String::new(),
                device_regexp: String::new(),
                baud_rate: 57600,
            },
        );
        networks.insert(
            "usb1".to_string(),
            NetworkDescription {
                connection_type: NetworkType::UsbDirect,
                device: "/dev/ttyUSB1".to_string(),
                device_dir: String::new(),
                device_regexp: String::new(),
                baud_rate: 9600,
            },
        );

        let mut devices = HashMap::new();
        devices.insert(
            2,
            DeviceDescription {
                device_type: HardwareModel::Readerboard3Rgb,
                network_id: "bus1".to_string(),
                description: "bus1 device 2".to_string(),
                serial: String::new(),
            },
        );
        devices.insert(
            5,
            DeviceDescription {
                device_type: HardwareModel::Readerboard3Rgb,
                network_id: "bus1".to_string(),
                description: "bus1 device 5".to_string(),
                serial: String::new(),
            },
        );
        devices.insert(
            40,
            DeviceDescription {
                device_type: HardwareModel::BusylightV2,
                network_id: "bus1".to_string(),
                description: "bus1 busylight".to_string(),
                serial: String::new(),
            },
        );
        devices.insert(
            1,
            DeviceDescription {
                device_type: HardwareModel::Readerboard3Mono,
                network_id: "usb1".to_string(),
                description: "usb1 device".to_string(),
                serial: String::new(),
            },
        );

        ConfigData {
            global_address: 15,
            devices,
            networks,
        }
    }

    // Grouping is pure set-partitioning: concatenating the per-group
    // target lists reproduces the input with per-group order preserved.
    #[test]
    fn property_grouping_preserves_all_targets_in_order() {
        let dispatcher = Dispatcher::new(make_config());
        let (groups, error_count) = dispatcher.resolve_and_group(&[2, 40, 5, 1]);
        assert_eq!(error_count, 0);

        let bus1_rgb_group = groups
            .iter()
            .find(|(key, _)| key.0 == "bus1" && key.1 == HardwareModel::Readerboard3Rgb)
            .unwrap();
        assert_eq!(bus1_rgb_group.1, vec![2, 5]);

        let total: usize = groups.iter().map(|(_, t)| t.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn unknown_device_increments_error_count_without_aborting() {
        let dispatcher = Dispatcher::new(make_config());
        let (groups, error_count) = dispatcher.resolve_and_group(&[2, 99]);
        assert_eq!(error_count, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1, vec![2]);
    }

    #[test]
    fn global_address_expands_to_every_device() {
        let dispatcher = Dispatcher::new(make_config());
        let (groups, error_count) = dispatcher.resolve_and_group(&[15]);
        assert_eq!(error_count, 0);
        let total: usize = groups.iter().map(|(_, t)| t.len()).sum();
        assert_eq!(total, 4);
    }

    struct RecordingTransport {
        open: bool,
        written: std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>>,
    }

    impl RecordingTransport {
        fn new() -> (Self, std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>>) {
            let written = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
            (
                RecordingTransport {
                    open: true,
                    written: written.clone(),
                },
                written,
            )
        }
    }

    impl crate::network::Transport for RecordingTransport {
        fn attach(&mut self, _path: &str, _baud_rate: u32) -> Result<(), DispatchError> {
            self.open = true;
            Ok(())
        }

        fn detach(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn write(&mut self, frame: &[u8]) -> Result<(), DispatchError> {
            self.written.lock().unwrap().push(frame.to_vec());
            Ok(())
        }

        fn read_until_newline(&mut self) -> Result<Vec<u8>, DispatchError> {
            Err(DispatchError::UnsupportedTransport("no reply queued".to_string()))
        }
    }

    // Exercises the legacy multi-device all-off fallback ladder: a
    // multi-target RS-485 group can't use the one-byte shortcut, so the
    // ladder falls back to the normally-framed Off command (tried before
    // Clear, and Off always succeeds, so Clear is never reached here).
    #[test]
    fn all_off_fallback_ladder_uses_off_for_multi_target_rs485() {
        let dispatcher = Dispatcher::new(make_config());
        let (transport, written) = RecordingTransport::new();
        let network =
            Network::with_transport("bus1".to_string(), NetworkType::Rs485, 15, Box::new(transport));

        dispatcher
            .emit_all_off(&network, HardwareModel::Readerboard3Rgb, &[2, 5], b"C\x04X")
            .unwrap();

        let Encoded::Normal(off_payload) =
            Operation::Off.encode(HardwareModel::Readerboard3Rgb).unwrap()
        else {
            panic!("Off always encodes normally");
        };
        let expected_frame = Rs485Frame::build(&[2, 5], &off_payload, 15).unwrap();

        let log = written.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0], expected_frame);
    }

    #[test]
    fn all_off_single_rs485_target_uses_shortcut_without_ladder() {
        let dispatcher = Dispatcher::new(make_config());
        let (transport, written) = RecordingTransport::new();
        let network =
            Network::with_transport("bus1".to_string(), NetworkType::Rs485, 15, Box::new(transport));

        dispatcher
            .emit_all_off(&network, HardwareModel::Readerboard3Rgb, &[2], b"C\x04X")
            .unwrap();

        let log = written.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0], vec![0x82]);
    }
}
