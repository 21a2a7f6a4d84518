//! Integration tests exercising the dispatcher's public entry points end
//! to end, against fake in-memory transports standing in for real serial
//! ports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use busylight_dispatch::config::{DeviceDescription, NetworkType};
use busylight_dispatch::{DispatchError, Dispatcher, Network, Transport};
use busylight_protocol::model::HardwareModel;

#[derive(Clone)]
struct SharedLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl SharedLog {
    fn new() -> Self {
        SharedLog(Arc::new(Mutex::new(Vec::new())))
    }

    fn frames(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().clone()
    }
}

struct FakeTransport {
    open: bool,
    log: SharedLog,
    reply: Option<Vec<u8>>,
}

impl Transport for FakeTransport {
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
        self.log.0.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    fn read_until_newline(&mut self) -> Result<Vec<u8>, DispatchError> {
        self.reply
            .clone()
            .ok_or_else(|| DispatchError::UnsupportedTransport("no reply queued".to_string()))
    }
}

fn one_network_dispatcher(
    model: HardwareModel,
    reply: Option<Vec<u8>>,
) -> (Dispatcher, SharedLog) {
    let log = SharedLog::new();
    let transport = FakeTransport {
        open: true,
        log: log.clone(),
        reply,
    };
    let network = Network::with_transport("bus1".to_string(), NetworkType::Rs485, 15, Box::new(transport));

    let mut networks = HashMap::new();
    networks.insert("bus1".to_string(), network);

    let mut devices = HashMap::new();
    devices.insert(
        2,
        DeviceDescription {
            device_type: model,
            network_id: "bus1".to_string(),
            description: String::new(),
            serial: String::new(),
        },
    );
    devices.insert(
        3,
        DeviceDescription {
            device_type: model,
            network_id: "bus1".to_string(),
            description: String::new(),
            serial: String::new(),
        },
    );

    (Dispatcher::with_networks(networks, devices, 15), log)
}

#[test]
fn fire_and_forget_sends_one_frame_per_group() {
    let (dispatcher, log) = one_network_dispatcher(HardwareModel::Readerboard3Rgb, None);
    let errors = dispatcher.dispatch_fire_and_forget(
        &[2, 3],
        &busylight_protocol::command::Operation::Clear,
    );
    assert_eq!(errors, 0);
    assert_eq!(log.frames().len(), 1);
    assert_eq!(log.frames()[0], vec![0xbf, 2, 2, 3, b'C']);
}

#[test]
fn fire_and_forget_counts_unknown_targets_without_aborting() {
    let (dispatcher, log) = one_network_dispatcher(HardwareModel::Readerboard3Rgb, None);
    let errors = dispatcher.dispatch_fire_and_forget(
        &[2, 99],
        &busylight_protocol::command::Operation::Off,
    );
    assert_eq!(errors, 1);
    assert_eq!(log.frames().len(), 1);
}

#[test]
fn query_status_round_trips_through_fake_transport() {
    let reply = b"LA$FS_$SS_$".to_vec();
    let (dispatcher, _log) = one_network_dispatcher(HardwareModel::Readerboard3Rgb, Some(reply));

    let (errors, result) = dispatcher
        .dispatch_query(&[2], busylight_protocol::command::QueryOperation::QueryStatus);
    assert_eq!(errors, 0);
    let outcome = result.unwrap();
    match outcome {
        busylight_dispatch::QueryOutcome::LedStatus(status) => {
            assert_eq!(status.status_lights, b"A");
        }
        other => panic!("expected LedStatus, got {other:?}"),
    }
}

#[test]
fn query_propagates_parse_error_without_panicking() {
    let (dispatcher, _log) = one_network_dispatcher(HardwareModel::Readerboard3Rgb, Some(b"garbage".to_vec()));
    let (errors, result) = dispatcher
        .dispatch_query(&[2], busylight_protocol::command::QueryOperation::QueryStatus);
    assert_eq!(errors, 1);
    assert!(result.is_err());
}
