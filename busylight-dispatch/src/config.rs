//! Configuration data model: the network/device table a daemon loads once
//! at startup.

use std::collections::HashMap;

use busylight_protocol::model::HardwareModel;
use serde::{Deserialize, Deserializer};

use crate::error::DispatchError;

/// Transport kind for one configured network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkType {
    /// Shared RS-485 multi-drop bus.
    #[serde(
        alias = "RS485",
        alias = "rs485",
        alias = "485",
        alias = "RS-485",
        alias = "rs-485"
    )]
    Rs485,
    /// One device per USB-serial port.
    #[serde(rename = "USB", alias = "usb")]
    UsbDirect,
}

/// Either a hard-coded device path, or a directory + regular expression to
/// scan for one at attach time.
#[derive(Debug, Clone)]
pub enum PortLocator {
    /// A fixed path to the serial device.
    Fixed(String),
    /// Scan `dir` for the first entry matching `pattern`.
    Scan {
        /// The directory to scan.
        dir: String,
        /// The regular expression a candidate file name must match.
        pattern: String,
    },
}

/// One configured transport: a serial port (direct or RS-485), its baud
/// rate, and how to locate the underlying device file.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkDescription {
    /// RS-485 or direct USB-serial.
    pub connection_type: NetworkType,
    /// Hard-coded device path, empty to use `device_dir`/`device_regexp`.
    #[serde(default)]
    pub device: String,
    /// Directory to scan when `device` is empty.
    #[serde(default)]
    pub device_dir: String,
    /// Regular expression a candidate file name must match.
    #[serde(default)]
    pub device_regexp: String,
    /// Baud rate to open the port with.
    pub baud_rate: u32,
}

impl NetworkDescription {
    /// How to find this network's serial device.
    pub fn locator(&self) -> PortLocator {
        if !self.device.is_empty() {
            PortLocator::Fixed(self.device.clone())
        } else {
            PortLocator::Scan {
                dir: self.device_dir.clone(),
                pattern: self.device_regexp.clone(),
            }
        }
    }
}

fn deserialize_hardware_model<'de, D>(deserializer: D) -> Result<HardwareModel, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hardware_model(&s).map_err(serde::de::Error::custom)
}

/// Parse the tolerant set of aliases accepted for each hardware model name.
pub fn parse_hardware_model(s: &str) -> Result<HardwareModel, String> {
    match s {
        "Busylight1.x" | "Busylight1" => Ok(HardwareModel::BusylightV1),
        "Busylight2" | "Busylight2.x" | "Busylight2.0" | "Busylight2.1" | "Busylight" => {
            Ok(HardwareModel::BusylightV2)
        }
        "Readerboard3" | "Readerboard" | "Readerboard3_RGB" | "Readerboard3RGB"
        | "ReaderboardRGB" | "Readerboard_RGB" => Ok(HardwareModel::Readerboard3Rgb),
        "Readerboard3Mono" | "ReaderboardMono" | "Readerboard3_Mono" | "Readerboard3Monochrome"
        | "ReaderboardMonochrome" | "Readerboard3_Monochrome" => {
            Ok(HardwareModel::Readerboard3Mono)
        }
        other => Err(format!("unsupported hardware model value {other:?}")),
    }
}

/// One controllable device: its address, model, host network, and optional
/// identifying metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceDescription {
    /// The hardware model configured for this address. May be corrected at
    /// runtime if the device reports a different class in a query reply.
    #[serde(deserialize_with = "deserialize_hardware_model")]
    pub device_type: HardwareModel,
    /// The network id (key into `ConfigData::networks`) this device lives
    /// on.
    pub network_id: String,
    /// Free-form description, logged on probe.
    #[serde(default)]
    pub description: String,
    /// Expected serial number; a mismatch at query time is a warning only.
    #[serde(default)]
    pub serial: String,
}

/// The full network/device table plus the server-wide global address,
/// loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigData {
    /// The broadcast address in `[0,15]`: commands addressed to this value
    /// are resolved to "every configured device" by the dispatcher.
    pub global_address: u8,
    /// Controllable devices, indexed by address.
    pub devices: HashMap<u8, DeviceDescription>,
    /// Transports, indexed by network id.
    pub networks: HashMap<String, NetworkDescription>,
}

impl ConfigData {
    /// Load and validate a configuration file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, DispatchError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DispatchError::Config(format!("unable to read {path:?}: {e}")))?;
        let data: ConfigData = serde_json::from_str(&text)
            .map_err(|e| DispatchError::Config(format!("unable to understand {path:?}: {e}")))?;
        data.validate()?;
        Ok(data)
    }

    fn validate(&self) -> Result<(), DispatchError> {
        if self.global_address > 15 {
            return Err(DispatchError::Config(format!(
                "global address {} out of range [0,15]",
                self.global_address
            )));
        }
        for (addr, dev) in &self.devices {
            if *addr > 63 {
                return Err(DispatchError::Config(format!(
                    "device address {addr} out of range [0,63]"
                )));
            }
            if !self.networks.contains_key(&dev.network_id) {
                return Err(DispatchError::Config(format!(
                    "device {addr} references unknown network {:?}",
                    dev.network_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "global_address": 15,
            "devices": {
                "2": {
                    "device_type": "Readerboard3_RGB",
                    "network_id": "bus1",
                    "description": "lobby sign",
                    "serial": ""
                }
            },
            "networks": {
                "bus1": {
                    "connection_type": "rs-485",
                    "device": "/dev/ttyUSB0",
                    "baud_rate": 57600
                }
            }
        }"#
    }

    #[test]
    fn parses_well_formed_config() {
        let data: ConfigData = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(data.global_address, 15);
        assert_eq!(
            data.devices[&2].device_type,
            HardwareModel::Readerboard3Rgb
        );
        assert_eq!(data.networks["bus1"].connection_type, NetworkType::Rs485);
    }

    #[test]
    fn tolerant_hardware_model_aliases() {
        for alias in ["Readerboard", "Readerboard3RGB", "ReaderboardRGB"] {
            assert_eq!(
                parse_hardware_model(alias).unwrap(),
                HardwareModel::Readerboard3Rgb
            );
        }
        for alias in ["Busylight2", "Busylight2.0", "Busylight"] {
            assert_eq!(
                parse_hardware_model(alias).unwrap(),
                HardwareModel::BusylightV2
            );
        }
        assert!(parse_hardware_model("Toaster").is_err());
    }

    #[test]
    fn rejects_device_referencing_unknown_network() {
        let bad = sample_json().replace("\"bus1\": {", "\"bus2\": {");
        let data: ConfigData = serde_json::from_str(&bad).unwrap();
        assert!(data.validate().is_err());
    }

    #[test]
    fn locator_prefers_fixed_device_path() {
        let net = NetworkDescription {
            connection_type: NetworkType::UsbDirect,
            device: "/dev/ttyUSB3".to_string(),
            device_dir: String::new(),
            device_regexp: String::new(),
            baud_rate: 9600,
        };
        assert!(matches!(net.locator(), PortLocator::Fixed(p) if p == "/dev/ttyUSB3"));
    }
}
