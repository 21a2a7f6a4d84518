//! Data model shared by the encoder, parser and (in `busylight-dispatch`)
//! the network/device configuration: hardware model tags, baud-rate codes,
//! EEPROM kind, discrete-LED status and the full parsed device status.

use crate::error::ProtocolError;

/// Hardware model tag. Branches encoder feasibility checks; never use open
/// inheritance for this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareModel {
    /// Busylight model 1.x, USB only.
    BusylightV1,
    /// Busylight model 2.x, USB or RS-485.
    BusylightV2,
    /// Readerboard model 3.x, RGB 64x8 matrix plus status LEDs.
    Readerboard3Rgb,
    /// Readerboard model 3.x, monochrome 64x8 matrix plus status LEDs.
    Readerboard3Mono,
}

impl HardwareModel {
    /// True for either busylight variant.
    pub fn is_busylight(self) -> bool {
        matches!(self, HardwareModel::BusylightV1 | HardwareModel::BusylightV2)
    }

    /// True for either readerboard variant.
    pub fn is_readerboard(self) -> bool {
        matches!(
            self,
            HardwareModel::Readerboard3Rgb | HardwareModel::Readerboard3Mono
        )
    }

    /// True only for the monochrome readerboard.
    pub fn is_monochrome(self) -> bool {
        matches!(self, HardwareModel::Readerboard3Mono)
    }

    /// Busylight firmware generation, or `0` for readerboards.
    pub fn busylight_version(self) -> u8 {
        match self {
            HardwareModel::BusylightV1 => 1,
            HardwareModel::BusylightV2 => 2,
            HardwareModel::Readerboard3Rgb | HardwareModel::Readerboard3Mono => 0,
        }
    }

    /// Number of bitmap planes a `Query` reply carries for this model:
    /// 1 (busylight), 2 (mono readerboard) or 4 (RGB readerboard).
    pub fn bitmap_plane_count(self) -> usize {
        match self {
            HardwareModel::BusylightV1 | HardwareModel::BusylightV2 => 1,
            HardwareModel::Readerboard3Mono => 2,
            HardwareModel::Readerboard3Rgb => 4,
        }
    }

    /// The model-class byte a device configured with this model is expected
    /// to self-report in a `Query` reply. A mismatch is a configuration
    /// warning, never a hard error.
    pub fn expected_model_class(self) -> ModelClass {
        match self {
            HardwareModel::BusylightV1 | HardwareModel::BusylightV2 => ModelClass::Busylight,
            HardwareModel::Readerboard3Mono => ModelClass::MonoReaderboard,
            HardwareModel::Readerboard3Rgb => ModelClass::ColorReaderboard,
        }
    }
}

/// The model-class byte reported by a device in a `Q` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelClass {
    /// `B` - busylight.
    Busylight,
    /// `M` - monochrome readerboard.
    MonoReaderboard,
    /// `C` - color readerboard.
    ColorReaderboard,
}

impl ModelClass {
    pub(crate) fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            b'B' => Ok(ModelClass::Busylight),
            b'M' => Ok(ModelClass::MonoReaderboard),
            b'C' => Ok(ModelClass::ColorReaderboard),
            other => Err(ProtocolError::ParseError(format!(
                "unrecognized device model class {:?}",
                other as char
            ))),
        }
    }

    /// The class byte as it appears on the wire.
    pub fn as_byte(self) -> u8 {
        match self {
            ModelClass::Busylight => b'B',
            ModelClass::MonoReaderboard => b'M',
            ModelClass::ColorReaderboard => b'C',
        }
    }

    /// Number of bitmap planes this class's `Query` reply carries. A
    /// busylight has no bitmap at all; a monochrome readerboard carries an
    /// image plane and a flash plane; a color readerboard adds green and
    /// blue planes between them.
    pub fn bitmap_plane_count(self) -> usize {
        match self {
            ModelClass::Busylight => 0,
            ModelClass::MonoReaderboard => 2,
            ModelClass::ColorReaderboard => 4,
        }
    }
}

/// EEPROM kind a device reports in its full status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EepromKind {
    /// `_` - no EEPROM.
    None,
    /// `I` - internal EEPROM.
    Internal,
    /// `X` - external EEPROM.
    External,
}

impl EepromKind {
    pub(crate) fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            b'_' => Ok(EepromKind::None),
            b'I' => Ok(EepromKind::Internal),
            b'X' => Ok(EepromKind::External),
            other => Err(ProtocolError::ParseError(format!(
                "invalid EEPROM type code {:?}",
                other as char
            ))),
        }
    }
}

/// One of the twelve baud rates the single-character speed code can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudRate(pub u32);

impl BaudRate {
    pub(crate) fn from_code(b: u8) -> Result<Self, ProtocolError> {
        let rate = match b {
            b'0' => 300,
            b'1' => 600,
            b'2' => 1200,
            b'3' => 2400,
            b'4' => 4800,
            b'5' => 9600,
            b'6' => 14400,
            b'7' => 19200,
            b'8' => 28800,
            b'9' => 31250,
            b'A' => 38400,
            b'B' => 57600,
            b'C' => 115200,
            other => {
                return Err(ProtocolError::ParseError(format!(
                    "invalid baud rate code {:?}",
                    other as char
                )))
            }
        };
        Ok(BaudRate(rate))
    }
}

/// An address in `[0, 63]` as reported by a device, or "not reported"
/// (wire sentinel `0xff`). Modeled as `Option<u8>` so the sentinel can't
/// collide with a real address.
pub type ReportedAddress = Option<u8>;

pub(crate) fn parse_reported_address(b: u8) -> ReportedAddress {
    if (b'0'..=(b'0' + 63)).contains(&b) {
        Some(b - b'0')
    } else {
        None
    }
}

/// An ordered run of LED codes driving a device's flasher or strober, with
/// a running flag and current position (`-1` meaning "none").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedSequence {
    /// Whether the sequence is currently being played.
    pub running: bool,
    /// Current position in the sequence, or `-1` for "none".
    pub position: i8,
    /// The ordered LED codes.
    pub sequence: Vec<u8>,
}

impl LedSequence {
    pub(crate) const NONE_POSITION: i8 = -1;

    /// An empty, stopped sequence.
    pub fn none() -> Self {
        LedSequence {
            running: false,
            position: Self::NONE_POSITION,
            sequence: Vec::new(),
        }
    }
}

/// Which status LEDs are lit, plus the flasher and strober sequences.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscreteLedStatus {
    /// Raw status-light codes currently on.
    pub status_lights: Vec<u8>,
    /// The flasher's running sequence.
    pub flasher: LedSequence,
    /// The strober's running sequence.
    pub strober: LedSequence,
}

/// One 64-byte column-major bitmap plane.
pub type Plane = [u8; 64];

/// Full parsed status of a device, produced by `Query`'s response parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    /// The model class the device itself reports.
    pub model_class: ModelClass,
    /// The device's own configured address, if it reported one.
    pub address: ReportedAddress,
    /// The global ("all devices") address the device is configured with.
    pub global_address: ReportedAddress,
    /// USB serial baud rate.
    pub usb_baud: BaudRate,
    /// RS-485 baud rate.
    pub rs485_baud: BaudRate,
    /// EEPROM kind.
    pub eeprom: EepromKind,
    /// Hardware revision string.
    pub hardware_revision: String,
    /// Firmware revision string.
    pub firmware_revision: String,
    /// Serial number string.
    pub serial: String,
    /// Discrete status LED state.
    pub leds: DiscreteLedStatus,
    /// 1 (busylight), 2 (mono: image, flash) or 4 (RGB: red, green, blue,
    /// flash) 64-byte planes, in wire order.
    pub planes: Vec<Plane>,
}
