//! Response Parser (C3, continued).
//!
//! Turns the bytes a device sent back - up to but not including the
//! terminating newline - into a structured status value. Two grammars,
//! selected by the leading byte: the status-only reply to `QueryStatus`
//! and the full reply to `Query`.

use crate::error::ProtocolError;
use crate::model::{
    parse_reported_address, BaudRate, DeviceStatus, DiscreteLedStatus, EepromKind, LedSequence,
    ModelClass, Plane,
};

fn parse_error(msg: impl Into<String>) -> ProtocolError {
    ProtocolError::ParseError(msg.into())
}

/// Extract a `prefix`-delimited field starting at `idx`, terminated by `$`
/// or `ESC` (exclusive of the terminator). Returns the field text and the
/// index just past the terminator.
fn extract_string<'a>(
    src: &'a [u8],
    idx: usize,
    prefix: &str,
) -> Result<(&'a [u8], usize), ProtocolError> {
    if idx >= src.len() {
        return Err(parse_error("expected string field not found in data"));
    }
    let mut pos = idx;
    if !prefix.is_empty() {
        let prefix_bytes = prefix.as_bytes();
        if !src[pos..].starts_with(prefix_bytes) {
            return Err(parse_error(format!(
                "missing expected {prefix:?} for string field"
            )));
        }
        pos += prefix_bytes.len();
    }
    match src[pos..].iter().position(|&b| b == b'$' || b == 0x1b) {
        Some(end) => Ok((&src[pos..pos + end], pos + end + 1)),
        None => Err(parse_error("missing string field terminator")),
    }
}

/// Parse one flasher/strober sequence field (the text between its
/// delimiters, not including them).
fn parse_flasher_status(src: &[u8]) -> Result<LedSequence, ProtocolError> {
    if src.len() < 2 {
        return Err(parse_error("flasher sequence data too short"));
    }
    let running = match src[0] {
        b'R' => true,
        b'S' => false,
        other => {
            return Err(parse_error(format!(
                "flasher sequence data invalid: run state value {}",
                other as char
            )))
        }
    };
    if src[1] == b'_' {
        return Ok(LedSequence {
            running,
            ..LedSequence::none()
        });
    }
    if src.len() < 3 || src[2] != b'@' {
        return Err(parse_error(
            "flasher sequence data invalid: can't read position marker",
        ));
    }
    if !(b'0'..=(b'0' + 63)).contains(&src[1]) {
        return Err(parse_error(format!(
            "flasher sequence data invalid: position {} out of range",
            src[1] as char
        )));
    }
    Ok(LedSequence {
        running,
        position: (src[1] - b'0') as i8,
        sequence: src[3..].to_vec(),
    })
}

/// Parse a hex-digit bitmap plane into its 64-byte column-major form.
fn parse_bitmap_plane(hex: &[u8]) -> Result<Plane, ProtocolError> {
    if hex.len() % 2 != 0 {
        return Err(parse_error("hex string must have even number of characters"));
    }
    if hex.len() > 128 {
        return Err(parse_error("hex string too long"));
    }
    let mut plane = [0u8; 64];
    let mut i = 0;
    while i * 2 + 2 <= hex.len() {
        let chunk = std::str::from_utf8(&hex[i * 2..i * 2 + 2])
            .map_err(|_| parse_error(format!("hex byte at index {} is invalid", i * 2)))?;
        let byte = u8::from_str_radix(chunk, 16)
            .map_err(|_| parse_error(format!("hex byte at index {} ({chunk}) is invalid", i * 2)))?;
        plane[i] = byte;
        i += 1;
    }
    Ok(plane)
}

/// Parse the three discrete-LED status fields (`L...$ F...$ S...$`)
/// starting at `idx`. Returns the parsed status and the index just past
/// the strober field.
fn parse_status_leds(
    src: &[u8],
    idx: usize,
) -> Result<(DiscreteLedStatus, usize), ProtocolError> {
    let (status_lights, idx) = extract_string(src, idx, "L")
        .map_err(|e| parse_error(format!("status light string could not be extracted ({e})")))?;
    let (fstat, idx) = extract_string(src, idx, "F")
        .map_err(|e| parse_error(format!("flasher string could not be extracted ({e})")))?;
    let flasher = parse_flasher_status(fstat)
        .map_err(|e| parse_error(format!("flasher string could not be parsed ({e})")))?;
    let (sstat, idx) = extract_string(src, idx, "S")
        .map_err(|e| parse_error(format!("strober string could not be extracted ({e})")))?;
    let strober = parse_flasher_status(sstat)
        .map_err(|e| parse_error(format!("strober string could not be parsed ({e})")))?;
    Ok((
        DiscreteLedStatus {
            status_lights: status_lights.to_vec(),
            flasher,
            strober,
        },
        idx,
    ))
}

/// Parse a reply to `QueryStatus` (`?`): discrete-LED status only.
pub fn parse_query_status(input: &[u8]) -> Result<DiscreteLedStatus, ProtocolError> {
    if input.len() < 9 {
        return Err(parse_error(format!(
            "query response from hardware too short ({})",
            input.len()
        )));
    }
    let (status, idx) = parse_status_leds(input, 0)
        .map_err(|e| parse_error(format!("status query response not understood: {e}")))?;
    if idx < input.len() {
        log::warn!(
            "received {} bytes from device but only {} were expected: {:?}",
            input.len(),
            idx,
            input
        );
    }
    Ok(status)
}

/// Parse a reply to `Query` (`Q`): the full device status, including model
/// class, addresses, baud rates, EEPROM kind, revision/serial strings,
/// discrete-LED status, and 1/2/4 bitmap planes depending on model class.
pub fn parse_query(input: &[u8]) -> Result<DeviceStatus, ProtocolError> {
    if input.len() < 15 {
        return Err(parse_error(format!(
            "query response from hardware too short ({})",
            input.len()
        )));
    }
    if input[0] != b'Q' || input[2] != b'=' || input[8] != b'$' {
        return Err(parse_error(format!(
            "query response is invalid ({:?}...)",
            &input[0..9]
        )));
    }

    let model_class = ModelClass::from_byte(input[1])?;
    let address = parse_reported_address(input[3]);
    let usb_baud = BaudRate::from_code(input[4])
        .map_err(|e| parse_error(format!("usb baud rate code {} invalid ({e})", input[4] as char)))?;
    let rs485_baud = BaudRate::from_code(input[5])
        .map_err(|e| parse_error(format!("rs-485 baud rate code {} invalid ({e})", input[5] as char)))?;
    let global_address = parse_reported_address(input[6]);
    let eeprom = EepromKind::from_byte(input[7])
        .map_err(|e| parse_error(format!("EEPROM type code {} invalid ({e})", input[7] as char)))?;

    let (hw, idx) = extract_string(input, 9, "V")
        .map_err(|e| parse_error(format!("hardware version could not be parsed ({e})")))?;
    let hardware_revision = String::from_utf8_lossy(hw).into_owned();
    let (fw, idx) = extract_string(input, idx, "R")
        .map_err(|e| parse_error(format!("firmware version could not be parsed ({e})")))?;
    let firmware_revision = String::from_utf8_lossy(fw).into_owned();
    let (sn, idx) = extract_string(input, idx, "S")
        .map_err(|e| parse_error(format!("serial number could not be parsed ({e})")))?;
    let serial = String::from_utf8_lossy(sn).into_owned();

    let (leds, idx) = parse_status_leds(input, idx)
        .map_err(|e| parse_error(format!("status LEDs could not be parsed ({e})")))?;

    let mut status = DeviceStatus {
        model_class,
        address,
        global_address,
        usb_baud,
        rs485_baud,
        eeprom,
        hardware_revision,
        firmware_revision,
        serial,
        leds,
        planes: Vec::new(),
    };

    let expected_planes = model_class.bitmap_plane_count();
    let mut idx = idx;
    for plane_index in 0..expected_planes {
        // The first plane is prefixed with "M"; every plane after it runs
        // straight on from the previous plane's "$" terminator.
        let prefix = if plane_index == 0 { "M" } else { "" };
        let label = match (model_class, plane_index) {
            (_, 0) => "red/image",
            (ModelClass::ColorReaderboard, 1) => "green",
            (ModelClass::ColorReaderboard, 2) => "blue",
            _ => "flash",
        };
        let (hex, next) = extract_string(input, idx, prefix)
            .map_err(|e| parse_error(format!("{label} bitmap plane could not be extracted ({e})")))?;
        status.planes.push(
            parse_bitmap_plane(hex)
                .map_err(|e| parse_error(format!("{label} bitmap plane could not be parsed ({e})")))?,
        );
        idx = next;
    }

    if idx < input.len() {
        log::warn!(
            "read {} bytes of status from device but only {} was expected: {:?}",
            input.len(),
            idx,
            input
        );
    }
    Ok(status)
}
