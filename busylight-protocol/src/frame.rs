//! Frame Builder (C2).
//!
//! Wraps an already-encoded command payload with the transport-appropriate
//! addressing header and terminator. Two variants: direct-serial (one peer,
//! addresses ignored) and RS-485 (multi-drop, addressed).

use crate::error::ProtocolError;
use crate::escape::escape_485;

/// `EOT`, the direct-serial frame terminator and the one byte a payload may
/// never contain.
pub const EOT: u8 = 0x04;

/// Direct-serial frame builder: one device per port, frames are
/// `EOT, payload..., EOT`.
pub struct DirectFrame;

impl DirectFrame {
    /// Wrap `payload` for transmission. Fails with `BadPayload` if the
    /// payload itself contains an `EOT` byte.
    pub fn build(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if payload.contains(&EOT) {
            return Err(ProtocolError::BadPayload);
        }
        let mut out = Vec::with_capacity(payload.len() + 2);
        out.push(EOT);
        out.extend_from_slice(payload);
        out.push(EOT);
        Ok(out)
    }

    /// Build the all-lights-off shortcut frame for a direct-serial target.
    ///
    /// Unlike `build`, this only appends the trailing `EOT` - no leading
    /// `EOT` and no rejection of an embedded one. The fallback payload for
    /// a readerboard is itself two back-to-back commands (`Clear`, `Off`)
    /// separated by an `EOT`, and the device is expected to treat that
    /// embedded terminator as ending the first and starting the second.
    /// This never fails.
    pub fn build_all_off(fallback: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(fallback.len() + 1);
        out.extend_from_slice(fallback);
        out.push(EOT);
        out
    }
}

/// RS-485 multi-drop frame builder: a binary addressing header followed by
/// the escaped payload.
pub struct Rs485Frame;

impl Rs485Frame {
    /// Wrap `payload` for the given (deduplicated, caller-ordered) target
    /// list `targets`, using `global_address` (`[0, 15]`) when a multi-target
    /// header is required.
    ///
    /// - single target `< 16`: header `1001aaaa`, then `Escape485(payload)`.
    /// - otherwise: header `1011gggg`, then `00nnnnnn` (n = |targets|, n <=
    ///   63), then `n` bytes `00aaaaaa`, then `Escape485(payload)`.
    pub fn build(
        targets: &[u8],
        payload: &[u8],
        global_address: u8,
    ) -> Result<Vec<u8>, ProtocolError> {
        if targets.is_empty() {
            return Err(ProtocolError::NoTargets);
        }
        for &a in targets {
            if a > 63 {
                return Err(ProtocolError::AddressOutOfRange(a));
            }
        }

        let escaped = escape_485(payload);

        if targets.len() == 1 && targets[0] < 16 {
            let mut out = Vec::with_capacity(1 + escaped.len());
            out.push(0x90 | (targets[0] & 0x0f));
            out.extend_from_slice(&escaped);
            return Ok(out);
        }

        if targets.len() > 63 {
            return Err(ProtocolError::TooManyTargets(targets.len()));
        }

        let mut out = Vec::with_capacity(2 + targets.len() + escaped.len());
        out.push(0xb0 | (global_address & 0x0f));
        out.push(targets.len() as u8 & 0x3f);
        for &a in targets {
            out.push(a & 0x3f);
        }
        out.extend_from_slice(&escaped);
        Ok(out)
    }

    /// Build the all-lights-off shortcut: the single-byte `1000aaaa` frame,
    /// valid only for a single target with address `< 16`. Multi-target (or
    /// high-address) all-off cannot be expressed as one RS-485 frame; the
    /// dispatcher's fallback ladder handles that case by falling back to
    /// the normal framing of `Off`/`Clear`.
    pub fn build_all_off(targets: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if targets.len() == 1 && targets[0] < 16 {
            Ok(vec![0x80 | (targets[0] & 0x0f)])
        } else if targets.is_empty() {
            Err(ProtocolError::NoTargets)
        } else {
            Err(ProtocolError::BadParam(
                "all-off shortcut cannot target more than one device or devices with address > 15"
                    .to_string(),
            ))
        }
    }
}
