//! Command Encoders (C3).
//!
//! Each encoder is a pure function `(params, model) -> Encoded`, with no
//! I/O, taking the raw per-operation parameters a caller would pass
//! straight through from a request. Feasibility depends on the hardware
//! model; unsupported combinations return `UnsupportedForModel`.

use crate::error::ProtocolError;
use crate::model::HardwareModel;

/// `ESC`, the text-payload terminator.
const ESC: u8 = 0x1b;
/// `EOT`, disallowed inside a text payload (it terminates a direct-serial
/// frame).
const EOT: u8 = 0x04;

/// The bytes an encoder produced, or a request to use the frame builder's
/// all-lights-off shortcut.
///
/// An explicit two-arm return, rather than an `0xff`-prefix sentinel byte,
/// keeps the "use the all-off shortcut" request out of the ordinary
/// payload bytes entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    /// Ordinary command bytes, to be wrapped by the normal frame builder.
    Normal(Vec<u8>),
    /// Use the frame builder's one-byte all-off shortcut; if that can't be
    /// expressed for the resolved targets, send `fallback` through the
    /// normal frame builder instead (and if that also fails, the
    /// dispatcher's `Off`/`Clear` fallback ladder takes over).
    AllOff {
        /// The fallback payload (not yet framed).
        fallback: Vec<u8>,
    },
}

/// Raw parameters for `Graph`.
#[derive(Debug, Clone, Default)]
pub struct GraphParams {
    /// Histogram value in `[0, 8]` (clamped); ignored if `colors` is set.
    pub value: Option<i32>,
    /// Eight characters in `['0', '?']`, one per column, overriding `value`.
    pub colors: Option<String>,
}

/// Raw parameters for `Bitmap`.
#[derive(Debug, Clone, Default)]
pub struct BitmapParams {
    /// Raw `merge` form value (`None` = absent).
    pub merge: Option<String>,
    /// Single-character position code, or `"~"`.
    pub pos: String,
    /// Single-character transition code (defaults to `.`).
    pub trans: Option<String>,
    /// Hex-digit planes separated by `$`, e.g. `"12345678$...$...$...$"`.
    pub image: String,
}

/// Raw parameters for `Text`.
#[derive(Debug, Clone, Default)]
pub struct TextParams {
    /// Raw `merge` form value.
    pub merge: Option<String>,
    /// Single-character alignment code (defaults to `<`).
    pub align: Option<String>,
    /// Single-character transition code (defaults to `.`).
    pub trans: Option<String>,
    /// The text itself (8-bit clean; codepoints >= 256 are dropped).
    pub text: String,
}

/// Raw parameters for `Scroll`.
#[derive(Debug, Clone, Default)]
pub struct ScrollParams {
    /// Raw `loop` form value.
    pub loop_flag: Option<String>,
    /// The text to scroll.
    pub text: String,
}

/// An operation together with its raw parameters, ready to be encoded for a
/// resolved hardware model.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Turn all lights (status LEDs and matrix) off.
    AllLightsOff,
    /// Clear the display matrix (readerboard only).
    Clear,
    /// Turn off the status LEDs.
    Off,
    /// Run the device's test pattern.
    Test,
    /// Set the current drawing color.
    Color {
        /// Raw `color` form value (`None` = absent, defaults to `'1'`).
        color: Option<String>,
    },
    /// Select a font by index.
    Font {
        /// Raw `idx` form value, a single digit `['0', '9']`.
        idx: String,
    },
    /// Reposition the text cursor.
    Move {
        /// Raw `pos` form value.
        pos: String,
    },
    /// Plot a histogram data point.
    Graph(GraphParams),
    /// Display a bitmap image.
    Bitmap(BitmapParams),
    /// Display a text message.
    Text(TextParams),
    /// Scroll a text message across the display.
    Scroll(ScrollParams),
    /// Set a static pattern on the status LEDs.
    Light {
        /// Raw `l` form value: a string of LED codes.
        leds: String,
    },
    /// Set a flash pattern on the status LEDs.
    Flash {
        /// Raw `l` form value.
        leds: String,
    },
    /// Set a strobe pattern on the status LEDs.
    Strobe {
        /// Raw `l` form value.
        leds: String,
    },
}

impl Operation {
    /// Encode this operation for the given hardware model.
    pub fn encode(&self, model: HardwareModel) -> Result<Encoded, ProtocolError> {
        match self {
            Operation::AllLightsOff => all_lights_off(model),
            Operation::Clear => clear(model).map(Encoded::Normal),
            Operation::Off => off(model).map(Encoded::Normal),
            Operation::Test => test(model).map(Encoded::Normal),
            Operation::Color { color } => {
                color_cmd(color.as_deref(), model).map(Encoded::Normal)
            }
            Operation::Font { idx } => font(idx, model).map(Encoded::Normal),
            Operation::Move { pos } => move_cmd(pos, model).map(Encoded::Normal),
            Operation::Graph(params) => graph(params, model).map(Encoded::Normal),
            Operation::Bitmap(params) => bitmap(params, model).map(Encoded::Normal),
            Operation::Text(params) => text_cmd(params, model).map(Encoded::Normal),
            Operation::Scroll(params) => scroll(params, model).map(Encoded::Normal),
            Operation::Light { leds } => light(leds, model),
            Operation::Flash { leds } => flash(leds).map(Encoded::Normal),
            Operation::Strobe { leds } => strobe(leds).map(Encoded::Normal),
        }
    }
}

/// The two reply-bearing operations, handled distinctly from `Operation`
/// because they round-trip through `response::parse_query`/
/// `response::parse_query_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperation {
    /// Full status query (`Q`).
    Query,
    /// Discrete-LED-only status query (`?`).
    QueryStatus,
}

impl QueryOperation {
    /// The single byte sent to request this query. Always succeeds; query
    /// encoding has no model-dependent feasibility check.
    pub fn encode(self) -> Vec<u8> {
        match self {
            QueryOperation::Query => vec![b'Q'],
            QueryOperation::QueryStatus => vec![b'?'],
        }
    }
}

/// Resolve a boolean form parameter: absent -> `false`; present-empty,
/// `"true"`, `"yes"` or `"on"` -> `true`; anything else -> `false`.
pub fn bool_param(raw: Option<&str>) -> bool {
    matches!(raw, Some("") | Some("true") | Some("yes") | Some("on"))
}

fn require_single_char(s: &str, what: &str) -> Result<u8, ProtocolError> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c as u8),
        _ => Err(ProtocolError::BadParam(format!(
            "{what} must be a single ASCII character"
        ))),
    }
}

/// Validate a position code: a single character in `['0', 'o']` or the
/// literal `~` ("don't care"). Returns the byte to emit as-is.
pub fn position_param(raw: &str) -> Result<u8, ProtocolError> {
    let b = require_single_char(raw, "position")?;
    if b == b'~' || (b'0'..=b'o').contains(&b) {
        Ok(b)
    } else {
        Err(ProtocolError::BadParam(format!(
            "position {raw:?} out of range ['0','o'] or '~'"
        )))
    }
}

/// Validate an LED code list: each byte must be in `[0x20, 0x7f]` and must
/// not be `'$'`. Returns the list with the `'$'` terminator appended.
pub fn led_list(raw: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(raw.len() + 1);
    for (i, ch) in raw.chars().enumerate() {
        let b = ch as u32;
        if !(0x20..=0x7f).contains(&b) {
            return Err(ProtocolError::BadParam(format!(
                "LED #{i} id {b} out of range [32,127]"
            )));
        }
        if b == u32::from(b'$') {
            return Err(ProtocolError::BadParam(format!(
                "LED #{i} id not allowed to be '$'"
            )));
        }
        out.push(b as u8);
    }
    out.push(b'$');
    Ok(out)
}

/// Validate and encode a text payload: 8-bit clean, codepoints `>= 256`
/// dropped, embedded `ESC`/`EOT` rejected, terminated with `ESC`.
pub fn text_param(raw: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(raw.len() + 1);
    for ch in raw.chars() {
        let cp = ch as u32;
        if cp == u32::from(ESC) || cp == u32::from(EOT) {
            return Err(ProtocolError::BadText);
        }
        if cp <= 255 {
            out.push(cp as u8);
        }
    }
    out.push(ESC);
    Ok(out)
}

fn all_lights_off(model: HardwareModel) -> Result<Encoded, ProtocolError> {
    let fallback = if model.is_busylight() {
        vec![b'X']
    } else {
        let mut v = vec![b'C', EOT];
        v.push(b'X');
        v
    };
    Ok(Encoded::AllOff { fallback })
}

fn clear(model: HardwareModel) -> Result<Vec<u8>, ProtocolError> {
    if !model.is_readerboard() {
        return Err(ProtocolError::UnsupportedForModel { model });
    }
    Ok(vec![b'C'])
}

fn off(_model: HardwareModel) -> Result<Vec<u8>, ProtocolError> {
    Ok(vec![b'X'])
}

fn test(model: HardwareModel) -> Result<Vec<u8>, ProtocolError> {
    if model.is_readerboard() || model.busylight_version() > 1 {
        Ok(vec![b'%'])
    } else {
        Err(ProtocolError::UnsupportedForModel { model })
    }
}

fn color_cmd(raw: Option<&str>, model: HardwareModel) -> Result<Vec<u8>, ProtocolError> {
    if !model.is_readerboard() {
        return Err(ProtocolError::UnsupportedForModel { model });
    }
    let color = match raw {
        None | Some("") => b'1',
        Some(s) => require_single_char(s, "color code")?,
    };
    if !(b'0'..=b'?').contains(&color) {
        return Err(ProtocolError::BadParam(format!(
            "invalid color code {:?}",
            color as char
        )));
    }
    Ok(vec![b'K', color])
}

fn font(raw: &str, model: HardwareModel) -> Result<Vec<u8>, ProtocolError> {
    if !model.is_readerboard() {
        return Err(ProtocolError::UnsupportedForModel { model });
    }
    let digit = require_single_char(raw, "font index")?;
    if !digit.is_ascii_digit() {
        return Err(ProtocolError::BadParam(format!(
            "font index {raw:?} out of range [0,9]"
        )));
    }
    Ok(vec![b'A', digit])
}

fn move_cmd(raw: &str, model: HardwareModel) -> Result<Vec<u8>, ProtocolError> {
    if !model.is_readerboard() {
        return Err(ProtocolError::UnsupportedForModel { model });
    }
    Ok(vec![b'@', position_param(raw)?])
}

fn graph(params: &GraphParams, model: HardwareModel) -> Result<Vec<u8>, ProtocolError> {
    if !model.is_readerboard() {
        return Err(ProtocolError::UnsupportedForModel { model });
    }
    if let Some(colors) = &params.colors {
        if colors.chars().count() != 8 {
            return Err(ProtocolError::BadParam(
                "colors parameter requires eight values".to_string(),
            ));
        }
        let mut out = vec![b'H', b'K'];
        for (i, ch) in colors.chars().enumerate() {
            let b = ch as u32;
            if !(u32::from(b'0')..=u32::from(b'?')).contains(&b) {
                return Err(ProtocolError::BadParam(format!(
                    "colors parameter value #{i} {ch:?} out of range"
                )));
            }
            out.push(b as u8);
        }
        return Ok(out);
    }
    let value = params.value.unwrap_or(0).clamp(0, 8);
    Ok(vec![b'H', (value as u8) + b'0'])
}

fn bitmap(params: &BitmapParams, model: HardwareModel) -> Result<Vec<u8>, ProtocolError> {
    if !model.is_readerboard() {
        return Err(ProtocolError::UnsupportedForModel { model });
    }
    let merge = if bool_param(params.merge.as_deref()) {
        b'M'
    } else {
        b'.'
    };
    let trans = match params.trans.as_deref() {
        None | Some("") => b'.',
        Some(s) => require_single_char(s, "transition code")?,
    };
    let pos = position_param(&params.pos)?;

    // The caller delimits planes *between* them with '$' - the final plane
    // has no trailing separator in `image` (the closing '$' appended below
    // ends the whole command, not the last plane). So N planes need N-1
    // separators.
    let expected_planes = model.bitmap_plane_count();
    let expected_separators = expected_planes.saturating_sub(1);
    let mut plane_count = 0usize;
    let mut plane_start = 0usize;
    for (i, ch) in params.image.char_indices() {
        if ch == '$' {
            let plane_len = i - plane_start;
            if plane_len % 2 != 0 {
                return Err(ProtocolError::BadParam(format!(
                    "bitplane #{plane_count} is not an even number of hex digits"
                )));
            }
            plane_count += 1;
            plane_start = i + 1;
            if plane_count > expected_separators {
                return Err(ProtocolError::BadParam(
                    "too many color planes or separators".to_string(),
                ));
            }
        } else if !ch.is_ascii_hexdigit() {
            return Err(ProtocolError::BadParam(format!(
                "invalid hex character {ch:?} in bitplane #{plane_count}"
            )));
        }
    }
    let final_plane_len = params.image.len() - plane_start;
    if final_plane_len % 2 != 0 {
        return Err(ProtocolError::BadParam(format!(
            "bitplane #{plane_count} is not an even number of hex digits"
        )));
    }
    if plane_count != expected_separators {
        return Err(ProtocolError::BadParam(format!(
            "not enough color bitplanes provided ({} of {expected_planes})",
            plane_count + 1
        )));
    }

    let mut out = vec![b'I', merge, pos, trans];
    out.extend_from_slice(params.image.as_bytes());
    out.push(b'$');
    Ok(out)
}

fn text_cmd(params: &TextParams, model: HardwareModel) -> Result<Vec<u8>, ProtocolError> {
    if !model.is_readerboard() {
        return Err(ProtocolError::UnsupportedForModel { model });
    }
    let merge = if bool_param(params.merge.as_deref()) {
        b'M'
    } else {
        b'.'
    };
    let align = match params.align.as_deref() {
        None | Some("") => b'<',
        Some(s) => require_single_char(s, "alignment value")?,
    };
    let trans = match params.trans.as_deref() {
        None | Some("") => b'.',
        Some(s) => require_single_char(s, "transition value")?,
    };
    let mut out = vec![b'T', merge, align, trans];
    out.extend(text_param(&params.text)?);
    Ok(out)
}

fn scroll(params: &ScrollParams, model: HardwareModel) -> Result<Vec<u8>, ProtocolError> {
    if !model.is_readerboard() {
        return Err(ProtocolError::UnsupportedForModel { model });
    }
    let loop_byte = if bool_param(params.loop_flag.as_deref()) {
        b'L'
    } else {
        b'.'
    };
    let mut out = vec![b'<', loop_byte];
    out.extend(text_param(&params.text)?);
    Ok(out)
}

fn light(raw: &str, model: HardwareModel) -> Result<Encoded, ProtocolError> {
    let l = led_list(raw)?;
    if l.len() == 2 {
        // exactly one LED code plus the '$' terminator: steady on any model.
        return Ok(Encoded::Normal(vec![b'S', l[0]]));
    }
    if !model.is_readerboard() {
        return Err(ProtocolError::UnsupportedForModel { model });
    }
    let mut out = vec![b'L'];
    out.extend(l);
    Ok(Encoded::Normal(out))
}

fn flash(raw: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut out = vec![b'F'];
    out.extend(led_list(raw)?);
    Ok(out)
}

fn strobe(raw: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut out = vec![b'*'];
    out.extend(led_list(raw)?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HardwareModel::*;

    #[test]
    fn all_lights_off_busylight_fallback() {
        let Encoded::AllOff { fallback } = all_lights_off(BusylightV1).unwrap() else {
            panic!("expected AllOff");
        };
        assert_eq!(fallback, b"X");
    }

    #[test]
    fn all_lights_off_readerboard_fallback() {
        let Encoded::AllOff { fallback } = all_lights_off(Readerboard3Rgb).unwrap() else {
            panic!("expected AllOff");
        };
        assert_eq!(fallback, b"C\x04X");
    }

    #[test]
    fn clear_requires_readerboard() {
        assert!(clear(Readerboard3Mono).is_ok());
        assert_eq!(
            clear(BusylightV1),
            Err(ProtocolError::UnsupportedForModel { model: BusylightV1 })
        );
    }

    #[test]
    fn off_works_on_any_model() {
        assert_eq!(off(BusylightV1).unwrap(), b"X");
        assert_eq!(off(Readerboard3Rgb).unwrap(), b"X");
    }

    #[test]
    fn test_pattern_requires_readerboard_or_busylight_v2() {
        assert!(test(BusylightV1).is_err());
        assert!(test(BusylightV2).is_ok());
        assert!(test(Readerboard3Mono).is_ok());
    }

    #[test]
    fn color_defaults_to_one() {
        assert_eq!(color_cmd(None, Readerboard3Rgb).unwrap(), b"K1");
        assert_eq!(color_cmd(Some("4"), Readerboard3Rgb).unwrap(), b"K4");
        assert!(color_cmd(Some("4"), BusylightV1).is_err());
        assert!(color_cmd(Some("@"), Readerboard3Rgb).is_err());
    }

    #[test]
    fn font_validates_digit() {
        assert_eq!(font("3", Readerboard3Rgb).unwrap(), b"A3");
        assert!(font("x", Readerboard3Rgb).is_err());
        assert!(font("3", BusylightV1).is_err());
    }

    #[test]
    fn move_cmd_accepts_dont_care() {
        assert_eq!(move_cmd("~", Readerboard3Rgb).unwrap(), b"@~");
        assert!(move_cmd("!", Readerboard3Rgb).is_err());
    }

    #[test]
    fn graph_clamps_value() {
        assert_eq!(
            graph(
                &GraphParams {
                    value: Some(99),
                    colors: None
                },
                Readerboard3Rgb
            )
            .unwrap(),
            b"H8"
        );
        assert_eq!(
            graph(
                &GraphParams {
                    value: Some(-5),
                    colors: None
                },
                Readerboard3Rgb
            )
            .unwrap(),
            b"H0"
        );
    }

    #[test]
    fn graph_colors_override_value() {
        let out = graph(
            &GraphParams {
                value: None,
                colors: Some("01234567".to_string()),
            },
            Readerboard3Rgb,
        )
        .unwrap();
        assert_eq!(out, b"HK01234567");
    }

    #[test]
    fn bitmap_scenario_s6() {
        let params = BitmapParams {
            merge: Some("".to_string()),
            pos: "0".to_string(),
            trans: Some(">".to_string()),
            image: "12345678$a1a2a3a4$abcdef01$0000".to_string(),
        };
        let out = bitmap(&params, Readerboard3Rgb).unwrap();
        assert_eq!(out, b"IM0>12345678$a1a2a3a4$abcdef01$0000$");
    }

    #[test]
    fn bitmap_wrong_plane_count_is_error() {
        let params = BitmapParams {
            merge: None,
            pos: "0".to_string(),
            trans: None,
            image: "1234$1234$".to_string(),
        };
        assert!(bitmap(&params, Readerboard3Rgb).is_err());
    }

    #[test]
    fn bitmap_odd_length_plane_is_error() {
        let params = BitmapParams {
            merge: None,
            pos: "0".to_string(),
            trans: None,
            image: "123$1234$1234$1234".to_string(),
        };
        assert!(bitmap(&params, Readerboard3Rgb).is_err());
    }

    #[test]
    fn scroll_scenario_s5() {
        let params = ScrollParams {
            loop_flag: Some("true".to_string()),
            text: "Hello, $World!".to_string(),
        };
        let out = scroll(&params, Readerboard3Rgb).unwrap();
        assert_eq!(out, b"<LHello, $World!\x1b");
    }

    #[test]
    fn text_rejects_embedded_esc_or_eot() {
        assert!(text_param("hi\x1bthere").is_err());
        assert!(text_param("hi\x04there").is_err());
    }

    #[test]
    fn text_drops_codepoints_above_255() {
        let out = text_param("a\u{1F600}b").unwrap();
        assert_eq!(out, b"ab\x1b");
    }

    // Light with one LED produces ['S', l] on any model; with more than
    // one it only succeeds on readerboards.
    #[test]
    fn property_light_single_vs_multi() {
        assert_eq!(light("A", BusylightV1).unwrap(), Encoded::Normal(vec![b'S', b'A']));
        assert_eq!(
            light("A", Readerboard3Rgb).unwrap(),
            Encoded::Normal(vec![b'S', b'A'])
        );
        assert!(matches!(light("AB", BusylightV1), Err(ProtocolError::UnsupportedForModel { .. })));
        assert_eq!(
            light("AB", Readerboard3Rgb).unwrap(),
            Encoded::Normal(b"LAB$".to_vec())
        );
    }

    #[test]
    fn flash_scenario_s4() {
        assert_eq!(flash("AB_C").unwrap(), b"FAB_C$");
    }

    #[test]
    fn led_list_rejects_dollar_and_out_of_range() {
        assert!(led_list("A$B").is_err());
        assert!(led_list("A\x01B").is_err());
    }

    #[test]
    fn query_operations_encode_single_byte() {
        assert_eq!(QueryOperation::Query.encode(), vec![b'Q']);
        assert_eq!(QueryOperation::QueryStatus.encode(), vec![b'?']);
    }

    #[test]
    fn bool_param_matches_spec_truth_table() {
        assert!(!bool_param(None));
        assert!(bool_param(Some("")));
        assert!(bool_param(Some("true")));
        assert!(bool_param(Some("yes")));
        assert!(bool_param(Some("on")));
        assert!(!bool_param(Some("nope")));
    }
}
