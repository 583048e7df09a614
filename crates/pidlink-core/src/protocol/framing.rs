//! Checksum & Framing
//!
//! Builds the `PAYLOAD|XX` wire frame.
//!
//! Frame format:
//! - payload: the command text, trimmed of surrounding whitespace
//! - `|`: separator
//! - `XX`: sum of the payload's ASCII bytes modulo 256, two uppercase hex digits
//!
//! The firmware recomputes the checksum on its side, so the algorithm must
//! stay bit-for-bit identical: unsigned wrapping addition over ASCII bytes,
//! non-ASCII characters skipped.
//!
//! [`build_frame`] always frames. Deciding whether a line still needs a frame
//! is the caller's job ([`is_framed`]); the command session skips framing for
//! any line that already contains the separator.

use std::fmt;

use super::FRAME_SEPARATOR;

/// A checksummed command frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: String,
    checksum: u8,
}

impl Frame {
    /// Create a frame from a raw payload (surrounding whitespace is trimmed)
    pub fn new(raw_payload: &str) -> Self {
        let payload = raw_payload.trim().to_string();
        let checksum = compute_checksum(&payload);
        Self { payload, checksum }
    }

    /// Trimmed payload
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Checksum byte
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Step-by-step view of how this frame was built
    pub fn breakdown(&self) -> FrameBreakdown {
        FrameBreakdown {
            payload: self.payload.clone(),
            checksum_hex: format!("{:02X}", self.checksum),
            frame: self.to_string(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:02X}", self.payload, FRAME_SEPARATOR, self.checksum)
    }
}

/// Payload, checksum and resulting frame, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBreakdown {
    /// Trimmed payload
    pub payload: String,
    /// Checksum as two uppercase hex digits
    pub checksum_hex: String,
    /// Complete frame
    pub frame: String,
}

/// Additive 8-bit checksum over the ASCII bytes of the trimmed payload
pub fn compute_checksum(payload: &str) -> u8 {
    ascii_bytes(payload.trim())
        .fold(0u8, |sum, byte| sum.wrapping_add(byte))
}

/// Trim `raw_payload` and append `|XX`
pub fn build_frame(raw_payload: &str) -> String {
    Frame::new(raw_payload).to_string()
}

/// Normalize operator input before framing.
///
/// Only trims surrounding whitespace.
pub fn normalize_input(raw: &str) -> String {
    raw.trim().to_string()
}

/// Whether `line` already carries a checksum separator
pub fn is_framed(line: &str) -> bool {
    line.contains(FRAME_SEPARATOR)
}

/// ASCII bytes of `text`, silently skipping everything else
pub(crate) fn ascii_bytes(text: &str) -> impl Iterator<Item = u8> + '_ {
    text.chars().filter(char::is_ascii).map(|c| c as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_frame() {
        // P(0x50) + I(0x49) + N(0x4E) + G(0x47) = 302 = 0x12E
        assert_eq!(compute_checksum("PING"), 0x2E);
        assert_eq!(build_frame("PING"), "PING|2E");
    }

    #[test]
    fn test_checksum_wraps() {
        // 0x7F * 3 = 381 = 0x17D
        assert_eq!(compute_checksum("\u{7f}\u{7f}\u{7f}"), 0x7D);
        assert_eq!(compute_checksum(""), 0);
    }

    #[test]
    fn test_checksum_ignores_surrounding_whitespace() {
        assert_eq!(compute_checksum("  TARGET(25.0)\t"), compute_checksum("TARGET(25.0)"));
        assert_eq!(build_frame("  PING \r\n"), "PING|2E");
    }

    #[test]
    fn test_checksum_skips_non_ascii() {
        assert_eq!(compute_checksum("PIżNG"), compute_checksum("PING"));
        assert_eq!(compute_checksum("°"), 0);
    }

    #[test]
    fn test_checksum_is_stable() {
        let inputs = ["PID(1.2,0.05,3)", "ZERO(90)", "ECHO(hello world)", "START"];
        for input in inputs {
            assert_eq!(compute_checksum(input), compute_checksum(input));
        }
    }

    #[test]
    fn test_frame_keeps_inner_spaces() {
        let frame = Frame::new(" ECHO(a b) ");
        assert_eq!(frame.payload(), "ECHO(a b)");
        assert_eq!(frame.to_string(), format!("ECHO(a b)|{:02X}", frame.checksum()));
    }

    #[test]
    fn test_hex_is_two_uppercase_digits() {
        // "\n" trims away, "\u{1}" does not
        let frame = Frame::new("\u{1}");
        assert_eq!(frame.to_string(), "\u{1}|01");
        assert_eq!(build_frame("STOP"), "STOP|46");
        assert_eq!(build_frame("J"), "J|4A");
    }

    #[test]
    fn test_breakdown() {
        let breakdown = Frame::new("PING").breakdown();
        assert_eq!(breakdown.payload, "PING");
        assert_eq!(breakdown.checksum_hex, "2E");
        assert_eq!(breakdown.frame, "PING|2E");
    }

    #[test]
    fn test_normalize_and_is_framed() {
        assert_eq!(normalize_input("  TARGET(25,0)  "), "TARGET(25,0)");
        assert!(is_framed("FOO|AB"));
        assert!(!is_framed("FOO"));
    }
}
