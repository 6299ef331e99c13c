//! Byte-level cleanup of raw console output.
//!
//! Serial consoles redraw lines with bare carriage returns (progress bars,
//! line editing). A `\r` followed by anything but `\n` is dropped together
//! with the byte after it; what remains is decoded lossily, so stray
//! non-UTF-8 bytes become U+FFFD instead of failing the read.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

static CARRIAGE_REDRAW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u)\r[^\n]").expect("carriage return pattern is valid"));

/// Decode one raw line: drop redraw sequences, decode, strip the line ending.
pub fn decode_line(raw: &[u8]) -> String {
    let cleaned = CARRIAGE_REDRAW.replace_all(raw, &b""[..]);
    let text = String::from_utf8_lossy(&cleaned);
    text.trim_end_matches('\n').trim_end_matches('\r').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_line_endings() {
        assert_eq!(decode_line(b"hello\n"), "hello");
        assert_eq!(decode_line(b"hello\r\n"), "hello");
        assert_eq!(decode_line(b"root@qnx:/# "), "root@qnx:/# ");
    }

    #[test]
    fn test_decode_drops_carriage_redraws() {
        // "\r5" and "\r1" are removed together with the following byte.
        assert_eq!(decode_line(b"50%\r51%\r100%\n"), "50%1%00%");
        assert_eq!(decode_line(b"abc\r\n"), "abc");
    }

    #[test]
    fn test_decode_is_lossy() {
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{fffd} byte");
    }
}
