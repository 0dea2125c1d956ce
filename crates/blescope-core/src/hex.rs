//! Hex string <-> byte conversions.
//!
//! Every function here is total: malformed input is skipped rather than
//! rejected, so callers can feed raw radio strings straight in.

use std::fmt::Write;

/// Remove all whitespace and upper-case the remaining characters.
#[must_use]
pub fn clean_hex(hex: &str) -> String {
    hex.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Decode a hex string into bytes.
///
/// Whitespace is ignored and case does not matter. The input is walked in
/// two-character chunks; a chunk that is not a valid hex pair (including a
/// dangling trailing nibble) is dropped.
#[must_use]
pub fn bytes_from_hex(hex: &str) -> Vec<u8> {
    let cleaned: Vec<char> = hex.chars().filter(|c| !c.is_whitespace()).collect();
    cleaned
        .chunks(2)
        .filter_map(|pair| match pair {
            [hi, lo] => {
                let hi = hi.to_digit(16)?;
                let lo = lo.to_digit(16)?;
                u8::try_from(hi << 4 | lo).ok()
            }
            _ => None,
        })
        .collect()
}

/// Encode bytes as an uppercase hex string without separators.
#[must_use]
pub fn hex_from_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Render a hex string as an offset-prefixed dump.
///
/// Each line starts with the 4-digit hex byte offset of its first byte,
/// followed by up to `bytes_per_line` space-separated pairs:
///
/// ```text
/// 0000: 1E FF 83 55 ...
/// 0010: ...
/// ```
#[must_use]
pub fn format_hex_block(hex: &str, bytes_per_line: usize) -> String {
    let cleaned = clean_hex(hex);
    if cleaned.is_empty() {
        return String::new();
    }
    let per_line = bytes_per_line.max(1);
    let chars: Vec<char> = cleaned.chars().collect();

    chars
        .chunks(per_line * 2)
        .enumerate()
        .map(|(line, chunk)| {
            let pairs: Vec<String> = chunk.chunks(2).map(|p| p.iter().collect()).collect();
            format!("{:04X}: {}", line * per_line, pairs.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Interpret user-supplied characteristic payload text.
///
/// `0x`-prefixed or purely hexadecimal text is decoded as hex; anything else
/// is sent as its UTF-8 bytes.
#[must_use]
pub fn parse_payload(text: &str) -> Vec<u8> {
    let trimmed = text.trim();
    if let Some(rest) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return bytes_from_hex(rest);
    }
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return bytes_from_hex(trimmed);
    }
    trimmed.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_from_hex_ignores_whitespace_and_case() {
        assert_eq!(bytes_from_hex("1e ff\n83 55"), vec![0x1E, 0xFF, 0x83, 0x55]);
        assert_eq!(bytes_from_hex("aBcD"), vec![0xAB, 0xCD]);
    }

    #[test]
    fn test_bytes_from_hex_drops_bad_pairs() {
        // "ZZ" is skipped, the dangling "F" is dropped
        assert_eq!(bytes_from_hex("01ZZ02F"), vec![0x01, 0x02]);
        assert!(bytes_from_hex("").is_empty());
        assert!(bytes_from_hex("G").is_empty());
    }

    #[test]
    fn test_hex_round_trip_normalises() {
        let input = "de ad be ef 00 7f";
        assert_eq!(hex_from_bytes(&bytes_from_hex(input)), clean_hex(input));
        assert_eq!(clean_hex(input), "DEADBEEF007F");
    }

    #[test]
    fn test_format_hex_block_offsets_count_bytes() {
        let dump = format_hex_block("00112233445566778899", 4);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(
            lines,
            vec!["0000: 00 11 22 33", "0004: 44 55 66 77", "0008: 88 99"]
        );
    }

    #[test]
    fn test_format_hex_block_sixteen_per_line() {
        let hex = "AB".repeat(20);
        let dump = format_hex_block(&hex, 16);
        assert!(dump.starts_with("0000: AB AB"));
        assert!(dump.contains("\n0010: AB AB AB AB"));
        assert_eq!(format_hex_block("  ", 16), "");
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload("0x0102"), vec![1, 2]);
        assert_eq!(parse_payload("ff00"), vec![0xFF, 0x00]);
        assert_eq!(parse_payload("hello"), b"hello".to_vec());
        assert!(parse_payload("   ").is_empty());
    }
}
