//! Hexadecimal text conversion for byte strings.
//!
//! Used for readable fixtures and the `data:` text form of tagged records.

const DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Encodes bytes as lowercase hex text, two digits per byte.
pub fn encode(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        text.push(DIGITS[(byte >> 4) as usize] as char);
        text.push(DIGITS[(byte & 0x0F) as usize] as char);
    }
    text
}

/// Decodes hex text into bytes.
///
/// Any character that isn't a hex digit is skipped, so separators such as spaces,
/// colons or newlines are tolerated. A trailing lone digit is dropped.
pub fn decode(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() / 2);
    let mut high = None;

    for nibble in text.chars().filter_map(|c| c.to_digit(16)) {
        match high.take() {
            Some(high) => bytes.push(((high << 4) | nibble) as u8),
            None => high = Some(nibble),
        }
    }

    bytes
}
