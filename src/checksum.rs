use crate::decode::{DecodeError, DecodeErrorKind};

/// Two's-complement 7-bit checksum used by Yamaha and Roland bulk dumps.
///
/// The checksum is chosen so that the 7-bit sum of the covered bytes plus the
/// checksum itself is zero: `(0x80 - (sum mod 128)) mod 128`.
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte)) & 0x7F;
    (0x80 - sum) & 0x7F
}

/// Checks a received checksum against the one computed over `data`.
#[inline]
pub(crate) fn verify_checksum<T>(data: &[u8], value: u8) -> Result<(), DecodeError> {
    let expected = checksum(data);

    if value != expected {
        return Err(DecodeError::new::<T>(DecodeErrorKind::Checksum { value, expected }));
    }

    Ok(())
}
