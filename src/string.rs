use core::{
    fmt::{self, Display},
    ops::Deref,
    str::FromStr,
};

use thiserror::Error;

use crate::{
    decode::{Decode, DecodeError},
    encode::Encode,
};

/// A 7-bit ASCII name stored in a fixed-width field of `N` bytes.
///
/// Instruments store program names padded with spaces to the width of their name
/// field. The string held here is the trimmed form; encoding pads it back out.
///
/// # Invariants
///
/// - Contents are ASCII.
/// - `len() <= N`.
/// - No trailing spaces.
#[derive(Debug, PartialEq, PartialOrd, Eq, Ord, Clone, Hash, Default)]
pub struct FixedString<const N: usize>(String);

impl<const N: usize> FixedString<N> {
    /// Creates a new [`FixedString`] from the given string slice.
    ///
    /// Trailing spaces are dropped before the size check.
    ///
    /// # Errors
    ///
    /// Returns [`FixedStringError`] if the trimmed string is longer than `N` bytes
    /// or contains a character outside of 7-bit ASCII.
    pub fn new(s: impl AsRef<str>) -> Result<Self, FixedStringError> {
        let s = s.as_ref().trim_end_matches(' ');

        if let Some(character) = s.chars().find(|c| !c.is_ascii()) {
            return Err(FixedStringError::NotAscii { character });
        }

        if s.len() > N {
            return Err(FixedStringError::TooLong {
                input_size: s.len(),
                max_size: N,
            });
        }

        Ok(Self(s.to_string()))
    }

    /// Reads a name field, trimming trailing spaces and NULs.
    ///
    /// Bytes are interpreted as 7-bit ASCII; the high bit is ignored.
    pub fn from_field(field: &[u8]) -> Self {
        let text: String = field
            .iter()
            .take(N)
            .map(|byte| char::from(byte & 0x7F))
            .collect();

        Self(text.trim_end_matches([' ', '\0']).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<const N: usize> Deref for FixedString<N> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl<const N: usize> AsRef<str> for FixedString<N> {
    fn as_ref(&self) -> &str {
        self
    }
}

impl<const N: usize> TryFrom<&str> for FixedString<N> {
    type Error = FixedStringError;

    fn try_from(value: &str) -> Result<FixedString<N>, FixedStringError> {
        Self::new(value)
    }
}

impl<const N: usize> FromStr for FixedString<N> {
    type Err = FixedStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<const N: usize> Display for FixedString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl<const N: usize> Encode for FixedString<N> {
    fn size(&self) -> usize {
        N
    }

    fn encode(&self, data: &mut [u8]) {
        let bytes = self.0.as_bytes();

        data[..bytes.len()].copy_from_slice(bytes);
        data[bytes.len()..N].fill(b' ');
    }
}

impl<const N: usize> Decode for FixedString<N> {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::from_field(&<[u8; N]>::decode(data)?))
    }
}

/// Returned when a string doesn't fit a [`FixedString`] field.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum FixedStringError {
    #[error("string with size {input_size} exceeds the maximum size of {max_size}")]
    TooLong { input_size: usize, max_size: usize },

    #[error("character {character:?} is not 7-bit ASCII")]
    NotAscii { character: char },
}

#[cfg(test)]
mod tests {
    use super::{FixedString, FixedStringError};
    use crate::{decode::Decode, encode::Encode};

    #[test]
    fn pads_with_spaces() {
        let name = FixedString::<10>::new("E.PIANO 1").unwrap();
        assert_eq!(name.to_bytes(), b"E.PIANO 1 ");

        let empty = FixedString::<4>::default();
        assert_eq!(empty.to_bytes(), b"    ");
    }

    #[test]
    fn decode_trims_padding() {
        let mut data: &[u8] = b"BRASS  1  \0\0tail";
        let name = FixedString::<12>::decode(&mut data).unwrap();

        assert_eq!(name.as_str(), "BRASS  1");
        assert_eq!(data, b"tail");
    }

    #[test]
    fn rejects_oversized() {
        assert_eq!(
            FixedString::<4>::new("TOO LONG"),
            Err(FixedStringError::TooLong {
                input_size: 8,
                max_size: 4
            })
        );
        // Trailing padding doesn't count towards the size.
        assert!(FixedString::<4>::new("PAD     ").is_ok());
    }

    #[test]
    fn rejects_non_ascii() {
        assert_eq!(
            "Piano é".parse::<FixedString<10>>(),
            Err(FixedStringError::NotAscii { character: 'é' })
        );
    }
}
