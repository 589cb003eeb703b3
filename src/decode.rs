use thiserror::Error;

/// A byte sequence that didn't have the shape the decoder expected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    type_name: &'static str,
}

impl DecodeError {
    pub fn new<T>(kind: DecodeErrorKind) -> Self {
        Self {
            kind,
            type_name: core::any::type_name::<T>(),
        }
    }

    pub const fn kind(&self) -> DecodeErrorKind {
        self.kind
    }
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Failed to decode {}: {}", self.type_name, self.kind)
    }
}

#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeErrorKind {
    #[error("Message was too short.")]
    UnexpectedEnd,

    #[error("Expected a status byte, found data byte {value:#04x}.")]
    MissingStatus { value: u8 },

    #[error("Status byte {value:#04x} does not start a message.")]
    UnexpectedStatus { value: u8 },

    #[error("Byte {value:#04x} at offset {offset} has its high bit set.")]
    HighBitSet { offset: usize, value: u8 },

    #[error("System exclusive message was not terminated.")]
    UnterminatedSysex,

    #[error("Message did not have a valid header sequence.")]
    InvalidHeader,

    #[error(
        "Could not decode {name} with unexpected byte. Found {value:x}, expected one of: {expected:x?}."
    )]
    UnexpectedByte {
        name: &'static str,
        value: u8,
        expected: &'static [u8],
    },

    #[error("Checksum mismatch. Found {value:x}, expected {expected:x}.")]
    Checksum { value: u8, expected: u8 },

    #[error("Unexpected length. Found {found} bytes, expected {expected}.")]
    InvalidLength { found: usize, expected: usize },
}

/// A type that can be reconstructed (decoded) from a raw sequence of bytes.
///
/// The input slice is advanced by the number of bytes consumed.
pub trait Decode {
    /// Attempts to decode `Self` from the beginning of the provided byte slice.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the input is malformed or too short to decode
    /// a complete value of this type.
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

impl Decode for u8 {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let (&byte, rest) = data
            .split_first()
            .ok_or_else(|| DecodeError::new::<Self>(DecodeErrorKind::UnexpectedEnd))?;
        *data = rest;
        Ok(byte)
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = data
            .get(..N)
            .ok_or_else(|| DecodeError::new::<Self>(DecodeErrorKind::UnexpectedEnd))?;
        let mut array = [0; N];
        array.copy_from_slice(bytes);
        *data = &data[N..];
        Ok(array)
    }
}

/// Requires every byte of a SysEx body to have its high bit clear.
pub(crate) fn require_7bit<T>(data: &[u8]) -> Result<(), DecodeError> {
    match data.iter().position(|byte| byte & 0x80 != 0) {
        Some(offset) => Err(DecodeError::new::<T>(DecodeErrorKind::HighBitSet {
            offset,
            value: data[offset],
        })),
        None => Ok(()),
    }
}

/// Requires the input to have been fully consumed.
pub(crate) fn require_end<T>(data: &[u8], consumed: usize) -> Result<(), DecodeError> {
    if !data.is_empty() {
        return Err(DecodeError::new::<T>(DecodeErrorKind::InvalidLength {
            found: consumed + data.len(),
            expected: consumed,
        }));
    }
    Ok(())
}
