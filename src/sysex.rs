//! System-exclusive framing shared by the device plugins.
//!
//! # Encoding
//!
//! | Field      | Size | Description |
//! |------------|------|-------------|
//! | `start`    | 1    | Always `0xF0`. |
//! | `header`   | n    | Manufacturer id, unit byte, message type and any fixed prefix. |
//! | `body`     | n    | Device payload. |
//! | `checksum` | 0–1  | [`checksum`](crate::checksum::checksum) over `body`, if the format has one. |
//! | `end`      | 1    | Always `0xF7`. |

use crate::{
    checksum::{checksum, verify_checksum},
    decode::{require_7bit, DecodeError, DecodeErrorKind},
    encode::Encode,
    message::status::{END_OF_EXCLUSIVE, SYSTEM_EXCLUSIVE},
};

/// Universal non-realtime manufacturer id.
pub const UNIVERSAL_NON_REALTIME: u8 = 0x7E;

/// Unit byte addressing every device on the bus.
pub const ALL_CALL: u8 = 0x7F;

/// Outgoing system-exclusive message.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SysexFrame<P: Encode> {
    pub header: Vec<u8>,
    pub body: P,
    /// Append a checksum over the encoded body.
    pub checksum: bool,
}

impl<P: Encode> SysexFrame<P> {
    pub fn new(header: impl Into<Vec<u8>>, body: P) -> Self {
        Self {
            header: header.into(),
            body,
            checksum: false,
        }
    }

    pub fn checksummed(header: impl Into<Vec<u8>>, body: P) -> Self {
        Self {
            checksum: true,
            ..Self::new(header, body)
        }
    }
}

impl<P: Encode> Encode for SysexFrame<P> {
    fn size(&self) -> usize {
        2 + self.header.len() + self.body.size() + usize::from(self.checksum)
    }

    fn encode(&self, data: &mut [u8]) {
        let body_start = 1 + self.header.len();
        let body_end = body_start + self.body.size();

        data[0] = SYSTEM_EXCLUSIVE;
        data[1..body_start].copy_from_slice(&self.header);
        self.body.encode(&mut data[body_start..body_end]);

        let mut end = body_end;
        if self.checksum {
            data[end] = checksum(&data[body_start..body_end]);
            end += 1;
        }
        data[end] = END_OF_EXCLUSIVE;
    }
}

/// Checks a received SysEx payload (framing bytes already stripped) against the
/// expected header and returns its body.
///
/// # Errors
///
/// Fails if any byte has its high bit set, if the header doesn't match, or if the
/// trailing checksum is missing or wrong.
pub fn parse_frame<'a, T>(
    payload: &'a [u8],
    header: &[u8],
    checksummed: bool,
) -> Result<&'a [u8], DecodeError> {
    require_7bit::<T>(payload)?;

    let body = payload
        .strip_prefix(header)
        .ok_or_else(|| DecodeError::new::<T>(DecodeErrorKind::InvalidHeader))?;

    if !checksummed {
        return Ok(body);
    }

    let (&value, body) = body
        .split_last()
        .ok_or_else(|| DecodeError::new::<T>(DecodeErrorKind::UnexpectedEnd))?;
    verify_checksum::<T>(body, value)?;

    Ok(body)
}
