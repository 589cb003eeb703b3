//! Universal device inquiry.
//!
//! A host sends an [`IdentityRequest`]; instruments that support it answer with an
//! [`IdentityReply`] naming their manufacturer, product family and member, and a
//! four-byte firmware revision.

use crate::{
    decode::{require_7bit, require_end, Decode, DecodeError, DecodeErrorKind},
    encode::Encode,
    message::combine,
    sysex::{SysexFrame, UNIVERSAL_NON_REALTIME},
};

/// General information sub-id.
const GENERAL_INFORMATION: u8 = 0x06;
const IDENTITY_REQUEST: u8 = 0x01;
const IDENTITY_REPLY: u8 = 0x02;

/// Asks the device(s) at `unit` to identify themselves.
///
/// Encodes as `F0 7E <unit> 06 01 F7`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct IdentityRequest {
    pub unit: u8,
}

impl Encode for IdentityRequest {
    fn size(&self) -> usize {
        6
    }

    fn encode(&self, data: &mut [u8]) {
        SysexFrame::new(
            [
                UNIVERSAL_NON_REALTIME,
                self.unit,
                GENERAL_INFORMATION,
                IDENTITY_REQUEST,
            ],
            (),
        )
        .encode(data)
    }
}

/// A SysEx manufacturer id, either one byte or `0x00` followed by two bytes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ManufacturerId {
    Short(u8),
    Extended(u8, u8),
}

impl Decode for ManufacturerId {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(data)? {
            0x00 => {
                let [high, low] = <[u8; 2]>::decode(data)?;
                Ok(Self::Extended(high, low))
            }
            id => Ok(Self::Short(id)),
        }
    }
}

impl Encode for ManufacturerId {
    fn size(&self) -> usize {
        match self {
            Self::Short(_) => 1,
            Self::Extended(..) => 3,
        }
    }

    fn encode(&self, data: &mut [u8]) {
        match *self {
            Self::Short(id) => data[0] = id,
            Self::Extended(high, low) => data[..3].copy_from_slice(&[0x00, high, low]),
        }
    }
}

/// Reply to an [`IdentityRequest`].
///
/// # Encoding
///
/// | Field          | Size | Description |
/// |----------------|------|-------------|
/// | `7E`           | 1    | Universal non-realtime. |
/// | `unit`         | 1    | Unit of the replying device. |
/// | `06 02`        | 2    | Identity reply. |
/// | `manufacturer` | 1, 3 | [`ManufacturerId`]. |
/// | `family`       | 2    | Family code, LSB first. |
/// | `member`       | 2    | Member code, LSB first. |
/// | `revision`     | 4    | Firmware revision, device-specific. |
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct IdentityReply {
    pub unit: u8,
    pub manufacturer: ManufacturerId,
    pub family: u16,
    pub member: u16,
    pub revision: [u8; 4],
}

impl IdentityReply {
    /// Parses the payload of a system-exclusive message (without `F0`/`F7`).
    ///
    /// # Errors
    ///
    /// Fails if the payload isn't exactly an identity reply.
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        require_7bit::<Self>(payload)?;

        let mut data = payload;
        let reply = Self::decode(&mut data)?;
        require_end::<Self>(data, payload.len() - data.len())?;

        Ok(reply)
    }
}

impl Decode for IdentityReply {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        expect_byte::<Self>(data, "id", &UNIVERSAL_NON_REALTIME)?;
        let unit = u8::decode(data)?;
        expect_byte::<Self>(data, "sub-id", &GENERAL_INFORMATION)?;
        expect_byte::<Self>(data, "sub-id", &IDENTITY_REPLY)?;

        let manufacturer = ManufacturerId::decode(data)?;
        let [family_lsb, family_msb] = <[u8; 2]>::decode(data)?;
        let [member_lsb, member_msb] = <[u8; 2]>::decode(data)?;
        let revision = <[u8; 4]>::decode(data)?;

        Ok(Self {
            unit,
            manufacturer,
            family: combine(family_msb, family_lsb),
            member: combine(member_msb, member_lsb),
            revision,
        })
    }
}

impl Encode for IdentityReply {
    fn size(&self) -> usize {
        2 + 4 + self.manufacturer.size() + 8
    }

    fn encode(&self, data: &mut [u8]) {
        let mut body = Vec::with_capacity(self.size() - 6);
        body.extend(self.manufacturer.to_bytes());
        body.extend([
            (self.family & 0x7F) as u8,
            (self.family >> 7) as u8,
            (self.member & 0x7F) as u8,
            (self.member >> 7) as u8,
        ]);
        body.extend(self.revision);

        SysexFrame::new(
            [
                UNIVERSAL_NON_REALTIME,
                self.unit,
                GENERAL_INFORMATION,
                IDENTITY_REPLY,
            ],
            body,
        )
        .encode(data)
    }
}

fn expect_byte<T>(
    data: &mut &[u8],
    name: &'static str,
    expected: &'static u8,
) -> Result<(), DecodeError> {
    let value = u8::decode(data)?;
    if value != *expected {
        return Err(DecodeError::new::<T>(DecodeErrorKind::UnexpectedByte {
            name,
            value,
            expected: core::slice::from_ref(expected),
        }));
    }
    Ok(())
}
