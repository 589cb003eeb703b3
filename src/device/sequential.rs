//! Sequential (Dave Smith Instruments) Prophet '08.
//!
//! Program data is 384 bytes of 8-bit parameters sent through the 7-bit packing
//! codec, 439 bytes on the wire.
//!
//! | Message             | Bytes                           |
//! |---------------------|---------------------------------|
//! | Program dump        | `F0 01 23 02 bank prog <439> F7`|
//! | Edit buffer dump    | `F0 01 23 03 <439> F7`          |
//! | Program request     | `F0 01 23 05 bank prog F7`      |
//! | Edit buffer request | `F0 01 23 06 F7`                |

use std::time::Duration;

use log::{debug, trace};

use super::{
    log_rejected, write_name, Capabilities, Device, DeviceConfig, DeviceError, DeviceInfo,
    DumpRequest, IdentityCodes, LoadItem,
};
use crate::{
    decode::{Decode, DecodeError, DecodeErrorKind},
    encode::Encode,
    identity::{IdentityReply, ManufacturerId},
    message::{status::SYSTEM_EXCLUSIVE, RawMessage},
    record::{Record, Selector},
    seven_bit::{self, packed_len},
    string::FixedString,
    sysex::{parse_frame, SysexFrame},
    version::Version,
};

const SEQUENTIAL: u8 = 0x01;
const PROPHET_08: u8 = 0x23;

mod commands {
    pub const PROGRAM_DATA: u8 = 0x02;
    pub const EDIT_BUFFER_DATA: u8 = 0x03;
    pub const REQUEST_PROGRAM: u8 = 0x05;
    pub const REQUEST_EDIT_BUFFER: u8 = 0x06;
}

pub const PROGRAM_LEN: usize = 384;
pub const PACKED_PROGRAM_LEN: usize = packed_len(PROGRAM_LEN);

const BANKS: u32 = 2;
const PROGRAMS_PER_BANK: u32 = 128;

const NAME_OFFSET: usize = 184;
const NAME_LEN: usize = 16;

static INFO: DeviceInfo = DeviceInfo {
    name: "sequential-prophet08",
    manufacturer: &[SEQUENTIAL],
    units: 0..=0,
    slots: BANKS * PROGRAMS_PER_BANK,
    writable: 0..=BANKS * PROGRAMS_PER_BANK,
    timeout: Duration::from_millis(500),
    identity: Some(IdentityCodes {
        manufacturer: ManufacturerId::Short(SEQUENTIAL),
        family: (0x01 << 7) | PROPHET_08 as u16,
        member: 0,
    }),
    globals: &[],
    capabilities: Capabilities::PROGRAM_DUMP
        .union(Capabilities::EDIT_BUFFER)
        .union(Capabilities::IDENTITY),
};

/// Where a program lives in memory. Slot 0 is the edit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    EditBuffer,
    Stored { bank: u8, program: u8 },
}

impl Location {
    fn from_slot(slot: u32) -> Result<Self, DeviceError> {
        match slot {
            0 => Ok(Self::EditBuffer),
            slot if slot <= INFO.slots => Ok(Self::Stored {
                bank: ((slot - 1) / PROGRAMS_PER_BANK) as u8,
                program: ((slot - 1) % PROGRAMS_PER_BANK) as u8,
            }),
            slot => Err(DeviceError::InvalidSlot(slot)),
        }
    }

    fn slot(self) -> u32 {
        match self {
            Self::EditBuffer => 0,
            Self::Stored { bank, program } => {
                u32::from(bank) * PROGRAMS_PER_BANK + u32::from(program) + 1
            }
        }
    }

    /// Message header up to the packed data, manufacturer id first.
    fn header(self, command: u8) -> Vec<u8> {
        let mut header = vec![SEQUENTIAL, PROPHET_08, command];
        if let Self::Stored { bank, program } = self {
            header.extend([bank, program]);
        }
        header
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Prophet08;

impl Prophet08 {
    fn decode_program(payload: &[u8]) -> Result<Vec<Record>, DecodeError> {
        let (location, packed) = match payload {
            [SEQUENTIAL, PROPHET_08, commands::EDIT_BUFFER_DATA, ..] => {
                let header = Location::EditBuffer.header(commands::EDIT_BUFFER_DATA);
                (
                    Location::EditBuffer,
                    parse_frame::<Self>(payload, &header, false)?,
                )
            }
            _ => {
                let mut body = parse_frame::<Self>(
                    payload,
                    &[SEQUENTIAL, PROPHET_08, commands::PROGRAM_DATA],
                    false,
                )?;
                let bank = u8::decode(&mut body)?;
                let program = u8::decode(&mut body)?;
                if u32::from(bank) >= BANKS {
                    return Err(DecodeError::new::<Self>(DecodeErrorKind::UnexpectedByte {
                        name: "bank",
                        value: bank,
                        expected: &[0, 1],
                    }));
                }
                (Location::Stored { bank, program }, body)
            }
        };

        if packed.len() != PACKED_PROGRAM_LEN {
            return Err(DecodeError::new::<Self>(DecodeErrorKind::InvalidLength {
                found: packed.len(),
                expected: PACKED_PROGRAM_LEN,
            }));
        }

        let data = seven_bit::unpack(packed);
        let name = FixedString::<NAME_LEN>::from_field(&data[NAME_OFFSET..]);
        debug!("sequential-prophet08: decoded program {} {name:?}", location.slot());

        Ok(vec![
            Record::Program(location.slot()),
            Record::Name(name.into_inner()),
            Record::Data(data),
        ])
    }
}

impl Device for Prophet08 {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn dump_request(
        &self,
        config: &DeviceConfig,
        item: &Selector,
    ) -> Result<DumpRequest, DeviceError> {
        INFO.unit(config)?;

        let location = match item {
            Selector::Program(slot) => Location::from_slot(*slot)?,
            Selector::Globals(_) => return Err(DeviceError::Unsupported(item.clone())),
        };

        let (request, response) = match location {
            Location::EditBuffer => (commands::REQUEST_EDIT_BUFFER, commands::EDIT_BUFFER_DATA),
            Location::Stored { .. } => (commands::REQUEST_PROGRAM, commands::PROGRAM_DATA),
        };

        let mut response_header = vec![SYSTEM_EXCLUSIVE];
        response_header.extend(location.header(response));

        Ok(DumpRequest {
            messages: vec![SysexFrame::new(location.header(request), ()).to_bytes()],
            response_header,
            response_count: 1,
        })
    }

    fn decode(&self, messages: &[RawMessage]) -> Vec<Record> {
        let mut records = Vec::new();

        for message in messages {
            let Some(payload) = message.kind.sysex() else {
                trace!("sequential-prophet08: skipping {:?}", message.kind);
                continue;
            };

            if !matches!(
                payload,
                [
                    SEQUENTIAL,
                    PROPHET_08,
                    commands::PROGRAM_DATA | commands::EDIT_BUFFER_DATA,
                    ..
                ]
            ) {
                trace!("sequential-prophet08: skipping foreign SysEx at {}", message.start);
                continue;
            }

            match Self::decode_program(payload) {
                Ok(program) => records.extend(program),
                Err(err) => log_rejected(INFO.name, message, &err),
            }
        }

        records
    }

    fn load_command(
        &self,
        config: &DeviceConfig,
        records: &[Record],
        slot: u32,
        name: Option<&str>,
    ) -> Result<Vec<Vec<u8>>, DeviceError> {
        INFO.unit(config)?;
        INFO.check_writable(slot)?;
        let location = Location::from_slot(slot)?;

        let mut item = LoadItem::from_records(records, name)?;
        if let Selector::Globals(_) = item.selector {
            return Err(DeviceError::Unsupported(item.selector));
        }
        item.require_len(PROGRAM_LEN)?;

        write_name::<NAME_LEN>(&mut item.data[NAME_OFFSET..], item.name)?;

        let command = match location {
            Location::EditBuffer => commands::EDIT_BUFFER_DATA,
            Location::Stored { .. } => commands::PROGRAM_DATA,
        };

        Ok(vec![SysexFrame::new(
            location.header(command),
            seven_bit::pack(&item.data),
        )
        .to_bytes()])
    }

    /// The main system version sits in the first two revision bytes, least significant
    /// first. The other two are always zero.
    fn identify(&self, reply: &IdentityReply) -> Option<Version> {
        if !INFO.identity?.matches(reply) {
            return None;
        }

        let [minor, major, ..] = reply.revision;
        Some(Version {
            major,
            minor,
            build: 0,
            beta: 0,
        })
    }
}
