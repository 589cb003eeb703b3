//! Yamaha DX7.
//!
//! The edit buffer travels as a single-voice (VCED) dump; the 32 internal voices
//! travel as one bulk (VMEM) dump whose voices are bit-packed to 128 bytes each.
//!
//! | Message       | Bytes                                   |
//! |---------------|-----------------------------------------|
//! | Voice dump    | `F0 43 0n 00 01 1B <155> cs F7`         |
//! | Bank dump     | `F0 43 0n 09 20 00 <4096> cs F7`        |
//! | Voice request | `F0 43 2n 00 F7`                        |
//! | Bank request  | `F0 43 2n 09 F7`                        |

use std::time::Duration;

use log::{debug, trace};

use super::{
    log_rejected, write_name, Capabilities, Device, DeviceConfig, DeviceError, DeviceInfo,
    DumpRequest, LoadItem,
};
use crate::{
    decode::{require_7bit, DecodeError, DecodeErrorKind},
    encode::Encode,
    message::{status::SYSTEM_EXCLUSIVE, RawMessage},
    record::{Record, Selector},
    string::FixedString,
    sysex::{parse_frame, SysexFrame},
};

const YAMAHA: u8 = 0x43;

/// Substatus nibble of a dump.
const DUMP: u8 = 0x00;
/// Substatus nibble of a dump request.
const REQUEST: u8 = 0x20;

const VOICE_FORMAT: u8 = 0x00;
const BANK_FORMAT: u8 = 0x09;

pub const VOICE_LEN: usize = 155;
pub const PACKED_VOICE_LEN: usize = 128;
pub const BANK_VOICES: usize = 32;
pub const BANK_LEN: usize = PACKED_VOICE_LEN * BANK_VOICES;

const NAME_OFFSET: usize = 145;
const NAME_LEN: usize = 10;

const OPERATORS: usize = 6;
const PACKED_OPERATOR_LEN: usize = 17;
const OPERATOR_LEN: usize = 21;

static INFO: DeviceInfo = DeviceInfo {
    name: "yamaha-dx7",
    manufacturer: &[YAMAHA],
    units: 0..=15,
    slots: BANK_VOICES as u32,
    writable: 0..=0,
    timeout: Duration::from_millis(3000),
    identity: None,
    globals: &[],
    capabilities: Capabilities::PROGRAM_DUMP.union(Capabilities::EDIT_BUFFER),
};

/// Header of a voice dump, byte count `01 1B` (155) included.
fn voice_header(unit: u8) -> [u8; 5] {
    [YAMAHA, DUMP | unit, VOICE_FORMAT, 0x01, 0x1B]
}

/// Header of a bank dump, byte count `20 00` (4096) included.
fn bank_header(unit: u8) -> [u8; 5] {
    [YAMAHA, DUMP | unit, BANK_FORMAT, 0x20, 0x00]
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Dx7;

impl Dx7 {
    fn decode_voice(payload: &[u8], unit: u8) -> Result<Vec<Record>, DecodeError> {
        let voice = parse_frame::<Self>(payload, &voice_header(unit), true)?;
        require_voice_len(voice, VOICE_LEN)?;

        Ok(voice_records(0, voice))
    }

    fn decode_bank(payload: &[u8], unit: u8) -> Result<Vec<Record>, DecodeError> {
        let bank = parse_frame::<Self>(payload, &bank_header(unit), true)?;
        require_voice_len(bank, BANK_LEN)?;

        let mut records = Vec::with_capacity(BANK_VOICES * 3);
        for (index, packed) in bank.chunks_exact(PACKED_VOICE_LEN).enumerate() {
            records.extend(voice_records(index as u32 + 1, &unpack_voice(packed)));
        }

        Ok(records)
    }
}

fn require_voice_len(data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() != expected {
        return Err(DecodeError::new::<Dx7>(DecodeErrorKind::InvalidLength {
            found: data.len(),
            expected,
        }));
    }
    Ok(())
}

fn voice_records(slot: u32, voice: &[u8]) -> Vec<Record> {
    let name = FixedString::<NAME_LEN>::from_field(&voice[NAME_OFFSET..]);
    debug!("yamaha-dx7: decoded voice {slot} {name:?}");

    vec![
        Record::Program(slot),
        Record::Name(name.into_inner()),
        Record::Data(voice.to_vec()),
    ]
}

/// Expands one packed bulk-dump voice into the single-voice parameter layout.
///
/// Both layouts store operator 6 first.
pub fn unpack_voice(packed: &[u8]) -> [u8; VOICE_LEN] {
    let mut voice = [0; VOICE_LEN];

    for op in 0..OPERATORS {
        let src = &packed[op * PACKED_OPERATOR_LEN..][..PACKED_OPERATOR_LEN];
        let dst = &mut voice[op * OPERATOR_LEN..][..OPERATOR_LEN];

        // Rates, levels, break point and depths.
        dst[..11].copy_from_slice(&src[..11]);
        // Left/right curves.
        dst[11] = src[11] & 0x03;
        dst[12] = (src[11] >> 2) & 0x03;
        // Rate scaling; detune shares its byte.
        dst[13] = src[12] & 0x07;
        // Amp mod / key velocity sensitivity.
        dst[14] = src[13] & 0x03;
        dst[15] = (src[13] >> 2) & 0x07;
        // Output level.
        dst[16] = src[14];
        // Oscillator mode, coarse and fine frequency.
        dst[17] = src[15] & 0x01;
        dst[18] = (src[15] >> 1) & 0x1F;
        dst[19] = src[16];
        dst[20] = (src[12] >> 3) & 0x0F;
    }

    let src = &packed[OPERATORS * PACKED_OPERATOR_LEN..];
    let dst = &mut voice[OPERATORS * OPERATOR_LEN..];

    // Pitch envelope rates and levels.
    dst[..8].copy_from_slice(&src[..8]);
    dst[8] = src[8] & 0x1F;
    dst[9] = src[9] & 0x07;
    dst[10] = (src[9] >> 3) & 0x01;
    // LFO speed, delay, pitch and amp mod depth.
    dst[11..15].copy_from_slice(&src[10..14]);
    dst[15] = src[14] & 0x01;
    dst[16] = (src[14] >> 1) & 0x07;
    dst[17] = (src[14] >> 4) & 0x07;
    // Transpose and name.
    dst[18] = src[15];
    dst[19..29].copy_from_slice(&src[16..26]);

    voice
}

impl Device for Dx7 {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn dump_request(
        &self,
        config: &DeviceConfig,
        item: &Selector,
    ) -> Result<DumpRequest, DeviceError> {
        let unit = INFO.unit(config)?;

        let (format, header) = match *item {
            Selector::Program(0) => (VOICE_FORMAT, voice_header(unit)),
            Selector::Program(slot) if slot <= INFO.slots => (BANK_FORMAT, bank_header(unit)),
            Selector::Program(slot) => return Err(DeviceError::InvalidSlot(slot)),
            Selector::Globals(_) => return Err(DeviceError::Unsupported(item.clone())),
        };

        Ok(DumpRequest {
            messages: vec![SysexFrame::new([YAMAHA, REQUEST | unit, format], ()).to_bytes()],
            response_header: [[SYSTEM_EXCLUSIVE].as_slice(), &header].concat(),
            response_count: 1,
        })
    }

    fn decode(&self, messages: &[RawMessage]) -> Vec<Record> {
        let mut records = Vec::new();

        for message in messages {
            let Some(payload) = message.kind.sysex() else {
                trace!("yamaha-dx7: skipping {:?}", message.kind);
                continue;
            };

            let result = match *payload {
                [YAMAHA, substatus, VOICE_FORMAT, ..] if substatus & 0xF0 == DUMP => {
                    Self::decode_voice(payload, substatus & 0x0F)
                }
                [YAMAHA, substatus, BANK_FORMAT, ..] if substatus & 0xF0 == DUMP => {
                    Self::decode_bank(payload, substatus & 0x0F)
                }
                _ => {
                    trace!("yamaha-dx7: skipping foreign SysEx at {}", message.start);
                    continue;
                }
            };

            match result {
                Ok(voice) => records.extend(voice),
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
        let unit = INFO.unit(config)?;
        INFO.check_writable(slot)?;

        let mut item = LoadItem::from_records(records, name)?;
        if let Selector::Globals(_) = item.selector {
            return Err(DeviceError::Unsupported(item.selector));
        }
        item.require_len(VOICE_LEN)?;
        require_7bit::<Self>(&item.data)?;

        write_name::<NAME_LEN>(&mut item.data[NAME_OFFSET..], item.name)?;

        Ok(vec![
            SysexFrame::checksummed(voice_header(unit), item.data).to_bytes()
        ])
    }
}
