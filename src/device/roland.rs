//! A Roland address-mapped instrument.
//!
//! Parameters live at flat 7-bit addresses and move with two message types, both
//! carrying a Roland checksum over everything after the command byte:
//!
//! | Message | Bytes                                         |
//! |---------|-----------------------------------------------|
//! | DT1     | `F0 41 dev 00 0B 12 <addr 4> <data> cs F7`    |
//! | RQ1     | `F0 41 dev 00 0B 11 <addr 4> <size 4> cs F7`  |
//!
//! # Memory map
//!
//! | Window                 | Address       | Size |
//! |------------------------|---------------|------|
//! | `system` globals       | `00 00 00 00` | 0x20 |
//! | `controller` globals   | `00 00 01 00` | 0x10 |
//! | Edit buffer            | `03 00 00 00` | 0x40 |
//! | Edit buffer expansion  | `03 00 10 00` | 0x30 |
//! | User patch `s`         | `10 s-1 00 00`| 0x40 |
//! | User patch expansion   | `11 s-1 00 00`| 0x30 |
//!
//! A patch's base and expansion are stored as one data record, the expansion
//! appended when present. The two halves are paired when they arrive back to back,
//! in either order; an expansion with no base next to it is dropped.

use std::time::Duration;

use log::{debug, trace};

use super::{
    log_rejected, write_name, Capabilities, Device, DeviceConfig, DeviceError, DeviceInfo,
    DumpRequest, IdentityCodes, LoadItem,
};
use crate::{
    decode::{require_7bit, Decode, DecodeError, DecodeErrorKind},
    encode::Encode,
    identity::ManufacturerId,
    message::{status::SYSTEM_EXCLUSIVE, RawMessage},
    record::{Record, Selector},
    string::FixedString,
    sysex::{parse_frame, SysexFrame},
};

const ROLAND: u8 = 0x41;
const MODEL: [u8; 2] = [0x00, 0x0B];

const RQ1: u8 = 0x11;
const DT1: u8 = 0x12;

const USER_SLOTS: u32 = 64;

pub const BASE_LEN: usize = 0x40;
pub const EXPANSION_LEN: usize = 0x30;

const NAME_LEN: usize = 12;

/// Globals categories with their start address and size.
const GLOBALS: [(&str, [u8; 4], usize); 2] = [
    ("system", [0x00, 0x00, 0x00, 0x00], 0x20),
    ("controller", [0x00, 0x00, 0x01, 0x00], 0x10),
];

static INFO: DeviceInfo = DeviceInfo {
    name: "roland-generic",
    manufacturer: &[ROLAND],
    units: 0x10..=0x1F,
    slots: USER_SLOTS,
    writable: 0..=USER_SLOTS,
    timeout: Duration::from_millis(200),
    identity: Some(IdentityCodes {
        manufacturer: ManufacturerId::Short(ROLAND),
        family: MODEL[1] as u16,
        member: 0,
    }),
    globals: &["system", "controller"],
    capabilities: Capabilities::all(),
};

/// A 28-bit address spread over four 7-bit bytes, most significant first.
///
/// Sizes in RQ1 messages use the same encoding.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Address(u32);

impl Address {
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(
            (bytes[0] as u32 & 0x7F) << 21
                | (bytes[1] as u32 & 0x7F) << 14
                | (bytes[2] as u32 & 0x7F) << 7
                | (bytes[3] as u32 & 0x7F),
        )
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        [
            (self.0 >> 21) as u8 & 0x7F,
            (self.0 >> 14) as u8 & 0x7F,
            (self.0 >> 7) as u8 & 0x7F,
            self.0 as u8 & 0x7F,
        ]
    }

    pub const fn linear(self) -> u32 {
        self.0
    }

    /// The address `len` bytes further on.
    pub const fn offset(self, len: usize) -> u32 {
        self.0 + len as u32
    }
}

impl Decode for Address {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::from_bytes(<[u8; 4]>::decode(data)?))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Component {
    Base,
    Expansion,
}

/// A named region of the memory map.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Window {
    Globals(usize),
    Patch { slot: u32, component: Component },
}

impl Window {
    fn all() -> impl Iterator<Item = Self> {
        let globals = (0..GLOBALS.len()).map(Self::Globals);
        let patches = (0..=USER_SLOTS).flat_map(|slot| {
            [Component::Base, Component::Expansion].map(|component| Self::Patch { slot, component })
        });
        globals.chain(patches)
    }

    fn start(self) -> Address {
        let bytes = match self {
            Self::Globals(index) => GLOBALS[index].1,
            Self::Patch { slot: 0, component } => match component {
                Component::Base => [0x03, 0x00, 0x00, 0x00],
                Component::Expansion => [0x03, 0x00, 0x10, 0x00],
            },
            Self::Patch { slot, component } => match component {
                Component::Base => [0x10, (slot - 1) as u8, 0x00, 0x00],
                Component::Expansion => [0x11, (slot - 1) as u8, 0x00, 0x00],
            },
        };
        Address::from_bytes(bytes)
    }

    fn len(self) -> usize {
        match self {
            Self::Globals(index) => GLOBALS[index].2,
            Self::Patch {
                component: Component::Base,
                ..
            } => BASE_LEN,
            Self::Patch {
                component: Component::Expansion,
                ..
            } => EXPANSION_LEN,
        }
    }

    /// The window starting exactly at `address`.
    fn at(address: Address) -> Option<Self> {
        Self::all().find(|window| window.start() == address)
    }

    /// The window holding every byte of `address..address + len`.
    fn containing(address: Address, len: usize) -> Option<Self> {
        Self::all().find(|window| {
            let start = window.start();
            start <= address && address.offset(len) <= start.offset(window.len())
        })
    }

    fn patch(slot: u32, component: Component) -> Self {
        Self::Patch { slot, component }
    }

    fn globals(category: &str) -> Result<Self, DeviceError> {
        GLOBALS
            .iter()
            .position(|(name, ..)| *name == category)
            .map(Self::Globals)
            .ok_or_else(|| DeviceError::UnknownGlobals(category.to_string()))
    }
}

fn header(unit: u8, command: u8) -> [u8; 5] {
    [ROLAND, unit, MODEL[0], MODEL[1], command]
}

/// Builds a DT1 message, refusing data that doesn't fit one window.
fn dt1(unit: u8, address: Address, data: &[u8]) -> Result<Vec<u8>, DeviceError> {
    if Window::containing(address, data.len()).is_none() {
        return Err(DeviceError::AddressOutOfRange {
            address: address.linear(),
        });
    }
    require_7bit::<RolandGeneric>(data)?;

    let mut body = address.to_bytes().to_vec();
    body.extend_from_slice(data);

    Ok(SysexFrame::checksummed(header(unit, DT1), body).to_bytes())
}

fn rq1(unit: u8, window: Window) -> Vec<u8> {
    let size = Address(window.len() as u32);
    let body = [window.start().to_bytes(), size.to_bytes()].concat();

    SysexFrame::checksummed(header(unit, RQ1), body).to_bytes()
}

/// Contiguous DT1 data, not yet matched to a window.
struct Run {
    start: Address,
    data: Vec<u8>,
}

/// One half of a patch waiting for the other.
struct PendingPatch {
    slot: u32,
    component: Component,
    data: Vec<u8>,
}

/// Groups DT1 messages into runs and runs into records.
#[derive(Default)]
struct Assembler {
    run: Option<Run>,
    pending: Option<PendingPatch>,
    records: Vec<Record>,
}

impl Assembler {
    fn push(&mut self, address: Address, data: &[u8]) {
        if let Some(run) = self
            .run
            .as_mut()
            .filter(|run| run.start.offset(run.data.len()) == address.linear())
        {
            run.data.extend_from_slice(data);
            return;
        }

        self.close_run();
        self.run = Some(Run {
            start: address,
            data: data.to_vec(),
        });
    }

    fn close_run(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };

        let Some(window) = Window::at(run.start).filter(|window| window.len() == run.data.len())
        else {
            debug!(
                "roland-generic: dropping partial run of {} bytes at {:02x?}",
                run.data.len(),
                run.start.to_bytes()
            );
            return;
        };

        match window {
            Window::Globals(index) => {
                self.flush();
                debug!("roland-generic: decoded globals {}", GLOBALS[index].0);
                self.records.push(Record::Globals(GLOBALS[index].0.to_string()));
                self.records.push(Record::Data(run.data));
            }
            Window::Patch { slot, component } => match self.pending.take() {
                Some(pending) if pending.slot == slot && pending.component != component => {
                    let data = match component {
                        Component::Base => [run.data, pending.data].concat(),
                        Component::Expansion => [pending.data, run.data].concat(),
                    };
                    self.emit(slot, data);
                }
                other => {
                    self.pending = other;
                    self.flush();
                    self.pending = Some(PendingPatch {
                        slot,
                        component,
                        data: run.data,
                    });
                }
            },
        }
    }

    fn flush(&mut self) {
        match self.pending.take() {
            Some(PendingPatch {
                slot,
                component: Component::Base,
                data,
            }) => self.emit(slot, data),
            Some(PendingPatch { slot, .. }) => {
                debug!("roland-generic: dropping expansion of patch {slot} without its base");
            }
            None => {}
        }
    }

    fn emit(&mut self, slot: u32, data: Vec<u8>) {
        let name = FixedString::<NAME_LEN>::from_field(&data);
        debug!("roland-generic: decoded patch {slot} {name:?}");

        self.records.extend([
            Record::Program(slot),
            Record::Name(name.into_inner()),
            Record::Data(data),
        ]);
    }

    fn finish(mut self) -> Vec<Record> {
        self.close_run();
        self.flush();
        self.records
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RolandGeneric;

impl RolandGeneric {
    /// Returns the address and data of a DT1 payload.
    fn parse_dt1(payload: &[u8]) -> Result<(Address, &[u8]), DecodeError> {
        let unit = payload
            .get(1)
            .copied()
            .ok_or_else(|| DecodeError::new::<Self>(DecodeErrorKind::UnexpectedEnd))?;
        let mut body = parse_frame::<Self>(payload, &header(unit, DT1), true)?;

        let address = Address::decode(&mut body)?;
        if body.is_empty() {
            return Err(DecodeError::new::<Self>(DecodeErrorKind::UnexpectedEnd));
        }

        Ok((address, body))
    }
}

impl Device for RolandGeneric {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn dump_request(
        &self,
        config: &DeviceConfig,
        item: &Selector,
    ) -> Result<DumpRequest, DeviceError> {
        let unit = INFO.unit(config)?;

        let windows = match item {
            Selector::Program(slot) if *slot <= USER_SLOTS => vec![
                Window::patch(*slot, Component::Base),
                Window::patch(*slot, Component::Expansion),
            ],
            Selector::Program(slot) => return Err(DeviceError::InvalidSlot(*slot)),
            Selector::Globals(category) => vec![Window::globals(category)?],
        };

        let mut response_header = vec![SYSTEM_EXCLUSIVE];
        response_header.extend(header(unit, DT1));

        Ok(DumpRequest {
            messages: windows.iter().map(|window| rq1(unit, *window)).collect(),
            response_header,
            response_count: windows.len(),
        })
    }

    fn decode(&self, messages: &[RawMessage]) -> Vec<Record> {
        let mut assembler = Assembler::default();

        for message in messages {
            let Some(payload) = message.kind.sysex() else {
                trace!("roland-generic: skipping {:?}", message.kind);
                continue;
            };

            if !matches!(payload, [ROLAND, _, m0, m1, DT1, ..] if [*m0, *m1] == MODEL) {
                trace!("roland-generic: skipping foreign SysEx at {}", message.start);
                continue;
            }

            match Self::parse_dt1(payload) {
                Ok((address, data)) => assembler.push(address, data),
                Err(err) => log_rejected(INFO.name, message, &err),
            }
        }

        assembler.finish()
    }

    fn load_command(
        &self,
        config: &DeviceConfig,
        records: &[Record],
        slot: u32,
        name: Option<&str>,
    ) -> Result<Vec<Vec<u8>>, DeviceError> {
        let unit = INFO.unit(config)?;
        let LoadItem {
            selector,
            name,
            mut data,
        } = LoadItem::from_records(records, name)?;

        if let Selector::Globals(category) = &selector {
            let window = Window::globals(category)?;
            if data.len() != window.len() {
                return Err(DeviceError::DataLength {
                    expected: window.len(),
                    found: data.len(),
                });
            }
            return Ok(vec![dt1(unit, window.start(), &data)?]);
        }

        INFO.check_writable(slot)?;
        if data.len() != BASE_LEN && data.len() != BASE_LEN + EXPANSION_LEN {
            return Err(DeviceError::DataLength {
                expected: BASE_LEN + EXPANSION_LEN,
                found: data.len(),
            });
        }

        write_name::<NAME_LEN>(&mut data, name)?;

        let (base, expansion) = data.split_at(BASE_LEN);
        let mut messages = vec![dt1(
            unit,
            Window::patch(slot, Component::Base).start(),
            base,
        )?];
        if !expansion.is_empty() {
            messages.push(dt1(
                unit,
                Window::patch(slot, Component::Expansion).start(),
                expansion,
            )?);
        }

        Ok(messages)
    }
}
