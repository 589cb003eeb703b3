//! The instrument plugin contract.
//!
//! Every supported instrument implements [`Device`]: static metadata, a dump request
//! builder, a decoder turning received messages into [`Record`]s, and a load command
//! builder turning records back into the messages that restore them. Plugins hold no
//! mutable state; all context is passed in through [`DeviceConfig`].

use std::{collections::BTreeMap, ops::RangeInclusive, time::Duration};

use bitflags::bitflags;
use log::{trace, warn};
use thiserror::Error;

use crate::{
    decode::{Decode, DecodeError, DecodeErrorKind},
    encode::Encode,
    identity::{IdentityReply, ManufacturerId},
    message::RawMessage,
    record::{extract, validate, Record, RecordError, Selector},
    string::{FixedString, FixedStringError},
    version::Version,
};

pub mod dx7;
pub mod roland;
pub mod sequential;

pub use dx7::Dx7;
pub use roland::RolandGeneric;
pub use sequential::Prophet08;

bitflags! {
    /// What a plugin can capture and restore.
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Capabilities: u8 {
        /// Stored programs can be requested and decoded.
        const PROGRAM_DUMP = 1 << 0;
        /// The edit buffer is addressable as slot 0.
        const EDIT_BUFFER = 1 << 1;
        /// Global settings can be requested and restored.
        const GLOBALS_DUMP = 1 << 2;
        /// Answers a universal identity request.
        const IDENTITY = 1 << 3;
    }
}

/// Codes an instrument reports in its [`IdentityReply`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct IdentityCodes {
    pub manufacturer: ManufacturerId,
    pub family: u16,
    pub member: u16,
}

impl IdentityCodes {
    pub fn matches(&self, reply: &IdentityReply) -> bool {
        self.manufacturer == reply.manufacturer
            && self.family == reply.family
            && self.member == reply.member
    }
}

/// Static description of a plugin, consumed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Registry key.
    pub name: &'static str,
    /// SysEx manufacturer id as it appears after `0xF0`.
    pub manufacturer: &'static [u8],
    /// Accepted values of [`DeviceConfig::unit`].
    pub units: RangeInclusive<u8>,
    /// Number of stored program slots, not counting the edit buffer.
    pub slots: u32,
    /// Slots a load command may target.
    pub writable: RangeInclusive<u32>,
    /// How long a host should wait for each response message.
    pub timeout: Duration,
    pub identity: Option<IdentityCodes>,
    /// Globals categories, in the order the instrument stores them.
    pub globals: &'static [&'static str],
    pub capabilities: Capabilities,
}

impl DeviceInfo {
    /// Returns the configured unit if the instrument accepts it.
    pub fn unit(&self, config: &DeviceConfig) -> Result<u8, DeviceError> {
        if !self.units.contains(&config.unit) {
            return Err(DeviceError::InvalidUnit(config.unit));
        }
        Ok(config.unit)
    }

    pub fn check_writable(&self, slot: u32) -> Result<(), DeviceError> {
        if !self.writable.contains(&slot) {
            return Err(DeviceError::InvalidSlot(slot));
        }
        Ok(())
    }
}

/// Per-instrument settings supplied by the host.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// Device id / unit number the instrument answers to.
    pub unit: u8,
}

/// Messages that ask an instrument to dump one item, and how to recognise the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRequest {
    pub messages: Vec<Vec<u8>>,
    /// Every response starts with these bytes, `0xF0` included.
    pub response_header: Vec<u8>,
    pub response_count: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Unit {0} is not accepted by this instrument")]
    InvalidUnit(u8),

    #[error("Slot {0} does not exist or is not writable")]
    InvalidSlot(u32),

    #[error("Unknown globals category {0:?}")]
    UnknownGlobals(String),

    #[error("{0} is not supported by this instrument")]
    Unsupported(Selector),

    #[error("Malformed record list: {0}")]
    Record(#[from] RecordError),

    #[error("Item data has {found} bytes, expected {expected}")]
    DataLength { expected: usize, found: usize },

    #[error("Address {address:#09x} is outside of its parameter window")]
    AddressOutOfRange { address: u32 },

    #[error("Invalid program name: {0}")]
    Name(#[from] FixedStringError),

    #[error("Item data cannot be sent: {0}")]
    Data(#[from] DecodeError),
}

/// An instrument plugin.
pub trait Device: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    /// Builds the messages requesting `item` from the instrument.
    ///
    /// # Errors
    ///
    /// Fails if the unit is out of range, the slot doesn't exist, or the instrument
    /// has no way of dumping the item.
    fn dump_request(&self, config: &DeviceConfig, item: &Selector)
        -> Result<DumpRequest, DeviceError>;

    /// Interprets received messages as tagged records.
    ///
    /// Messages that don't belong to this instrument, or don't pass validation, are
    /// skipped.
    fn decode(&self, messages: &[RawMessage]) -> Vec<Record>;

    /// Builds the messages restoring the item that `records` opens into `slot`.
    ///
    /// `name` overrides the item's name record, if any. Globals items ignore `slot`.
    ///
    /// # Errors
    ///
    /// Fails rather than emit anything the instrument would misinterpret.
    fn load_command(
        &self,
        config: &DeviceConfig,
        records: &[Record],
        slot: u32,
        name: Option<&str>,
    ) -> Result<Vec<Vec<u8>>, DeviceError>;

    /// Returns the firmware version if `reply` came from this instrument.
    ///
    /// By default the four revision bytes are read as major, minor, build and beta in
    /// that order. Plugins whose instrument lays them out differently override this.
    fn identify(&self, reply: &IdentityReply) -> Option<Version> {
        let codes = self.info().identity?;
        if !codes.matches(reply) {
            return None;
        }

        Version::decode(&mut reply.revision.as_slice()).ok()
    }
}

/// The item a load command restores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadItem<'a> {
    pub selector: Selector,
    pub name: Option<&'a str>,
    /// Concatenated data payloads.
    pub data: Vec<u8>,
}

impl<'a> LoadItem<'a> {
    /// Collects the first item of `records`, with `name` taking precedence over the
    /// item's own name record.
    ///
    /// # Errors
    ///
    /// Fails if the list doesn't start with an opener or the item carries no data.
    pub fn from_records(
        records: &'a [Record],
        name: Option<&'a str>,
    ) -> Result<Self, DeviceError> {
        validate(records)?;
        let selector = records
            .first()
            .and_then(Record::selector)
            .ok_or(RecordError::MissingOpener)?;
        let item = extract(records, &selector).ok_or(RecordError::MissingOpener)?;

        if item.data.is_empty() {
            return Err(RecordError::MissingData.into());
        }

        Ok(Self {
            name: name.or(item.name),
            data: item.data.concat(),
            selector,
        })
    }

    pub fn require_len(&self, expected: usize) -> Result<(), DeviceError> {
        if self.data.len() != expected {
            return Err(DeviceError::DataLength {
                expected,
                found: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Writes `name` into a fixed-width name field, leaving the field untouched if it
/// already holds that name.
pub(crate) fn write_name<const N: usize>(
    field: &mut [u8],
    name: Option<&str>,
) -> Result<(), DeviceError> {
    let Some(name) = name else {
        return Ok(());
    };

    let name = FixedString::<N>::new(name)?;
    if FixedString::<N>::from_field(&field[..N]) != name {
        name.encode(&mut field[..N]);
    }

    Ok(())
}

/// Logs a SysEx message a decoder rejected.
pub(crate) fn log_rejected(device: &str, message: &RawMessage, err: &DecodeError) {
    match err.kind() {
        DecodeErrorKind::Checksum { .. } => {
            warn!("{device}: dropping message at {}: {err}", message.start)
        }
        _ => trace!("{device}: skipping message at {}: {err}", message.start),
    }
}

/// Name-keyed collection of plugins.
#[derive(Default)]
pub struct Registry {
    devices: BTreeMap<&'static str, Box<dyn Device>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every plugin shipped with this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Dx7);
        registry.register(Prophet08);
        registry.register(RolandGeneric);
        registry
    }

    /// Adds a plugin under its [`DeviceInfo::name`], returning any plugin it replaced.
    pub fn register(&mut self, device: impl Device + 'static) -> Option<Box<dyn Device>> {
        self.devices.insert(device.info().name, Box::new(device))
    }

    pub fn get(&self, name: &str) -> Option<&dyn Device> {
        self.devices.get(name).map(|device| &**device)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.devices.keys().copied()
    }

    /// Finds the plugin that sent `reply` and its firmware version.
    pub fn identify(&self, reply: &IdentityReply) -> Option<(&dyn Device, Version)> {
        self.devices
            .values()
            .find_map(|device| Some((&**device, device.identify(reply)?)))
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{write_name, DeviceConfig, DeviceError, LoadItem, Registry};
    use crate::{
        identity::{IdentityReply, ManufacturerId},
        record::{Record, RecordError, Selector},
        string::FixedStringError,
        version::Version,
    };

    #[test]
    fn builtin_registry() {
        let registry = Registry::builtin();

        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["roland-generic", "sequential-prophet08", "yamaha-dx7"]
        );
        assert_eq!(registry.get("yamaha-dx7").unwrap().info().slots, 32);
        assert!(registry.get("korg-m1").is_none());
    }

    #[test]
    fn identifies_by_codes() {
        let registry = Registry::builtin();
        let mut reply = IdentityReply {
            unit: 0,
            manufacturer: ManufacturerId::Short(0x01),
            family: 0xA3,
            member: 0,
            revision: [2, 1, 0, 0],
        };

        let (device, version) = registry.identify(&reply).unwrap();
        assert_eq!(device.info().name, "sequential-prophet08");
        assert_eq!(
            version,
            Version {
                major: 1,
                minor: 2,
                build: 0,
                beta: 0
            }
        );

        reply.manufacturer = ManufacturerId::Short(0x42);
        assert!(registry.identify(&reply).is_none());
    }

    #[test]
    fn default_identify_reads_revision_in_order() {
        let reply = IdentityReply {
            unit: 0x10,
            manufacturer: ManufacturerId::Short(0x41),
            family: 0x0B,
            member: 0,
            revision: [1, 4, 2, 3],
        };

        let registry = Registry::builtin();
        let (device, version) = registry.identify(&reply).unwrap();
        assert_eq!(device.info().name, "roland-generic");
        assert_eq!(version.to_string(), "1.4.2b3");
    }

    #[test]
    fn load_item_collects_first_item() {
        let records = vec![
            Record::Program(3),
            Record::Name("LEAD".into()),
            Record::Data(vec![1, 2]),
            Record::Data(vec![3]),
            Record::Program(4),
            Record::Data(vec![4]),
        ];

        let item = LoadItem::from_records(&records, None).unwrap();
        assert_eq!(item.selector, Selector::Program(3));
        assert_eq!(item.name, Some("LEAD"));
        assert_eq!(item.data, vec![1, 2, 3]);

        let item = LoadItem::from_records(&records, Some("BASS")).unwrap();
        assert_eq!(item.name, Some("BASS"));
    }

    #[test]
    fn load_item_rejects_malformed_lists() {
        assert_eq!(
            LoadItem::from_records(&[], None),
            Err(DeviceError::Record(RecordError::MissingOpener))
        );
        assert_eq!(
            LoadItem::from_records(&[Record::Data(vec![0])], None),
            Err(DeviceError::Record(RecordError::MissingOpener))
        );
        assert_eq!(
            LoadItem::from_records(&[Record::Program(0), Record::Name("X".into())], None),
            Err(DeviceError::Record(RecordError::MissingData))
        );
    }

    #[test]
    fn name_field() {
        let mut field = *b"OLD NAME\0\0";

        write_name::<10>(&mut field, Some("OLD NAME")).unwrap();
        assert_eq!(&field, b"OLD NAME\0\0");

        write_name::<10>(&mut field, Some("NEW")).unwrap();
        assert_eq!(&field, b"NEW       ");

        assert_eq!(
            write_name::<10>(&mut field, Some("WAY TOO LONG")),
            Err(DeviceError::Name(FixedStringError::TooLong {
                input_size: 12,
                max_size: 10
            }))
        );
    }

    #[test]
    fn unit_validation() {
        let registry = Registry::builtin();
        let dx7 = registry.get("yamaha-dx7").unwrap();

        assert_eq!(dx7.info().unit(&DeviceConfig { unit: 15 }), Ok(15));
        assert_eq!(
            dx7.info().unit(&DeviceConfig { unit: 16 }),
            Err(DeviceError::InvalidUnit(16))
        );
    }
}
