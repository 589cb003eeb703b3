//! Capture and restore synthesizer programs and global settings over MIDI System
//! Exclusive.
//!
//! A capture flows from raw bytes through [`message::scan`] (or the strict
//! [`message::decode_stream`]) into a [`Device`](device::Device) plugin, which turns the
//! messages it recognises into a flat list of tagged [`Record`](record::Record)s. A
//! restore takes a list of records back through the plugin's
//! [`load_command`](device::Device::load_command) to produce the exact messages to send.
//!
//! Like the messages they describe, most types here implement [`Encode`](encode::Encode)
//! or [`Decode`](decode::Decode). Nothing in this crate performs I/O.

pub mod aggregate;
pub mod checksum;
pub mod decode;
pub mod device;
pub mod encode;
pub mod hex;
pub mod identity;
pub mod message;
pub mod record;
pub mod seven_bit;
pub mod string;
pub mod sysex;
pub mod version;

pub use device::{Device, DeviceConfig, DeviceError, Registry};
pub use message::{decode_stream, scan, MessageKind, RawMessage};
pub use record::{extract, Record, Selector};
