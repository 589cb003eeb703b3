//! Merging of multi-message controller idioms.
//!
//! Parameter numbers, bank numbers and data entry values travel as pairs of
//! control-change messages, one per 7-bit half. The [`Aggregator`] folds such runs
//! into single [`Composite`] messages. It holds exactly one pending composite: a new
//! message either extends it or flushes it.

use crate::message::{Controller, Half, MessageKind, RawMessage};

/// A 14-bit value assembled from two 7-bit halves.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct Value14 {
    msb: Option<u8>,
    lsb: Option<u8>,
}

impl Value14 {
    pub const fn new(msb: u8, lsb: u8) -> Self {
        Self {
            msb: Some(msb),
            lsb: Some(lsb),
        }
    }

    fn half(half: Half, value: u8) -> Self {
        let mut partial = Self::default();
        partial.fill(half, value);
        partial
    }

    /// Supplies one half. Returns `false` if that half was already present.
    fn fill(&mut self, half: Half, value: u8) -> bool {
        let slot = match half {
            Half::Msb => &mut self.msb,
            Half::Lsb => &mut self.lsb,
        };

        if slot.is_some() {
            return false;
        }

        *slot = Some(value & 0x7F);
        true
    }

    pub const fn msb(&self) -> Option<u8> {
        self.msb
    }

    pub const fn lsb(&self) -> Option<u8> {
        self.lsb
    }

    pub const fn is_complete(&self) -> bool {
        self.msb.is_some() && self.lsb.is_some()
    }

    /// Returns the combined value once both halves have been supplied.
    pub const fn get(&self) -> Option<u16> {
        match (self.msb, self.lsb) {
            (Some(msb), Some(lsb)) => Some(((msb as u16) << 7) | lsb as u16),
            _ => None,
        }
    }
}

/// The logical message carried by a [`Composite`].
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Logical {
    /// A message that took part in no merge.
    Single(MessageKind),
    SelectNrpn { channel: u8, number: Value14 },
    SelectRpn { channel: u8, number: Value14 },
    SelectBank { channel: u8, bank: Value14 },
    DataEntry { channel: u8, value: Value14 },
    /// A parameter write. The number may be incomplete if only one half was selected.
    SetNrpn { channel: u8, number: Value14, value: Value14 },
    SetRpn { channel: u8, number: Value14, value: Value14 },
    BankedProgramChange { channel: u8, bank: u16, program: u8 },
}

/// One or more consecutive messages merged into one logical message.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Composite {
    /// Start of the first constituent message.
    pub start: usize,
    /// End of the last constituent message.
    pub end: usize,
    /// Number of constituent messages.
    pub parts: usize,
    pub message: Logical,
}

impl From<RawMessage> for Composite {
    fn from(raw: RawMessage) -> Self {
        let message = match raw.kind {
            MessageKind::ControlChange {
                channel,
                control,
                value,
            } => match Controller::from_number(control) {
                Controller::SelectNrpn(half) => Logical::SelectNrpn {
                    channel,
                    number: Value14::half(half, value),
                },
                Controller::SelectRpn(half) => Logical::SelectRpn {
                    channel,
                    number: Value14::half(half, value),
                },
                Controller::SelectBank(half) => Logical::SelectBank {
                    channel,
                    bank: Value14::half(half, value),
                },
                Controller::DataEntry(half) => Logical::DataEntry {
                    channel,
                    value: Value14::half(half, value),
                },
                Controller::Other(_) => Logical::Single(raw.kind),
            },
            kind => Logical::Single(kind),
        };

        Self {
            start: raw.start,
            end: raw.end,
            parts: 1,
            message,
        }
    }
}

impl Composite {
    /// Attempts to merge `raw` into this composite according to the continuation
    /// rules. Returns `false`, leaving `self` untouched, if no rule applies.
    fn extend(&mut self, raw: &RawMessage) -> bool {
        let merged = match &raw.kind {
            MessageKind::ProgramChange { channel, program } => {
                self.extend_program(*channel, *program)
            }
            MessageKind::ControlChange {
                channel,
                control,
                value,
            } => extend_controller(
                &mut self.message,
                *channel,
                Controller::from_number(*control),
                *value,
            ),
            _ => false,
        };

        if merged {
            self.end = raw.end;
            self.parts += 1;
        }
        merged
    }

    fn extend_program(&mut self, incoming: u8, program: u8) -> bool {
        let Logical::SelectBank { channel, bank } = self.message else {
            return false;
        };

        // Half a bank number can't be told apart from a stale one.
        let Some(bank) = bank.get().filter(|_| channel == incoming) else {
            return false;
        };

        self.message = Logical::BankedProgramChange {
            channel,
            bank,
            program,
        };
        true
    }
}

fn extend_controller(
    message: &mut Logical,
    incoming: u8,
    controller: Controller,
    value: u8,
) -> bool {
    match (message, controller) {
        (Logical::SelectNrpn { channel, number }, Controller::SelectNrpn(half))
        | (Logical::SelectRpn { channel, number }, Controller::SelectRpn(half))
        | (Logical::SelectBank { channel, bank: number }, Controller::SelectBank(half))
        | (Logical::DataEntry { channel, value: number }, Controller::DataEntry(half))
        | (Logical::SetNrpn { channel, value: number, .. }, Controller::DataEntry(half))
        | (Logical::SetRpn { channel, value: number, .. }, Controller::DataEntry(half)) => {
            *channel == incoming && number.fill(half, value)
        }
        (message @ Logical::SelectNrpn { .. }, Controller::DataEntry(half))
        | (message @ Logical::SelectRpn { .. }, Controller::DataEntry(half)) => {
            let (channel, number, registered) = match message {
                Logical::SelectNrpn { channel, number } => (*channel, *number, false),
                Logical::SelectRpn { channel, number } => (*channel, *number, true),
                _ => return false,
            };

            if channel != incoming {
                return false;
            }

            let value = Value14::half(half, value);
            *message = if registered {
                Logical::SetRpn { channel, number, value }
            } else {
                Logical::SetNrpn { channel, number, value }
            };
            true
        }
        _ => false,
    }
}

/// Stateful reducer folding a message sequence into composites.
#[derive(Debug, Default)]
pub struct Aggregator {
    pending: Option<Composite>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one message, returning the previously pending composite if this message
    /// couldn't extend it.
    pub fn push(&mut self, raw: RawMessage) -> Option<Composite> {
        if let Some(pending) = &mut self.pending {
            if pending.extend(&raw) {
                return None;
            }
        }

        self.pending.replace(Composite::from(raw))
    }

    /// Flushes whatever is still pending.
    pub fn finish(self) -> Option<Composite> {
        self.pending
    }
}

/// Folds a whole message sequence into composites.
pub fn aggregate(messages: impl IntoIterator<Item = RawMessage>) -> Vec<Composite> {
    let mut aggregator = Aggregator::new();
    let mut composites: Vec<Composite> = messages
        .into_iter()
        .filter_map(|raw| aggregator.push(raw))
        .collect();

    composites.extend(aggregator.finish());
    composites
}

#[cfg(test)]
mod tests {
    use super::{aggregate, Aggregator, Logical, Value14};
    use crate::message::{decode_stream, MessageKind};

    fn composites(buffer: &[u8]) -> Vec<super::Composite> {
        aggregate(decode_stream(buffer).unwrap())
    }

    #[test]
    fn nrpn_select_pair_is_one_composite() {
        let result = composites(&[0xB2, 0x62, 0x10, 0xB2, 0x63, 0x01]);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].start, 0);
        assert_eq!(result[0].end, 6);
        assert_eq!(result[0].parts, 2);
        assert_eq!(
            result[0].message,
            Logical::SelectNrpn {
                channel: 2,
                number: Value14::new(0x01, 0x10)
            }
        );
    }

    #[test]
    fn full_nrpn_write() {
        let result = composites(&[
            0xB0, 0x63, 0x02, 0xB0, 0x62, 0x05, 0xB0, 0x06, 0x40, 0xB0, 0x26, 0x01,
        ]);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].parts, 4);
        match &result[0].message {
            Logical::SetNrpn {
                channel,
                number,
                value,
            } => {
                assert_eq!(*channel, 0);
                assert_eq!(number.get(), Some(0x105));
                assert_eq!(value.get(), Some(0x2001));
            }
            other => panic!("unexpected composite {other:?}"),
        }
    }

    #[test]
    fn rpn_write_without_lsb() {
        let result = composites(&[0xB1, 0x65, 0x00, 0xB1, 0x64, 0x00, 0xB1, 0x06, 0x0C]);

        assert_eq!(result.len(), 1);
        match &result[0].message {
            Logical::SetRpn { number, value, .. } => {
                assert_eq!(number.get(), Some(0));
                assert_eq!(value.msb(), Some(0x0C));
                assert!(!value.is_complete());
            }
            other => panic!("unexpected composite {other:?}"),
        }
    }

    #[test]
    fn repeated_half_starts_new_composite() {
        let result = composites(&[0xB0, 0x63, 0x01, 0xB0, 0x63, 0x02]);

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|composite| composite.parts == 1));
    }

    #[test]
    fn channel_mismatch_does_not_merge() {
        let result = composites(&[0xB0, 0x63, 0x01, 0xB1, 0x62, 0x02]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn incomplete_select_takes_data_entry() {
        let result = composites(&[0xB0, 0x63, 0x01, 0xB0, 0x06, 0x40]);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].parts, 2);
        match &result[0].message {
            Logical::SetNrpn { number, value, .. } => {
                assert_eq!(number.msb(), Some(0x01));
                assert_eq!(number.get(), None);
                assert_eq!(value.msb(), Some(0x40));
            }
            other => panic!("unexpected composite {other:?}"),
        }
    }

    #[test]
    fn select_and_data_entry_on_other_channels_stay_apart() {
        let result = composites(&[0xB0, 0x63, 0x01, 0xB0, 0x62, 0x02, 0xB1, 0x06, 0x40]);

        assert_eq!(result.len(), 2);
        assert!(matches!(result[1].message, Logical::DataEntry { channel: 1, .. }));
    }

    #[test]
    fn completed_select_refuses_more_halves() {
        let result = composites(&[0xB0, 0x65, 0x00, 0xB0, 0x64, 0x02, 0xB0, 0x64, 0x03]);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].parts, 2);
    }

    #[test]
    fn bank_and_program() {
        let result = composites(&[0xB3, 0x00, 0x01, 0xB3, 0x20, 0x02, 0xC3, 0x05, 0x93, 0x3C, 0x40]);

        assert_eq!(result.len(), 2);
        assert_eq!(
            result[0].message,
            Logical::BankedProgramChange {
                channel: 3,
                bank: 0x82,
                program: 5
            }
        );
        assert_eq!(result[0].end, 8);
        assert!(matches!(
            result[1].message,
            Logical::Single(MessageKind::NoteOn { .. })
        ));
    }

    #[test]
    fn half_bank_and_program_stay_apart() {
        let result = composites(&[0xB0, 0x00, 0x01, 0xC0, 0x05]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn push_flushes_previous() {
        let messages = decode_stream(&[0xF8, 0xB0, 0x07, 0x64]).unwrap();
        let mut aggregator = Aggregator::new();
        let mut messages = messages.into_iter();

        assert_eq!(aggregator.push(messages.next().unwrap()), None);
        let flushed = aggregator.push(messages.next().unwrap()).unwrap();
        assert_eq!(flushed.message, Logical::Single(MessageKind::Clock));

        let last = aggregator.finish().unwrap();
        assert_eq!(last.end - last.start, 3);
    }

    #[test]
    fn empty_input() {
        assert!(aggregate(Vec::new()).is_empty());
    }
}
