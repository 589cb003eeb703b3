//! MIDI message decoding.
//!
//! [`RawMessage::decode`] turns the bytes at a given offset of a buffer into one typed
//! message together with its byte extent. [`decode_stream`] and [`scan`] apply it
//! repeatedly over a whole capture.

use core::ops::Range;

use crate::{
    decode::{DecodeError, DecodeErrorKind},
    encode::Encode,
};

/// Status bytes.
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_PRESSURE: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;

    pub const SYSTEM_EXCLUSIVE: u8 = 0xF0;
    pub const TIME_CODE: u8 = 0xF1;
    pub const SONG_POSITION: u8 = 0xF2;
    pub const SONG_SELECT: u8 = 0xF3;
    pub const TUNE_REQUEST: u8 = 0xF6;
    pub const END_OF_EXCLUSIVE: u8 = 0xF7;
    pub const CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const CONTINUE: u8 = 0xFB;
    pub const STOP: u8 = 0xFC;
    pub const ACTIVE_SENSING: u8 = 0xFE;
    pub const SYSTEM_RESET: u8 = 0xFF;
}

/// Controller numbers with a dedicated meaning.
pub mod controllers {
    pub const BANK_SELECT_MSB: u8 = 0x00;
    pub const DATA_ENTRY_MSB: u8 = 0x06;
    pub const BANK_SELECT_LSB: u8 = 0x20;
    pub const DATA_ENTRY_LSB: u8 = 0x26;
    pub const NRPN_LSB: u8 = 0x62;
    pub const NRPN_MSB: u8 = 0x63;
    pub const RPN_LSB: u8 = 0x64;
    pub const RPN_MSB: u8 = 0x65;
}

/// Which half of a 14-bit controller pair a message carries.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Half {
    Msb,
    Lsb,
}

/// Classification of a control-change controller number.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Controller {
    DataEntry(Half),
    SelectNrpn(Half),
    SelectRpn(Half),
    SelectBank(Half),
    Other(u8),
}

impl Controller {
    pub const fn from_number(number: u8) -> Self {
        use controllers::*;

        match number {
            DATA_ENTRY_MSB => Self::DataEntry(Half::Msb),
            DATA_ENTRY_LSB => Self::DataEntry(Half::Lsb),
            NRPN_MSB => Self::SelectNrpn(Half::Msb),
            NRPN_LSB => Self::SelectNrpn(Half::Lsb),
            RPN_MSB => Self::SelectRpn(Half::Msb),
            RPN_LSB => Self::SelectRpn(Half::Lsb),
            BANK_SELECT_MSB => Self::SelectBank(Half::Msb),
            BANK_SELECT_LSB => Self::SelectBank(Half::Lsb),
            other => Self::Other(other),
        }
    }
}

/// The kind of a decoded message and the fields it carries.
///
/// Channels are zero-based (0-15). 14-bit values are `msb << 7 | lsb`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum MessageKind {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    PolyPressure { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, control: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    PitchBend { channel: u8, value: u16 },

    /// Payload excludes the `0xF0` and `0xF7` framing bytes.
    SystemExclusive { payload: Vec<u8> },
    TimeCodeQuarterFrame { value: u8 },
    SongPosition { beats: u16 },
    SongSelect { song: u8 },
    TuneRequest,

    Clock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    SystemReset,
}

impl MessageKind {
    /// Returns the channel of channel-voice messages.
    pub const fn channel(&self) -> Option<u8> {
        match self {
            Self::NoteOff { channel, .. }
            | Self::NoteOn { channel, .. }
            | Self::PolyPressure { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::ChannelPressure { channel, .. }
            | Self::PitchBend { channel, .. } => Some(*channel),
            Self::SystemExclusive { .. }
            | Self::TimeCodeQuarterFrame { .. }
            | Self::SongPosition { .. }
            | Self::SongSelect { .. }
            | Self::TuneRequest
            | Self::Clock
            | Self::Start
            | Self::Continue
            | Self::Stop
            | Self::ActiveSensing
            | Self::SystemReset => None,
        }
    }

    /// Returns the classified controller and value of a control change.
    pub const fn controller(&self) -> Option<(Controller, u8)> {
        match self {
            Self::ControlChange { control, value, .. } => {
                Some((Controller::from_number(*control), *value))
            }
            _ => None,
        }
    }

    /// Returns the SysEx payload of a system-exclusive message.
    pub fn sysex(&self) -> Option<&[u8]> {
        match self {
            Self::SystemExclusive { payload } => Some(payload),
            _ => None,
        }
    }

    const fn status(&self) -> u8 {
        match self {
            Self::NoteOff { channel, .. } => status::NOTE_OFF | *channel,
            Self::NoteOn { channel, .. } => status::NOTE_ON | *channel,
            Self::PolyPressure { channel, .. } => status::POLY_PRESSURE | *channel,
            Self::ControlChange { channel, .. } => status::CONTROL_CHANGE | *channel,
            Self::ProgramChange { channel, .. } => status::PROGRAM_CHANGE | *channel,
            Self::ChannelPressure { channel, .. } => status::CHANNEL_PRESSURE | *channel,
            Self::PitchBend { channel, .. } => status::PITCH_BEND | *channel,
            Self::SystemExclusive { .. } => status::SYSTEM_EXCLUSIVE,
            Self::TimeCodeQuarterFrame { .. } => status::TIME_CODE,
            Self::SongPosition { .. } => status::SONG_POSITION,
            Self::SongSelect { .. } => status::SONG_SELECT,
            Self::TuneRequest => status::TUNE_REQUEST,
            Self::Clock => status::CLOCK,
            Self::Start => status::START,
            Self::Continue => status::CONTINUE,
            Self::Stop => status::STOP,
            Self::ActiveSensing => status::ACTIVE_SENSING,
            Self::SystemReset => status::SYSTEM_RESET,
        }
    }
}

impl Encode for MessageKind {
    fn size(&self) -> usize {
        match self {
            Self::NoteOff { .. }
            | Self::NoteOn { .. }
            | Self::PolyPressure { .. }
            | Self::ControlChange { .. }
            | Self::PitchBend { .. }
            | Self::SongPosition { .. } => 3,
            Self::ProgramChange { .. }
            | Self::ChannelPressure { .. }
            | Self::TimeCodeQuarterFrame { .. }
            | Self::SongSelect { .. } => 2,
            Self::SystemExclusive { payload } => payload.len() + 2,
            Self::TuneRequest
            | Self::Clock
            | Self::Start
            | Self::Continue
            | Self::Stop
            | Self::ActiveSensing
            | Self::SystemReset => 1,
        }
    }

    fn encode(&self, data: &mut [u8]) {
        data[0] = self.status();

        match self {
            Self::NoteOff { note, velocity, .. } | Self::NoteOn { note, velocity, .. } => {
                data[1] = *note;
                data[2] = *velocity;
            }
            Self::PolyPressure { note, pressure, .. } => {
                data[1] = *note;
                data[2] = *pressure;
            }
            Self::ControlChange { control, value, .. } => {
                data[1] = *control;
                data[2] = *value;
            }
            Self::ProgramChange { program: byte, .. }
            | Self::ChannelPressure { pressure: byte, .. }
            | Self::TimeCodeQuarterFrame { value: byte }
            | Self::SongSelect { song: byte } => data[1] = *byte,
            Self::PitchBend { value, .. } | Self::SongPosition { beats: value } => {
                data[1] = (value & 0x7F) as u8;
                data[2] = ((value >> 7) & 0x7F) as u8;
            }
            Self::SystemExclusive { payload } => {
                data[1..=payload.len()].copy_from_slice(payload);
                data[payload.len() + 1] = status::END_OF_EXCLUSIVE;
            }
            Self::TuneRequest
            | Self::Clock
            | Self::Start
            | Self::Continue
            | Self::Stop
            | Self::ActiveSensing
            | Self::SystemReset => {}
        }
    }
}

/// A message decoded from a buffer, along with the bytes it occupied.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct RawMessage {
    /// Offset of the status byte.
    pub start: usize,
    /// Offset one past the last byte of the message.
    pub end: usize,
    pub kind: MessageKind,
}

impl RawMessage {
    /// Decodes the message whose status byte is at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if the byte at `offset` is not a status byte that starts a message, if
    /// the message runs past the end of `buffer`, or if a data byte has its high bit
    /// set. A system-exclusive message interrupted by another status byte is
    /// reported as unterminated; the caller must not skip past that status byte.
    pub fn decode(buffer: &[u8], offset: usize) -> Result<Self, DecodeError> {
        let status = *buffer
            .get(offset)
            .ok_or_else(|| DecodeError::new::<Self>(DecodeErrorKind::UnexpectedEnd))?;

        if status & 0x80 == 0 {
            return Err(DecodeError::new::<Self>(DecodeErrorKind::MissingStatus {
                value: status,
            }));
        }

        let (kind, len) = if status >= status::SYSTEM_EXCLUSIVE {
            match status {
                status::SYSTEM_EXCLUSIVE => {
                    let payload = sysex_payload(buffer, offset + 1)?;
                    let len = payload.len() + 2;
                    (
                        MessageKind::SystemExclusive {
                            payload: payload.to_vec(),
                        },
                        len,
                    )
                }
                status::TIME_CODE => {
                    let [value] = data_bytes(buffer, offset)?;
                    (MessageKind::TimeCodeQuarterFrame { value }, 2)
                }
                status::SONG_POSITION => {
                    let [lsb, msb] = data_bytes(buffer, offset)?;
                    (
                        MessageKind::SongPosition {
                            beats: combine(msb, lsb),
                        },
                        3,
                    )
                }
                status::SONG_SELECT => {
                    let [song] = data_bytes(buffer, offset)?;
                    (MessageKind::SongSelect { song }, 2)
                }
                status::TUNE_REQUEST => (MessageKind::TuneRequest, 1),
                status::CLOCK => (MessageKind::Clock, 1),
                status::START => (MessageKind::Start, 1),
                status::CONTINUE => (MessageKind::Continue, 1),
                status::STOP => (MessageKind::Stop, 1),
                status::ACTIVE_SENSING => (MessageKind::ActiveSensing, 1),
                status::SYSTEM_RESET => (MessageKind::SystemReset, 1),
                value => {
                    return Err(DecodeError::new::<Self>(
                        DecodeErrorKind::UnexpectedStatus { value },
                    ))
                }
            }
        } else {
            let channel = status & 0x0F;

            match status & 0xF0 {
                status::NOTE_OFF => {
                    let [note, velocity] = data_bytes(buffer, offset)?;
                    (MessageKind::NoteOff { channel, note, velocity }, 3)
                }
                status::NOTE_ON => {
                    let [note, velocity] = data_bytes(buffer, offset)?;
                    (MessageKind::NoteOn { channel, note, velocity }, 3)
                }
                status::POLY_PRESSURE => {
                    let [note, pressure] = data_bytes(buffer, offset)?;
                    (MessageKind::PolyPressure { channel, note, pressure }, 3)
                }
                status::CONTROL_CHANGE => {
                    let [control, value] = data_bytes(buffer, offset)?;
                    (MessageKind::ControlChange { channel, control, value }, 3)
                }
                status::PROGRAM_CHANGE => {
                    let [program] = data_bytes(buffer, offset)?;
                    (MessageKind::ProgramChange { channel, program }, 2)
                }
                status::CHANNEL_PRESSURE => {
                    let [pressure] = data_bytes(buffer, offset)?;
                    (MessageKind::ChannelPressure { channel, pressure }, 2)
                }
                _ => {
                    let [lsb, msb] = data_bytes(buffer, offset)?;
                    (
                        MessageKind::PitchBend {
                            channel,
                            value: combine(msb, lsb),
                        },
                        3,
                    )
                }
            }
        };

        Ok(Self {
            start: offset,
            end: offset + len,
            kind,
        })
    }

    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Returns the bytes this message was decoded from.
    pub fn bytes<'a>(&self, buffer: &'a [u8]) -> &'a [u8] {
        &buffer[self.span()]
    }
}

/// Joins two 7-bit halves into a 14-bit value.
pub(crate) const fn combine(msb: u8, lsb: u8) -> u16 {
    ((msb as u16 & 0x7F) << 7) | (lsb as u16 & 0x7F)
}

/// Reads the `N` data bytes following the status byte at `offset`.
fn data_bytes<const N: usize>(buffer: &[u8], offset: usize) -> Result<[u8; N], DecodeError> {
    let bytes = buffer
        .get(offset + 1..offset + 1 + N)
        .ok_or_else(|| DecodeError::new::<RawMessage>(DecodeErrorKind::UnexpectedEnd))?;

    if let Some(i) = bytes.iter().position(|byte| byte & 0x80 != 0) {
        return Err(DecodeError::new::<RawMessage>(DecodeErrorKind::HighBitSet {
            offset: offset + 1 + i,
            value: bytes[i],
        }));
    }

    let mut data = [0; N];
    data.copy_from_slice(bytes);
    Ok(data)
}

/// Returns the bytes between a `0xF0` and its terminating `0xF7`.
fn sysex_payload(buffer: &[u8], from: usize) -> Result<&[u8], DecodeError> {
    let rest = buffer.get(from..).unwrap_or_default();

    match rest.iter().position(|byte| byte & 0x80 != 0) {
        Some(end) if rest[end] == status::END_OF_EXCLUSIVE => Ok(&rest[..end]),
        _ => Err(DecodeError::new::<RawMessage>(
            DecodeErrorKind::UnterminatedSysex,
        )),
    }
}

/// Decodes consecutive messages from the start of `buffer`.
///
/// Decoding stops at the first message that fails to decode, returning everything
/// decoded before it. An empty buffer yields an empty list.
///
/// # Errors
///
/// Fails if the very first message can't be decoded.
pub fn decode_stream(buffer: &[u8]) -> Result<Vec<RawMessage>, DecodeError> {
    let mut messages = Vec::new();
    let mut offset = 0;

    while offset < buffer.len() {
        match RawMessage::decode(buffer, offset) {
            Ok(message) => {
                offset = message.end;
                messages.push(message);
            }
            Err(err) if messages.is_empty() => return Err(err),
            Err(_) => break,
        }
    }

    Ok(messages)
}

/// Decodes every message in `buffer`, resynchronising after malformed input.
///
/// After a failure the scan resumes at the next byte with its high bit set, so no
/// status byte that could start a legitimate message is ever skipped.
pub fn scan(buffer: &[u8]) -> Vec<RawMessage> {
    let mut messages = Vec::new();
    let mut offset = 0;

    while offset < buffer.len() {
        match RawMessage::decode(buffer, offset) {
            Ok(message) => {
                offset = message.end;
                messages.push(message);
            }
            Err(_) => {
                offset = buffer[offset + 1..]
                    .iter()
                    .position(|byte| byte & 0x80 != 0)
                    .map_or(buffer.len(), |skip| offset + 1 + skip);
            }
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::{decode_stream, scan, Controller, Half, MessageKind, RawMessage};
    use crate::{decode::DecodeErrorKind, encode::Encode};

    #[test]
    fn channel_voice() {
        let buffer = [0x93, 0x3C, 0x64, 0xC1, 0x05, 0xE2, 0x00, 0x40];
        let messages = decode_stream(&buffer).unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages[0].kind,
            MessageKind::NoteOn {
                channel: 3,
                note: 0x3C,
                velocity: 0x64
            }
        );
        assert_eq!(messages[1].span(), 3..5);
        assert_eq!(
            messages[1].kind,
            MessageKind::ProgramChange {
                channel: 1,
                program: 5
            }
        );
        assert_eq!(
            messages[2].kind,
            MessageKind::PitchBend {
                channel: 2,
                value: 0x2000
            }
        );
    }

    #[test]
    fn sysex_payload_excludes_framing() {
        let buffer = [0xF0, 0x43, 0x20, 0x00, 0xF7, 0xF8];
        let messages = decode_stream(&buffer).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].span(), 0..5);
        assert_eq!(messages[0].kind.sysex(), Some(&[0x43, 0x20, 0x00][..]));
        assert_eq!(messages[0].bytes(&buffer), &buffer[..5]);
        assert_eq!(messages[1].kind, MessageKind::Clock);
    }

    #[test]
    fn sysex_interrupted_by_status() {
        let buffer = [0xF0, 0x43, 0x90, 0x3C, 0x64];
        let err = RawMessage::decode(&buffer, 0).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::UnterminatedSysex);

        let err = RawMessage::decode(&[0xF0, 0x43, 0x00], 0).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::UnterminatedSysex);
    }

    #[test]
    fn data_byte_with_high_bit() {
        let err = RawMessage::decode(&[0xB0, 0x07, 0x90], 0).unwrap_err();
        assert_eq!(
            err.kind(),
            DecodeErrorKind::HighBitSet {
                offset: 2,
                value: 0x90
            }
        );
    }

    #[test]
    fn truncated_message() {
        let err = RawMessage::decode(&[0x80, 0x40], 0).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::UnexpectedEnd);
    }

    #[test]
    fn undefined_status() {
        for value in [0xF4, 0xF5, 0xF7, 0xF9, 0xFD] {
            let err = RawMessage::decode(&[value], 0).unwrap_err();
            assert_eq!(err.kind(), DecodeErrorKind::UnexpectedStatus { value });
        }
    }

    #[test]
    fn empty_stream() {
        assert_eq!(decode_stream(&[]).unwrap(), vec![]);
    }

    #[test]
    fn stream_must_start_with_status() {
        let err = decode_stream(&[0x40, 0x90, 0x3C, 0x64]).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::MissingStatus { value: 0x40 });
    }

    #[test]
    fn stream_stops_at_first_failure() {
        let buffer = [0xF8, 0xFA, 0x12, 0xFC];
        let messages = decode_stream(&buffer).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].kind, MessageKind::Start);
    }

    #[test]
    fn spans_are_contiguous() {
        let buffer = [
            0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7, 0xB0, 0x63, 0x01, 0xF2, 0x10, 0x02, 0xF6,
        ];
        let messages = decode_stream(&buffer).unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].start, 0);
        for pair in messages.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(messages[3].end, buffer.len());
        assert_eq!(messages[2].kind, MessageKind::SongPosition { beats: 0x110 });
    }

    #[test]
    fn scan_resynchronises() {
        // Garbage, a SysEx cut short by a note-on, then a stray data byte.
        let buffer = [0x12, 0x34, 0xF0, 0x43, 0x91, 0x3C, 0x64, 0x05, 0xC0, 0x07];
        let messages = scan(&buffer);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].span(), 4..7);
        assert_eq!(
            messages[1].kind,
            MessageKind::ProgramChange {
                channel: 0,
                program: 7
            }
        );
    }

    #[test]
    fn classifies_controllers() {
        assert_eq!(Controller::from_number(0x63), Controller::SelectNrpn(Half::Msb));
        assert_eq!(Controller::from_number(0x62), Controller::SelectNrpn(Half::Lsb));
        assert_eq!(Controller::from_number(0x65), Controller::SelectRpn(Half::Msb));
        assert_eq!(Controller::from_number(0x26), Controller::DataEntry(Half::Lsb));
        assert_eq!(Controller::from_number(0x20), Controller::SelectBank(Half::Lsb));
        assert_eq!(Controller::from_number(0x07), Controller::Other(0x07));
    }

    #[test]
    fn encode_matches_decoded_bytes() {
        let buffer = [
            0x85, 0x40, 0x00, 0xA1, 0x40, 0x10, 0xB2, 0x07, 0x64, 0xD3, 0x22, 0xE4, 0x7F, 0x7F,
            0xF0, 0x01, 0x02, 0xF7, 0xF1, 0x23, 0xF3, 0x04, 0xFF,
        ];

        let encoded: Vec<u8> = decode_stream(&buffer)
            .unwrap()
            .iter()
            .flat_map(|message| message.kind.to_bytes())
            .collect();

        assert_eq!(encoded, buffer);
    }
}
