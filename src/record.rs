//! Tagged records.
//!
//! A capture is stored as a flat, ordered list of records. `program:` and
//! `globals:` records open a logical item; the `name:` and `data:` records after
//! them belong to that item until the next opener.
//!
//! | Line                   | Record              |
//! |------------------------|---------------------|
//! | `program:<slot>`       | [`Record::Program`] |
//! | `name:<text>`          | [`Record::Name`]    |
//! | `globals:<category>`   | [`Record::Globals`] |
//! | `data:<opaque bytes>`  | [`Record::Data`]    |
//!
//! Lines are matched on their literal `tag:` prefix only, so everything after the
//! first colon is taken verbatim and payload bytes need no escaping.

use core::{fmt, str::FromStr};

use thiserror::Error;

use crate::hex;

pub mod tags {
    pub const PROGRAM: &str = "program:";
    pub const NAME: &str = "name:";
    pub const GLOBALS: &str = "globals:";
    pub const DATA: &str = "data:";
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Line does not start with a known tag")]
    UnknownTag,

    #[error("Invalid program slot {0:?}")]
    InvalidSlot(String),

    #[error("Record text is not valid UTF-8")]
    InvalidText,

    #[error("Record list does not start with a program or globals record")]
    MissingOpener,

    #[error("Record list holds no data for the item")]
    MissingData,
}

/// One entry of a tagged record list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Record {
    /// Opens a stored program. Slot 0 is the edit buffer.
    Program(u32),
    Name(String),
    /// Opens a globals category.
    Globals(String),
    /// Device-specific payload; never interpreted outside of the owning plugin.
    Data(Vec<u8>),
}

impl Record {
    /// Whether this record starts a new logical item.
    pub const fn is_opener(&self) -> bool {
        matches!(self, Self::Program(_) | Self::Globals(_))
    }

    /// Returns the selector naming the item this record opens.
    pub fn selector(&self) -> Option<Selector> {
        match self {
            Self::Program(slot) => Some(Selector::Program(*slot)),
            Self::Globals(category) => Some(Selector::Globals(category.clone())),
            Self::Name(_) | Self::Data(_) => None,
        }
    }

    /// Encodes the record as a raw line, with `data:` payloads copied verbatim.
    pub fn to_line(&self) -> Vec<u8> {
        match self {
            Self::Data(data) => [tags::DATA.as_bytes(), data.as_slice()].concat(),
            text => text.to_string().into_bytes(),
        }
    }

    /// Parses a raw line produced by [`Record::to_line`].
    ///
    /// # Errors
    ///
    /// Fails if the line has no known tag, if a program slot isn't a canonical
    /// decimal number, or if a textual record isn't UTF-8.
    pub fn parse_line(line: &[u8]) -> Result<Self, RecordError> {
        if let Some(data) = line.strip_prefix(tags::DATA.as_bytes()) {
            return Ok(Self::Data(data.to_vec()));
        }

        let text = core::str::from_utf8(line).map_err(|_| RecordError::InvalidText)?;
        parse_text(text, |_| Err(RecordError::UnknownTag))
    }
}

fn parse_text(
    text: &str,
    data: impl FnOnce(&str) -> Result<Record, RecordError>,
) -> Result<Record, RecordError> {
    if let Some(slot) = text.strip_prefix(tags::PROGRAM) {
        Ok(Record::Program(parse_slot(slot)?))
    } else if let Some(name) = text.strip_prefix(tags::NAME) {
        Ok(Record::Name(name.to_string()))
    } else if let Some(category) = text.strip_prefix(tags::GLOBALS) {
        Ok(Record::Globals(category.to_string()))
    } else if let Some(payload) = text.strip_prefix(tags::DATA) {
        data(payload)
    } else {
        Err(RecordError::UnknownTag)
    }
}

/// Parses a slot number, accepting only its canonical decimal spelling so that
/// text comparison and numeric comparison agree.
fn parse_slot(slot: &str) -> Result<u32, RecordError> {
    slot.parse::<u32>()
        .ok()
        .filter(|value| value.to_string() == slot)
        .ok_or_else(|| RecordError::InvalidSlot(slot.to_string()))
}

/// Text form; `data:` payloads are written as hex.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Program(slot) => write!(f, "{}{slot}", tags::PROGRAM),
            Self::Name(name) => write!(f, "{}{name}", tags::NAME),
            Self::Globals(category) => write!(f, "{}{category}", tags::GLOBALS),
            Self::Data(data) => write!(f, "{}{}", tags::DATA, hex::encode(data)),
        }
    }
}

impl FromStr for Record {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_text(s, |payload| Ok(Record::Data(hex::decode(payload))))
    }
}

/// Names one logical item: `program:<slot>` or `globals:<category>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Selector {
    Program(u32),
    Globals(String),
}

impl Selector {
    /// Whether `record` is the opener of the item this selector names.
    pub fn matches(&self, record: &Record) -> bool {
        match (self, record) {
            (Self::Program(slot), Record::Program(other)) => slot == other,
            (Self::Globals(category), Record::Globals(other)) => category == other,
            _ => false,
        }
    }

    /// Returns the record opening this item.
    pub fn opener(&self) -> Record {
        match self {
            Self::Program(slot) => Record::Program(*slot),
            Self::Globals(category) => Record::Globals(category.clone()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.opener().fmt(f)
    }
}

impl FromStr for Selector {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Record>()? {
            Record::Program(slot) => Ok(Self::Program(slot)),
            Record::Globals(category) => Ok(Self::Globals(category)),
            Record::Name(_) | Record::Data(_) => Err(RecordError::MissingOpener),
        }
    }
}

/// The records belonging to one item, as found by [`extract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item<'a> {
    /// Last name seen before the item's first data record.
    pub name: Option<&'a str>,
    /// Data payloads in list order.
    pub data: Vec<&'a [u8]>,
}

/// Finds the first item opened by `selector` and collects its records.
///
/// Collection starts right after the opener and stops at the next opener or the
/// end of the list. Returns `None` if no record opens the item.
pub fn extract<'a>(records: &'a [Record], selector: &Selector) -> Option<Item<'a>> {
    let opener = records.iter().position(|record| selector.matches(record))?;

    let mut item = Item {
        name: None,
        data: Vec::new(),
    };

    for record in records[opener + 1..].iter().take_while(|record| !record.is_opener()) {
        match record {
            Record::Name(name) if item.data.is_empty() => item.name = Some(name.as_str()),
            Record::Data(data) => item.data.push(data.as_slice()),
            _ => {}
        }
    }

    Some(item)
}

/// Returns the selectors of every item in the list, in order.
pub fn selectors(records: &[Record]) -> Vec<Selector> {
    records.iter().filter_map(Record::selector).collect()
}

/// Checks that a non-empty list starts with an opener.
pub fn validate(records: &[Record]) -> Result<(), RecordError> {
    match records.first() {
        Some(first) if !first.is_opener() => Err(RecordError::MissingOpener),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{extract, selectors, validate, Record, RecordError, Selector};

    fn capture() -> Vec<Record> {
        vec![
            Record::Program(1),
            Record::Name("FIRST".into()),
            Record::Data(vec![0x01, 0x02]),
            Record::Name("IGNORED".into()),
            Record::Data(vec![0x03]),
            Record::Globals("system".into()),
            Record::Data(vec![0x7F]),
            Record::Program(2),
            Record::Name("OLD".into()),
            Record::Name("SECOND".into()),
            Record::Data(vec![0x04]),
            Record::Program(1),
            Record::Data(vec![0x05]),
        ]
    }

    #[test]
    fn extracts_first_match_only() {
        let records = capture();
        let item = extract(&records, &"program:1".parse().unwrap()).unwrap();

        assert_eq!(item.name, Some("FIRST"));
        assert_eq!(item.data, vec![&[0x01, 0x02][..], &[0x03][..]]);
    }

    #[test]
    fn last_name_before_data_wins() {
        let records = capture();
        let item = extract(&records, &Selector::Program(2)).unwrap();

        assert_eq!(item.name, Some("SECOND"));
        assert_eq!(item.data, vec![&[0x04][..]]);
    }

    #[test]
    fn globals_stop_at_next_opener() {
        let records = capture();
        let item = extract(&records, &Selector::Globals("system".into())).unwrap();

        assert_eq!(item.name, None);
        assert_eq!(item.data, vec![&[0x7F][..]]);
    }

    #[test]
    fn missing_item() {
        let records = capture();

        assert_eq!(extract(&records, &Selector::Program(3)), None);
        assert_eq!(extract(&records, &Selector::Globals("midi".into())), None);
        assert_eq!(extract(&[], &Selector::Program(0)), None);
    }

    #[test]
    fn extract_is_idempotent() {
        let records = capture();
        let before = records.clone();
        let selector = Selector::Program(2);

        assert_eq!(extract(&records, &selector), extract(&records, &selector));
        assert_eq!(records, before);
    }

    #[test]
    fn text_form() {
        assert_eq!(Record::Program(12).to_string(), "program:12");
        assert_eq!(Record::Name("A:B".into()).to_string(), "name:A:B");
        assert_eq!(Record::Data(vec![0x0A, 0xFF]).to_string(), "data:0aff");

        assert_eq!("name:A:B".parse::<Record>(), Ok(Record::Name("A:B".into())));
        assert_eq!("data:0a ff".parse::<Record>(), Ok(Record::Data(vec![0x0A, 0xFF])));
        assert_eq!("globals:".parse::<Record>(), Ok(Record::Globals(String::new())));
        assert_eq!("slot:1".parse::<Record>(), Err(RecordError::UnknownTag));
        assert_eq!(
            "program:01".parse::<Record>(),
            Err(RecordError::InvalidSlot("01".into()))
        );
    }

    #[test]
    fn raw_lines_carry_bytes_verbatim() {
        let data = Record::Data(vec![b'p', b':', 0x00, 0xF7, b'\n']);
        let line = data.to_line();

        assert_eq!(line, b"data:p:\x00\xF7\n");
        assert_eq!(Record::parse_line(&line), Ok(data));
        assert_eq!(Record::parse_line(b"program:0"), Ok(Record::Program(0)));
        assert_eq!(Record::parse_line(b"name:\xFF"), Err(RecordError::InvalidText));
    }

    #[test]
    fn selector_text() {
        assert_eq!("globals:system".parse::<Selector>(), Ok(Selector::Globals("system".into())));
        assert_eq!(Selector::Program(7).to_string(), "program:7");
        assert_eq!("name:x".parse::<Selector>(), Err(RecordError::MissingOpener));
    }

    #[test]
    fn lists_selectors() {
        assert_eq!(
            selectors(&capture()),
            vec![
                Selector::Program(1),
                Selector::Globals("system".into()),
                Selector::Program(2),
                Selector::Program(1),
            ]
        );
    }

    #[test]
    fn validation() {
        assert_eq!(validate(&[]), Ok(()));
        assert_eq!(validate(&capture()), Ok(()));
        assert_eq!(
            validate(&[Record::Data(vec![])]),
            Err(RecordError::MissingOpener)
        );
    }
}
