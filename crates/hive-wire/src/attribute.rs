//! Typed attribute records and the record iterator
//!
//! Attribute payloads are a sequence of `(attr-id, [status], type, value)`
//! records. Read-attributes-response records carry a status byte and omit the
//! value when the status is non-success; report-attributes records carry no
//! status byte. The iterator yields one decoded record at a time and stops
//! cleanly at end-of-stream.

use tracing::trace;

use crate::error::{Result, WireError};
use crate::stream::WireReader;

/// Success status in read-attributes-response records.
pub const STATUS_SUCCESS: u8 = 0x00;

/// On-air data type tags the codec understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    Bool = 0x10,
    Bitmap8 = 0x18,
    Bitmap16 = 0x19,
    Bitmap24 = 0x1A,
    Bitmap32 = 0x1B,
    Bitmap40 = 0x1C,
    Bitmap48 = 0x1D,
    Bitmap56 = 0x1E,
    Bitmap64 = 0x1F,
    U8 = 0x20,
    U16 = 0x21,
    U24 = 0x22,
    U32 = 0x23,
    U40 = 0x24,
    U48 = 0x25,
    U56 = 0x26,
    U64 = 0x27,
    I8 = 0x28,
    I16 = 0x29,
    I24 = 0x2A,
    I32 = 0x2B,
    I40 = 0x2C,
    I48 = 0x2D,
    I56 = 0x2E,
    I64 = 0x2F,
    Enum8 = 0x30,
    Enum16 = 0x31,
    F32 = 0x39,
    OctetString = 0x41,
    CharString = 0x42,
    UtcTime = 0xE2,
}

impl DataType {
    /// Map a raw type tag; unknown tags are a record-level error.
    pub fn from_tag(tag: u8) -> Result<Self> {
        let dt = match tag {
            0x10 => Self::Bool,
            0x18 => Self::Bitmap8,
            0x19 => Self::Bitmap16,
            0x1A => Self::Bitmap24,
            0x1B => Self::Bitmap32,
            0x1C => Self::Bitmap40,
            0x1D => Self::Bitmap48,
            0x1E => Self::Bitmap56,
            0x1F => Self::Bitmap64,
            0x20 => Self::U8,
            0x21 => Self::U16,
            0x22 => Self::U24,
            0x23 => Self::U32,
            0x24 => Self::U40,
            0x25 => Self::U48,
            0x26 => Self::U56,
            0x27 => Self::U64,
            0x28 => Self::I8,
            0x29 => Self::I16,
            0x2A => Self::I24,
            0x2B => Self::I32,
            0x2C => Self::I40,
            0x2D => Self::I48,
            0x2E => Self::I56,
            0x2F => Self::I64,
            0x30 => Self::Enum8,
            0x31 => Self::Enum16,
            0x39 => Self::F32,
            0x41 => Self::OctetString,
            0x42 => Self::CharString,
            0xE2 => Self::UtcTime,
            other => return Err(WireError::UnknownDataType(other)),
        };
        Ok(dt)
    }

    /// Fixed width in bytes, or `None` for length-prefixed types.
    pub fn fixed_width(self) -> Option<usize> {
        let w = match self {
            Self::Bool | Self::Bitmap8 | Self::U8 | Self::I8 | Self::Enum8 => 1,
            Self::Bitmap16 | Self::U16 | Self::I16 | Self::Enum16 => 2,
            Self::Bitmap24 | Self::U24 | Self::I24 => 3,
            Self::Bitmap32 | Self::U32 | Self::I32 | Self::F32 | Self::UtcTime => 4,
            Self::Bitmap40 | Self::U40 | Self::I40 => 5,
            Self::Bitmap48 | Self::U48 | Self::I48 => 6,
            Self::Bitmap56 | Self::U56 | Self::I56 => 7,
            Self::Bitmap64 | Self::U64 | Self::I64 => 8,
            Self::OctetString | Self::CharString => return None,
        };
        Some(w)
    }
}

/// A decoded attribute value, tagged by shape rather than exact width.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    /// Unsigned integers, bitmaps and enumerations
    Uint(u64),
    /// Signed integers
    Int(i64),
    Float(f32),
    Str(String),
    Octets(Vec<u8>),
    /// Unix seconds
    Time(u64),
}

impl AttrValue {
    /// Numeric view used by scaling transforms; strings and octets are None.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Bool(b) => Some(f64::from(u8::from(*b))),
            AttrValue::Uint(v) => Some(*v as f64),
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(f64::from(*v)),
            AttrValue::Time(v) => Some(*v as f64),
            AttrValue::Str(_) | AttrValue::Octets(_) => None,
        }
    }

    /// Decode one value of the given type from the reader.
    pub fn read(r: &mut WireReader<'_>, dt: DataType) -> Self {
        match dt {
            DataType::Bool => AttrValue::Bool(r.read_bool()),
            DataType::Bitmap8
            | DataType::Bitmap16
            | DataType::Bitmap24
            | DataType::Bitmap32
            | DataType::Bitmap40
            | DataType::Bitmap48
            | DataType::Bitmap56
            | DataType::Bitmap64
            | DataType::U8
            | DataType::U16
            | DataType::U24
            | DataType::U32
            | DataType::U40
            | DataType::U48
            | DataType::U56
            | DataType::U64
            | DataType::Enum8
            | DataType::Enum16 => {
                let width = dt.fixed_width().unwrap_or(1);
                AttrValue::Uint(r.read_uint(width))
            }
            DataType::I8
            | DataType::I16
            | DataType::I24
            | DataType::I32
            | DataType::I40
            | DataType::I48
            | DataType::I56
            | DataType::I64 => {
                let width = dt.fixed_width().unwrap_or(1);
                AttrValue::Int(r.read_int(width))
            }
            DataType::F32 => AttrValue::Float(r.read_f32()),
            DataType::CharString => AttrValue::Str(r.read_string()),
            DataType::OctetString => AttrValue::Octets(r.read_octets()),
            DataType::UtcTime => AttrValue::Time(r.read_utc_time()),
        }
    }
}

/// One `(attr-id, [status], type, value)` record.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrRecord {
    /// Attribute identifier
    pub attr_id: u16,
    /// Status byte, present in read-attributes-response payloads
    pub status: Option<u8>,
    /// Data type tag
    pub data_type: DataType,
    /// Decoded value; `None` for failed read-response records
    pub value: Option<AttrValue>,
}

/// Payload layout the iterator expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    /// report-attributes: no status byte
    Report,
    /// read-attributes-response: status byte before the type
    ReadResponse,
}

/// Iterator over attribute records in a frame payload.
///
/// Yields `Ok(record)` per well-formed record, `Err` for a record with an
/// unknown type tag (iteration stops, the rest of the payload cannot be
/// framed), and ends cleanly at end-of-stream.
pub struct AttrRecordIter<'a> {
    reader: WireReader<'a>,
    layout: RecordLayout,
    done: bool,
}

impl<'a> AttrRecordIter<'a> {
    pub fn new(payload: &'a [u8], layout: RecordLayout) -> Self {
        Self { reader: WireReader::new(payload), layout, done: false }
    }
}

impl Iterator for AttrRecordIter<'_> {
    type Item = Result<AttrRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.reader.remaining() == 0 {
            return None;
        }

        let attr_id = self.reader.read_u16();
        let status = match self.layout {
            RecordLayout::Report => None,
            RecordLayout::ReadResponse => Some(self.reader.read_u8()),
        };

        // A failed read-response record carries no type or value.
        if let Some(st) = status {
            if st != STATUS_SUCCESS {
                if !self.reader.ok() {
                    self.done = true;
                    return None;
                }
                trace!("attr 0x{:04X} read failed with status 0x{:02X}", attr_id, st);
                return Some(Ok(AttrRecord {
                    attr_id,
                    status,
                    data_type: DataType::U8,
                    value: None,
                }));
            }
        }

        let tag = self.reader.read_u8();
        if !self.reader.ok() {
            // Truncated record: stop without yielding.
            self.done = true;
            return None;
        }
        let data_type = match DataType::from_tag(tag) {
            Ok(dt) => dt,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        let value = AttrValue::read(&mut self.reader, data_type);
        if !self.reader.ok() {
            self.done = true;
            return None;
        }

        Some(Ok(AttrRecord { attr_id, status, data_type, value: Some(value) }))
    }
}
