//! Generic fixed-layout little-endian record codec.
//!
//! A [`Schema`] describes an ordered sequence of fields making up one
//! fixed-size record (a DZ `FileHeader` or `ChunkHeader`). [`encode`] and
//! [`decode`] are the only places that know how to turn a [`Record`] into
//! bytes and back; the two DZ record schemas themselves live in
//! [`crate::record`] and just describe their fields.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{FormatError, Result};

/// The width/interpretation of one field in a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U16,
    U32,
    /// Fixed-width opaque or string bytes.
    Bytes(usize),
}

impl FieldKind {
    pub fn width(&self) -> usize {
        match self {
            FieldKind::U16 => 2,
            FieldKind::U32 => 4,
            FieldKind::Bytes(n) => *n,
        }
    }
}

/// One field slot in a record schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Trailing NUL bytes are trimmed on decode and re-padded on encode.
    pub collapsible: bool,
}

/// A record schema: the magic value expected in the first field plus the
/// ordered list of remaining fields. `size` is the declared total width and
/// is checked against the sum of field widths.
pub struct Schema {
    pub name: &'static str,
    pub magic: &'static [u8],
    pub fields: &'static [FieldSpec],
    pub size: usize,
}

impl Schema {
    /// `sum(widths) == size`, including the 4-byte magic field.
    pub fn check(&self) -> Result<()> {
        let total: usize = 4 + self.fields.iter().map(|f| f.kind.width()).sum::<usize>();
        if total != self.size {
            return Err(FormatError::SchemaSizeMismatch {
                expected: self.size,
                actual: total,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    U16(u16),
    U32(u32),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            FieldValue::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            FieldValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// A decoded or to-be-encoded record: an ordered `(name, value)` list,
/// excluding the magic (which the schema owns).
#[derive(Debug, Clone, Default)]
pub struct Record(Vec<(&'static str, FieldValue)>);

impl Record {
    pub fn new() -> Self {
        Record(Vec::new())
    }

    pub fn set(&mut self, name: &'static str, value: FieldValue) {
        self.0.push((name, value));
    }

    pub fn get(&self, name: &str) -> Result<&FieldValue> {
        self.0
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| FormatError::MissingField(leak(name)))
    }

    pub fn get_u32(&self, name: &str) -> Result<u32> {
        self.get(name)?.as_u32().ok_or_else(|| FormatError::FieldWidth(leak(name)))
    }

    pub fn get_u16(&self, name: &str) -> Result<u16> {
        self.get(name)?.as_u16().ok_or_else(|| FormatError::FieldWidth(leak(name)))
    }

    pub fn get_bytes(&self, name: &str) -> Result<&[u8]> {
        self.get(name)?.as_bytes().ok_or_else(|| FormatError::FieldWidth(leak(name)))
    }
}

// Field names are always `&'static str` literals in practice (schema
// definitions); this only exists to satisfy the error type's lifetime when
// a caller looks a field up by a borrowed `&str`.
fn leak(name: &str) -> &'static str {
    Box::leak(name.to_string().into_boxed_str())
}

fn trim_trailing_nul(mut buf: Vec<u8>) -> Vec<u8> {
    while buf.last() == Some(&0) {
        buf.pop();
    }
    buf
}

fn pad_to(mut buf: Vec<u8>, width: usize) -> Vec<u8> {
    buf.resize(width, 0);
    buf
}

/// Pack a [`Record`] into `schema.size` bytes. Missing `Bytes` fields
/// default to all-zero; missing numeric fields are an error.
pub fn encode(schema: &Schema, record: &Record) -> Result<Vec<u8>> {
    schema.check()?;
    let mut out = vec![0u8; schema.size];
    out[0..4].copy_from_slice(schema.magic);
    let mut offset = 4;

    for field in schema.fields {
        let width = field.kind.width();
        match field.kind {
            FieldKind::U16 => {
                let v = record.get_u16(field.name)?;
                LittleEndian::write_u16(&mut out[offset..offset + width], v);
            }
            FieldKind::U32 => {
                let v = record.get_u32(field.name)?;
                LittleEndian::write_u32(&mut out[offset..offset + width], v);
            }
            FieldKind::Bytes(n) => {
                let raw = record
                    .0
                    .iter()
                    .find(|(name, _)| *name == field.name)
                    .and_then(|(_, v)| v.as_bytes())
                    .map(|b| b.to_vec())
                    .unwrap_or_default();
                let padded = pad_to(raw, n);
                out[offset..offset + n].copy_from_slice(&padded[..n]);
            }
        }
        offset += width;
    }

    Ok(out)
}

/// Decode `buf` against `schema`. Returns `Ok(None)` (the `MagicMismatch`
/// sentinel) if the magic field doesn't match — the caller decides whether
/// that's fatal.
pub fn decode(schema: &Schema, buf: &[u8]) -> Result<Option<Record>> {
    schema.check()?;
    if buf.len() != schema.size {
        return Err(FormatError::SizeMismatch {
            expected: schema.size,
            actual: buf.len(),
        });
    }
    if &buf[0..4] != schema.magic {
        return Ok(None);
    }

    let mut record = Record::new();
    let mut offset = 4;
    for field in schema.fields {
        let width = field.kind.width();
        let slice = &buf[offset..offset + width];
        let value = match field.kind {
            FieldKind::U16 => FieldValue::U16(LittleEndian::read_u16(slice)),
            FieldKind::U32 => FieldValue::U32(LittleEndian::read_u32(slice)),
            FieldKind::Bytes(_) => {
                let raw = slice.to_vec();
                let raw = if field.collapsible { trim_trailing_nul(raw) } else { raw };
                FieldValue::Bytes(raw)
            }
        };
        record.set(field.name, value);
        offset += width;
    }

    Ok(Some(record))
}
