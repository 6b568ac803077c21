//! Module: db::codec
//! Responsibility: stateless, order-preserving byte encoding of property
//! values and key paths, in ascending and descending forms.
//! Does not own: key layout of any index (see `db::index`).
//!
//! Every value starts with its type marker; a descending column uses the
//! complemented marker and complements the payload, so byte order of the
//! encoding is the value order (ascending) or its reverse (descending).

mod cursor;
mod double;
mod error;
mod int;
mod path;
mod text;

#[cfg(test)]
mod tests;

use crate::{
    MAX_INDEXED_STRING_BYTES,
    key::{EntityKey, IdOrName, KeyPath},
    value::{PointValue, UserValue, Value},
};
use strata_primitives::{
    ABSENT_MARKER, DOUBLE_CODE, FALSE_CODE, NULL_CODE, POINT_CODE, PRESENT_MARKER,
    REFERENCE_CODE, STRING_CODE, TRUE_CODE, USER_CODE, ValueTag, directed_marker,
};

// re-exports
pub use cursor::{CursorDecodeError, decode_cursor, encode_cursor};
pub use error::CodecError;
pub use int::{decode_sortable_int, encode_sortable_int};
pub use path::{ancestor_range, decode_path, encode_path, encode_path_prefix};

///
/// EncodedValue
///
/// A value paired with its encoding for one column direction.
///

#[derive(Clone, Debug, PartialEq)]
pub struct EncodedValue {
    raw: Value,
    encoded: Vec<u8>,
    descending: bool,
}

impl EncodedValue {
    pub fn try_new(raw: Value, descending: bool) -> Result<Self, CodecError> {
        let encoded = encode_value(&raw, descending)?;

        Ok(Self {
            raw,
            encoded,
            descending,
        })
    }

    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.raw
    }

    #[must_use]
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    #[must_use]
    pub const fn is_descending(&self) -> bool {
        self.descending
    }

    #[must_use]
    pub fn into_encoded(self) -> Vec<u8> {
        self.encoded
    }
}

/// Encode one property value for an ascending or descending column.
pub fn encode_value(value: &Value, descending: bool) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    push_value(&mut out, value, descending)?;

    Ok(out)
}

/// Decode one value starting at `pos`, returning it with the offset just
/// past its encoding.
pub fn decode_value(
    bytes: &[u8],
    pos: usize,
    descending: bool,
) -> Result<(Value, usize), CodecError> {
    let mut reader = ByteReader::at(bytes, pos);
    let value = read_value(&mut reader, descending)?;

    Ok((value, reader.position()))
}

/// Decode a buffer that holds exactly one encoded value.
pub fn decode_value_exact(bytes: &[u8], descending: bool) -> Result<Value, CodecError> {
    let mut reader = ByteReader::new(bytes);
    let value = read_value(&mut reader, descending)?;
    reader.finish()?;

    Ok(value)
}

pub(crate) fn push_value(
    out: &mut Vec<u8>,
    value: &Value,
    descending: bool,
) -> Result<(), CodecError> {
    match value {
        Value::Null => out.push(directed_marker(NULL_CODE, descending)),
        Value::Int64(v) => int::push_int64(out, *v, descending),
        Value::Boolean(v) => {
            let code = if *v { TRUE_CODE } else { FALSE_CODE };
            out.push(directed_marker(code, descending));
        }
        Value::String(v) => {
            check_text_len(v)?;
            out.push(directed_marker(STRING_CODE, descending));
            text::push_text(out, v, descending);
        }
        Value::Double(v) => {
            out.push(directed_marker(DOUBLE_CODE, descending));
            double::push_double(out, *v, descending);
        }
        Value::Point(point) => {
            out.push(directed_marker(POINT_CODE, descending));
            double::push_double(out, point.x, descending);
            double::push_double(out, point.y, descending);
        }
        Value::User(user) => {
            check_text_len(&user.email)?;
            check_text_len(&user.auth_domain)?;
            for field in [
                &user.nickname,
                &user.federated_identity,
                &user.federated_provider,
            ] {
                check_text_len(field.as_deref().unwrap_or_default())?;
            }
            out.push(directed_marker(USER_CODE, descending));
            text::push_text(out, &user.email, descending);
            text::push_text(out, &user.auth_domain, descending);
            for field in [
                &user.nickname,
                &user.federated_identity,
                &user.federated_provider,
            ] {
                push_optional_text(out, field.as_deref(), descending);
            }
        }
        Value::Reference(key) => {
            for element in key.path.elements() {
                if let Some(IdOrName::Name(name)) = &element.id_or_name {
                    check_text_len(name)?;
                }
            }
            out.push(directed_marker(REFERENCE_CODE, descending));
            text::push_text(out, &key.project_id, descending);
            text::push_text(out, &key.namespace, descending);
            path::push_path(out, &key.path, descending, true)?;
        }
    }

    Ok(())
}

// Indexed text is capped before any of its bytes are written.
fn check_text_len(text: &str) -> Result<(), CodecError> {
    if text.len() > MAX_INDEXED_STRING_BYTES {
        return Err(CodecError::ValueTooLarge {
            len: text.len(),
            max: MAX_INDEXED_STRING_BYTES,
        });
    }

    Ok(())
}

fn push_optional_text(out: &mut Vec<u8>, field: Option<&str>, descending: bool) {
    match field {
        Some(text) => {
            out.push(directed_marker(PRESENT_MARKER, descending));
            text::push_text(out, text, descending);
        }
        None => out.push(directed_marker(ABSENT_MARKER, descending)),
    }
}

pub(crate) fn read_value(
    reader: &mut ByteReader<'_>,
    descending: bool,
) -> Result<Value, CodecError> {
    let offset = reader.position();
    let code = reader.next_directed(descending)?;
    let tag = ValueTag::from_code(code).ok_or(CodecError::UnknownMarker {
        marker: code,
        offset,
    })?;

    let value = match tag {
        ValueTag::Null => Value::Null,
        ValueTag::Int64 => Value::Int64(int::read_int64_payload(reader, code, offset, descending)?),
        ValueTag::Boolean => Value::Boolean(code == TRUE_CODE),
        ValueTag::String => Value::String(text::read_text(reader, descending)?),
        ValueTag::Double => Value::Double(double::read_double(reader, descending)?),
        ValueTag::Point => {
            let x = double::read_double(reader, descending)?;
            let y = double::read_double(reader, descending)?;
            Value::Point(PointValue::new(x, y))
        }
        ValueTag::User => Value::User(UserValue {
            email: text::read_text(reader, descending)?,
            auth_domain: text::read_text(reader, descending)?,
            nickname: read_optional_text(reader, descending)?,
            federated_identity: read_optional_text(reader, descending)?,
            federated_provider: read_optional_text(reader, descending)?,
        }),
        ValueTag::Reference => {
            let project_id = text::read_text(reader, descending)?;
            let namespace = text::read_text(reader, descending)?;
            let path = path::read_path(reader, descending)?;
            Value::Reference(EntityKey::new(project_id, namespace, path))
        }
    };

    Ok(value)
}

fn read_optional_text(
    reader: &mut ByteReader<'_>,
    descending: bool,
) -> Result<Option<String>, CodecError> {
    let offset = reader.position();
    match reader.next_directed(descending)? {
        PRESENT_MARKER => text::read_text(reader, descending).map(Some),
        ABSENT_MARKER => Ok(None),
        marker => Err(CodecError::UnknownMarker { marker, offset }),
    }
}

// Append `bytes`, complemented for descending columns.
pub(super) fn push_directed(out: &mut Vec<u8>, bytes: &[u8], descending: bool) {
    if descending {
        out.extend(bytes.iter().map(|byte| !byte));
    } else {
        out.extend_from_slice(bytes);
    }
}

///
/// ByteReader
///
/// Forward-only reader over an encoded buffer that reports offsets in
/// decode errors.
///

#[derive(Clone, Debug)]
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) const fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    pub(crate) const fn position(&self) -> usize {
        self.pos
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos.min(self.bytes.len())..]
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub(crate) fn next_byte(&mut self) -> Result<u8, CodecError> {
        let byte = self
            .peek()
            .ok_or(CodecError::Truncated { offset: self.pos })?;
        self.pos += 1;

        Ok(byte)
    }

    // Next byte in ascending form.
    pub(crate) fn next_directed(&mut self, descending: bool) -> Result<u8, CodecError> {
        let byte = self.next_byte()?;
        Ok(if descending { !byte } else { byte })
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(CodecError::Truncated { offset: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;

        Ok(slice)
    }

    pub(crate) fn read_path(&mut self) -> Result<KeyPath, CodecError> {
        path::read_path(self, false)
    }

    pub(crate) fn read_value(&mut self, descending: bool) -> Result<Value, CodecError> {
        read_value(self, descending)
    }

    pub(crate) fn read_text(&mut self) -> Result<String, CodecError> {
        text::read_text(self, false)
    }

    pub(crate) const fn finish(&self) -> Result<(), CodecError> {
        if self.pos < self.bytes.len() {
            return Err(CodecError::TrailingBytes {
                len: self.bytes.len() - self.pos,
            });
        }

        Ok(())
    }
}

/// Append ascending terminated text; used for directory path components.
pub(crate) fn push_component(out: &mut Vec<u8>, component: &str) {
    text::push_text(out, component, false);
}
