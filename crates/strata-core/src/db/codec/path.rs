//! Key path packing.
//!
//! Each element is `KIND_MARKER + text(kind)` followed by either an int64
//! id or `NAME_MARKER + text(name)`. A packed path ends with a terminator
//! unless it is being used as a range prefix.

use super::{ByteReader, CodecError, int, text};
use crate::{
    db::store::KeySelector,
    key::{IdOrName, KeyPath, PathElement},
};
use strata_primitives::{KIND_MARKER, NAME_MARKER, TERMINATOR, directed_marker};

pub(super) fn push_path(
    out: &mut Vec<u8>,
    path: &KeyPath,
    descending: bool,
    terminate: bool,
) -> Result<(), CodecError> {
    for element in path.elements() {
        push_element(out, element, descending)?;
    }
    if terminate {
        out.push(directed_marker(TERMINATOR, descending));
    }

    Ok(())
}

fn push_element(
    out: &mut Vec<u8>,
    element: &PathElement,
    descending: bool,
) -> Result<(), CodecError> {
    let id_or_name = element
        .id_or_name
        .as_ref()
        .ok_or_else(|| CodecError::IncompletePathElement {
            kind: element.kind.clone(),
        })?;

    out.push(directed_marker(KIND_MARKER, descending));
    text::push_text(out, &element.kind, descending);
    match id_or_name {
        IdOrName::Id(id) => int::push_int64(out, *id, descending),
        IdOrName::Name(name) => {
            out.push(directed_marker(NAME_MARKER, descending));
            text::push_text(out, name, descending);
        }
    }

    Ok(())
}

pub(super) fn read_path(
    reader: &mut ByteReader<'_>,
    descending: bool,
) -> Result<KeyPath, CodecError> {
    let start = reader.position();
    let terminator = directed_marker(TERMINATOR, descending);
    let kind_marker = directed_marker(KIND_MARKER, descending);
    let name_marker = directed_marker(NAME_MARKER, descending);
    let mut path = KeyPath::default();

    loop {
        let offset = reader.position();
        let marker = reader
            .next_byte()
            .map_err(|_| CodecError::MissingTerminator { offset: start })?;
        if marker == terminator {
            break;
        }
        if marker != kind_marker {
            return Err(CodecError::UnexpectedMarker {
                expected: kind_marker,
                found: marker,
                offset,
            });
        }

        let kind = text::read_text(reader, descending)?;
        let id_or_name = if reader.peek() == Some(name_marker) {
            reader.next_byte()?;
            IdOrName::Name(text::read_text(reader, descending)?)
        } else {
            IdOrName::Id(int::read_int64(reader, descending)?)
        };

        path.push(PathElement {
            kind,
            id_or_name: Some(id_or_name),
        });
    }

    if path.is_empty() {
        return Err(CodecError::EmptyPath);
    }

    Ok(path)
}

/// Pack a complete key path, terminator included, in ascending form.
pub fn encode_path(path: &KeyPath) -> Result<Vec<u8>, CodecError> {
    if path.is_empty() {
        return Err(CodecError::EmptyPath);
    }

    let mut out = Vec::new();
    push_path(&mut out, path, false, true)?;

    Ok(out)
}

/// Unpack a path produced by [`encode_path`]; trailing bytes are an error.
pub fn decode_path(bytes: &[u8]) -> Result<KeyPath, CodecError> {
    let mut reader = ByteReader::new(bytes);
    let path = read_path(&mut reader, false)?;
    reader.finish()?;

    Ok(path)
}

/// Pack a path without its terminator, for use as a range prefix.
pub fn encode_path_prefix(path: &KeyPath) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    push_path(&mut out, path, false, false)?;

    Ok(out)
}

/// Half-open selector pair covering `ancestor` and all of its descendants
/// stored under `prefix`.
///
/// The bounds sit between the smallest and largest marker that can follow a
/// packed element, so a sibling kind whose name merely extends the
/// ancestor's kind name is never included.
pub fn ancestor_range(
    prefix: &[u8],
    ancestor: &KeyPath,
) -> Result<(KeySelector, KeySelector), CodecError> {
    if ancestor.is_empty() {
        return Err(CodecError::EmptyPath);
    }

    let mut packed = prefix.to_vec();
    push_path(&mut packed, ancestor, false, false)?;

    let mut begin = packed.clone();
    begin.push(TERMINATOR);
    let mut end = packed;
    end.push(KIND_MARKER + 1);

    Ok((
        KeySelector::first_greater_or_equal(begin),
        KeySelector::first_greater_or_equal(end),
    ))
}
