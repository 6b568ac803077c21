//! Variable-width sortable int64 encoding.
//!
//! The marker byte carries sign and payload width: `ZERO + n` for a positive
//! value of `n` big-endian bytes, `ZERO - n` for a negative value whose
//! payload is stored offset by `2^(8n) - 1`. Descending columns complement
//! both the marker and the payload.

use super::{ByteReader, CodecError, push_directed};
use strata_primitives::{INT64_MAX_WIDTH, INT64_ZERO_CODE, directed_marker};

// Largest magnitude representable in `i` bytes.
const fn width_limit(width: usize) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * width)) - 1
    }
}

// Fewest bytes that can hold `magnitude`.
const fn byte_width(magnitude: u64) -> usize {
    let mut width = 0;
    while width_limit(width) < magnitude {
        width += 1;
    }
    width
}

#[expect(clippy::cast_possible_truncation)]
pub(super) fn push_int64(out: &mut Vec<u8>, value: i64, descending: bool) {
    if value == 0 {
        out.push(directed_marker(INT64_ZERO_CODE, descending));
        return;
    }

    let magnitude = value.unsigned_abs();
    let width = byte_width(magnitude);
    let (code, payload) = if value > 0 {
        (INT64_ZERO_CODE + width as u8, magnitude)
    } else {
        (INT64_ZERO_CODE - width as u8, width_limit(width) - magnitude)
    };

    out.push(directed_marker(code, descending));
    push_directed(out, &payload.to_be_bytes()[8 - width..], descending);
}

pub(super) fn read_int64(reader: &mut ByteReader<'_>, descending: bool) -> Result<i64, CodecError> {
    let offset = reader.position();
    let code = reader.next_directed(descending)?;

    read_int64_payload(reader, code, offset, descending)
}

// Decode the payload that follows an already consumed marker.
pub(super) fn read_int64_payload(
    reader: &mut ByteReader<'_>,
    code: u8,
    offset: usize,
    descending: bool,
) -> Result<i64, CodecError> {
    let max_width = usize::from(INT64_MAX_WIDTH);

    let (negative, width) = if code >= INT64_ZERO_CODE {
        (false, usize::from(code - INT64_ZERO_CODE))
    } else {
        (true, usize::from(INT64_ZERO_CODE - code))
    };
    if width > max_width {
        return Err(CodecError::UnknownMarker {
            marker: code,
            offset,
        });
    }

    let mut buf = [0u8; 8];
    for slot in &mut buf[8 - width..] {
        *slot = reader.next_directed(descending)?;
    }
    let payload = u64::from_be_bytes(buf);

    if negative {
        let magnitude = width_limit(width) - payload;
        let signed = -i128::from(magnitude);
        i64::try_from(signed).map_err(|_| CodecError::IntOutOfRange)
    } else {
        i64::try_from(payload).map_err(|_| CodecError::IntOutOfRange)
    }
}

/// Encode an unsigned counter into exactly `byte_count` big-endian bytes.
///
/// Values that do not fit are rejected rather than truncated.
pub fn encode_sortable_int(value: u64, byte_count: usize) -> Result<Vec<u8>, CodecError> {
    if byte_count == 0 || byte_count > 8 || value > width_limit(byte_count) {
        return Err(CodecError::ValueExceedsWidth { value, byte_count });
    }

    Ok(value.to_be_bytes()[8 - byte_count..].to_vec())
}

/// Decode bytes produced by [`encode_sortable_int`].
pub fn decode_sortable_int(bytes: &[u8]) -> Result<u64, CodecError> {
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(CodecError::Truncated { offset: 0 });
    }

    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);

    Ok(u64::from_be_bytes(buf))
}

///
/// TESTS
///
