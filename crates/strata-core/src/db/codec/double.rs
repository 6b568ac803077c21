//! Sortable IEEE-754 encoding: positives flip the sign bit, negatives flip
//! every bit. Descending columns complement the result.

use super::{ByteReader, CodecError, push_directed};

fn ordered_bits(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits & (1 << 63) == 0 {
        bits ^ (1 << 63)
    } else {
        !bits
    }
}

fn from_ordered_bits(ordered: u64) -> f64 {
    let bits = if ordered & (1 << 63) != 0 {
        ordered ^ (1 << 63)
    } else {
        !ordered
    };
    f64::from_bits(bits)
}

pub(super) fn push_double(out: &mut Vec<u8>, value: f64, descending: bool) {
    push_directed(out, &ordered_bits(value).to_be_bytes(), descending);
}

pub(super) fn read_double(
    reader: &mut ByteReader<'_>,
    descending: bool,
) -> Result<f64, CodecError> {
    let mut buf = [0u8; 8];
    for slot in &mut buf {
        *slot = reader.next_directed(descending)?;
    }

    Ok(from_ordered_bits(u64::from_be_bytes(buf)))
}
