//! Terminated text encoding.
//!
//! Every byte is shifted up by one so the terminator `0x00` cannot occur
//! inside the payload. Descending text complements the shifted bytes and
//! ends with `0xFF`, so a string still sorts after every longer string it
//! prefixes.

use super::{ByteReader, CodecError};
use strata_primitives::{TERMINATOR, directed_marker};

pub(super) fn push_text(out: &mut Vec<u8>, text: &str, descending: bool) {
    out.reserve(text.len() + 1);
    for byte in text.bytes() {
        // UTF-8 never produces 0xFF, so the shift cannot overflow.
        let shifted = byte + 1;
        out.push(if descending { !shifted } else { shifted });
    }
    out.push(directed_marker(TERMINATOR, descending));
}

pub(super) fn read_text(
    reader: &mut ByteReader<'_>,
    descending: bool,
) -> Result<String, CodecError> {
    let start = reader.position();
    let terminator = directed_marker(TERMINATOR, descending);
    let mut raw = Vec::new();

    loop {
        let byte = reader
            .next_byte()
            .map_err(|_| CodecError::MissingTerminator { offset: start })?;
        if byte == terminator {
            break;
        }

        let shifted = if descending { !byte } else { byte };
        raw.push(
            shifted
                .checked_sub(1)
                .ok_or(CodecError::MissingTerminator { offset: start })?,
        );
    }

    String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)
}
