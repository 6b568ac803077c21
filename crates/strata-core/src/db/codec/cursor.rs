//! Opaque query-cursor token format.
//!
//! A token is the lowercase hex rendering of a one-byte format version
//! followed by the cursor payload. Only framing lives here; the payload's
//! meaning belongs to `db::query::cursor`.

use crate::error::{ErrorOrigin, InternalError};

/// Current token framing version.
const CURSOR_FORMAT_VERSION: u8 = 1;

// Decode bound for untrusted cursor tokens. Cursors carry ordered property
// values, each capped at the indexable string size.
const MAX_CURSOR_TOKEN_HEX_LEN: usize = 32 * 1024;

///
/// CursorDecodeError
///

#[derive(Debug, Eq, thiserror::Error, PartialEq)]
pub enum CursorDecodeError {
    #[error("cursor token is empty")]
    Empty,

    #[error("cursor token exceeds max length: {len} hex chars (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("cursor token must have an even number of hex characters")]
    OddLength,

    #[error("invalid hex character at position {position}")]
    InvalidHex { position: usize },

    #[error("unsupported cursor format version {version}")]
    UnsupportedVersion { version: u8 },
}

impl From<CursorDecodeError> for InternalError {
    fn from(err: CursorDecodeError) -> Self {
        Self::validation(ErrorOrigin::Planner, format!("invalid cursor: {err}"))
    }
}

/// Frame a cursor payload as a hex token.
#[must_use]
pub fn encode_cursor(payload: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity((payload.len() + 1) * 2);
    for byte in std::iter::once(&CURSOR_FORMAT_VERSION).chain(payload) {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Unframe a hex token into its cursor payload.
///
/// Surrounding whitespace is trimmed; hex digits may be in either case.
pub fn decode_cursor(token: &str) -> Result<Vec<u8>, CursorDecodeError> {
    let token = token.trim();

    if token.is_empty() {
        return Err(CursorDecodeError::Empty);
    }
    if token.len() > MAX_CURSOR_TOKEN_HEX_LEN {
        return Err(CursorDecodeError::TooLong {
            len: token.len(),
            max: MAX_CURSOR_TOKEN_HEX_LEN,
        });
    }
    if !token.len().is_multiple_of(2) {
        return Err(CursorDecodeError::OddLength);
    }

    let digits = token.as_bytes();
    let mut framed = Vec::with_capacity(digits.len() / 2);
    for (idx, pair) in digits.chunks_exact(2).enumerate() {
        let hi = hex_nibble(pair[0]).ok_or(CursorDecodeError::InvalidHex {
            position: idx * 2 + 1,
        })?;
        let lo = hex_nibble(pair[1]).ok_or(CursorDecodeError::InvalidHex {
            position: idx * 2 + 2,
        })?;
        framed.push((hi << 4) | lo);
    }

    match framed.split_first() {
        Some((&CURSOR_FORMAT_VERSION, payload)) => Ok(payload.to_vec()),
        Some((&version, _)) => Err(CursorDecodeError::UnsupportedVersion { version }),
        None => Err(CursorDecodeError::Empty),
    }
}

const fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_carries_the_format_version() {
        let token = encode_cursor(&[0x00, 0x0a, 0xff]);
        assert_eq!(token, "01000aff");
        assert_eq!(
            decode_cursor(&token).expect("framed token should decode"),
            vec![0x00, 0x0a, 0xff]
        );
    }

    #[test]
    fn blank_and_odd_tokens_are_rejected() {
        assert_eq!(decode_cursor(" \n\t"), Err(CursorDecodeError::Empty));
        assert_eq!(decode_cursor("010"), Err(CursorDecodeError::OddLength));
    }

    #[test]
    fn invalid_hex_reports_its_position() {
        let err = decode_cursor("01zz").expect_err("non-hex digit should be rejected");
        assert_eq!(err, CursorDecodeError::InvalidHex { position: 3 });
    }

    #[test]
    fn foreign_versions_are_rejected() {
        let err = decode_cursor("07aa").expect_err("unknown version should be rejected");
        assert_eq!(err, CursorDecodeError::UnsupportedVersion { version: 7 });
    }

    #[test]
    fn oversized_tokens_are_rejected_before_decoding() {
        let token = "01".repeat(MAX_CURSOR_TOKEN_HEX_LEN / 2 + 1);
        let err = decode_cursor(&token).expect_err("oversized token should be rejected");
        assert!(
            matches!(err, CursorDecodeError::TooLong { .. }),
            "unexpected error: {err:?}"
        );
    }
}
