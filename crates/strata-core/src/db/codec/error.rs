use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use thiserror::Error as ThisError;

///
/// CodecError
///
/// Encode-side variants are caller mistakes; decode-side variants mean the
/// bytes were not produced by this codec.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CodecError {
    #[error("path element of kind '{kind}' has neither an id nor a name")]
    IncompletePathElement { kind: String },

    #[error("key path is empty")]
    EmptyPath,

    #[error("value is {len} bytes, exceeding the indexable maximum of {max}")]
    ValueTooLarge { len: usize, max: usize },

    #[error("value {value} does not fit in {byte_count} bytes")]
    ValueExceedsWidth { value: u64, byte_count: usize },

    #[error("encoded value truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("missing terminator for field starting at offset {offset}")]
    MissingTerminator { offset: usize },

    #[error("unknown type marker 0x{marker:02x} at offset {offset}")]
    UnknownMarker { marker: u8, offset: usize },

    #[error("expected marker 0x{expected:02x} at offset {offset}, found 0x{found:02x}")]
    UnexpectedMarker { expected: u8, found: u8, offset: usize },

    #[error("encoded text is not valid UTF-8")]
    InvalidUtf8,

    #[error("encoded integer is outside the int64 range")]
    IntOutOfRange,

    #[error("{len} trailing bytes after encoded value")]
    TrailingBytes { len: usize },
}

impl CodecError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::IncompletePathElement { .. } | Self::EmptyPath | Self::ValueTooLarge { .. } => {
                ErrorClass::Validation
            }
            Self::ValueExceedsWidth { .. } => ErrorClass::Internal,
            Self::Truncated { .. }
            | Self::MissingTerminator { .. }
            | Self::UnknownMarker { .. }
            | Self::UnexpectedMarker { .. }
            | Self::InvalidUtf8
            | Self::IntOutOfRange
            | Self::TrailingBytes { .. } => ErrorClass::Corruption,
        }
    }
}

impl From<CodecError> for InternalError {
    fn from(err: CodecError) -> Self {
        Self::new(err.class(), ErrorOrigin::Codec, err.to_string())
    }
}
