mod cbor;

use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error as ThisError;

/// Upper bound on any persisted structured record accepted for decode.
///
/// Matches the store's per-value limit; nothing larger can have been written.
pub const MAX_RECORD_BYTES: usize = 100_000 * 1_024;

///
/// SerializeError
///

#[derive(Debug, ThisError)]
pub enum SerializeError {
    #[error("serialize error: {0}")]
    Serialize(String),
    #[error("deserialize error: {0}")]
    Deserialize(String),
}

impl SerializeError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::Serialize(_) => ErrorClass::Internal,
            Self::Deserialize(_) => ErrorClass::Corruption,
        }
    }
}

impl From<SerializeError> for InternalError {
    fn from(err: SerializeError) -> Self {
        Self::new(err.class(), ErrorOrigin::Serialize, err.to_string())
    }
}

/// Serialize a value into the persisted record format.
pub fn serialize<T>(ty: &T) -> Result<Vec<u8>, SerializeError>
where
    T: Serialize,
{
    cbor::serialize(ty)
}

/// Deserialize a value produced by [`serialize`].
pub fn deserialize<T>(bytes: &[u8]) -> Result<T, SerializeError>
where
    T: DeserializeOwned,
{
    cbor::deserialize(bytes)
}
