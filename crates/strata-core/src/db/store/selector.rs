use serde::{Deserialize, Serialize};

///
/// KeySelector
///
/// Picks a key relative to a reference key: the last key `< key`
/// (or `<= key` when `or_equal`), then moves `offset` keys forward.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct KeySelector {
    key: Vec<u8>,
    or_equal: bool,
    offset: i32,
}

impl KeySelector {
    #[must_use]
    pub const fn new(key: Vec<u8>, or_equal: bool, offset: i32) -> Self {
        Self {
            key,
            or_equal,
            offset,
        }
    }

    #[must_use]
    pub fn first_greater_or_equal(key: impl Into<Vec<u8>>) -> Self {
        Self::new(key.into(), false, 1)
    }

    #[must_use]
    pub fn first_greater_than(key: impl Into<Vec<u8>>) -> Self {
        Self::new(key.into(), true, 1)
    }

    #[must_use]
    pub fn last_less_than(key: impl Into<Vec<u8>>) -> Self {
        Self::new(key.into(), false, 0)
    }

    #[must_use]
    pub fn last_less_or_equal(key: impl Into<Vec<u8>>) -> Self {
        Self::new(key.into(), true, 0)
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[must_use]
    pub const fn or_equal(&self) -> bool {
        self.or_equal
    }

    #[must_use]
    pub const fn offset(&self) -> i32 {
        self.offset
    }

    /// Position of the selected key within an ordered key list; may equal
    /// `keys.len()` when the selection runs past the end.
    #[must_use]
    pub fn resolve<K: AsRef<[u8]>>(&self, keys: &[K]) -> usize {
        let base = keys.partition_point(|k| {
            if self.or_equal {
                k.as_ref() <= self.key.as_slice()
            } else {
                k.as_ref() < self.key.as_slice()
            }
        });
        let position = i64::try_from(base).unwrap_or(i64::MAX) - 1 + i64::from(self.offset);
        let len = i64::try_from(keys.len()).unwrap_or(i64::MAX);

        usize::try_from(position.clamp(0, len)).unwrap_or(0)
    }
}

///
/// TESTS
///
