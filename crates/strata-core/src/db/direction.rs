use serde::{Deserialize, Serialize};

///
/// Direction
///
/// Sort direction of one index column or query order.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub const fn is_descending(self) -> bool {
        matches!(self, Self::Desc)
    }

    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    /// Stable single-byte form used inside encoded index definitions.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Asc => 1,
            Self::Desc => 2,
        }
    }
}
