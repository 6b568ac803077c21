//! Shared byte-level vocabulary for the strata value codec: type tags, path
//! markers and their registry metadata.

#[macro_use]
mod macros;

///
/// ValueTag
///
/// Canonical property value type. Declaration order is the cross-type sort
/// order of encoded values.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ValueTag {
    Null,
    Int64,
    Boolean,
    String,
    Double,
    Point,
    User,
    Reference,
}

impl ValueTag {
    /// Return the full metadata descriptor for one tag.
    #[must_use]
    pub const fn metadata(self) -> TagMetadata {
        value_tag_registry!(metadata_from_registry, self)
    }

    /// Ascending marker byte. For `Int64` this is the zero code and for
    /// `Boolean` the `false` code; both families occupy a small code band.
    #[must_use]
    pub const fn code(self) -> u8 {
        self.metadata().code
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        self.metadata().label
    }

    #[must_use]
    pub const fn payload(self) -> PayloadShape {
        self.metadata().payload
    }

    /// Resolve an ascending marker byte back to its tag.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            NULL_CODE => Some(Self::Null),
            c if c >= INT64_MIN_CODE && c <= INT64_MAX_CODE => Some(Self::Int64),
            FALSE_CODE | TRUE_CODE => Some(Self::Boolean),
            STRING_CODE => Some(Self::String),
            DOUBLE_CODE => Some(Self::Double),
            POINT_CODE => Some(Self::Point),
            USER_CODE => Some(Self::User),
            REFERENCE_CODE => Some(Self::Reference),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

///
/// TagMetadata
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TagMetadata {
    pub code: u8,
    pub label: &'static str,
    pub payload: PayloadShape,
}

///
/// PayloadShape
///
/// How the bytes following a marker are framed.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadShape {
    None,
    /// Width is carried by the marker's distance from the zero code.
    VarInt,
    Fixed(u8),
    /// Byte-shifted text closed by a terminator.
    Terminated,
    /// Sequence of nested scalar components.
    Compound,
}

/// Ordered list of all tags in registry order.
pub const ALL_VALUE_TAGS: [ValueTag; 8] = value_tag_registry!(all_tags_from_registry);

// Marker bytes. A couple of values are left between families so they can be
// adjusted without renumbering everything.
pub const NULL_CODE: u8 = ValueTag::Null.code();
pub const INT64_ZERO_CODE: u8 = ValueTag::Int64.code();
pub const INT64_MAX_WIDTH: u8 = 8;
pub const INT64_MIN_CODE: u8 = INT64_ZERO_CODE - INT64_MAX_WIDTH;
pub const INT64_MAX_CODE: u8 = INT64_ZERO_CODE + INT64_MAX_WIDTH;
pub const FALSE_CODE: u8 = ValueTag::Boolean.code();
pub const TRUE_CODE: u8 = FALSE_CODE + 1;
pub const STRING_CODE: u8 = ValueTag::String.code();
pub const DOUBLE_CODE: u8 = ValueTag::Double.code();
pub const POINT_CODE: u8 = ValueTag::Point.code();
pub const USER_CODE: u8 = ValueTag::User.code();
pub const REFERENCE_CODE: u8 = ValueTag::Reference.code();

/// Closes variable-length text and packed paths.
pub const TERMINATOR: u8 = 0x00;

/// Opens every key path element.
pub const KIND_MARKER: u8 = 0x1C;

/// Marks a path element identified by name. Sorts after every id marker.
pub const NAME_MARKER: u8 = 0x1D;

/// Presence flags for optional compound components.
pub const ABSENT_MARKER: u8 = 0x01;
pub const PRESENT_MARKER: u8 = 0x02;

/// Marker used in place of `code` when the column sorts descending.
#[must_use]
pub const fn descending_marker(code: u8) -> u8 {
    code ^ 0xFF
}

/// Apply the direction to one marker byte.
#[must_use]
pub const fn directed_marker(code: u8, descending: bool) -> u8 {
    if descending {
        descending_marker(code)
    } else {
        code
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_order_matches_code_order() {
        let codes: Vec<u8> = ALL_VALUE_TAGS.iter().map(|tag| tag.code()).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        assert_eq!(codes, sorted);
    }

    #[test]
    fn every_code_resolves_to_its_tag() {
        for tag in ALL_VALUE_TAGS {
            assert_eq!(ValueTag::from_code(tag.code()), Some(tag));
        }

        assert_eq!(ValueTag::from_code(TRUE_CODE), Some(ValueTag::Boolean));
        assert_eq!(ValueTag::from_code(INT64_MIN_CODE), Some(ValueTag::Int64));
        assert_eq!(ValueTag::from_code(INT64_MAX_CODE), Some(ValueTag::Int64));
        assert_eq!(ValueTag::from_code(KIND_MARKER), None);
    }

    #[test]
    fn int_band_does_not_overlap_neighbours() {
        assert!(NULL_CODE < INT64_MIN_CODE);
        assert!(INT64_MAX_CODE < FALSE_CODE);
        assert!(INT64_MAX_CODE < KIND_MARKER);
    }

    #[test]
    fn descending_marker_inverts_order() {
        assert!(descending_marker(NULL_CODE) > descending_marker(REFERENCE_CODE));
        assert_eq!(directed_marker(STRING_CODE, false), STRING_CODE);
        assert_eq!(directed_marker(STRING_CODE, true), 0xFF - STRING_CODE);
    }
}
