//! Module: db::index
//! Responsibility: kind and composite index key layout, keeping entries in
//! step with entity writes, and building composite indexes in the
//! background.
//! Does not own: choosing which index answers a query (see `db::query`).

mod builder;
mod composite;
mod definition;
mod kind;
mod lock;
mod manager;
mod slice;

#[cfg(test)]
mod tests;

use crate::{
    KEY_PROPERTY,
    db::{
        direction::Direction,
        query::{CursorPosition, FilterProperty, QueryCursor},
        store::{KeySelector, KeyValue, Versionstamp},
    },
    error::InternalError,
    key::{EntityKey, KeyPath},
    value::Value,
};

// re-exports
pub use builder::{BackfillCursor, BackfillProgress, CompositeIndexManager};
pub use composite::CompositeIndex;
pub use definition::{CompositeIndexDefinition, DEFINITIONS_DIR, IndexDefinitions, IndexProperty};
pub use kind::KindIndex;
pub use lock::PollingLock;
pub use manager::IndexManager;

/// Directory (under the project) holding kind indexes, one per
/// `(namespace, kind)`.
pub const KIND_INDEX_DIR: &str = "kind-indexes";

/// Directory (under the project) holding composite indexes, one per
/// `(index id, namespace)`.
pub const COMPOSITE_INDEX_DIR: &str = "composite-indexes";

///
/// IndexEntry
///
/// One decoded index row: the entity it points at, the indexed values (empty
/// for kind index rows), the versionstamp of the write that created it, and
/// the versionstamp of the write that superseded it, if any.
///

#[derive(Clone, Debug, PartialEq)]
pub struct IndexEntry {
    pub key: EntityKey,
    pub properties: Vec<(String, Value)>,
    pub commit_vs: Versionstamp,
    pub deleted_vs: Option<Versionstamp>,
}

impl IndexEntry {
    /// Whether the entry belongs to the snapshot at `read_vs`. Without a
    /// read versionstamp only live entries count.
    #[must_use]
    pub fn is_visible(&self, read_vs: Option<Versionstamp>) -> bool {
        match (read_vs, self.deleted_vs) {
            (None, deleted) => deleted.is_none(),
            (Some(read), None) => self.commit_vs < read,
            (Some(read), Some(deleted)) => self.commit_vs < read && read < deleted,
        }
    }

    /// Cursor that resumes a scan just after this entry, carrying the values
    /// of the ordered properties.
    #[must_use]
    pub fn cursor_result(&self, ordered_props: &[String]) -> QueryCursor {
        let index_values = self
            .properties
            .iter()
            .filter(|(name, _)| ordered_props.contains(name))
            .cloned()
            .collect();

        QueryCursor::new(CursorPosition {
            key: self.key.clone(),
            index_values,
            start_inclusive: false,
        })
    }
}

///
/// QueryIndex
///
/// The index chosen to answer one query.
///

#[derive(Clone, Debug)]
pub enum QueryIndex {
    Kind(KindIndex),
    Composite(CompositeIndex),
}

impl QueryIndex {
    pub fn decode(&self, kv: &KeyValue) -> Result<IndexEntry, InternalError> {
        match self {
            Self::Kind(index) => index.decode(kv),
            Self::Composite(index) => index.decode(kv),
        }
    }

    /// Indexed property names, in column order.
    #[must_use]
    pub fn prop_names(&self) -> Vec<String> {
        match self {
            Self::Kind(_) => Vec::new(),
            Self::Composite(index) => index
                .definition()
                .prop_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Column direction for `name`; the entity key is always ascending.
    #[must_use]
    pub fn direction_of(&self, name: &str) -> Option<Direction> {
        if name == KEY_PROPERTY {
            return Some(Direction::Asc);
        }

        match self {
            Self::Kind(_) => None,
            Self::Composite(index) => index.definition().direction_of(name),
        }
    }

    pub fn get_slice(
        &self,
        filter_props: &[FilterProperty],
        ancestor: Option<&KeyPath>,
        start_cursor: Option<&CursorPosition>,
        end_cursor: Option<&CursorPosition>,
        reverse: bool,
    ) -> Result<(KeySelector, KeySelector), InternalError> {
        match self {
            Self::Kind(index) => {
                index.get_slice(filter_props, ancestor, start_cursor, end_cursor, reverse)
            }
            Self::Composite(index) => {
                index.get_slice(filter_props, ancestor, start_cursor, end_cursor, reverse)
            }
        }
    }
}

// Value stored under an index key: the superseding versionstamp, or nothing.
fn decode_deleted(value: &[u8]) -> Result<Option<Versionstamp>, InternalError> {
    if value.is_empty() {
        return Ok(None);
    }

    Versionstamp::from_bytes(value)
        .map(Some)
        .ok_or_else(|| {
            InternalError::index_corruption(format!(
                "deleted marker is {} bytes, expected {}",
                value.len(),
                Versionstamp::LEN
            ))
        })
}

// Split an index key body into the part before the trailing commit
// versionstamp and the versionstamp itself.
fn split_commit_vs(body: &[u8]) -> Result<(&[u8], Versionstamp), InternalError> {
    let Some(split) = body.len().checked_sub(Versionstamp::LEN) else {
        return Err(InternalError::index_corruption(
            "index key is shorter than its commit versionstamp",
        ));
    };
    let (head, stamp) = body.split_at(split);

    Versionstamp::from_bytes(stamp)
        .map(|vs| (head, vs))
        .ok_or_else(|| InternalError::index_corruption("malformed commit versionstamp"))
}

// Entity key addressed by a `__key__` filter value.
fn key_filter_path(value: &Value) -> Result<&KeyPath, InternalError> {
    match value {
        Value::Reference(key) => Ok(&key.path),
        other => Err(InternalError::bad_query(format!(
            "{KEY_PROPERTY} filters need a key value, got {:?}",
            other.tag()
        ))),
    }
}
