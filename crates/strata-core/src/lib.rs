//! Core engine for strata: the sortable value codec, entity-id allocation,
//! resumable range scans, query planning and composite secondary indexes on
//! top of an ordered transactional key-value store.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod key;
pub mod obs;
pub mod serialize;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Maximum number of bytes a single string value may occupy once indexed.
///
/// Oversized values are rejected at encode time, before anything is written.
pub const MAX_INDEXED_STRING_BYTES: usize = 1500;

/// Reserved property name that addresses the entity key in filters and orders.
pub const KEY_PROPERTY: &str = "__key__";

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, stores, serializers, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{
            direction::Direction,
            index::{CompositeIndexDefinition, IndexProperty},
            query::{Filter, FilterOp, Order, Query},
        },
        key::{EntityKey, IdOrName, KeyPath, PathElement},
        value::{PointValue, UserValue, Value},
    };
}
