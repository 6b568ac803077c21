//! Storage-facing engine: codec, store contract, allocation, scans, indexes
//! and query planning.

pub mod alloc;
pub mod codec;
pub mod data;
pub mod direction;
pub mod index;
pub mod iter;
pub mod query;
pub mod store;

// re-exports
pub use data::{DataManager, Entity, Property, VersionEntry};
pub use iter::ResultIterator;
