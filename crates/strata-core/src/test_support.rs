//! Shared fixtures for unit tests.

use crate::{
    config::StrataConfig,
    db::{
        data::{Entity, Property},
        store::{DirectoryCache, DirectoryLayer, MemoryStore},
    },
    key::{EntityKey, IdOrName, KeyPath},
    value::Value,
};
use std::sync::Arc;

pub(crate) const PROJECT: &str = "guestbook";

/// Fresh in-memory store plus a directory cache rooted at the default prefix.
pub(crate) fn memory_env() -> (Arc<MemoryStore>, Arc<DirectoryCache>) {
    let config = StrataConfig::default();
    let directories = DirectoryCache::new(DirectoryLayer::new(config.root_prefix_bytes()));

    (Arc::new(MemoryStore::new()), Arc::new(directories))
}

/// Key of a root entity in the default namespace.
pub(crate) fn root_key(kind: &str, id: i64) -> EntityKey {
    EntityKey::new(PROJECT, "", KeyPath::from_pairs([(kind, IdOrName::Id(id))]))
}

/// Entity with the given single-valued properties.
pub(crate) fn entity(key: EntityKey, properties: &[(&str, Value)]) -> Entity {
    Entity::new(
        key,
        properties
            .iter()
            .map(|(name, value)| Property::new(*name, value.clone()))
            .collect(),
    )
}
