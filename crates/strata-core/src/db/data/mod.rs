//! Module: db::data
//! Responsibility: versioned entity records and keeping the kind and
//! composite indexes in step with every write.
//! Does not own: index key layout (see `db::index`).

#[cfg(test)]
mod tests;

use crate::{
    config::StrataConfig,
    db::{
        codec::encode_path,
        index::{IndexDefinitions, IndexEntry, IndexManager},
        iter::ResultIterator,
        store::{DirectoryCache, KeyValue, Subspace, Transaction, Versionstamp},
    },
    error::{ErrorOrigin, InternalError},
    key::EntityKey,
    serialize::{deserialize, serialize},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Directory (under the project) holding entity versions.
pub const DATA_DIR: &str = "data";

///
/// Property
///
/// One named value. An entity may carry the same name more than once, which
/// makes the property multi-valued.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: Value,
}

impl Property {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

///
/// Entity
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Entity {
    pub key: EntityKey,
    pub properties: Vec<Property>,
}

impl Entity {
    #[must_use]
    pub const fn new(key: EntityKey, properties: Vec<Property>) -> Self {
        Self { key, properties }
    }

    /// Every value stored under `name`, in property order.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.properties
            .iter()
            .filter(move |prop| prop.name == name)
            .map(|prop| &prop.value)
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|prop| prop.name == name)
    }

    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.key.kind()
    }
}

///
/// VersionEntry
///
/// One version of an entity as read back from the store. `commit_vs` is
/// `None` when the entity was never written; `entity` is `None` for a
/// deletion marker or a missing entity.
///

#[derive(Clone, Debug, PartialEq)]
pub struct VersionEntry {
    pub key: EntityKey,
    pub commit_vs: Option<Versionstamp>,
    pub entity: Option<Entity>,
}

impl VersionEntry {
    #[must_use]
    pub const fn present(&self) -> bool {
        self.entity.is_some()
    }

    #[must_use]
    pub const fn entity(&self) -> Option<&Entity> {
        self.entity.as_ref()
    }
}

// Persisted form of one version; `None` properties mark a deletion.
#[derive(Debug, Deserialize, Serialize)]
struct StoredVersion {
    properties: Option<Vec<Property>>,
}

///
/// DataManager
///
/// Entity versions live under `(project, "data", namespace)` keyed by the
/// packed path followed by the commit versionstamp, so the newest version of
/// an entity is the last key under its path.
///

pub struct DataManager {
    directories: Arc<DirectoryCache>,
    indexes: IndexManager,
    max_entity_bytes: usize,
}

impl DataManager {
    #[must_use]
    pub fn new(
        directories: Arc<DirectoryCache>,
        definitions: Arc<IndexDefinitions>,
        config: &StrataConfig,
    ) -> Self {
        Self {
            indexes: IndexManager::new(Arc::clone(&directories), definitions),
            directories,
            max_entity_bytes: config.max_entity_bytes,
        }
    }

    #[must_use]
    pub const fn indexes(&self) -> &IndexManager {
        &self.indexes
    }

    /// Write a new version of `entity` and its index entries.
    ///
    /// The version becomes visible once `tr` commits; reads through the same
    /// transaction still see the previous version.
    pub async fn put<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        entity: &Entity,
    ) -> Result<(), InternalError> {
        let stored = serialize(&StoredVersion {
            properties: Some(entity.properties.clone()),
        })?;
        if stored.len() > self.max_entity_bytes {
            return Err(InternalError::validation(
                ErrorOrigin::Data,
                format!(
                    "entity is {} bytes, exceeding the maximum of {}",
                    stored.len(),
                    self.max_entity_bytes
                ),
            ));
        }

        let old = self.get_latest(tr, &entity.key).await?;
        self.write_version(tr, &entity.key, &stored).await?;
        self.indexes.put_entries(tr, Some(&old), Some(entity)).await
    }

    /// Write a deletion marker for `key`. Returns false when there was no
    /// live version to delete.
    pub async fn delete<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        key: &EntityKey,
    ) -> Result<bool, InternalError> {
        let old = self.get_latest(tr, key).await?;
        if !old.present() {
            return Ok(false);
        }

        let stored = serialize(&StoredVersion { properties: None })?;
        self.write_version(tr, key, &stored).await?;
        self.indexes.put_entries(tr, Some(&old), None).await?;

        Ok(true)
    }

    /// Newest committed version of `key`.
    pub async fn get_latest<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        key: &EntityKey,
    ) -> Result<VersionEntry, InternalError> {
        let entity_space = self.entity_subspace(tr, key).await?;
        let rows = ResultIterator::from_range(tr, entity_space.range().reversed(true))
            .with_limit(1)
            .list()
            .await?;

        match rows.first() {
            Some(row) => decode_version(&entity_space, key, row),
            None => Ok(VersionEntry {
                key: key.clone(),
                commit_vs: None,
                entity: None,
            }),
        }
    }

    /// The exact version an index entry points at.
    pub async fn get_entry<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        entry: &IndexEntry,
    ) -> Result<VersionEntry, InternalError> {
        let entity_space = self.entity_subspace(tr, &entry.key).await?;
        let version_key = entity_space.pack(entry.commit_vs.as_bytes());

        let Some(bytes) = tr
            .get(&version_key, false)
            .await
            .map_err(|err| InternalError::store(ErrorOrigin::Data, err))?
        else {
            return Err(InternalError::index_corruption(format!(
                "index entry for {:?} at {} has no matching version",
                entry.key.path, entry.commit_vs
            )));
        };

        let row = KeyValue {
            key: version_key,
            value: bytes,
        };
        decode_version(&entity_space, &entry.key, &row)
    }

    async fn write_version<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        key: &EntityKey,
        stored: &[u8],
    ) -> Result<(), InternalError> {
        let entity_space = self.entity_subspace(tr, key).await?;
        let version_key = entity_space.pack(Versionstamp::incomplete().as_bytes());

        tr.set_versionstamped_key(&version_key, entity_space.prefix().len(), stored)
            .map_err(|err| InternalError::store(ErrorOrigin::Data, err))
    }

    // Versions of one entity: the namespace directory plus its packed path.
    async fn entity_subspace<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        key: &EntityKey,
    ) -> Result<Subspace, InternalError> {
        let namespace = self
            .directories
            .open(tr, &[&key.project_id, DATA_DIR, &key.namespace])
            .await?;

        Ok(namespace.subspace(&encode_path(&key.path)?))
    }
}

fn decode_version(
    entity_space: &Subspace,
    key: &EntityKey,
    row: &KeyValue,
) -> Result<VersionEntry, InternalError> {
    let commit_vs = entity_space
        .unpack(row.key())
        .and_then(Versionstamp::from_bytes)
        .ok_or_else(|| {
            InternalError::data_corruption(format!(
                "malformed version key for {:?}",
                key.path
            ))
        })?;
    let stored: StoredVersion = deserialize(row.value())?;

    Ok(VersionEntry {
        key: key.clone(),
        commit_vs: Some(commit_vs),
        entity: stored
            .properties
            .map(|properties| Entity::new(key.clone(), properties)),
    })
}
