use crate::{
    db::{
        codec::{decode_sortable_int, encode_sortable_int, push_component},
        direction::Direction,
        iter::ResultIterator,
        store::{
            DirectoryCache, Subspace, Transaction, Versionstamp, bump_metadata_version,
            metadata_version,
        },
    },
    error::{ErrorOrigin, InternalError},
    serialize::{deserialize, serialize},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

/// Directory (under the project) holding index definitions.
pub const DEFINITIONS_DIR: &str = "index-definitions";

// Width of the sortable id suffix on definition keys.
const ID_WIDTH: usize = 8;

// Written on every definition change; the builder watches it.
const TRIGGER_KEY: &[u8] = b"rebuild-trigger";

///
/// IndexProperty
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct IndexProperty {
    pub name: String,
    pub direction: Direction,
}

impl IndexProperty {
    #[must_use]
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }

    #[must_use]
    pub fn asc(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Asc)
    }

    #[must_use]
    pub fn desc(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Desc)
    }
}

///
/// CompositeIndexDefinition
///
/// A declared composite index. `id` is assigned once when the definition
/// is first persisted; `ready` flips to true once backfill completes and
/// never goes back.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CompositeIndexDefinition {
    pub id: Option<u64>,
    pub project_id: String,
    pub kind: String,
    pub ancestor: bool,
    pub properties: Vec<IndexProperty>,
    pub ready: bool,
}

impl CompositeIndexDefinition {
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        kind: impl Into<String>,
        ancestor: bool,
        properties: Vec<IndexProperty>,
    ) -> Self {
        Self {
            id: None,
            project_id: project_id.into(),
            kind: kind.into(),
            ancestor,
            properties,
            ready: false,
        }
    }

    /// Structural identity: kind, ancestor flag and the ordered
    /// property/direction list. Two definitions with equal encodings
    /// describe the same index regardless of id.
    #[must_use]
    pub fn encoded_def(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_component(&mut out, &self.kind);
        out.push(u8::from(self.ancestor));
        for prop in &self.properties {
            push_component(&mut out, &prop.name);
            out.push(prop.direction.as_byte());
        }

        out
    }

    #[must_use]
    pub fn prop_names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name.as_str()).collect()
    }

    /// Direction of the column for `name`, if the index has one.
    #[must_use]
    pub fn direction_of(&self, name: &str) -> Option<Direction> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.direction)
    }

    /// Assigned id, or an error for a definition that was never persisted.
    pub fn require_id(&self) -> Result<u64, InternalError> {
        self.id.ok_or_else(|| {
            InternalError::internal(
                ErrorOrigin::Index,
                format!("index definition for kind '{}' has no id", self.kind),
            )
        })
    }
}

///
/// IndexDefinitions
///
/// Per-project definition registry. Reads are cached per project together
/// with the metadata version they were read under; any definition change
/// bumps that version, so a stale cache is detected with one key read.
///

pub struct IndexDefinitions {
    directories: Arc<DirectoryCache>,
    cache: Mutex<HashMap<String, CachedDefinitions>>,
}

struct CachedDefinitions {
    metadata_version: Option<Vec<u8>>,
    definitions: Vec<CompositeIndexDefinition>,
}

impl IndexDefinitions {
    #[must_use]
    pub fn new(directories: Arc<DirectoryCache>) -> Self {
        Self {
            directories,
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn directories(&self) -> &Arc<DirectoryCache> {
        &self.directories
    }

    /// Key whose value changes on every definition change.
    #[must_use]
    pub fn trigger_key(&self) -> Vec<u8> {
        self.directories.layer().subspace(&[]).pack(TRIGGER_KEY)
    }

    /// Every definition of the project, pending and ready, in id order.
    pub async fn get_definitions<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        project_id: &str,
    ) -> Result<Vec<CompositeIndexDefinition>, InternalError> {
        let current = metadata_version(tr)
            .await
            .map_err(|err| InternalError::store(ErrorOrigin::Index, err))?;

        if let Some(cached) = self.cache.lock().get(project_id)
            && cached.metadata_version == current
        {
            return Ok(cached.definitions.clone());
        }

        let definitions = self.load(tr, project_id).await?;
        tracing::debug!(
            project_id,
            count = definitions.len(),
            "refreshed index definitions"
        );
        self.cache.lock().insert(
            project_id.to_string(),
            CachedDefinitions {
                metadata_version: current,
                definitions: definitions.clone(),
            },
        );

        Ok(definitions)
    }

    pub async fn get_definition<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        project_id: &str,
        id: u64,
    ) -> Result<Option<CompositeIndexDefinition>, InternalError> {
        let subspace = self.subspace(tr, project_id).await?;
        let key = subspace.pack(&encode_sortable_int(id, ID_WIDTH)?);

        let Some(bytes) = tr
            .get(&key, false)
            .await
            .map_err(|err| InternalError::store(ErrorOrigin::Index, err))?
        else {
            return Ok(None);
        };

        Ok(Some(deserialize(&bytes)?))
    }

    /// Persist `definition` under its id. Does not signal the builder; pair
    /// with [`IndexDefinitions::mark_schema_change`].
    pub async fn put_definition<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        definition: &CompositeIndexDefinition,
    ) -> Result<(), InternalError> {
        let id = definition.require_id()?;
        let subspace = self.subspace(tr, &definition.project_id).await?;
        let key = subspace.pack(&encode_sortable_int(id, ID_WIDTH)?);

        tr.set(&key, &serialize(definition)?);
        self.cache.lock().remove(&definition.project_id);

        Ok(())
    }

    /// Record that some project's definitions changed: rewrites the trigger
    /// key and bumps the store's metadata version.
    pub fn mark_schema_change<T: Transaction + ?Sized>(&self, tr: &T) -> Result<(), InternalError> {
        let store_err = |err| InternalError::store(ErrorOrigin::Index, err);

        tr.set_versionstamped_value(&self.trigger_key(), Versionstamp::incomplete().as_bytes(), 0)
            .map_err(store_err)?;
        bump_metadata_version(tr).map_err(store_err)
    }

    /// Add the genuinely new definitions among `new_indexes`, each as a
    /// pending definition with a fresh random id. Returns what was added.
    pub async fn merge<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        project_id: &str,
        new_indexes: Vec<CompositeIndexDefinition>,
    ) -> Result<Vec<CompositeIndexDefinition>, InternalError> {
        let existing = self.load(tr, project_id).await?;
        let mut seen: Vec<Vec<u8>> = existing
            .iter()
            .map(CompositeIndexDefinition::encoded_def)
            .collect();
        let mut taken: Vec<u64> = existing.iter().filter_map(|def| def.id).collect();

        let mut added = Vec::new();
        for mut definition in new_indexes {
            let encoded = definition.encoded_def();
            if seen.contains(&encoded) {
                continue;
            }

            let id = fresh_id(&taken);
            definition.id = Some(id);
            definition.project_id = project_id.to_string();
            definition.ready = false;
            self.put_definition(tr, &definition).await?;

            tracing::debug!(
                project_id,
                index_id = id,
                kind = %definition.kind,
                "added index definition"
            );
            seen.push(encoded);
            taken.push(id);
            added.push(definition);
        }

        if !added.is_empty() {
            self.mark_schema_change(tr)?;
        }

        Ok(added)
    }

    async fn load<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        project_id: &str,
    ) -> Result<Vec<CompositeIndexDefinition>, InternalError> {
        let subspace = self.subspace(tr, project_id).await?;
        let rows = ResultIterator::from_range(tr, subspace.range()).list().await?;

        let mut definitions = Vec::with_capacity(rows.len());
        for row in rows {
            let suffix = subspace.unpack(row.key()).unwrap_or_default();
            let id = decode_sortable_int(suffix)?;
            let definition: CompositeIndexDefinition = deserialize(row.value())?;
            if definition.id != Some(id) {
                return Err(InternalError::index_corruption(format!(
                    "definition stored under id {id} claims id {:?}",
                    definition.id
                )));
            }
            definitions.push(definition);
        }

        Ok(definitions)
    }

    async fn subspace<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        project_id: &str,
    ) -> Result<Subspace, InternalError> {
        self.directories.open(tr, &[project_id, DEFINITIONS_DIR]).await
    }
}

// Random 63-bit id that is neither zero nor already used.
fn fresh_id(taken: &[u64]) -> u64 {
    loop {
        let id = rand::random::<u64>() >> 1;
        if id != 0 && !taken.contains(&id) {
            return id;
        }
    }
}
