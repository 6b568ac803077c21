use super::{
    COMPOSITE_INDEX_DIR, CompositeIndex, CompositeIndexDefinition, IndexDefinitions,
    KIND_INDEX_DIR, KindIndex, QueryIndex,
};
use crate::{
    KEY_PROPERTY,
    db::{
        data::{Entity, VersionEntry},
        query::{
            IndexIterator, Query, find_index_to_use, group_filters, order_info, scan_direction,
        },
        store::{DirectoryCache, Transaction, Versionstamp},
    },
    error::{ErrorOrigin, InternalError},
    key::EntityKey,
};
use std::sync::Arc;

///
/// IndexManager
///
/// Keeps the kind index and every composite index of a kind in step with
/// entity writes, and opens the scan that answers a query.
///

pub struct IndexManager {
    directories: Arc<DirectoryCache>,
    definitions: Arc<IndexDefinitions>,
}

impl IndexManager {
    #[must_use]
    pub const fn new(directories: Arc<DirectoryCache>, definitions: Arc<IndexDefinitions>) -> Self {
        Self {
            directories,
            definitions,
        }
    }

    #[must_use]
    pub const fn definitions(&self) -> &Arc<IndexDefinitions> {
        &self.definitions
    }

    pub async fn kind_index<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        project_id: &str,
        namespace: &str,
        kind: &str,
    ) -> Result<KindIndex, InternalError> {
        let subspace = self
            .directories
            .open(tr, &[project_id, KIND_INDEX_DIR, namespace, kind])
            .await?;

        Ok(KindIndex::new(subspace, project_id, namespace, kind))
    }

    pub async fn composite_index<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        definition: &CompositeIndexDefinition,
        namespace: &str,
    ) -> Result<CompositeIndex, InternalError> {
        let id = definition.require_id()?.to_string();
        let subspace = self
            .directories
            .open(
                tr,
                &[&definition.project_id, COMPOSITE_INDEX_DIR, &id, namespace],
            )
            .await?;

        Ok(CompositeIndex::new(subspace, namespace, definition.clone()))
    }

    /// Namespaces of `project_id` that hold a kind index for `kind`, in
    /// namespace order.
    pub async fn kind_namespaces<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        project_id: &str,
        kind: &str,
    ) -> Result<Vec<String>, InternalError> {
        let layer = self.directories.layer();
        let mut namespaces = Vec::new();
        for namespace in layer.list(tr, &[project_id, KIND_INDEX_DIR]).await? {
            let exists = layer
                .exists(tr, &[project_id, KIND_INDEX_DIR, &namespace, kind], true)
                .await
                .map_err(|err| InternalError::store(ErrorOrigin::Index, err))?;
            if exists {
                namespaces.push(namespace);
            }
        }

        Ok(namespaces)
    }

    /// Write index entries for a new version and mark the previous version's
    /// entries deleted.
    ///
    /// `old` is the latest version before this write; `new` is `None` for a
    /// deletion. Composite entries are written for every definition of the
    /// kind, pending or ready, so a backfill only has to cover versions
    /// written before the definition existed.
    pub async fn put_entries<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        old: Option<&VersionEntry>,
        new: Option<&Entity>,
    ) -> Result<(), InternalError> {
        let Some(key) = new.map(|entity| &entity.key).or(old.map(|entry| &entry.key)) else {
            return Ok(());
        };
        let kind = entity_kind(key)?;

        let previous = old.and_then(|entry| entry.commit_vs.zip(entry.entity()));

        let kind_index = self
            .kind_index(tr, &key.project_id, &key.namespace, kind)
            .await?;
        if let Some((commit_vs, _)) = previous {
            mark_deleted(tr, &kind_index.encode_key(&key.path, Some(commit_vs))?)?;
        }
        if new.is_some() {
            write_new(tr, &kind_index.encode_key(&key.path, None)?)?;
        }

        let definitions = self
            .definitions
            .get_definitions(tr, &key.project_id)
            .await?;
        for definition in definitions.iter().filter(|def| def.kind == kind) {
            let index = self.composite_index(tr, definition, &key.namespace).await?;
            if let Some((commit_vs, entity)) = previous {
                for index_key in index.encode_keys(entity, Some(commit_vs))? {
                    mark_deleted(tr, &index_key)?;
                }
            }
            if let Some(entity) = new {
                for index_key in index.encode_keys(entity, None)? {
                    write_new(tr, &index_key)?;
                }
            }
        }

        Ok(())
    }

    /// Open the scan that answers `query`.
    ///
    /// Queries over `__key__` alone read the kind index; anything else needs
    /// a ready composite index. `fetch_limit` of zero means unlimited, and
    /// `read_vs` selects the snapshot whose entries are visible.
    pub async fn get_iterator<'a, T: Transaction + ?Sized>(
        &self,
        tr: &'a T,
        query: &Query,
        fetch_limit: usize,
        read_vs: Option<Versionstamp>,
    ) -> Result<IndexIterator<'a, T>, InternalError> {
        let query = query.normalized();
        let Some(kind) = query.kind.as_deref() else {
            return Err(InternalError::unsupported(
                ErrorOrigin::Planner,
                "kindless queries are not supported",
            ));
        };

        let filter_props = group_filters(&query)?;
        let index = if only_key_properties(&query) {
            QueryIndex::Kind(
                self.kind_index(tr, &query.project_id, &query.namespace, kind)
                    .await?,
            )
        } else {
            let definitions = self
                .definitions
                .get_definitions(tr, &query.project_id)
                .await?;
            let Some(definition) = find_index_to_use(&query, &definitions)? else {
                return Err(InternalError::unsupported(
                    ErrorOrigin::Planner,
                    "single-property index scans are not supported",
                ));
            };
            QueryIndex::Composite(self.composite_index(tr, &definition, &query.namespace).await?)
        };

        let orders = order_info(&query);
        let reverse = scan_direction(&orders, &index);
        let start = query.compiled_cursor.as_ref().map(|c| &c.position);
        let end = query.end_compiled_cursor.as_ref().map(|c| &c.position);
        let (begin, stop) =
            index.get_slice(&filter_props, query.ancestor.as_ref(), start, end, reverse)?;

        tracing::debug!(
            project_id = %query.project_id,
            kind,
            composite = matches!(index, QueryIndex::Composite(_)),
            reverse,
            "planned index scan"
        );

        Ok(IndexIterator::new(
            tr,
            index,
            begin,
            stop,
            fetch_limit,
            reverse,
            read_vs,
        ))
    }
}

fn entity_kind(key: &EntityKey) -> Result<&str, InternalError> {
    key.kind().ok_or_else(|| {
        InternalError::validation(ErrorOrigin::Index, "entity key has an empty path")
    })
}

// The superseding write's versionstamp becomes the entry's value.
fn mark_deleted<T: Transaction + ?Sized>(tr: &T, key: &[u8]) -> Result<(), InternalError> {
    tr.set_versionstamped_value(key, Versionstamp::incomplete().as_bytes(), 0)
        .map_err(|err| InternalError::store(ErrorOrigin::Index, err))
}

// New entries end in an incomplete commit versionstamp.
fn write_new<T: Transaction + ?Sized>(tr: &T, key: &[u8]) -> Result<(), InternalError> {
    let offset = key.len().saturating_sub(Versionstamp::LEN);

    tr.set_versionstamped_key(key, offset, b"")
        .map_err(|err| InternalError::store(ErrorOrigin::Index, err))
}

fn only_key_properties(query: &Query) -> bool {
    query
        .filters
        .iter()
        .map(|filter| filter.property.as_str())
        .chain(query.orders.iter().map(|order| order.property.as_str()))
        .chain(query.property_names.iter().map(String::as_str))
        .chain(query.group_by.iter().map(String::as_str))
        .all(|name| name == KEY_PROPERTY)
}
