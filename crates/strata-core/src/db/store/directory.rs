//! Directory-style keyspace partitioning.
//!
//! A logical path of strings maps to a byte prefix: the root prefix, each
//! component as terminated text, then a content separator. Node markers
//! under a separate branch of the root record which paths exist so that
//! children can be listed in name order.

use super::{KeySelector, RangeOption, Transaction, metadata_version};
use crate::{
    db::{
        codec::{ByteReader, push_component},
        iter::ResultIterator,
    },
    error::{ErrorOrigin, InternalError, StoreError},
};
use parking_lot::Mutex;
use std::collections::HashMap;

// Follows the last component of a directory's content prefix.
const CONTENT_SEPARATOR: u8 = 0xFD;

// Follows the root prefix for node markers.
const NODE_BRANCH: u8 = 0xFE;

///
/// Subspace
///
/// Byte prefix that owns every key starting with it.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    #[must_use]
    pub const fn from_prefix(prefix: Vec<u8>) -> Self {
        Self { prefix }
    }

    #[must_use]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Key made of this prefix followed by `suffix`.
    #[must_use]
    pub fn pack(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + suffix.len());
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(suffix);
        key
    }

    /// Nested subspace whose prefix extends this one.
    #[must_use]
    pub fn subspace(&self, suffix: &[u8]) -> Self {
        Self::from_prefix(self.pack(suffix))
    }

    /// Strip this prefix from `key`, if it has it.
    #[must_use]
    pub fn unpack<'k>(&self, key: &'k [u8]) -> Option<&'k [u8]> {
        key.strip_prefix(self.prefix.as_slice())
    }

    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// Range over every key in this subspace.
    #[must_use]
    pub fn range(&self) -> RangeOption {
        RangeOption::prefix(&self.prefix)
    }

    /// Selector pair for the whole subspace.
    #[must_use]
    pub fn selectors(&self) -> (KeySelector, KeySelector) {
        let range = self.range();
        (range.begin, range.end)
    }
}

///
/// DirectoryLayer
///

#[derive(Clone, Debug)]
pub struct DirectoryLayer {
    root: Vec<u8>,
}

impl DirectoryLayer {
    #[must_use]
    pub fn new(root: &[u8]) -> Self {
        Self {
            root: root.to_vec(),
        }
    }

    /// Content subspace of `path`, computed without touching the store.
    #[must_use]
    pub fn subspace(&self, path: &[&str]) -> Subspace {
        let mut prefix = self.root.clone();
        for component in path {
            push_component(&mut prefix, component);
        }
        prefix.push(CONTENT_SEPARATOR);

        Subspace::from_prefix(prefix)
    }

    fn node_key(&self, path: &[&str]) -> Vec<u8> {
        let mut key = self.root.clone();
        key.push(NODE_BRANCH);
        for component in path {
            push_component(&mut key, component);
        }
        key
    }

    /// Record `path` and all of its ancestors, then return its subspace.
    pub fn create_or_open<T: Transaction + ?Sized>(&self, tr: &T, path: &[&str]) -> Subspace {
        for depth in 1..=path.len() {
            tr.set(&self.node_key(&path[..depth]), b"");
        }

        self.subspace(path)
    }

    /// True if `path` has been created.
    pub async fn exists<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        path: &[&str],
        snapshot: bool,
    ) -> Result<bool, StoreError> {
        Ok(tr.get(&self.node_key(path), snapshot).await?.is_some())
    }

    /// Names of the direct children of `path`, in sorted order.
    ///
    /// Snapshot reads: listing never conflicts with concurrent creation.
    pub async fn list<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        path: &[&str],
    ) -> Result<Vec<String>, InternalError> {
        let parent = self.node_key(path);
        let range = RangeOption::prefix(&parent).snapshot(true);
        let rows = ResultIterator::from_range(tr, range).list().await?;

        let mut children = Vec::new();
        for row in rows {
            // the parent's own node marker
            if row.key().len() == parent.len() {
                continue;
            }
            let mut reader = ByteReader::new(&row.key()[parent.len()..]);
            let name = reader.read_text()?;
            if reader.is_empty() {
                children.push(name);
            }
        }

        Ok(children)
    }
}

///
/// DirectoryCache
///
/// Subspaces whose node markers have been observed committed, keyed by
/// path. Cleared whenever the store's metadata version moves.
///

#[derive(Debug)]
pub struct DirectoryCache {
    layer: DirectoryLayer,
    state: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    metadata_version: Option<Vec<u8>>,
    entries: HashMap<Vec<String>, Subspace>,
}

impl DirectoryCache {
    #[must_use]
    pub fn new(layer: DirectoryLayer) -> Self {
        Self {
            layer,
            state: Mutex::new(CacheState::default()),
        }
    }

    #[must_use]
    pub const fn layer(&self) -> &DirectoryLayer {
        &self.layer
    }

    /// Drop cached entries if the metadata version seen by `tr` differs
    /// from the one they were cached under.
    pub async fn validate<T: Transaction + ?Sized>(&self, tr: &T) -> Result<(), InternalError> {
        let current = metadata_version(tr)
            .await
            .map_err(|err| InternalError::store(ErrorOrigin::Store, err))?;

        let mut state = self.state.lock();
        if state.metadata_version != current {
            tracing::debug!(
                cached = state.entries.len(),
                "metadata version changed; clearing directory cache"
            );
            state.entries.clear();
            state.metadata_version = current;
        }

        Ok(())
    }

    /// Subspace of `path`, creating its node markers if they are not yet
    /// known to be committed.
    pub async fn open<T: Transaction + ?Sized>(
        &self,
        tr: &T,
        path: &[&str],
    ) -> Result<Subspace, InternalError> {
        self.validate(tr).await?;

        let cache_key: Vec<String> = path.iter().map(|c| (*c).to_string()).collect();
        if let Some(hit) = self.state.lock().entries.get(&cache_key) {
            return Ok(hit.clone());
        }

        let committed = self
            .layer
            .exists(tr, path, true)
            .await
            .map_err(|err| InternalError::store(ErrorOrigin::Store, err))?;
        if !committed {
            return Ok(self.layer.create_or_open(tr, path));
        }

        let subspace = self.layer.subspace(path);
        self.state.lock().entries.insert(cache_key, subspace.clone());

        Ok(subspace)
    }

    /// Forget every cached entry.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.metadata_version = None;
    }

    #[cfg(test)]
    pub(crate) fn cached_len(&self) -> usize {
        self.state.lock().entries.len()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{KvStore, MemoryStore, bump_metadata_version};

    #[test]
    fn sibling_directories_do_not_share_keys() {
        let layer = DirectoryLayer::new(b"root");
        let parent = layer.subspace(&["app"]);
        let child = layer.subspace(&["app", "data"]);
        let lookalike = layer.subspace(&["apple"]);

        assert!(!parent.contains(child.prefix()));
        assert!(!parent.contains(lookalike.prefix()));
        assert!(!child.contains(parent.prefix()));
    }

    #[tokio::test]
    async fn list_returns_direct_children_in_order() {
        let store = MemoryStore::new();
        let layer = DirectoryLayer::new(b"root");
        let tr = store.create_transaction().expect("transaction should open");
        layer.create_or_open(&tr, &["app", "indexes", "ns-b"]);
        layer.create_or_open(&tr, &["app", "indexes", ""]);
        layer.create_or_open(&tr, &["app", "indexes", "ns-a", "kind", "Greeting"]);
        tr.commit().await.expect("commit should succeed");

        let tr = store.create_transaction().expect("transaction should open");
        let children = layer
            .list(&tr, &["app", "indexes"])
            .await
            .expect("list should succeed");
        assert_eq!(children, vec!["", "ns-a", "ns-b"]);
        assert_eq!(
            layer.list(&tr, &[]).await.expect("list should succeed"),
            vec!["app"]
        );
    }

    #[tokio::test]
    async fn cache_fills_after_commit_and_clears_on_metadata_change() {
        let store = MemoryStore::new();
        let cache = DirectoryCache::new(DirectoryLayer::new(b"root"));

        let tr = store.create_transaction().expect("transaction should open");
        let created = cache.open(&tr, &["app", "data"]).await.expect("open should succeed");
        assert_eq!(cache.cached_len(), 0);
        tr.commit().await.expect("commit should succeed");

        let tr = store.create_transaction().expect("transaction should open");
        let reopened = cache.open(&tr, &["app", "data"]).await.expect("open should succeed");
        assert_eq!(created, reopened);
        assert_eq!(cache.cached_len(), 1);
        bump_metadata_version(&tr).expect("bump should be accepted");
        tr.commit().await.expect("commit should succeed");

        let tr = store.create_transaction().expect("transaction should open");
        cache.validate(&tr).await.expect("validate should succeed");
        assert_eq!(cache.cached_len(), 0);
    }
}
