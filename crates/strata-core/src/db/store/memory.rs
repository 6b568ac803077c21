//! In-process reference store.
//!
//! Multi-version and serializable: every commit records its write ranges,
//! and a commit fails if any non-snapshot read of the transaction overlaps
//! a range written by a commit newer than its read version. Range reads
//! materialize the visible keyspace, so this store suits tests and small
//! single-process deployments only.
//!
//! No transaction outlives the maximum transaction age, so commit records
//! and superseded versions older than that age are dropped on commit.

use super::{
    KeyValue, KvStore, RangeOption, RangeResult, StreamingMode, Transaction, Versionstamp, Watch,
};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::oneshot, time::Instant};

/// Default age after which reads and commits fail as too old.
const DEFAULT_MAX_TRANSACTION_AGE: Duration = Duration::from_secs(5);

///
/// CommitFault
///
/// Failure injected into the next commit.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommitFault {
    /// Reject the commit as conflicting.
    Conflict,
    /// Report an ambiguous result without applying anything.
    UnknownResultBeforeApply,
    /// Apply the commit, then report an ambiguous result.
    UnknownResultAfterApply,
    /// Reject the commit as if the cluster were unreachable.
    Unavailable,
}

///
/// MemoryStore
///

#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Mutex<StoreState>>,
    max_transaction_age: Duration,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_transaction_age(DEFAULT_MAX_TRANSACTION_AGE)
    }

    #[must_use]
    pub fn with_max_transaction_age(max_transaction_age: Duration) -> Self {
        Self {
            shared: Arc::new(Mutex::new(StoreState::default())),
            max_transaction_age,
        }
    }

    /// Queue a failure for an upcoming commit. Faults apply in FIFO order,
    /// one per commit.
    pub fn inject_commit_fault(&self, fault: CommitFault) {
        self.shared.lock().faults.push_back(fault);
    }

    /// Latest committed version.
    #[must_use]
    pub fn committed_version(&self) -> u64 {
        self.shared.lock().version
    }

    // (commit records, stored key versions)
    #[cfg(test)]
    fn retained(&self) -> (usize, usize) {
        let state = self.shared.lock();

        (state.commits.len(), state.versions.values().map(Vec::len).sum())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    type Tx = MemoryTransaction;

    fn create_transaction(&self) -> Result<Self::Tx, StoreError> {
        let read_version = self.shared.lock().version;

        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            read_version,
            started: Instant::now(),
            max_age: self.max_transaction_age,
            local: Mutex::new(LocalState::default()),
        })
    }
}

///
/// StoreState
///

#[derive(Default)]
struct StoreState {
    // Per key, ascending by commit version; `None` marks a deletion.
    versions: BTreeMap<Vec<u8>, Vec<(u64, Option<Vec<u8>>)>>,
    version: u64,
    // Every live transaction reads at or above this version.
    horizon: u64,
    commits: VecDeque<CommitRecord>,
    watches: Vec<PendingWatch>,
    faults: VecDeque<CommitFault>,
}

struct CommitRecord {
    version: u64,
    committed_at: Instant,
    writes: Vec<(Vec<u8>, Vec<u8>)>,
}

struct PendingWatch {
    key: Vec<u8>,
    seen: Option<Vec<u8>>,
    notify: oneshot::Sender<()>,
}

impl StoreState {
    fn value_at(&self, key: &[u8], version: u64) -> Option<&Vec<u8>> {
        self.versions
            .get(key)?
            .iter()
            .rev()
            .find(|(written, _)| *written <= version)
            .and_then(|(_, value)| value.as_ref())
    }

    fn visible_at(&self, version: u64) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.versions
            .iter()
            .filter_map(|(key, history)| {
                history
                    .iter()
                    .rev()
                    .find(|(written, _)| *written <= version)
                    .and_then(|(_, value)| value.clone())
                    .map(|value| (key.clone(), value))
            })
            .collect()
    }

    fn write(&mut self, key: Vec<u8>, value: Option<Vec<u8>>, version: u64) {
        let history = self.versions.entry(key).or_default();
        match history.last_mut() {
            Some((written, slot)) if *written == version => *slot = value,
            _ => history.push((version, value)),
        }
    }

    fn conflicts(&self, read_version: u64, reads: &[(Vec<u8>, Vec<u8>)]) -> bool {
        self.commits
            .iter()
            .filter(|commit| commit.version > read_version)
            .any(|commit| {
                commit.writes.iter().any(|(write_begin, write_end)| {
                    reads.iter().any(|(read_begin, read_end)| {
                        write_begin < read_end && read_begin < write_end
                    })
                })
            })
    }

    // Drop commit records older than `max_age`, then every version no live
    // transaction can read.
    fn prune(&mut self, now: Instant, max_age: Duration) {
        let mut horizon = self.horizon;
        while let Some(oldest) = self.commits.front()
            && now.duration_since(oldest.committed_at) > max_age
        {
            horizon = oldest.version;
            self.commits.pop_front();
        }
        if horizon == self.horizon {
            return;
        }
        self.horizon = horizon;

        self.versions.retain(|_, history| {
            if let Some(current) = history.iter().rposition(|(written, _)| *written <= horizon) {
                history.drain(..current);
            }
            !matches!(history.as_slice(), [(written, None)] if *written <= horizon)
        });
    }

    fn register_watch(&mut self, watch: PendingWatch) {
        if self.value_at(&watch.key, self.version) == watch.seen.as_ref() {
            self.watches.push(watch);
        } else {
            let _ = watch.notify.send(());
        }
    }

    fn notify_watches(&mut self) {
        for watch in std::mem::take(&mut self.watches) {
            if !watch.notify.is_closed() {
                self.register_watch(watch);
            }
        }
    }
}

///
/// MemoryTransaction
///

pub struct MemoryTransaction {
    shared: Arc<Mutex<StoreState>>,
    read_version: u64,
    started: Instant,
    max_age: Duration,
    local: Mutex<LocalState>,
}

#[derive(Default)]
struct LocalState {
    mutations: Vec<Mutation>,
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    cleared: Vec<(Vec<u8>, Vec<u8>)>,
    reads: Vec<(Vec<u8>, Vec<u8>)>,
    watches: Vec<PendingWatch>,
}

enum Mutation {
    Set(Vec<u8>, Vec<u8>),
    Clear(Vec<u8>),
    ClearRange(Vec<u8>, Vec<u8>),
    StampKey {
        key: Vec<u8>,
        offset: usize,
        value: Vec<u8>,
    },
    StampValue {
        key: Vec<u8>,
        value: Vec<u8>,
        offset: usize,
    },
}

impl LocalState {
    // `Some` when this transaction's own writes determine the value.
    fn own_value(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        if let Some(value) = self.overlay.get(key) {
            return Some(value.clone());
        }
        self.cleared
            .iter()
            .any(|(begin, end)| begin.as_slice() <= key && key < end.as_slice())
            .then_some(None)
    }

    fn apply_to(&self, view: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
        for (begin, end) in &self.cleared {
            view.retain(|key, _| key < begin || key >= end);
        }
        for (key, value) in &self.overlay {
            match value {
                Some(value) => view.insert(key.clone(), value.clone()),
                None => view.remove(key),
            };
        }
    }
}

fn point_range(key: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut end = key.to_vec();
    end.push(0x00);
    (key.to_vec(), end)
}

fn check_stamp_offset(len: usize, offset: usize) -> Result<(), StoreError> {
    if offset.checked_add(Versionstamp::LEN).is_none_or(|end| end > len) {
        return Err(StoreError::InvalidSelector {
            message: format!("versionstamp offset {offset} out of bounds for {len} bytes"),
        });
    }

    Ok(())
}

impl MemoryTransaction {
    fn check_age(&self) -> Result<(), StoreError> {
        if self.started.elapsed() > self.max_age {
            return Err(StoreError::TransactionTooOld);
        }

        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_age()?;

        {
            let mut local = self.local.lock();
            if !snapshot {
                local.reads.push(point_range(key));
            }
            if let Some(value) = local.own_value(key) {
                return Ok(value);
            }
        }

        Ok(self.shared.lock().value_at(key, self.read_version).cloned())
    }

    async fn get_range(
        &self,
        range: &RangeOption,
        iteration: usize,
    ) -> Result<RangeResult, StoreError> {
        self.check_age()?;
        if range.mode == StreamingMode::Exact && range.limit == 0 {
            return Err(StoreError::InvalidSelector {
                message: "exact streaming mode requires a limit".to_string(),
            });
        }

        let mut view = self.shared.lock().visible_at(self.read_version);
        let mut local = self.local.lock();
        local.apply_to(&mut view);

        let rows: Vec<KeyValue> = view
            .into_iter()
            .map(|(key, value)| KeyValue { key, value })
            .collect();
        let keys: Vec<&[u8]> = rows.iter().map(KeyValue::key).collect();
        let begin = range.begin.resolve(&keys);
        let end = range.end.resolve(&keys).max(begin);

        if !range.snapshot {
            let mut low = range.begin.key().to_vec();
            if let Some(first) = keys.get(begin) {
                low = low.min(first.to_vec());
            }
            let mut high = range.end.key().to_vec();
            high.push(0x00);
            if let Some(past) = keys.get(end) {
                high = high.max(past.to_vec());
            }
            local.reads.push((low, high));
        }
        drop(local);

        let mut selected: Vec<KeyValue> = rows
            .into_iter()
            .skip(begin)
            .take(end - begin)
            .collect();
        if range.reverse {
            selected.reverse();
        }

        let budget = match (range.limit, range.mode.row_budget(iteration)) {
            (0, None) => selected.len(),
            (0, Some(budget)) => budget,
            (limit, None) => limit,
            (limit, Some(budget)) => limit.min(budget),
        };
        let more = selected.len() > budget;
        selected.truncate(budget);

        Ok(RangeResult {
            kvs: selected,
            more,
        })
    }

    fn set(&self, key: &[u8], value: &[u8]) {
        let mut local = self.local.lock();
        local.overlay.insert(key.to_vec(), Some(value.to_vec()));
        local.mutations.push(Mutation::Set(key.to_vec(), value.to_vec()));
    }

    fn clear(&self, key: &[u8]) {
        let mut local = self.local.lock();
        local.overlay.insert(key.to_vec(), None);
        local.mutations.push(Mutation::Clear(key.to_vec()));
    }

    fn clear_range(&self, begin: &[u8], end: &[u8]) {
        if begin >= end {
            return;
        }

        let mut local = self.local.lock();
        local
            .overlay
            .retain(|key, _| key.as_slice() < begin || key.as_slice() >= end);
        local.cleared.push((begin.to_vec(), end.to_vec()));
        local
            .mutations
            .push(Mutation::ClearRange(begin.to_vec(), end.to_vec()));
    }

    fn set_versionstamped_key(
        &self,
        key: &[u8],
        offset: usize,
        value: &[u8],
    ) -> Result<(), StoreError> {
        check_stamp_offset(key.len(), offset)?;
        self.local.lock().mutations.push(Mutation::StampKey {
            key: key.to_vec(),
            offset,
            value: value.to_vec(),
        });

        Ok(())
    }

    fn set_versionstamped_value(
        &self,
        key: &[u8],
        value: &[u8],
        offset: usize,
    ) -> Result<(), StoreError> {
        check_stamp_offset(value.len(), offset)?;
        self.local.lock().mutations.push(Mutation::StampValue {
            key: key.to_vec(),
            value: value.to_vec(),
            offset,
        });

        Ok(())
    }

    async fn watch(&self, key: &[u8]) -> Result<Watch, StoreError> {
        self.check_age()?;

        let own = self.local.lock().own_value(key);
        let seen = match own {
            Some(value) => value,
            None => self.shared.lock().value_at(key, self.read_version).cloned(),
        };

        let (notify, rx) = oneshot::channel();
        self.local.lock().watches.push(PendingWatch {
            key: key.to_vec(),
            seen,
            notify,
        });

        Ok(Watch::new(rx))
    }

    async fn read_version(&self) -> Result<u64, StoreError> {
        self.check_age()?;

        Ok(self.read_version)
    }

    async fn commit(self) -> Result<Versionstamp, StoreError> {
        self.check_age()?;

        let Self {
            shared,
            read_version,
            max_age,
            local,
            ..
        } = self;
        let local = local.into_inner();
        let mut state = shared.lock();

        let fault = state.faults.pop_front();
        match fault {
            Some(CommitFault::Conflict) => return Err(StoreError::NotCommitted),
            Some(CommitFault::UnknownResultBeforeApply) => {
                return Err(StoreError::CommitUnknownResult);
            }
            Some(CommitFault::Unavailable) => {
                return Err(StoreError::Unavailable {
                    message: "injected commit failure".to_string(),
                });
            }
            Some(CommitFault::UnknownResultAfterApply) | None => {}
        }

        if local.mutations.is_empty() {
            for watch in local.watches {
                state.register_watch(watch);
            }
            return Ok(Versionstamp::from_parts(read_version, 0));
        }

        if state.conflicts(read_version, &local.reads) {
            return Err(StoreError::NotCommitted);
        }

        state.version += 1;
        let version = state.version;
        let stamp = Versionstamp::from_parts(version, 0);
        let mut writes = Vec::with_capacity(local.mutations.len());

        for mutation in local.mutations {
            match mutation {
                Mutation::Set(key, value) => {
                    writes.push(point_range(&key));
                    state.write(key, Some(value), version);
                }
                Mutation::Clear(key) => {
                    writes.push(point_range(&key));
                    state.write(key, None, version);
                }
                Mutation::ClearRange(begin, end) => {
                    let doomed: Vec<Vec<u8>> = state
                        .versions
                        .range(begin.clone()..end.clone())
                        .map(|(key, _)| key.clone())
                        .collect();
                    for key in doomed {
                        state.write(key, None, version);
                    }
                    writes.push((begin, end));
                }
                Mutation::StampKey {
                    mut key,
                    offset,
                    value,
                } => {
                    key[offset..offset + Versionstamp::LEN].copy_from_slice(stamp.as_bytes());
                    writes.push(point_range(&key));
                    state.write(key, Some(value), version);
                }
                Mutation::StampValue {
                    key,
                    mut value,
                    offset,
                } => {
                    value[offset..offset + Versionstamp::LEN].copy_from_slice(stamp.as_bytes());
                    writes.push(point_range(&key));
                    state.write(key, Some(value), version);
                }
            }
        }

        let now = Instant::now();
        state.commits.push_back(CommitRecord {
            version,
            committed_at: now,
            writes,
        });
        state.prune(now, max_age);
        state.notify_watches();
        for watch in local.watches {
            state.register_watch(watch);
        }

        if fault == Some(CommitFault::UnknownResultAfterApply) {
            return Err(StoreError::CommitUnknownResult);
        }

        Ok(stamp)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::KeySelector;

    async fn put(store: &MemoryStore, key: &[u8], value: &[u8]) {
        let tr = store.create_transaction().expect("transaction should open");
        tr.set(key, value);
        tr.commit().await.expect("commit should succeed");
    }

    async fn read(store: &MemoryStore, key: &[u8]) -> Option<Vec<u8>> {
        let tr = store.create_transaction().expect("transaction should open");
        tr.get(key, false).await.expect("read should succeed")
    }

    #[tokio::test]
    async fn writes_are_visible_to_their_transaction_and_after_commit() {
        let store = MemoryStore::new();
        let writer = store.create_transaction().expect("transaction should open");
        let before = store.create_transaction().expect("transaction should open");

        writer.set(b"k", b"v");
        assert_eq!(
            writer.get(b"k", false).await.expect("read should succeed"),
            Some(b"v".to_vec())
        );
        writer.commit().await.expect("commit should succeed");

        assert_eq!(before.get(b"k", true).await.expect("read should succeed"), None);
        assert_eq!(read(&store, b"k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn overlapping_read_write_sets_conflict() {
        let store = MemoryStore::new();
        put(&store, b"counter", b"0").await;

        let first = store.create_transaction().expect("transaction should open");
        let second = store.create_transaction().expect("transaction should open");
        first.get(b"counter", false).await.expect("read should succeed");
        second.get(b"counter", false).await.expect("read should succeed");
        first.set(b"counter", b"1");
        second.set(b"counter", b"2");

        first.commit().await.expect("first commit should win");
        let err = second.commit().await.expect_err("second commit should conflict");
        assert_eq!(err, StoreError::NotCommitted);
        assert_eq!(read(&store, b"counter").await, Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn snapshot_reads_do_not_conflict() {
        let store = MemoryStore::new();
        let reader = store.create_transaction().expect("transaction should open");
        reader.get(b"k", true).await.expect("read should succeed");
        reader.set(b"other", b"x");

        put(&store, b"k", b"changed").await;
        reader.commit().await.expect("snapshot read should not conflict");
    }

    #[tokio::test]
    async fn range_reads_conflict_with_inserts_into_the_range() {
        let store = MemoryStore::new();
        let scanner = store.create_transaction().expect("transaction should open");
        scanner
            .get_range(&RangeOption::prefix(b"idx/"), 1)
            .await
            .expect("range read should succeed");
        scanner.set(b"summary", b"0");

        put(&store, b"idx/new", b"").await;
        let err = scanner.commit().await.expect_err("phantom insert should conflict");
        assert_eq!(err, StoreError::NotCommitted);
    }

    #[tokio::test]
    async fn range_reads_honour_selectors_limit_and_reverse() {
        let store = MemoryStore::new();
        let tr = store.create_transaction().expect("transaction should open");
        for key in [b"a", b"b", b"c", b"d"] {
            tr.set(key, b"");
        }
        tr.commit().await.expect("commit should succeed");

        let tr = store.create_transaction().expect("transaction should open");
        let range = RangeOption::new(
            KeySelector::first_greater_than(b"a".to_vec()),
            KeySelector::first_greater_or_equal(b"d".to_vec()),
        )
        .with_limit(1)
        .reversed(true);
        let page = tr.get_range(&range, 1).await.expect("range read should succeed");
        assert_eq!(page.kvs.len(), 1);
        assert_eq!(page.kvs[0].key(), b"c");
        assert!(page.more);

        let all = tr
            .get_range(&range.with_limit(0).with_mode(StreamingMode::WantAll), 1)
            .await
            .expect("range read should succeed");
        let keys: Vec<&[u8]> = all.kvs.iter().map(KeyValue::key).collect();
        assert_eq!(keys, vec![b"c".as_slice(), b"b".as_slice()]);
        assert!(!all.more);
    }

    #[tokio::test]
    async fn cleared_ranges_hide_committed_keys_until_rewritten() {
        let store = MemoryStore::new();
        put(&store, b"p/1", b"x").await;
        put(&store, b"p/2", b"y").await;

        let tr = store.create_transaction().expect("transaction should open");
        tr.clear_range(b"p/", b"p0");
        tr.set(b"p/2", b"z");
        let page = tr
            .get_range(&RangeOption::prefix(b"p/"), 1)
            .await
            .expect("range read should succeed");
        assert_eq!(page.kvs.len(), 1);
        assert_eq!(page.kvs[0].value(), b"z");
        tr.commit().await.expect("commit should succeed");

        assert_eq!(read(&store, b"p/1").await, None);
        assert_eq!(read(&store, b"p/2").await, Some(b"z".to_vec()));
    }

    #[tokio::test]
    async fn versionstamped_keys_receive_the_commit_stamp() {
        let store = MemoryStore::new();
        let tr = store.create_transaction().expect("transaction should open");
        let mut key = b"log/".to_vec();
        key.extend_from_slice(Versionstamp::incomplete().as_bytes());
        tr.set_versionstamped_key(&key, 4, b"entry")
            .expect("offset is in bounds");
        let stamp = tr.commit().await.expect("commit should succeed");

        let mut expected = b"log/".to_vec();
        expected.extend_from_slice(stamp.as_bytes());
        assert_eq!(read(&store, &expected).await, Some(b"entry".to_vec()));

        let tr = store.create_transaction().expect("transaction should open");
        let err = tr
            .set_versionstamped_value(b"k", b"short", 0)
            .expect_err("value too short for a stamp");
        assert!(
            matches!(err, StoreError::InvalidSelector { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn watches_fire_after_the_key_changes() {
        let store = MemoryStore::new();
        let watcher = store.create_transaction().expect("transaction should open");
        let watch = watcher.watch(b"trigger").await.expect("watch should register");
        watcher.commit().await.expect("commit should succeed");

        put(&store, b"trigger", b"1").await;
        watch.changed().await.expect("watch should fire");
    }

    #[tokio::test]
    async fn uncommitted_watches_are_cancelled() {
        let store = MemoryStore::new();
        let watcher = store.create_transaction().expect("transaction should open");
        let watch = watcher.watch(b"trigger").await.expect("watch should register");
        drop(watcher);

        assert!(watch.changed().await.is_err());
    }

    #[tokio::test]
    async fn injected_faults_apply_in_order() {
        let store = MemoryStore::new();
        store.inject_commit_fault(CommitFault::UnknownResultAfterApply);
        store.inject_commit_fault(CommitFault::Conflict);

        let tr = store.create_transaction().expect("transaction should open");
        tr.set(b"k", b"1");
        let err = tr.commit().await.expect_err("ambiguous result expected");
        assert_eq!(err, StoreError::CommitUnknownResult);
        assert_eq!(read(&store, b"k").await, Some(b"1".to_vec()));

        let tr = store.create_transaction().expect("transaction should open");
        tr.set(b"k", b"2");
        assert_eq!(tr.commit().await, Err(StoreError::NotCommitted));
        assert_eq!(read(&store, b"k").await, Some(b"1".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn history_past_the_transaction_age_is_pruned() {
        let store = MemoryStore::with_max_transaction_age(Duration::from_secs(1));
        for value in [b"1", b"2", b"3"] {
            put(&store, b"k", value).await;
        }
        put(&store, b"gone", b"x").await;
        let tr = store.create_transaction().expect("transaction should open");
        tr.clear(b"gone");
        tr.commit().await.expect("commit should succeed");
        assert_eq!(store.retained(), (5, 5));

        let stale = store.create_transaction().expect("transaction should open");
        tokio::time::advance(Duration::from_secs(2)).await;
        put(&store, b"fresh", b"y").await;

        assert_eq!(store.retained(), (1, 2));
        assert_eq!(read(&store, b"k").await, Some(b"3".to_vec()));
        assert_eq!(read(&store, b"gone").await, None);
        assert_eq!(stale.get(b"k", false).await, Err(StoreError::TransactionTooOld));
    }

    #[tokio::test]
    async fn recent_commits_still_conflict_after_pruning() {
        let store = MemoryStore::with_max_transaction_age(Duration::from_secs(60));
        put(&store, b"k", b"0").await;

        let reader = store.create_transaction().expect("transaction should open");
        reader.get(b"k", false).await.expect("read should succeed");
        reader.set(b"other", b"x");
        put(&store, b"k", b"1").await;
        put(&store, b"unrelated", b"y").await;

        assert_eq!(reader.commit().await, Err(StoreError::NotCommitted));
    }

    #[tokio::test(start_paused = true)]
    async fn old_transactions_are_rejected() {
        let store = MemoryStore::with_max_transaction_age(Duration::from_secs(5));
        let tr = store.create_transaction().expect("transaction should open");
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(tr.get(b"k", false).await, Err(StoreError::TransactionTooOld));
        assert_eq!(tr.commit().await, Err(StoreError::TransactionTooOld));
    }
}
