use super::{CompositeIndexDefinition, IndexDefinitions, PollingLock};
use crate::{
    config::StrataConfig,
    db::{
        data::DataManager,
        iter::ResultIterator,
        store::{KeySelector, KvStore, Transaction, bump_metadata_version, metadata_version},
    },
    error::{ErrorOrigin, InternalError, StoreError},
    obs::sink::{self, MetricsEvent},
};
use parking_lot::Mutex;
use rand::Rng;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};

// Root-level key of the builder's leader lock.
const LOCK_KEY: &[u8] = b"composite-index-manager-lock";

// Retryable failures tolerated in a row before a build gives up and leaves
// the definition to the next pass.
const MAX_CONSECUTIVE_BACKFILL_FAILURES: usize = 10;

///
/// BackfillCursor
///
/// Progress of one backfill: the namespace being scanned and the last kind
/// index key already processed in it, or `None` when the namespace has not
/// been started. The default cursor starts from the beginning.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BackfillCursor {
    pub namespace: String,
    pub key: Option<Vec<u8>>,
}

///
/// BackfillProgress
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BackfillProgress {
    /// A transaction committed before the scan finished; resume from here.
    Checkpoint(BackfillCursor),
    Done,
}

///
/// CompositeIndexManager
///
/// Owns the index definition lifecycle: merging new definitions, and a
/// background builder that backfills each pending definition and marks it
/// ready. Only the process holding the leader lock builds.
///

pub struct CompositeIndexManager<S: KvStore> {
    store: Arc<S>,
    data: Arc<DataManager>,
    backfill_deadline: Duration,
    backoff_max_ms: u64,
    lock: Arc<PollingLock<S>>,
    builder: Mutex<Option<JoinHandle<()>>>,
    // Last committed cursor per (project, index id), kept across failed
    // builds so the next pass resumes instead of restarting.
    checkpoints: Mutex<HashMap<(String, u64), BackfillCursor>>,
}

impl<S: KvStore> CompositeIndexManager<S> {
    #[must_use]
    pub fn new(store: Arc<S>, data: Arc<DataManager>, config: &StrataConfig) -> Self {
        let lock_key = data
            .indexes()
            .definitions()
            .directories()
            .layer()
            .subspace(&[])
            .pack(LOCK_KEY);
        let lock = PollingLock::new(
            Arc::clone(&store),
            lock_key,
            config.lock_heartbeat(),
            config.lock_lease(),
        );

        Self {
            store,
            data,
            backfill_deadline: config.backfill_deadline(),
            backoff_max_ms: config.builder_backoff_max_ms,
            lock: Arc::new(lock),
            builder: Mutex::new(None),
            checkpoints: Mutex::new(HashMap::new()),
        }
    }

    /// Override how long one backfill transaction may run before it
    /// checkpoints.
    #[must_use]
    pub const fn with_backfill_deadline(mut self, deadline: Duration) -> Self {
        self.backfill_deadline = deadline;
        self
    }

    #[must_use]
    pub const fn lock(&self) -> &Arc<PollingLock<S>> {
        &self.lock
    }

    fn definitions(&self) -> &IndexDefinitions {
        self.data.indexes().definitions()
    }

    /// Ensure the metadata version key exists, then start the leader lock
    /// and the builder task.
    pub async fn start(self: &Arc<Self>) -> Result<(), InternalError> {
        let tr = self.store.create_transaction().map_err(store_error)?;
        if metadata_version(&tr).await.map_err(store_error)?.is_none() {
            bump_metadata_version(&tr).map_err(store_error)?;
            tr.commit().await.map_err(store_error)?;
        }

        self.lock.start();
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move { manager.run_builder().await });
        if let Some(previous) = self.builder.lock().replace(handle) {
            previous.abort();
        }

        tracing::info!(owner = %self.lock.owner(), "composite index manager started");

        Ok(())
    }

    pub fn stop(&self) {
        if let Some(handle) = self.builder.lock().take() {
            handle.abort();
        }
        self.lock.stop();
    }

    pub async fn get_definitions(
        &self,
        project_id: &str,
    ) -> Result<Vec<CompositeIndexDefinition>, InternalError> {
        let tr = self.store.create_transaction().map_err(store_error)?;

        self.definitions().get_definitions(&tr, project_id).await
    }

    /// Register `new_indexes` for `project_id`; returns the definitions that
    /// were genuinely new and are now pending.
    pub async fn merge(
        &self,
        project_id: &str,
        new_indexes: Vec<CompositeIndexDefinition>,
    ) -> Result<Vec<CompositeIndexDefinition>, InternalError> {
        let tr = self.store.create_transaction().map_err(store_error)?;
        let added = self.definitions().merge(&tr, project_id, new_indexes).await?;
        tr.commit().await.map_err(store_error)?;

        if !added.is_empty() {
            tracing::info!(project_id, added = added.len(), "merged index definitions");
        }

        Ok(added)
    }

    /// Committed backfill progress of an unfinished build, if any.
    #[must_use]
    pub fn backfill_checkpoint(&self, project_id: &str, index_id: u64) -> Option<BackfillCursor> {
        self.checkpoints
            .lock()
            .get(&(project_id.to_string(), index_id))
            .cloned()
    }

    /// Backfill `definition` to completion, checkpointing between
    /// transactions, then mark it ready.
    ///
    /// A build that fails keeps its last checkpoint; the next call for the
    /// same definition resumes from there.
    pub async fn update_composite_index(
        &self,
        project_id: &str,
        definition: &CompositeIndexDefinition,
    ) -> Result<(), InternalError> {
        let progress_key = (project_id.to_string(), definition.require_id()?);
        let mut cursor = self
            .checkpoints
            .lock()
            .get(&progress_key)
            .cloned()
            .unwrap_or_default();
        let mut failures = 0;

        loop {
            match self.backfill(project_id, definition, &cursor).await {
                Ok(BackfillProgress::Done) => break,
                Ok(BackfillProgress::Checkpoint(next)) => {
                    sink::record(MetricsEvent::BackfillCheckpoint);
                    tracing::debug!(
                        project_id,
                        index_id = ?definition.id,
                        namespace = %next.namespace,
                        "backfill checkpoint"
                    );
                    failures = 0;
                    self.checkpoints
                        .lock()
                        .insert(progress_key.clone(), next.clone());
                    cursor = next;
                }
                Err(err) if err.is_retryable() && failures < MAX_CONSECUTIVE_BACKFILL_FAILURES => {
                    failures += 1;
                    tracing::warn!(
                        project_id,
                        index_id = ?definition.id,
                        attempt = failures,
                        error = %err,
                        "backfill transaction failed; resuming from last checkpoint"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        self.checkpoints.lock().remove(&progress_key);
        self.mark_ready(project_id, definition).await
    }

    /// Process kind index entries from `cursor` in one transaction until the
    /// range ends or the deadline passes. The deadline is checked after every
    /// page and before every namespace but the first.
    pub async fn backfill(
        &self,
        project_id: &str,
        definition: &CompositeIndexDefinition,
        cursor: &BackfillCursor,
    ) -> Result<BackfillProgress, InternalError> {
        let tr = self.store.create_transaction().map_err(store_error)?;
        let deadline = Instant::now() + self.backfill_deadline;
        let indexes = self.data.indexes();
        let mut rows = 0_u64;
        let mut started = false;

        let namespaces = indexes
            .kind_namespaces(&tr, project_id, &definition.kind)
            .await?;
        for namespace in namespaces {
            if namespace < cursor.namespace {
                continue;
            }
            if started && Instant::now() >= deadline {
                tr.commit().await.map_err(store_error)?;
                record_rows(project_id, rows);

                return Ok(BackfillProgress::Checkpoint(BackfillCursor {
                    namespace,
                    key: None,
                }));
            }
            started = true;

            let kind_index = indexes
                .kind_index(&tr, project_id, &namespace, &definition.kind)
                .await?;
            let composite = indexes.composite_index(&tr, definition, &namespace).await?;

            let (mut begin, end) = kind_index.subspace().selectors();
            if namespace == cursor.namespace
                && let Some(key) = &cursor.key
            {
                begin = KeySelector::first_greater_than(key.clone());
            }

            tracing::info!(
                project_id,
                index_id = ?definition.id,
                namespace = %namespace,
                "backfilling namespace"
            );

            let mut entries = ResultIterator::new(&tr, begin, end);
            while !entries.is_done() {
                let page = entries.next_page().await?;
                for kv in &page.kvs {
                    let entry = kind_index.decode(kv)?;
                    let version = self.data.get_entry(&tr, &entry).await?;
                    if let Some(entity) = version.entity() {
                        let marker = entry
                            .deleted_vs
                            .as_ref()
                            .map_or(&[][..], |vs| vs.as_bytes().as_slice());
                        for index_key in composite.encode_keys(entity, Some(entry.commit_vs))? {
                            tr.set(&index_key, marker);
                        }
                    }
                    rows += 1;
                }

                if Instant::now() >= deadline
                    && !entries.is_done()
                    && let Some(last) = page.kvs.last()
                {
                    tr.commit().await.map_err(store_error)?;
                    record_rows(project_id, rows);

                    return Ok(BackfillProgress::Checkpoint(BackfillCursor {
                        namespace,
                        key: Some(last.key.clone()),
                    }));
                }
            }
        }

        tr.commit().await.map_err(store_error)?;
        record_rows(project_id, rows);

        Ok(BackfillProgress::Done)
    }

    // Flip the stored definition to ready, unless it has disappeared.
    async fn mark_ready(
        &self,
        project_id: &str,
        definition: &CompositeIndexDefinition,
    ) -> Result<(), InternalError> {
        let id = definition.require_id()?;
        let tr = self.store.create_transaction().map_err(store_error)?;
        let definitions = self.definitions();

        let Some(mut current) = definitions.get_definition(&tr, project_id, id).await? else {
            tracing::debug!(project_id, index_id = id, "definition removed during backfill");
            return Ok(());
        };
        current.ready = true;
        definitions.put_definition(&tr, &current).await?;
        definitions.mark_schema_change(&tr)?;
        tr.commit().await.map_err(store_error)?;

        sink::record(MetricsEvent::IndexReady { project_id });
        tracing::info!(project_id, index_id = id, kind = %current.kind, "composite index ready");

        Ok(())
    }

    async fn run_builder(self: Arc<Self>) {
        loop {
            if let Err(err) = self.build_pass().await {
                let backoff =
                    Duration::from_millis(rand::rng().random_range(0..=self.backoff_max_ms));
                tracing::error!(
                    error = %err.display_with_class(),
                    backoff_ms = backoff.as_millis(),
                    "index builder pass failed"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }

    // Build the first pending definition found, or wait for the next
    // definition change.
    async fn build_pass(&self) -> Result<(), InternalError> {
        self.lock.acquire().await?;

        let tr = self.store.create_transaction().map_err(store_error)?;
        let definitions = self.definitions();
        let projects = definitions.directories().layer().list(&tr, &[]).await?;
        for project_id in &projects {
            let pending = definitions
                .get_definitions(&tr, project_id)
                .await?
                .into_iter()
                .find(|def| !def.ready);
            if let Some(definition) = pending {
                drop(tr);
                tracing::info!(
                    project_id = %project_id,
                    index_id = ?definition.id,
                    kind = %definition.kind,
                    "building composite index"
                );
                return self.update_composite_index(project_id, &definition).await;
            }
        }

        let watch = tr
            .watch(&definitions.trigger_key())
            .await
            .map_err(store_error)?;
        tr.commit().await.map_err(store_error)?;
        tracing::debug!(projects = projects.len(), "no pending indexes; waiting for changes");

        watch.changed().await.map_err(store_error)
    }
}

fn record_rows(project_id: &str, rows: u64) {
    if rows > 0 {
        sink::record(MetricsEvent::BackfillRows { project_id, rows });
    }
}

fn store_error(err: StoreError) -> InternalError {
    InternalError::store(ErrorOrigin::Index, err)
}
