use super::{AllocatorKind, EntityIdAllocator, id_to_counter, to_scattered_id};
use crate::{
    config::StrataConfig,
    db::store::{DirectoryCache, KvStore},
    error::InternalError,
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

///
/// ScatteredAllocator
///
/// Hands out scattered ids from a locally cached block of counters and only
/// goes back to the store once the block is used up.
///

pub struct ScatteredAllocator<S: KvStore> {
    inner: EntityIdAllocator<S>,
    reservation_size: i64,
    block: tokio::sync::Mutex<Option<Block>>,
}

// Inclusive counter range; exhausted once `start > end`.
#[derive(Clone, Copy, Debug)]
struct Block {
    start: i64,
    end: i64,
}

impl<S: KvStore> ScatteredAllocator<S> {
    #[must_use]
    pub fn new(
        store: Arc<S>,
        directories: Arc<DirectoryCache>,
        project_id: impl Into<String>,
        config: &StrataConfig,
    ) -> Self {
        let inner = EntityIdAllocator::new(
            store,
            directories,
            project_id,
            AllocatorKind::Scattered,
            config.allocator_retries,
        );

        Self {
            inner,
            reservation_size: i64::try_from(config.scattered_reservation_size).unwrap_or(i64::MAX),
            block: tokio::sync::Mutex::new(None),
        }
    }

    /// Next scattered id.
    pub async fn next_id(&self) -> Result<i64, InternalError> {
        let mut block = self.block.lock().await;

        let current = match *block {
            Some(current) if current.start <= current.end => current,
            _ => {
                let (start, end) = self.inner.allocate_size(self.reservation_size).await?;
                Block { start, end }
            }
        };

        *block = Some(Block {
            start: current.start + 1,
            end: current.end,
        });

        Ok(to_scattered_id(current.start))
    }

    /// Make sure `counter` is never handed out again, trimming or replacing
    /// the cached block as needed.
    pub async fn set_min_counter(&self, counter: i64) -> Result<(), InternalError> {
        let mut block = self.block.lock().await;

        match *block {
            // Nothing cached yet: only future blocks need to start higher.
            None => self.inner.set_min_counter(counter).await,

            Some(current) if current.start > counter => Ok(()),

            Some(current) if current.end > counter => {
                *block = Some(Block {
                    start: counter + 1,
                    end: current.end,
                });
                Ok(())
            }

            Some(_) => {
                let (start, end) = self
                    .inner
                    .allocate_size_with_min(self.reservation_size, Some(counter))
                    .await?;
                *block = Some(Block { start, end });
                Ok(())
            }
        }
    }

    #[must_use]
    pub const fn allocator(&self) -> &EntityIdAllocator<S> {
        &self.inner
    }
}

///
/// IdAllocators
///
/// Per-project sequential and scattered allocators, created on first use.
///

pub struct IdAllocators<S: KvStore> {
    store: Arc<S>,
    directories: Arc<DirectoryCache>,
    config: StrataConfig,
    sequential: Mutex<HashMap<String, Arc<EntityIdAllocator<S>>>>,
    scattered: Mutex<HashMap<String, Arc<ScatteredAllocator<S>>>>,
}

impl<S: KvStore> IdAllocators<S> {
    #[must_use]
    pub fn new(store: Arc<S>, directories: Arc<DirectoryCache>, config: StrataConfig) -> Self {
        Self {
            store,
            directories,
            config,
            sequential: Mutex::new(HashMap::new()),
            scattered: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn sequential(&self, project_id: &str) -> Arc<EntityIdAllocator<S>> {
        let mut allocators = self.sequential.lock();
        let allocator = allocators.entry(project_id.to_string()).or_insert_with(|| {
            Arc::new(EntityIdAllocator::new(
                Arc::clone(&self.store),
                Arc::clone(&self.directories),
                project_id,
                AllocatorKind::Sequential,
                self.config.allocator_retries,
            ))
        });

        Arc::clone(allocator)
    }

    #[must_use]
    pub fn scattered(&self, project_id: &str) -> Arc<ScatteredAllocator<S>> {
        let mut allocators = self.scattered.lock();
        let allocator = allocators.entry(project_id.to_string()).or_insert_with(|| {
            Arc::new(ScatteredAllocator::new(
                Arc::clone(&self.store),
                Arc::clone(&self.directories),
                project_id,
                &self.config,
            ))
        });

        Arc::clone(allocator)
    }

    /// Mark caller-chosen ids as used so neither allocator reissues them.
    pub async fn reserve_ids(&self, project_id: &str, ids: &[i64]) -> Result<(), InternalError> {
        for &id in ids {
            let (counter, kind) = id_to_counter(id)?;
            match kind {
                AllocatorKind::Sequential => {
                    self.sequential(project_id).set_min_counter(counter).await?;
                }
                AllocatorKind::Scattered => {
                    self.scattered(project_id).set_min_counter(counter).await?;
                }
            }
        }

        Ok(())
    }
}
