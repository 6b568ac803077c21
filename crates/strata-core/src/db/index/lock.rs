use crate::{
    db::store::{KvStore, Transaction},
    error::{ErrorOrigin, InternalError, StoreError},
    serialize::{deserialize, serialize},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use ulid::Ulid;

///
/// PollingLock
///
/// Advisory leader lock kept alive by polling. The holder rewrites the lock
/// record every heartbeat; a contender takes over once it has seen the same
/// record unchanged for a whole lease. Nothing blocks on the store, so a
/// crashed holder is superseded without intervention.
///

pub struct PollingLock<S: KvStore> {
    store: Arc<S>,
    key: Vec<u8>,
    owner: Ulid,
    heartbeat: Duration,
    lease: Duration,
    held: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

// Persisted lock state; `op_id` changes on every heartbeat.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
struct LockRecord {
    owner: Ulid,
    op_id: Ulid,
}

// A foreign record and when it was first seen in this exact form.
struct Observed {
    record: LockRecord,
    since: Instant,
}

impl<S: KvStore> PollingLock<S> {
    #[must_use]
    pub fn new(store: Arc<S>, key: Vec<u8>, heartbeat: Duration, lease: Duration) -> Self {
        Self {
            store,
            key,
            owner: Ulid::new(),
            heartbeat,
            lease,
            held: watch::Sender::new(false),
            task: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn owner(&self) -> Ulid {
        self.owner
    }

    #[must_use]
    pub fn is_acquired(&self) -> bool {
        *self.held.borrow()
    }

    /// Start the heartbeat task. Restarting replaces any running task.
    pub fn start(self: &Arc<Self>) {
        let lock = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(lock.heartbeat);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut observed = None;

            loop {
                ticker.tick().await;
                match lock.poll(&mut observed).await {
                    Ok(held) => lock.set_held(held),
                    Err(err) => {
                        tracing::warn!(owner = %lock.owner, error = %err, "lock heartbeat failed");
                        lock.set_held(false);
                    }
                }
            }
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop heartbeating. The record lapses after one lease.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        self.set_held(false);
    }

    /// Wait until this process holds the lock.
    pub async fn acquire(&self) -> Result<(), InternalError> {
        let mut held = self.held.subscribe();
        held.wait_for(|held| *held).await.map_err(|_| {
            InternalError::internal(ErrorOrigin::Index, "lock state channel closed")
        })?;

        Ok(())
    }

    // One heartbeat: refresh our own record, or take over a free or lapsed
    // one. Returns whether we hold the lock afterwards.
    async fn poll(&self, observed: &mut Option<Observed>) -> Result<bool, InternalError> {
        let tr = self.store.create_transaction().map_err(store_error)?;
        let current = match tr.get(&self.key, false).await.map_err(store_error)? {
            Some(bytes) => Some(deserialize::<LockRecord>(&bytes)?),
            None => None,
        };

        let take = match current {
            None => true,
            Some(record) if record.owner == self.owner => true,
            Some(record) => {
                let lapsed = observed
                    .as_ref()
                    .filter(|seen| seen.record == record)
                    .is_some_and(|seen| seen.since.elapsed() >= self.lease);
                if observed.as_ref().is_none_or(|seen| seen.record != record) {
                    *observed = Some(Observed {
                        record,
                        since: Instant::now(),
                    });
                }
                lapsed
            }
        };
        if !take {
            return Ok(false);
        }

        let record = LockRecord {
            owner: self.owner,
            op_id: Ulid::new(),
        };
        tr.set(&self.key, &serialize(&record)?);
        tr.commit().await.map_err(store_error)?;
        *observed = None;

        Ok(true)
    }

    fn set_held(&self, value: bool) {
        let changed = self.held.send_if_modified(|held| {
            if *held == value {
                false
            } else {
                *held = value;
                true
            }
        });
        if changed {
            tracing::debug!(owner = %self.owner, held = value, "leader lock state changed");
        }
    }
}

fn store_error(err: StoreError) -> InternalError {
    InternalError::store(ErrorOrigin::Index, err)
}
