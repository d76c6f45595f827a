use log::{debug, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use super::RunError;
use crate::models::{QueryRequest, ResultTable};

pub type CachedOutcome = Result<Arc<ResultTable>, RunError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a fresh entry or from a run another caller started.
    Hit,
    /// This caller ran the query.
    Miss,
}

#[derive(Clone)]
struct Completed {
    at: Instant,
    outcome: CachedOutcome,
}

#[derive(Default)]
struct Slot {
    cell: OnceCell<Completed>,
}

impl Slot {
    /// In-flight slots are always shared. Finished slots are reused only
    /// while successful and fresh.
    fn is_reusable(&self, ttl: Duration) -> bool {
        match self.cell.get() {
            None => true,
            Some(done) => done.outcome.is_ok() && done.at.elapsed() < ttl,
        }
    }
}

/// Expiring memoization of query results with at most one in-flight run
/// per request.
pub struct ResultCache {
    ttl: Duration,
    slots: Mutex<HashMap<QueryRequest, Arc<Slot>>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached outcome for `key`, or run `run` to produce it.
    /// Failed outcomes reach everyone waiting on that run and are then
    /// dropped so the next call tries again.
    ///
    /// The run happens on its own task. A caller that goes away stops
    /// waiting but leaves the run going, and later callers for the same key
    /// join it.
    pub async fn get_or_run<F, Fut>(&self, key: &QueryRequest, run: F) -> (CachedOutcome, CacheStatus)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<ResultTable, RunError>> + Send + 'static,
    {
        let slot = self.slot_for(key);

        let ran = Arc::new(AtomicBool::new(false));
        let task = {
            let slot = slot.clone();
            let ran = ran.clone();
            tokio::spawn(async move {
                slot.cell
                    .get_or_init(|| async move {
                        ran.store(true, Ordering::Relaxed);
                        let outcome = run().await.map(Arc::new);
                        Completed {
                            at: Instant::now(),
                            outcome,
                        }
                    })
                    .await
                    .clone()
            })
        };

        let completed = match task.await {
            Ok(completed) => completed,
            Err(e) => {
                warn!("Query task for database {} did not complete: {}", key.database, e);
                Completed {
                    at: Instant::now(),
                    outcome: Err(RunError::Interrupted(e.to_string())),
                }
            }
        };

        if completed.outcome.is_err() {
            self.evict(key, &slot);
        }

        let status = if ran.load(Ordering::Relaxed) {
            CacheStatus::Miss
        } else {
            CacheStatus::Hit
        };
        (completed.outcome, status)
    }

    /// Number of entries currently held, including in-flight ones.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn slot_for(&self, key: &QueryRequest) -> Arc<Slot> {
        let mut slots = self.lock();

        if let Some(slot) = slots.get(key) {
            if slot.is_reusable(self.ttl) {
                return slot.clone();
            }
        }

        let ttl = self.ttl;
        slots.retain(|_, slot| slot.is_reusable(ttl));

        debug!("Cache miss for query on database {}", key.database);
        let slot = Arc::new(Slot::default());
        slots.insert(key.clone(), slot.clone());
        slot
    }

    fn evict(&self, key: &QueryRequest, slot: &Arc<Slot>) {
        let mut slots = self.lock();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<QueryRequest, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
