//! Worker naming and the bounded fan-out pool used by scrape and fetch stages.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, ThreadId};

use tokio_util::sync::CancellationToken;

use crate::types::WorkerTask;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Fast path only: registry id -> name already issued to this thread.
    static NAME_CACHE: RefCell<HashMap<u64, String>> = RefCell::new(HashMap::new());
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum WorkerError {
    #[error("worker names exhausted: all {max_workers} names are already issued")]
    ResourceExhausted { max_workers: usize },
    #[error("max_workers must be at least 1")]
    InvalidPoolSize,
}

struct Registry {
    names: HashMap<ThreadId, String>,
    issued: usize,
}

/// Issues short stable names (`W1`..`Wn`) to the threads of one pool.
///
/// The mutex-guarded registry is the source of truth; each name goes to at
/// most one thread and at most `max_workers` names are ever issued.
pub struct WorkerIdentity {
    id: u64,
    max_workers: usize,
    registry: Mutex<Registry>,
}

impl WorkerIdentity {
    pub fn new(max_workers: usize) -> Result<Self, WorkerError> {
        if max_workers == 0 {
            return Err(WorkerError::InvalidPoolSize);
        }
        Ok(Self::with_capacity(max_workers))
    }

    fn with_capacity(max_workers: usize) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            max_workers,
            registry: Mutex::new(Registry {
                names: HashMap::new(),
                issued: 0,
            }),
        }
    }

    /// Name of the calling thread, issuing the next free one on first call.
    pub fn name_for_current_thread(&self) -> Result<String, WorkerError> {
        if let Some(name) = NAME_CACHE.with(|cache| cache.borrow().get(&self.id).cloned()) {
            return Ok(name);
        }

        let thread_id = thread::current().id();
        let name = {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            match registry.names.get(&thread_id) {
                Some(name) => name.clone(),
                None => {
                    if registry.issued >= self.max_workers {
                        return Err(WorkerError::ResourceExhausted {
                            max_workers: self.max_workers,
                        });
                    }
                    registry.issued += 1;
                    let name = format!("W{}", registry.issued);
                    registry.names.insert(thread_id, name.clone());
                    name
                }
            }
        };

        NAME_CACHE.with(|cache| cache.borrow_mut().insert(self.id, name.clone()));
        Ok(name)
    }

    /// Number of names handed out so far.
    pub fn issued(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .issued
    }
}

/// Counters reported after a pool run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub submitted: usize,
    pub completed: usize,
    /// Tasks drained without running because the run was cancelled.
    pub skipped: usize,
}

/// Fixed-size pool of scoped OS threads fed through a bounded queue.
///
/// Results come back over a channel and are consumed on the calling thread in
/// completion order, so consumers never need their own locking.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Result<Self, WorkerError> {
        if max_workers == 0 {
            return Err(WorkerError::InvalidPoolSize);
        }
        Ok(Self { max_workers })
    }

    /// Runs `work` over every item and feeds each result to `consume`.
    ///
    /// Once `cancel` fires, workers keep draining the queue but skip the work.
    pub fn run<T, R, W, C>(
        &self,
        items: Vec<T>,
        cancel: &CancellationToken,
        work: W,
        mut consume: C,
    ) -> PoolStats
    where
        T: Send,
        R: Send,
        W: Fn(WorkerTask<T>) -> R + Sync,
        C: FnMut(R),
    {
        // Fresh names per run: scoped threads never outlive it.
        let identity = WorkerIdentity::with_capacity(self.max_workers);
        let (task_tx, task_rx) = mpsc::sync_channel::<(usize, T)>(self.max_workers * 2);
        // Each worker owns a handle; once the last one exits, even by panic,
        // the receiver drops and the feeder stops instead of blocking.
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, result_rx) = mpsc::channel::<R>();
        let skipped = AtomicUsize::new(0);
        let mut stats = PoolStats::default();

        thread::scope(|scope| {
            for _ in 0..self.max_workers {
                let result_tx = result_tx.clone();
                let task_rx = Arc::clone(&task_rx);
                let (identity, work, skipped) = (&identity, &work, &skipped);
                scope.spawn(move || {
                    let worker_id = match identity.name_for_current_thread() {
                        Ok(name) => name,
                        Err(err) => {
                            tracing::error!("worker pool: {}", err);
                            return;
                        }
                    };
                    tracing::debug!(worker = %worker_id, "worker started");
                    loop {
                        let next = {
                            let rx = task_rx.lock().unwrap_or_else(|e| e.into_inner());
                            rx.recv()
                        };
                        let Ok((index, data)) = next else {
                            break;
                        };
                        if cancel.is_cancelled() {
                            skipped.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                        let out = work(WorkerTask {
                            index,
                            data,
                            worker_id: worker_id.clone(),
                        });
                        if result_tx.send(out).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);
            drop(task_rx);

            let feeder = scope.spawn(move || {
                let mut sent = 0usize;
                for (index, item) in items.into_iter().enumerate() {
                    if task_tx.send((index, item)).is_err() {
                        break;
                    }
                    sent += 1;
                }
                sent
            });

            for result in result_rx {
                consume(result);
                stats.completed += 1;
            }
            stats.submitted = feeder.join().unwrap_or(0);
        });

        stats.skipped = skipped.into_inner();
        stats
    }
}
