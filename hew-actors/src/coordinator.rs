//! The worker pool owner.
//!
//! Starts one thread per worker, routes external enqueues round-robin,
//! and runs the two-phase shutdown:
//!
//! 1. Feed [`ShutdownHelper`] sentinels one at a time. Sentinels can be
//!    stolen, so after each one the coordinator waits for *some* worker
//!    to report and removes that worker from the pending set.
//! 2. With every worker stopped, send `ExitMsg` to the utility actors
//!    (timer, printer) and join all threads.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::actor::{ActorAddr, ActorRef};
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::exit_reason::ExitReason;
use crate::msg;
use crate::resumable::{ExecutionUnit, Job};
use crate::system_messages::ExitMsg;
use crate::worker::{self, Pool, ShutdownHelper};

// ── Metrics ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    pub(crate) jobs_enqueued: AtomicU64,
    pub(crate) jobs_resumed: AtomicU64,
    pub(crate) steals: AtomicU64,
    pub(crate) jobs_attached: AtomicU64,
}

impl SchedulerCounters {
    pub(crate) fn snapshot(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_resumed: self.jobs_resumed.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
            jobs_attached: self.jobs_attached.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerMetrics {
    /// Jobs pushed onto worker queues (including requeues after yields).
    pub jobs_enqueued: u64,
    /// Calls to `resume` made by pool workers.
    pub jobs_resumed: u64,
    /// Jobs taken from a peer's queue.
    pub steals: u64,
    /// Event-based actors handed to the scheduler.
    pub jobs_attached: u64,
}

// ── Coordinator ─────────────────────────────────────────────────────────

pub(crate) struct Coordinator {
    pool: Arc<Pool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    /// Long-lived blocking actors stopped after the workers.
    utilities: Mutex<Vec<(ActorRef, JoinHandle<()>)>>,
    next_worker: AtomicUsize,
    stopped: AtomicBool,
}

impl Coordinator {
    /// Spawn the worker threads.
    ///
    /// # Errors
    ///
    /// [`Error::ThreadSpawn`] if a worker thread cannot be created; the
    /// workers started so far are stopped again.
    pub(crate) fn start(config: &RuntimeConfig, counters: Arc<SchedulerCounters>) -> Result<Self> {
        let n = config.worker_count;
        let pool = Arc::new(Pool::new(n, config.max_throughput, counters));
        let mut rng = StdRng::seed_from_u64(config.steal_seed.unwrap_or_else(|| rand::rng().random()));
        let mut threads = Vec::with_capacity(n);
        for id in 0..n {
            let first_victim = rng.random_range(0..n);
            let worker_pool = Arc::clone(&pool);
            let name = format!("hew-worker-{id}");
            match thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker::run(&worker_pool, id, first_victim))
            {
                Ok(handle) => threads.push(handle),
                Err(source) => {
                    stop_workers(&pool, (0..id).collect());
                    for handle in threads {
                        let _ = handle.join();
                    }
                    return Err(Error::ThreadSpawn { name, source });
                }
            }
        }
        tracing::debug!(workers = n, "scheduler started");
        Ok(Self {
            pool,
            threads: Mutex::new(threads),
            utilities: Mutex::new(Vec::new()),
            next_worker: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        })
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.pool.workers.len()
    }

    /// Hand `job` to the next worker in round-robin order.
    pub(crate) fn enqueue(&self, job: Job) {
        if self.stopped.load(Ordering::Acquire) {
            tracing::warn!("scheduler stopped, dropping job");
            return;
        }
        let idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.pool.workers.len();
        self.pool.workers[idx].exec_later(job);
    }

    pub(crate) fn add_utility(&self, actor: ActorRef, thread: JoinHandle<()>) {
        self.utilities.lock().push((actor, thread));
    }

    /// Two-phase shutdown. Must be called once, from outside the pool.
    pub(crate) fn shutdown(&self) {
        tracing::debug!("stopping workers");
        stop_workers(&self.pool, (0..self.pool.workers.len()).collect());
        self.stopped.store(true, Ordering::Release);

        tracing::debug!("stopping utility actors");
        let utilities = std::mem::take(&mut *self.utilities.lock());
        for (actor, _) in &utilities {
            actor.send(msg![ExitMsg {
                source: ActorAddr::default(),
                reason: ExitReason::USER_SHUTDOWN,
            }]);
        }
        for (_, thread) in utilities {
            let _ = thread.join();
        }

        for handle in std::mem::take(&mut *self.threads.lock()) {
            let _ = handle.join();
        }
        let dropped: usize = self.pool.workers.iter().map(|w| w.drain()).sum();
        tracing::debug!(dropped, "scheduler stopped");
    }
}

/// Stop every worker in `pending` by feeding sentinels.
fn stop_workers(pool: &Pool, mut pending: Vec<usize>) {
    while let Some(&target) = pending.first() {
        pool.workers[target].exec_later(Arc::new(ShutdownHelper));
        let done = pool.await_report();
        pending.retain(|&id| id != done);
    }
}
