//! Pool workers.
//!
//! Each worker owns a private job list (touched only by its own thread)
//! and an exposed [`ProducerConsumerList`] that any thread may push to
//! and that idle peers raid.
//!
//! # Polling tiers
//!
//! With no private work left, a worker polls its exposed queue with
//! decreasing urgency:
//!
//! | tier       | polls     | steal attempt   | pause between polls |
//! |------------|-----------|-----------------|---------------------|
//! | aggressive | 100       | every 10th poll | spin                |
//! | moderate   | 550       | every 5th poll  | 50µs sleep          |
//! | relaxed    | unbounded | every poll      | 10ms sleep          |

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_utils::Backoff;
use parking_lot::{Condvar, Mutex};

use crate::coordinator::SchedulerCounters;
use crate::queue::ProducerConsumerList;
use crate::resumable::{ExecutionUnit, Job, ResumeResult, Resumable};

// ── Constants ───────────────────────────────────────────────────────────

const AGGRESSIVE_POLLS: usize = 100;
const AGGRESSIVE_STEAL_INTERVAL: usize = 10;
const MODERATE_POLLS: usize = 550;
const MODERATE_STEAL_INTERVAL: usize = 5;
const MODERATE_SLEEP: Duration = Duration::from_micros(50);
const RELAXED_SLEEP: Duration = Duration::from_millis(10);

// ── Worker ──────────────────────────────────────────────────────────────

pub(crate) struct Worker {
    id: usize,
    exposed: ProducerConsumerList<Job>,
    counters: Arc<SchedulerCounters>,
}

impl Worker {
    pub(crate) fn new(id: usize, counters: Arc<SchedulerCounters>) -> Self {
        Self {
            id,
            exposed: ProducerConsumerList::new(),
            counters,
        }
    }

    /// Drop everything still queued. Only valid once no worker runs.
    pub(crate) fn drain(&self) -> usize {
        self.exposed.drain().len()
    }
}

impl ExecutionUnit for Worker {
    fn exec_later(&self, job: Job) {
        self.counters.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
        self.exposed.push_back(job);
    }
}

// ── Pool ────────────────────────────────────────────────────────────────

/// Shared by all worker threads and the coordinator.
pub(crate) struct Pool {
    pub(crate) workers: Vec<Arc<Worker>>,
    pub(crate) max_throughput: usize,
    counters: Arc<SchedulerCounters>,
    /// Ids of workers that have run a shutdown sentinel.
    reports: Mutex<VecDeque<usize>>,
    reported: Condvar,
}

impl Pool {
    pub(crate) fn new(
        worker_count: usize,
        max_throughput: usize,
        counters: Arc<SchedulerCounters>,
    ) -> Self {
        let workers = (0..worker_count)
            .map(|id| Arc::new(Worker::new(id, Arc::clone(&counters))))
            .collect();
        Self {
            workers,
            max_throughput,
            counters,
            reports: Mutex::new(VecDeque::new()),
            reported: Condvar::new(),
        }
    }

    fn report_shutdown(&self, id: usize) {
        self.reports.lock().push_back(id);
        self.reported.notify_all();
    }

    /// Block until some worker has shut down; returns its id.
    pub(crate) fn await_report(&self) -> usize {
        let mut reports = self.reports.lock();
        loop {
            if let Some(id) = reports.pop_front() {
                return id;
            }
            self.reported.wait(&mut reports);
        }
    }
}

/// Sentinel job: whichever worker runs it stops.
pub(crate) struct ShutdownHelper;

impl Resumable for ShutdownHelper {
    fn resume(&self, _unit: &Arc<dyn ExecutionUnit>, _max_throughput: usize) -> ResumeResult {
        ResumeResult::ShutdownExecutionUnit
    }
}

// ── Loop ────────────────────────────────────────────────────────────────

/// Thread body of worker `id`. Returns after running a [`ShutdownHelper`].
pub(crate) fn run(pool: &Pool, id: usize, first_victim: usize) {
    let me = Arc::clone(&pool.workers[id]);
    let unit: Arc<dyn ExecutionUnit> = Arc::clone(&me) as Arc<dyn ExecutionUnit>;
    let mut private: VecDeque<Job> = VecDeque::new();
    let mut victim = first_victim;
    tracing::debug!(worker = id, "worker started");

    loop {
        let job = match private.pop_front() {
            Some(job) => job,
            None => poll(pool, &me, &mut victim),
        };
        pool.counters.jobs_resumed.fetch_add(1, Ordering::Relaxed);
        match job.resume(&unit, pool.max_throughput) {
            ResumeResult::Done => job.detach_from_scheduler(),
            ResumeResult::ResumeLater => {
                // Yield to queued work rather than rerunning immediately.
                if me.exposed.is_empty() {
                    private.push_back(job);
                } else {
                    me.exposed.push_back(job);
                }
            }
            ResumeResult::AwaitingMessage => {}
            ResumeResult::ShutdownExecutionUnit => {
                for job in private.drain(..) {
                    me.exposed.push_back(job);
                }
                tracing::debug!(worker = id, "worker stopped");
                pool.report_shutdown(id);
                return;
            }
        }
        if private.len() > 1 && me.exposed.is_empty() {
            if let Some(oldest) = private.pop_front() {
                me.exposed.push_back(oldest);
            }
        }
    }
}

fn poll(pool: &Pool, me: &Worker, victim: &mut usize) -> Job {
    let backoff = Backoff::new();
    for i in 1..=AGGRESSIVE_POLLS {
        if let Some(job) = me.exposed.try_pop() {
            return job;
        }
        if i % AGGRESSIVE_STEAL_INTERVAL == 0 {
            if let Some(job) = raid(pool, me.id, victim) {
                return job;
            }
        }
        backoff.spin();
    }
    for i in 1..=MODERATE_POLLS {
        if let Some(job) = me.exposed.try_pop() {
            return job;
        }
        if i % MODERATE_STEAL_INTERVAL == 0 {
            if let Some(job) = raid(pool, me.id, victim) {
                return job;
            }
        }
        thread::sleep(MODERATE_SLEEP);
    }
    loop {
        if let Some(job) = me.exposed.try_pop() {
            return job;
        }
        if let Some(job) = raid(pool, me.id, victim) {
            return job;
        }
        thread::sleep(RELAXED_SLEEP);
    }
}

/// Steal one job from a peer's exposed queue.
///
/// Scans from the last successful victim; even ids scan upwards, odd
/// ids downwards, so two workers rarely raid each other in lockstep.
fn raid(pool: &Pool, id: usize, victim: &mut usize) -> Option<Job> {
    let n = pool.workers.len();
    if n < 2 {
        return None;
    }
    for step in 0..n {
        let candidate = if id % 2 == 0 {
            (*victim + step) % n
        } else {
            (*victim + n - step) % n
        };
        if candidate == id {
            continue;
        }
        if let Some(job) = pool.workers[candidate].exposed.try_pop() {
            *victim = candidate;
            pool.counters.steals.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(worker = id, victim = candidate, "stole job");
            return Some(job);
        }
    }
    None
}
