//! Event-based actors: cooperative jobs driven by execution units.
//!
//! An event-based actor is an [`ActorCell`] whose `event` slot holds its
//! [`EventState`]. Each [`resume`](Resumable::resume) runs the actor
//! until it has handled `max_throughput` messages, found its mailbox
//! empty, or decided to terminate.
//!
//! Detached actors (and `BLOCKING_API` ones) get a private
//! [`ThreadUnit`] instead of a pool worker.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::actor::{ActorAddr, ActorCell};
use crate::behavior::Behavior;
use crate::context::Context;
use crate::exit_reason::ExitReason;
use crate::invoke::{dispatch, drain_cache, Dispatch};
use crate::message_id::MessageId;
use crate::msg;
use crate::resumable::{ExecutionUnit, Job, ResumeResult, Resumable};
use crate::system_messages::ExitMsg;

pub(crate) type Factory = Box<dyn FnOnce(&mut Context) -> Behavior + Send>;

pub(crate) struct EventState {
    /// Runs on the first resumption.
    init: Option<Factory>,
    pub(crate) ctx: Context,
    /// Stack generation at which the cache was last scanned.
    scanned: u64,
}

enum Step {
    Yield,
    Suspend,
    Exit(ExitReason),
}

impl EventState {
    pub(crate) fn new(ctx: Context, init: Factory) -> Self {
        Self {
            init: Some(init),
            ctx,
            scanned: 0,
        }
    }

    fn run(&mut self, max_throughput: usize) -> Step {
        if let Some(init) = self.init.take() {
            let behavior = init(&mut self.ctx);
            if !behavior.is_empty() {
                self.ctx.become_keep(behavior);
            }
        }
        let mut handled = 0;
        loop {
            if let Some(reason) = self.ctx.planned_exit {
                return Step::Exit(reason);
            }
            if self.ctx.stack.is_empty() {
                return Step::Exit(ExitReason::NORMAL);
            }
            let generation = self.ctx.stack.generation();
            if self.ctx.cache.is_empty() {
                self.scanned = generation;
            } else if self.scanned != generation {
                handled += drain_cache(&mut self.ctx);
                self.scanned = self.ctx.stack.generation();
                continue;
            }
            if handled >= max_throughput {
                return Step::Yield;
            }
            let next = self.ctx.mailbox().try_pop();
            match next {
                Some(elem) => match dispatch(&mut self.ctx, elem) {
                    Dispatch::Skipped(elem) => self.ctx.cache.push_back(elem),
                    Dispatch::Handled | Dispatch::Dropped => handled += 1,
                },
                None => {
                    if self.ctx.mailbox().try_block() {
                        return Step::Suspend;
                    }
                }
            }
        }
    }
}

impl Resumable for ActorCell {
    fn attach_to_scheduler(&self) {
        self.runtime
            .counters()
            .jobs_attached
            .fetch_add(1, Ordering::Relaxed);
    }

    fn detach_from_scheduler(&self) {
        tracing::trace!(actor = self.id, "detached from scheduler");
    }

    fn resume(&self, unit: &Arc<dyn ExecutionUnit>, max_throughput: usize) -> ResumeResult {
        let Some(slot) = &self.event else {
            return ResumeResult::Done;
        };
        let mut guard = slot.lock();
        let Some(state) = guard.as_mut() else {
            return ResumeResult::Done;
        };
        if self.home.is_none() {
            state.ctx.host = Some(Arc::clone(unit));
        }
        let step = match catch_unwind(AssertUnwindSafe(|| state.run(max_throughput))) {
            Ok(step) => step,
            Err(payload) => {
                tracing::warn!(
                    actor = self.id,
                    panic = panic_message(payload.as_ref()),
                    "actor panicked"
                );
                Step::Exit(ExitReason::UNHANDLED_EXCEPTION)
            }
        };
        match step {
            Step::Yield => ResumeResult::ResumeLater,
            Step::Suspend => ResumeResult::AwaitingMessage,
            Step::Exit(reason) => {
                let Some(mut state) = guard.take() else {
                    return ResumeResult::Done;
                };
                drop(guard);
                state.ctx.terminate(reason);
                ResumeResult::Done
            }
        }
    }
}

/// Terminate `cell` from outside its thread of control.
///
/// Event-based actors are torn down in place; blocking actors get an
/// `ExitMsg` and unwind on their next receive.
pub(crate) fn kill(cell: &Arc<ActorCell>, reason: ExitReason) {
    match &cell.event {
        Some(slot) => {
            let state = slot.lock().take();
            if let Some(mut state) = state {
                state.ctx.terminate(reason);
            }
            // Wake a dedicated thread so it notices and exits.
            if let Some(home) = &cell.home {
                home.exec_later(Arc::clone(cell) as Job);
            }
        }
        None => cell.enqueue(
            &ActorAddr::default(),
            MessageId::default(),
            msg![ExitMsg {
                source: ActorAddr::default(),
                reason,
            }],
            None,
        ),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

// ── Dedicated threads ───────────────────────────────────────────────────

/// Execution unit owning one OS thread.
#[derive(Default)]
pub(crate) struct ThreadUnit {
    jobs: Mutex<VecDeque<Job>>,
    cond: Condvar,
}

impl ThreadUnit {
    fn next_job(&self) -> Job {
        let mut jobs = self.jobs.lock();
        loop {
            if let Some(job) = jobs.pop_front() {
                return job;
            }
            self.cond.wait(&mut jobs);
        }
    }
}

impl ExecutionUnit for ThreadUnit {
    fn exec_later(&self, job: Job) {
        self.jobs.lock().push_back(job);
        self.cond.notify_one();
    }
}

/// Thread body for a detached actor. Returns once its job is done.
pub(crate) fn run_detached(unit: &Arc<ThreadUnit>, max_throughput: usize) {
    let as_unit: Arc<dyn ExecutionUnit> = Arc::clone(unit) as Arc<dyn ExecutionUnit>;
    loop {
        let job = unit.next_job();
        match job.resume(&as_unit, max_throughput) {
            ResumeResult::Done => {
                job.detach_from_scheduler();
                break;
            }
            ResumeResult::ResumeLater => unit.exec_later(job),
            ResumeResult::AwaitingMessage => {}
            ResumeResult::ShutdownExecutionUnit => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Countdown {
        left: AtomicUsize,
        detached: AtomicUsize,
    }

    impl Resumable for Countdown {
        fn detach_from_scheduler(&self) {
            self.detached.fetch_add(1, Ordering::Relaxed);
        }

        fn resume(&self, _unit: &Arc<dyn ExecutionUnit>, _max: usize) -> ResumeResult {
            if self.left.fetch_sub(1, Ordering::Relaxed) > 1 {
                ResumeResult::ResumeLater
            } else {
                ResumeResult::Done
            }
        }
    }

    #[test]
    fn detached_thread_runs_job_to_completion() {
        let unit = Arc::new(ThreadUnit::default());
        let job = Arc::new(Countdown {
            left: AtomicUsize::new(3),
            detached: AtomicUsize::new(0),
        });
        unit.exec_later(Arc::clone(&job) as Job);
        let runner = Arc::clone(&unit);
        std::thread::spawn(move || run_detached(&runner, 10))
            .join()
            .unwrap();
        assert_eq!(job.left.load(Ordering::Relaxed), 0);
        assert_eq!(job.detached.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn panic_messages() {
        let p: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(p.as_ref()), "boom");
        let p: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(p.as_ref()), "bang");
        let p: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(p.as_ref()), "<non-string panic payload>");
    }
}
