//! The scheduler-facing job abstraction.
//!
//! Workers know nothing about actors: they pop [`Job`]s and call
//! [`Resumable::resume`] until the job reports that it is finished,
//! wants to run again, or is waiting for mail.

use std::sync::Arc;

/// What a job wants after a call to [`Resumable::resume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeResult {
    /// Finished for good; the worker detaches and drops it.
    Done,
    /// Yielded with work left; the worker requeues it.
    ResumeLater,
    /// Suspended on an empty mailbox. The next enqueue reschedules it,
    /// so the worker just drops its handle.
    AwaitingMessage,
    /// Stop the worker thread that ran this job.
    ShutdownExecutionUnit,
}

/// A unit of cooperative work.
pub trait Resumable: Send + Sync {
    /// Called once before the job is first handed to a scheduler.
    fn attach_to_scheduler(&self) {}

    /// Called once after `resume` returned [`ResumeResult::Done`].
    fn detach_from_scheduler(&self) {}

    /// Run until done, blocked, or `max_throughput` units of work are spent.
    ///
    /// `unit` is the execution unit running the job; work it spawns
    /// may be handed back to it through [`ExecutionUnit::exec_later`].
    fn resume(&self, unit: &Arc<dyn ExecutionUnit>, max_throughput: usize) -> ResumeResult;
}

pub type Job = Arc<dyn Resumable>;

/// Something that runs jobs: a pool worker, or a dedicated thread.
pub trait ExecutionUnit: Send + Sync {
    /// Queue `job` on this unit. Callable from any thread.
    fn exec_later(&self, job: Job);
}
