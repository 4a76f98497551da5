//! The runtime context object.
//!
//! A [`Runtime`] owns one scheduler, registry, group manager, timer
//! actor, and printer actor. It is a cheap handle: clones share the same
//! instance, and every actor cell holds one. Nothing here is global, so
//! several runtimes can coexist in one process.
//!
//! # Shutdown
//!
//! [`Runtime::shutdown`] stops the worker pool, then the utility actors,
//! then terminates every actor still alive with `USER_SHUTDOWN` and
//! joins the threads of detached and blocking actors. It must be called
//! from outside the worker pool (e.g. from `main` or a scoped actor).

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::actor::{self, ActorAddr, ActorCell, ActorId, ActorRef, Channel, NodeId, SpawnFlags};
use crate::behavior::Behavior;
use crate::blocking::{run_blocking, BlockingContext, Body, ScopedActor};
use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::coordinator::{Coordinator, SchedulerCounters, SchedulerMetrics};
use crate::error::{ActorExited, Error, Result};
use crate::event_based::{kill, run_detached, EventState, Factory, ThreadUnit};
use crate::exit_reason::ExitReason;
use crate::group::{Group, GroupManager};
use crate::mailbox::Mailbox;
use crate::message::Message;
use crate::message_id::MessageId;
use crate::msg;
use crate::printer::{self, PrinterCmd, Sink};
use crate::registry::ActorRegistry;
use crate::resumable::{ExecutionUnit, Resumable};
use crate::timer::{self, DelayedSend};

struct RuntimeInner {
    config: RuntimeConfig,
    node: NodeId,
    next_actor_id: AtomicU64,
    registry: Arc<ActorRegistry>,
    groups: GroupManager,
    counters: Arc<SchedulerCounters>,
    coordinator: Coordinator,
    timer: OnceLock<ActorAddr>,
    printer: OnceLock<ActorAddr>,
    /// Threads of detached and blocking actors, joined at shutdown.
    detached: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("node", &self.inner.node)
            .field("workers", &self.inner.coordinator.worker_count())
            .field("running", &self.inner.registry.running())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Runtime {
    // ── Construction ────────────────────────────────────────────────────

    /// Start a runtime printing actor output to stdout.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `config` does not validate,
    /// [`Error::ThreadSpawn`] if a thread cannot be started.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::with_printer_output(config, io::stdout())
    }

    /// Start a runtime whose printer writes to `out`.
    ///
    /// # Errors
    ///
    /// See [`Runtime::new`].
    pub fn with_printer_output<W>(config: RuntimeConfig, out: W) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        config.validate()?;
        let counters = Arc::new(SchedulerCounters::default());
        let coordinator = Coordinator::start(&config, Arc::clone(&counters))?;
        let runtime = Self {
            inner: Arc::new(RuntimeInner {
                config,
                node: NodeId::random(),
                next_actor_id: AtomicU64::new(1),
                registry: Arc::new(ActorRegistry::new()),
                groups: GroupManager::new(),
                counters,
                coordinator,
                timer: OnceLock::new(),
                printer: OnceLock::new(),
                detached: Mutex::new(Vec::new()),
                stopped: AtomicBool::new(false),
            }),
        };
        if let Err(err) = runtime.start_utilities(Box::new(out)) {
            runtime.shutdown();
            return Err(err);
        }
        tracing::debug!(node = %runtime.inner.node, "runtime started");
        Ok(runtime)
    }

    fn start_utilities(&self, sink: Sink) -> Result<()> {
        let (timer, handle) =
            self.spawn_blocking_actor(SpawnFlags::HIDDEN, None, Box::new(timer::run))?;
        let _ = self.inner.timer.set(timer.addr());
        self.inner.coordinator.add_utility(timer, handle);

        let (printer, handle) = self.spawn_blocking_actor(
            SpawnFlags::HIDDEN,
            None,
            Box::new(move |bctx: &mut BlockingContext| printer::run(bctx, sink)),
        )?;
        let _ = self.inner.printer.set(printer.addr());
        self.inner.coordinator.add_utility(printer, handle);
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────────────

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.inner.node
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ActorRegistry> {
        &self.inner.registry
    }

    /// The group called `name`.
    #[must_use]
    pub fn group(&self, name: &str) -> Group {
        self.inner.groups.get(name)
    }

    #[must_use]
    pub fn metrics(&self) -> SchedulerMetrics {
        self.inner.counters.snapshot()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }

    pub(crate) fn counters(&self) -> &SchedulerCounters {
        &self.inner.counters
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::RuntimeStopped);
        }
        Ok(())
    }

    fn next_id(&self) -> ActorId {
        self.inner.next_actor_id.fetch_add(1, Ordering::Relaxed)
    }

    // ── Spawning ────────────────────────────────────────────────────────

    /// Spawn an event-based actor on the worker pool.
    ///
    /// `factory` runs on the actor's first resumption and returns its
    /// initial behavior; an empty behavior means the actor terminates
    /// as soon as it has nothing left to wait for.
    ///
    /// # Errors
    ///
    /// [`Error::RuntimeStopped`] after shutdown.
    pub fn spawn<F>(&self, factory: F) -> Result<ActorRef>
    where
        F: FnOnce(&mut Context) -> Behavior + Send + 'static,
    {
        self.spawn_with(SpawnFlags::empty(), factory)
    }

    /// Spawn an event-based actor with `flags`. `LINKED` and `MONITORED`
    /// are ignored outside an actor.
    ///
    /// # Errors
    ///
    /// [`Error::RuntimeStopped`] after shutdown, [`Error::ThreadSpawn`]
    /// if a detached actor's thread cannot be started.
    pub fn spawn_with<F>(&self, flags: SpawnFlags, factory: F) -> Result<ActorRef>
    where
        F: FnOnce(&mut Context) -> Behavior + Send + 'static,
    {
        self.spawn_event(flags, None, Box::new(factory))
    }

    /// Spawn a blocking actor running `body` on its own thread.
    ///
    /// # Errors
    ///
    /// [`Error::RuntimeStopped`] after shutdown, [`Error::ThreadSpawn`]
    /// if the thread cannot be started.
    pub fn spawn_blocking<F>(&self, flags: SpawnFlags, body: F) -> Result<ActorRef>
    where
        F: FnOnce(&mut BlockingContext) -> std::result::Result<(), ActorExited> + Send + 'static,
    {
        self.spawn_blocking_detached(flags, None, Box::new(body))
    }

    /// A hidden blocking actor running on the calling thread.
    ///
    /// # Errors
    ///
    /// [`Error::RuntimeStopped`] after shutdown.
    pub fn scoped(&self) -> Result<ScopedActor> {
        self.ensure_running()?;
        let flags = SpawnFlags::HIDDEN;
        let cell = ActorCell::new(
            self.next_id(),
            self.clone(),
            flags,
            Mailbox::new(false, true, false),
            None,
            false,
        );
        let actor = ActorRef(Arc::new(cell));
        self.register(&actor, flags);
        Ok(ScopedActor::new(actor))
    }

    pub(crate) fn spawn_event(
        &self,
        flags: SpawnFlags,
        parent: Option<&ActorRef>,
        factory: Factory,
    ) -> Result<ActorRef> {
        self.ensure_running()?;
        let id = self.next_id();
        let lazy = flags.contains(SpawnFlags::LAZY_INIT);
        let (home, thread) = if flags.intersects(SpawnFlags::DETACHED | SpawnFlags::BLOCKING_API) {
            let unit = Arc::new(ThreadUnit::default());
            let runner = Arc::clone(&unit);
            let max_throughput = self.inner.config.max_throughput;
            let name = format!("hew-actor-{id}");
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_detached(&runner, max_throughput))
                .map_err(|source| Error::ThreadSpawn { name, source })?;
            (Some(unit as Arc<dyn ExecutionUnit>), Some(handle))
        } else {
            (None, None)
        };
        let mailbox = Mailbox::new(flags.contains(SpawnFlags::PRIORITY_AWARE), false, lazy);
        let actor = ActorRef(Arc::new(ActorCell::new(
            id,
            self.clone(),
            flags,
            mailbox,
            home,
            true,
        )));
        if let Some(slot) = &actor.0.event {
            let ctx = Context::new(actor.clone(), false);
            *slot.lock() = Some(EventState::new(ctx, factory));
        }
        self.register(&actor, flags);
        if let Some(parent) = parent {
            attach_parent(parent, &actor, flags);
        }
        if let Some(handle) = thread {
            self.inner.detached.lock().push(handle);
        }
        tracing::debug!(actor = id, ?flags, "spawned actor");
        actor.0.attach_to_scheduler();
        if !lazy {
            actor.0.schedule(None);
        }
        Ok(actor)
    }

    pub(crate) fn spawn_blocking_detached(
        &self,
        flags: SpawnFlags,
        parent: Option<&ActorRef>,
        body: Body,
    ) -> Result<ActorRef> {
        self.ensure_running()?;
        let (actor, handle) = self.spawn_blocking_actor(flags, parent, body)?;
        self.inner.detached.lock().push(handle);
        Ok(actor)
    }

    fn spawn_blocking_actor(
        &self,
        flags: SpawnFlags,
        parent: Option<&ActorRef>,
        body: Body,
    ) -> Result<(ActorRef, JoinHandle<()>)> {
        let id = self.next_id();
        let mailbox = Mailbox::new(flags.contains(SpawnFlags::PRIORITY_AWARE), true, false);
        let actor = ActorRef(Arc::new(ActorCell::new(
            id,
            self.clone(),
            flags,
            mailbox,
            None,
            false,
        )));
        self.register(&actor, flags);
        if let Some(parent) = parent {
            attach_parent(parent, &actor, flags);
        }
        let name = format!("hew-blocking-{id}");
        let runner = actor.clone();
        match thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_blocking(runner, body))
        {
            Ok(handle) => {
                tracing::debug!(actor = id, ?flags, "spawned blocking actor");
                Ok((actor, handle))
            }
            Err(source) => {
                actor.0.cleanup(ExitReason::UNHANDLED_EXCEPTION);
                Err(Error::ThreadSpawn { name, source })
            }
        }
    }

    fn register(&self, actor: &ActorRef, flags: SpawnFlags) {
        self.inner.registry.put(actor);
        if !flags.contains(SpawnFlags::HIDDEN) {
            self.inner.registry.inc_running();
        }
    }

    // ── Sending ─────────────────────────────────────────────────────────

    /// Send `msg` to `dest` without a sender.
    pub fn send<C: Channel + ?Sized>(&self, dest: &C, msg: Message) {
        dest.enqueue(&ActorAddr::default(), MessageId::default(), msg, None);
    }

    /// Send `msg` to `dest` after `delay`, without a sender.
    pub fn delayed_send<C>(&self, dest: &C, delay: Duration, msg: Message)
    where
        C: Channel + Clone + 'static,
    {
        self.schedule_delivery(
            Arc::new(dest.clone()),
            ActorAddr::default(),
            MessageId::default(),
            msg,
            delay,
        );
    }

    pub(crate) fn schedule_delivery(
        &self,
        target: Arc<dyn Channel>,
        sender: ActorAddr,
        mid: MessageId,
        msg: Message,
        delay: Duration,
    ) {
        if delay.is_zero() {
            target.enqueue(&sender, mid, msg, None);
            return;
        }
        let Some(deadline) = Instant::now().checked_add(delay) else {
            tracing::trace!(?delay, "delay out of range, message never fires");
            return;
        };
        let Some(timer) = self.inner.timer.get() else {
            tracing::warn!("timer not running, dropping delayed message");
            return;
        };
        timer.enqueue_raw(
            &ActorAddr::default(),
            MessageId::default(),
            msg![DelayedSend {
                deadline,
                target,
                sender,
                mid,
                msg,
            }],
        );
    }

    // ── Printing ────────────────────────────────────────────────────────

    pub(crate) fn print(&self, actor: ActorId, text: String) {
        self.printer_cmd(PrinterCmd::Output { actor, text });
    }

    pub(crate) fn flush_output(&self, actor: ActorId) {
        self.printer_cmd(PrinterCmd::Flush { actor });
    }

    fn printer_cmd(&self, cmd: PrinterCmd) {
        if let Some(printer) = self.inner.printer.get() {
            printer.enqueue_raw(&ActorAddr::default(), MessageId::default(), msg![cmd]);
        }
    }

    // ── Barriers & shutdown ─────────────────────────────────────────────

    /// Block until exactly `n` visible actors are running.
    pub fn await_running_count_equal(&self, n: usize) {
        self.inner.registry.await_running_count_equal(n);
    }

    /// Bounded [`await_running_count_equal`](Self::await_running_count_equal).
    /// Returns whether the count was reached in time.
    #[must_use]
    pub fn await_running_count_equal_timeout(&self, n: usize, timeout: Duration) -> bool {
        self.inner
            .registry
            .await_running_count_equal_timeout(n, timeout)
    }

    /// Stop the runtime. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(node = %self.inner.node, "runtime shutting down");
        self.inner.coordinator.shutdown();

        let survivors = self.inner.registry.live_actors();
        tracing::debug!(count = survivors.len(), "terminating remaining actors");
        for actor in survivors {
            kill(&actor.0, ExitReason::USER_SHUTDOWN);
        }

        let current = thread::current().id();
        let handles = std::mem::take(&mut *self.inner.detached.lock());
        for handle in handles {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        tracing::debug!(node = %self.inner.node, "runtime stopped");
    }
}

fn attach_parent(parent: &ActorRef, child: &ActorRef, flags: SpawnFlags) {
    if flags.contains(SpawnFlags::LINKED) {
        actor::link(parent, child);
    }
    if flags.contains(SpawnFlags::MONITORED) {
        actor::monitor(parent, child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_config() {
        let err = Runtime::new(RuntimeConfig::default().with_max_throughput(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn spawn_after_shutdown_fails() {
        let rt = Runtime::new(RuntimeConfig::default().with_worker_count(1)).unwrap();
        rt.shutdown();
        rt.shutdown();
        assert!(rt.is_stopped());
        assert!(matches!(
            rt.spawn(|_| Behavior::default()),
            Err(Error::RuntimeStopped)
        ));
        assert!(matches!(rt.scoped(), Err(Error::RuntimeStopped)));
    }
}
