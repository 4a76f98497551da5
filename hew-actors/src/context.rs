//! The handler-facing actor API.
//!
//! Every handler receives `&mut Context`. It exposes the current
//! message's metadata, sending (plain, delayed, synchronous), behavior
//! changes, lifecycle control, links, monitors, and groups. Blocking
//! actors use the same type through [`BlockingContext`](crate::BlockingContext).

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actor::{self, bounce, ActorAddr, ActorId, ActorRef, Channel, SpawnFlags};
use crate::behavior::{Behavior, Reply};
use crate::behavior_stack::BehaviorStack;
use crate::blocking::BlockingContext;
use crate::error::{ActorExited, Error, Result};
use crate::exit_reason::ExitReason;
use crate::group::{Group, Subscription};
use crate::mailbox::{Mailbox, MailboxElement};
use crate::message::Message;
use crate::message_id::MessageId;
use crate::msg;
use crate::response::{ResponseHandle, ResponsePromise};
use crate::resumable::ExecutionUnit;
use crate::runtime::Runtime;
use crate::system_messages::{SyncTimeoutMsg, TimeoutMsg};

pub struct Context {
    pub(crate) self_ref: ActorRef,
    pub(crate) runtime: Runtime,
    /// Unit running the current resumption (pool workers only).
    pub(crate) host: Option<Arc<dyn ExecutionUnit>>,
    pub(crate) stack: BehaviorStack,
    /// Messages no behavior has accepted yet, oldest first.
    pub(crate) cache: VecDeque<MailboxElement>,
    /// The element being handled.
    pub(crate) current: Option<MailboxElement>,
    pub(crate) planned_exit: Option<ExitReason>,
    trap_exit: bool,
    last_request_id: u64,
    pub(crate) timeout_id: u64,
    pub(crate) has_timeout: bool,
    subscriptions: Vec<Subscription>,
    printed: bool,
    blocking: bool,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("actor", &self.self_ref)
            .field("stack_depth", &self.stack.len())
            .field("cached", &self.cache.len())
            .field("planned_exit", &self.planned_exit)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) fn new(self_ref: ActorRef, blocking: bool) -> Self {
        let runtime = self_ref.0.runtime.clone();
        Self {
            self_ref,
            runtime,
            host: None,
            stack: BehaviorStack::new(),
            cache: VecDeque::new(),
            current: None,
            planned_exit: None,
            trap_exit: false,
            last_request_id: 0,
            timeout_id: 0,
            has_timeout: false,
            subscriptions: Vec::new(),
            printed: false,
            blocking,
        }
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.self_ref.0.mailbox
    }

    // ── Identity ────────────────────────────────────────────────────────

    #[must_use]
    pub fn self_ref(&self) -> &ActorRef {
        &self.self_ref
    }

    #[must_use]
    pub fn addr(&self) -> ActorAddr {
        self.self_ref.addr()
    }

    #[must_use]
    pub fn id(&self) -> ActorId {
        self.self_ref.id()
    }

    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    // ── Current message ─────────────────────────────────────────────────

    /// Sender of the message being handled (invalid if anonymous).
    #[must_use]
    pub fn sender(&self) -> ActorAddr {
        self.current
            .as_ref()
            .map(|e| e.sender.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn message_id(&self) -> MessageId {
        self.current.as_ref().map(|e| e.mid).unwrap_or_default()
    }

    /// The actor that forwarded the current message to us, if any.
    #[must_use]
    pub fn forwarded_by(&self) -> Option<ActorAddr> {
        self.current.as_ref().and_then(|e| e.forwarded_by.clone())
    }

    // ── Sending ─────────────────────────────────────────────────────────

    pub fn send<C: Channel + ?Sized>(&self, dest: &C, msg: Message) {
        dest.enqueue(&self.addr(), MessageId::default(), msg, self.host.as_ref());
    }

    /// Send with the high-priority flag; overtakes ordinary mail at
    /// priority-aware receivers.
    pub fn send_high_priority<C: Channel + ?Sized>(&self, dest: &C, msg: Message) {
        dest.enqueue(
            &self.addr(),
            MessageId::default().with_high_priority(),
            msg,
            self.host.as_ref(),
        );
    }

    /// Deliver `msg` to `dest` after `delay`, via the timer actor.
    pub fn delayed_send<C>(&self, dest: &C, delay: Duration, msg: Message)
    where
        C: Channel + Clone + 'static,
    {
        self.runtime.schedule_delivery(
            Arc::new(dest.clone()),
            self.addr(),
            MessageId::default(),
            msg,
            delay,
        );
    }

    /// Send a request; install a reply handler on the returned handle.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidActor`] if `dest` does not refer to a live cell.
    pub fn sync_send(
        &mut self,
        dest: impl Into<ActorAddr>,
        msg: Message,
    ) -> Result<ResponseHandle<'_>> {
        let id = self.send_request(&dest.into(), msg)?;
        Ok(ResponseHandle::new(self, id))
    }

    /// Like [`sync_send`](Self::sync_send); if no reply arrived within
    /// `timeout`, the handler sees a `SyncTimeoutMsg` instead.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidActor`] if `dest` does not refer to a live cell.
    pub fn timed_sync_send(
        &mut self,
        dest: impl Into<ActorAddr>,
        timeout: Duration,
        msg: Message,
    ) -> Result<ResponseHandle<'_>> {
        let id = self.send_request(&dest.into(), msg)?;
        self.schedule_sync_timeout(id, timeout);
        Ok(ResponseHandle::new(self, id))
    }

    /// Enqueue a fresh request to `dest`; returns the response id.
    pub(crate) fn send_request(&mut self, dest: &ActorAddr, msg: Message) -> Result<MessageId> {
        let target = dest.upgrade().ok_or(Error::InvalidActor)?;
        self.last_request_id += 1;
        let request = MessageId::request(self.last_request_id);
        target
            .0
            .enqueue(&self.addr(), request, msg, self.host.as_ref());
        Ok(request.response_id())
    }

    pub(crate) fn schedule_sync_timeout(&self, response_id: MessageId, timeout: Duration) {
        let me = self.addr();
        self.runtime.schedule_delivery(
            Arc::new(me.clone()),
            me,
            response_id,
            msg![SyncTimeoutMsg],
            timeout,
        );
    }

    pub(crate) fn await_response(&mut self, response_id: MessageId, handler: Behavior) {
        self.stack.push(handler, response_id);
    }

    /// Answer the current request now. No-op if the current message is
    /// not a request or was already answered.
    pub fn reply(&mut self, msg: Message) {
        let me = self.addr();
        let Some(cur) = self.current.as_mut() else {
            return;
        };
        if !cur.mid.is_request() || cur.mid.is_answered() {
            return;
        }
        let response_id = cur.mid.response_id();
        cur.mid.mark_as_answered();
        let to = cur.sender.clone();
        to.enqueue(&me, response_id, msg, self.host.as_ref());
    }

    /// Take over answering the current request.
    ///
    /// Returns an invalid promise if there is nothing to answer.
    pub fn make_response_promise(&mut self) -> ResponsePromise {
        let me = self.addr();
        match self.current.as_mut() {
            Some(cur) if cur.mid.is_request() && !cur.mid.is_answered() => {
                cur.mid.mark_as_answered();
                ResponsePromise::new(me, cur.sender.clone(), cur.mid.response_id())
            }
            _ => ResponsePromise::default(),
        }
    }

    /// Pass the current message on to `dest`, keeping its sender and
    /// id; `dest` answers in our place.
    pub fn forward_to(&mut self, dest: &ActorRef) {
        let me = self.addr();
        let Some(cur) = self.current.as_mut() else {
            return;
        };
        let mut elem = cur.clone();
        elem.forwarded_by = Some(me);
        cur.mid.mark_as_answered();
        dest.0.push_element(elem, self.host.as_ref());
    }

    // ── Behavior ────────────────────────────────────────────────────────

    /// Replace the current behavior. `unbecome` will not bring the old
    /// one back.
    pub fn become_(&mut self, behavior: Behavior) {
        self.stack.pop_async_back();
        self.install(behavior);
    }

    /// Push `behavior` on top of the current one.
    pub fn become_keep(&mut self, behavior: Behavior) {
        self.install(behavior);
    }

    /// Return to the previous behavior. An event-based actor whose stack
    /// runs empty terminates normally.
    pub fn unbecome(&mut self) {
        self.stack.pop_async_back();
        let timeout = self.stack.top().and_then(Behavior::timeout);
        self.request_timeout(timeout);
    }

    #[must_use]
    pub fn has_behavior(&self) -> bool {
        self.stack.top().is_some()
    }

    fn install(&mut self, behavior: Behavior) {
        let timeout = behavior.timeout();
        self.stack.push(behavior, MessageId::default());
        self.request_timeout(timeout);
    }

    /// Arm a behavior timeout, invalidating any pending one.
    pub(crate) fn request_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout_id += 1;
        self.has_timeout = false;
        if self.blocking {
            // Blocking receives turn timeouts into deadlines.
            return;
        }
        if let Some(after) = timeout {
            self.has_timeout = true;
            let me = self.addr();
            self.runtime.schedule_delivery(
                Arc::new(me.clone()),
                me,
                MessageId::default(),
                msg![TimeoutMsg {
                    id: self.timeout_id
                }],
                after,
            );
        }
    }

    pub(crate) fn is_active_timeout(&self, id: u64) -> bool {
        self.has_timeout && id == self.timeout_id
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Terminate after the current handler returns. The first reason wins.
    pub fn quit(&mut self, reason: ExitReason) {
        if self.planned_exit.is_none() {
            self.planned_exit = Some(reason);
        }
    }

    #[must_use]
    pub fn planned_exit_reason(&self) -> Option<ExitReason> {
        self.planned_exit
    }

    /// With `true`, `ExitMsg`s are delivered as ordinary messages
    /// instead of terminating this actor.
    pub fn trap_exit(&mut self, enabled: bool) {
        self.trap_exit = enabled;
    }

    #[must_use]
    pub fn traps_exit(&self) -> bool {
        self.trap_exit
    }

    /// Link to `other`: each gets the other's `ExitMsg` on termination.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidActor`] if `other` does not refer to a live cell.
    pub fn link_to(&mut self, other: impl Into<ActorAddr>) -> Result<()> {
        let other = other.into().upgrade().ok_or(Error::InvalidActor)?;
        actor::link(&self.self_ref, &other);
        Ok(())
    }

    pub fn unlink_from(&mut self, other: impl Into<ActorAddr>) {
        let other = other.into();
        match other.upgrade() {
            Some(peer) => actor::unlink(&self.self_ref, &peer),
            None => self.self_ref.0.remove_link_entry(&other),
        }
    }

    /// Receive a `DownMsg` when `other` terminates.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidActor`] if `other` does not refer to a live cell.
    pub fn monitor(&mut self, other: impl Into<ActorAddr>) -> Result<()> {
        let other = other.into().upgrade().ok_or(Error::InvalidActor)?;
        actor::monitor(&self.self_ref, &other);
        Ok(())
    }

    pub fn demonitor(&mut self, other: impl Into<ActorAddr>) {
        if let Some(target) = other.into().upgrade() {
            target.0.remove_monitor_entry(&self.addr());
        }
    }

    /// Run `f` with our exit reason when we terminate.
    pub fn attach_functor<F>(&self, f: F)
    where
        F: FnOnce(ExitReason) + Send + 'static,
    {
        self.self_ref.attach_functor(f);
    }

    // ── Spawning ────────────────────────────────────────────────────────

    /// Spawn an event-based actor. `LINKED` and `MONITORED` refer to us.
    ///
    /// # Errors
    ///
    /// See [`Runtime::spawn_with`].
    pub fn spawn<F>(&mut self, flags: SpawnFlags, factory: F) -> Result<ActorRef>
    where
        F: FnOnce(&mut Context) -> Behavior + Send + 'static,
    {
        self.runtime
            .spawn_event(flags, Some(&self.self_ref), Box::new(factory))
    }

    /// Spawn a blocking actor on its own thread. `LINKED` and
    /// `MONITORED` refer to us.
    ///
    /// # Errors
    ///
    /// See [`Runtime::spawn_blocking`].
    pub fn spawn_blocking<F>(&mut self, flags: SpawnFlags, body: F) -> Result<ActorRef>
    where
        F: FnOnce(&mut BlockingContext) -> std::result::Result<(), ActorExited> + Send + 'static,
    {
        self.runtime
            .spawn_blocking_detached(flags, Some(&self.self_ref), Box::new(body))
    }

    // ── Groups ──────────────────────────────────────────────────────────

    /// Subscribe to `group` until we leave it or terminate.
    pub fn join(&mut self, group: &Group) {
        if self.subscriptions.iter().any(|s| s.group().same_as(group)) {
            return;
        }
        self.subscriptions.push(group.subscribe(self.addr()));
    }

    pub fn leave(&mut self, group: &Group) {
        self.subscriptions.retain(|s| !s.group().same_as(group));
    }

    // ── Output ──────────────────────────────────────────────────────────

    /// Append `text` to this actor's output buffer in the printer.
    /// Complete lines are written immediately, the rest on exit.
    pub fn print(&mut self, text: impl Into<String>) {
        self.printed = true;
        self.runtime.print(self.id(), text.into());
    }

    // ── Internal ────────────────────────────────────────────────────────

    /// Apply a handler's result to the current element.
    pub(crate) fn finish_handler(&mut self, reply: Reply) {
        match reply {
            Reply::Message(msg) => self.reply(msg),
            Reply::Silent => {
                // An unanswered request gets an empty reply so the
                // requester is not left waiting.
                let pending = self
                    .current
                    .as_ref()
                    .is_some_and(|c| c.mid.is_request() && !c.mid.is_answered());
                if pending {
                    self.reply(Message::new());
                }
            }
            Reply::Failed(err) => {
                tracing::warn!(actor = self.id(), error = %err, "handler failed");
                self.quit(ExitReason::UNHANDLED_EXCEPTION);
            }
        }
    }

    /// Release everything this actor holds and run cell cleanup.
    pub(crate) fn terminate(&mut self, reason: ExitReason) {
        let me = self.addr();
        if let Some(cur) = self.current.take() {
            bounce(&me, cur, reason);
        }
        for elem in self.cache.drain(..) {
            bounce(&me, elem, reason);
        }
        self.subscriptions.clear();
        self.stack.clear();
        self.stack.cleanup();
        if self.printed {
            self.runtime.flush_output(self.id());
        }
        self.self_ref.0.cleanup(reason);
    }
}
