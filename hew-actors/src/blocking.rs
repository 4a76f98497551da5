//! Blocking actors: actors that own a thread and pull messages with
//! explicit receive calls.
//!
//! A blocking actor runs a body closure on a dedicated OS thread (or,
//! for [`ScopedActor`], on the caller's thread). Every receive returns
//! `Err(ActorExited)` once the actor has decided to terminate, so
//! bodies propagate termination with `?`.
//!
//! Behavior timeouts become receive deadlines here; no timer messages
//! are involved.

use std::ops::{Deref, DerefMut};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::actor::{ActorAddr, ActorRef};
use crate::behavior::Behavior;
use crate::context::Context;
use crate::error::{ActorExited, Result};
use crate::event_based::panic_message;
use crate::exit_reason::ExitReason;
use crate::invoke::{dispatch, handle_exit_signal, Dispatch};
use crate::mailbox::MailboxElement;
use crate::message::Message;
use crate::message_id::MessageId;
use crate::response::ResponseHandle;

pub(crate) type Body =
    Box<dyn FnOnce(&mut BlockingContext) -> std::result::Result<(), ActorExited> + Send>;

/// Context of a blocking actor.
///
/// Dereferences to [`Context`] for everything that does not block.
#[derive(Debug)]
pub struct BlockingContext {
    ctx: Context,
}

impl Deref for BlockingContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.ctx
    }
}

impl DerefMut for BlockingContext {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }
}

impl BlockingContext {
    pub(crate) fn new(actor: ActorRef) -> Self {
        Self {
            ctx: Context::new(actor, true),
        }
    }

    fn check_exit(&self) -> std::result::Result<(), ActorExited> {
        match self.ctx.planned_exit {
            Some(reason) => Err(ActorExited(reason)),
            None => Ok(()),
        }
    }

    // ── Receiving ───────────────────────────────────────────────────────

    /// Block until one message matching `behavior` was handled.
    ///
    /// If `behavior` has a timeout and nothing matched in time, its
    /// timeout handler runs instead. Messages that do not match stay
    /// queued for later receives.
    ///
    /// # Errors
    ///
    /// [`ActorExited`] once the actor is terminating.
    pub fn receive(&mut self, behavior: Behavior) -> std::result::Result<(), ActorExited> {
        self.check_exit()?;
        let depth = self.ctx.stack.len();
        // A timeout too large to represent never fires.
        let deadline = behavior
            .timeout()
            .and_then(|after| Instant::now().checked_add(after));
        self.ctx.stack.push(behavior.clone(), MessageId::default());
        let received = self.dequeue_one(deadline);
        self.ctx.stack.truncate(depth);
        self.ctx.stack.cleanup();
        if !received && self.ctx.planned_exit.is_none() {
            behavior.handle_timeout(&mut self.ctx);
        }
        self.check_exit()
    }

    /// Receive with `behavior` until the actor terminates.
    ///
    /// # Errors
    ///
    /// Always ends with [`ActorExited`].
    pub fn receive_loop(&mut self, behavior: Behavior) -> std::result::Result<(), ActorExited> {
        loop {
            self.receive(behavior.clone())?;
        }
    }

    /// Receive with `behavior` as long as `pred` holds.
    ///
    /// # Errors
    ///
    /// [`ActorExited`] once the actor is terminating.
    pub fn receive_while<P>(
        &mut self,
        mut pred: P,
        behavior: Behavior,
    ) -> std::result::Result<(), ActorExited>
    where
        P: FnMut() -> bool,
    {
        while pred() {
            self.receive(behavior.clone())?;
        }
        Ok(())
    }

    /// Receive exactly `n` messages with `behavior`.
    ///
    /// # Errors
    ///
    /// [`ActorExited`] once the actor is terminating.
    pub fn receive_for(&mut self, n: usize, behavior: Behavior) -> std::result::Result<(), ActorExited> {
        for _ in 0..n {
            self.receive(behavior.clone())?;
        }
        Ok(())
    }

    /// Returns `false` if `deadline` passed before anything was handled.
    fn dequeue_one(&mut self, deadline: Option<Instant>) -> bool {
        let mut i = 0;
        while i < self.ctx.cache.len() {
            let Some(elem) = self.ctx.cache.remove(i) else {
                break;
            };
            match dispatch(&mut self.ctx, elem) {
                Dispatch::Skipped(elem) => {
                    self.ctx.cache.insert(i, elem);
                    i += 1;
                }
                Dispatch::Handled => return true,
                Dispatch::Dropped => {}
            }
        }
        loop {
            if self.ctx.planned_exit.is_some() {
                return true;
            }
            let Some(elem) = self.ctx.mailbox().try_pop() else {
                if !self.ctx.mailbox().await_data(deadline) {
                    return false;
                }
                continue;
            };
            match dispatch(&mut self.ctx, elem) {
                Dispatch::Skipped(elem) => self.ctx.cache.push_back(elem),
                Dispatch::Handled => return true,
                Dispatch::Dropped => {}
            }
        }
    }

    /// Next raw element, for runtime-internal actors that do their own
    /// matching. Exit signals are applied first. `Ok(None)` on timeout.
    pub(crate) fn next_message(
        &mut self,
        deadline: Option<Instant>,
    ) -> std::result::Result<Option<MailboxElement>, ActorExited> {
        loop {
            self.check_exit()?;
            match self.ctx.mailbox().try_pop() {
                Some(elem) => {
                    if handle_exit_signal(&mut self.ctx, &elem) {
                        continue;
                    }
                    return Ok(Some(elem));
                }
                None => {
                    if !self.ctx.mailbox().await_data(deadline) {
                        return Ok(None);
                    }
                }
            }
        }
    }

    // ── Requests ────────────────────────────────────────────────────────

    /// Send a request; wait for the reply with [`ResponseHandle::receive`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidActor`](crate::Error::InvalidActor) if `dest`
    /// does not refer to a live cell.
    pub fn sync_send(
        &mut self,
        dest: impl Into<ActorAddr>,
        msg: Message,
    ) -> Result<ResponseHandle<'_, BlockingContext>> {
        let id = self.ctx.send_request(&dest.into(), msg)?;
        Ok(ResponseHandle::new(self, id))
    }

    /// Like [`sync_send`](Self::sync_send), giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidActor`](crate::Error::InvalidActor) if `dest`
    /// does not refer to a live cell.
    pub fn timed_sync_send(
        &mut self,
        dest: impl Into<ActorAddr>,
        timeout: Duration,
        msg: Message,
    ) -> Result<ResponseHandle<'_, BlockingContext>> {
        let id = self.ctx.send_request(&dest.into(), msg)?;
        self.ctx.schedule_sync_timeout(id, timeout);
        Ok(ResponseHandle::new(self, id))
    }

    /// Handle mail until the response handler for `id` has run.
    /// Ordinary messages arriving meanwhile are kept for later.
    fn await_response(
        &mut self,
        id: MessageId,
        handler: Behavior,
    ) -> std::result::Result<(), ActorExited> {
        self.check_exit()?;
        self.ctx.stack.push(handler, id);
        while self.ctx.stack.has_sync_handler(id) {
            if let Some(reason) = self.ctx.planned_exit {
                self.ctx.stack.erase(id);
                self.ctx.stack.cleanup();
                return Err(ActorExited(reason));
            }
            let Some(elem) = self.ctx.mailbox().try_pop() else {
                self.ctx.mailbox().await_data(None);
                continue;
            };
            if let Dispatch::Skipped(elem) = dispatch(&mut self.ctx, elem) {
                self.ctx.cache.push_back(elem);
            }
        }
        self.ctx.stack.cleanup();
        self.check_exit()
    }

    /// Block until every other visible actor has terminated.
    pub fn await_all_other_actors_done(&self) {
        let own = usize::from(!self.ctx.self_ref.0.is_hidden());
        self.ctx.runtime.registry().await_running_count_equal(own);
    }
}

impl ResponseHandle<'_, BlockingContext> {
    /// Wait for the reply and handle it with `behavior`.
    ///
    /// # Errors
    ///
    /// [`ActorExited`] if the actor started terminating while waiting,
    /// including through an unhandled timeout or failure.
    pub fn receive(self, behavior: Behavior) -> std::result::Result<(), ActorExited> {
        let (bctx, id, handler) = self.into_handler(behavior);
        bctx.await_response(id, handler)
    }
}

/// Thread body of a spawned blocking actor.
pub(crate) fn run_blocking(actor: ActorRef, body: Body) {
    let mut bctx = BlockingContext::new(actor);
    let reason = match catch_unwind(AssertUnwindSafe(|| body(&mut bctx))) {
        Ok(Ok(())) => bctx.ctx.planned_exit.unwrap_or(ExitReason::NORMAL),
        Ok(Err(ActorExited(reason))) => reason,
        Err(payload) => {
            tracing::warn!(
                actor = bctx.ctx.id(),
                panic = panic_message(payload.as_ref()),
                "blocking actor panicked"
            );
            ExitReason::UNHANDLED_EXCEPTION
        }
    };
    bctx.ctx.terminate(reason);
}

// ── Scoped actor ────────────────────────────────────────────────────────

/// A hidden blocking actor bound to the current scope.
///
/// Lets non-actor code talk to actors: send, request, receive. It
/// terminates when dropped.
#[derive(Debug)]
pub struct ScopedActor {
    bctx: BlockingContext,
}

impl ScopedActor {
    pub(crate) fn new(actor: ActorRef) -> Self {
        Self {
            bctx: BlockingContext::new(actor),
        }
    }
}

impl Deref for ScopedActor {
    type Target = BlockingContext;

    fn deref(&self) -> &BlockingContext {
        &self.bctx
    }
}

impl DerefMut for ScopedActor {
    fn deref_mut(&mut self) -> &mut BlockingContext {
        &mut self.bctx
    }
}

impl Drop for ScopedActor {
    fn drop(&mut self) {
        let reason = self.bctx.ctx.planned_exit.unwrap_or(ExitReason::NORMAL);
        self.bctx.ctx.terminate(reason);
    }
}
