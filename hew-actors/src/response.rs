//! Request/response correlation.
//!
//! A synchronous send returns a [`ResponseHandle`] for the response id
//! of the new request. Installing a handler on it pushes a *targeted*
//! entry on the behavior stack that only the matching reply can reach:
//! event-based actors use [`ResponseHandle::then`], blocking actors
//! wait in place with `ResponseHandle::receive`.
//!
//! The replier side is a [`ResponsePromise`]: a deferred answer that
//! can be delivered later, from another handler or thread, at most once.

use crate::actor::ActorAddr;
use crate::behavior::{others, Behavior, Reply};
use crate::context::Context;
use crate::exit_reason::ExitReason;
use crate::message::Message;
use crate::message_id::MessageId;
use crate::system_messages::{SyncExitedMsg, SyncTimeoutMsg};

type TimeoutFn = Box<dyn FnMut(&mut Context) + Send>;
type FailureFn = Box<dyn FnMut(&mut Context, ExitReason) + Send>;

// ── ResponseHandle ──────────────────────────────────────────────────────

/// Pending reply to a synchronous request.
///
/// Dropping the handle without installing a handler discards the reply
/// when it arrives.
#[must_use = "the reply is discarded unless a handler is installed"]
pub struct ResponseHandle<'a, C = Context> {
    ctx: &'a mut C,
    id: MessageId,
    on_timeout: Option<TimeoutFn>,
    on_failure: Option<FailureFn>,
}

impl<'a, C> ResponseHandle<'a, C> {
    pub(crate) fn new(ctx: &'a mut C, id: MessageId) -> Self {
        Self {
            ctx,
            id,
            on_timeout: None,
            on_failure: None,
        }
    }

    /// The response id the reply will carry.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Called instead of quitting with `UNHANDLED_SYNC_TIMEOUT`.
    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut Context) + Send + 'static,
    {
        self.on_timeout = Some(Box::new(f));
        self
    }

    /// Called instead of quitting with `UNHANDLED_SYNC_FAILURE` when the
    /// receiver had exited or the reply matched no case.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut Context, ExitReason) + Send + 'static,
    {
        self.on_failure = Some(Box::new(f));
        self
    }

    /// Wrap `behavior` into the stack entry for this response.
    pub(crate) fn into_handler(self, behavior: Behavior) -> (&'a mut C, MessageId, Behavior) {
        let handler = response_behavior(behavior, self.on_timeout, self.on_failure);
        (self.ctx, self.id, handler)
    }
}

impl ResponseHandle<'_, Context> {
    /// Handle the reply with `behavior` once it arrives.
    ///
    /// Until then, ordinary messages are held back in the cache.
    pub fn then(self, behavior: Behavior) {
        let (ctx, id, handler) = self.into_handler(behavior);
        ctx.await_response(id, handler);
    }
}

fn fail(ctx: &mut Context, handler: Option<&mut FailureFn>, reason: ExitReason) {
    match handler {
        Some(f) => f(ctx, reason),
        None => ctx.quit(ExitReason::UNHANDLED_SYNC_FAILURE),
    }
}

fn response_behavior(
    inner: Behavior,
    mut on_timeout: Option<TimeoutFn>,
    mut on_failure: Option<FailureFn>,
) -> Behavior {
    Behavior::new(vec![others(move |ctx: &mut Context, msg: &Message| {
        if msg.single::<SyncTimeoutMsg>().is_some() {
            tracing::trace!(actor = ctx.id(), "request timed out");
            match on_timeout.as_mut() {
                Some(f) => f(ctx),
                None => ctx.quit(ExitReason::UNHANDLED_SYNC_TIMEOUT),
            }
            return Reply::Silent;
        }
        if let Some(exited) = msg.single::<SyncExitedMsg>() {
            let reason = exited.reason;
            fail(ctx, on_failure.as_mut(), reason);
            return Reply::Silent;
        }
        match inner.invoke(ctx, msg) {
            Some(Reply::Failed(e)) => Reply::Failed(e),
            Some(_) => Reply::Silent,
            None => {
                fail(ctx, on_failure.as_mut(), ExitReason::UNHANDLED_SYNC_FAILURE);
                Reply::Silent
            }
        }
    })])
}

// ── ResponsePromise ─────────────────────────────────────────────────────

/// Deferred answer to a request.
///
/// Delivers at most once; later calls, and calls on a default-constructed
/// promise, do nothing.
#[derive(Debug, Default)]
pub struct ResponsePromise {
    from: ActorAddr,
    to: ActorAddr,
    id: MessageId,
}

impl ResponsePromise {
    pub(crate) fn new(from: ActorAddr, to: ActorAddr, id: MessageId) -> Self {
        Self { from, to, id }
    }

    /// Whether [`deliver`](Self::deliver) would send anything.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.id.valid() && self.to.is_valid()
    }

    pub fn deliver(&mut self, msg: Message) {
        if !self.is_valid() {
            return;
        }
        let id = std::mem::take(&mut self.id);
        self.to.enqueue_raw(&self.from, id, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg;

    #[test]
    fn default_promise_is_inert() {
        let mut p = ResponsePromise::default();
        assert!(!p.is_valid());
        p.deliver(msg![1i32]);
        assert!(!p.is_valid());
    }
}
