//! Message dispatch shared by event-based and blocking actors.
//!
//! One element at a time goes through [`dispatch`]:
//!
//! 1. async `ExitMsg` from a link: consumed unless the actor traps exits
//! 2. async `TimeoutMsg`: runs the timeout handler if still current,
//!    dropped otherwise
//! 3. responses: routed to the handler registered for their id, dropped
//!    if none is left
//! 4. everything else: offered to the top ordinary behavior, but only
//!    while no response handler sits on top of the stack
//!
//! Elements nobody accepted come back as [`Dispatch::Skipped`] and wait
//! in the context's cache until the behavior stack changes.

use crate::behavior::{Behavior, Reply};
use crate::context::Context;
use crate::exit_reason::ExitReason;
use crate::mailbox::MailboxElement;
use crate::system_messages::{ExitMsg, TimeoutMsg};

pub(crate) enum Dispatch {
    Handled,
    /// Consumed without running a handler.
    Dropped,
    /// No behavior accepted the element; the caller keeps it.
    Skipped(MailboxElement),
}

/// Link bookkeeping for an incoming `ExitMsg`. Returns `true` if the
/// message was consumed here.
pub(crate) fn handle_exit_signal(ctx: &mut Context, elem: &MailboxElement) -> bool {
    if !elem.mid.is_async() {
        return false;
    }
    let Some(exit) = elem.msg.single::<ExitMsg>() else {
        return false;
    };
    if exit.source.is_valid() {
        ctx.self_ref.0.remove_link_entry(&exit.source);
    }
    if ctx.traps_exit() {
        return false;
    }
    if !exit.reason.is_normal() {
        tracing::debug!(
            actor = ctx.id(),
            from = exit.source.id(),
            reason = %exit.reason,
            "exit signal"
        );
        ctx.quit(exit.reason);
    }
    true
}

pub(crate) fn dispatch(ctx: &mut Context, elem: MailboxElement) -> Dispatch {
    if handle_exit_signal(ctx, &elem) {
        return Dispatch::Dropped;
    }
    if elem.mid.is_async() {
        if let Some(tick) = elem.msg.single::<TimeoutMsg>() {
            if ctx.is_active_timeout(tick.id) {
                handle_timeout(ctx);
                return Dispatch::Handled;
            }
            tracing::trace!(actor = ctx.id(), id = tick.id, "stale timeout");
            return Dispatch::Dropped;
        }
    }
    if elem.mid.is_response() {
        return handle_response(ctx, elem);
    }
    if ctx.stack.awaits_response() || ctx.stack.top().is_none() {
        return Dispatch::Skipped(elem);
    }
    invoke_ordinary(ctx, elem)
}

fn invoke_ordinary(ctx: &mut Context, elem: MailboxElement) -> Dispatch {
    let Some(behavior) = ctx.stack.top().cloned() else {
        return Dispatch::Skipped(elem);
    };
    let msg = elem.msg.clone();
    ctx.current = Some(elem);
    let timeout_id = ctx.timeout_id;
    match behavior.invoke(ctx, &msg) {
        None => match ctx.current.take() {
            Some(elem) => Dispatch::Skipped(elem),
            None => Dispatch::Dropped,
        },
        Some(reply) => {
            ctx.finish_handler(reply);
            // A quitting actor keeps the element so termination can
            // bounce it if it is still unanswered.
            if ctx.planned_exit.is_none() {
                ctx.current = None;
            }
            // Handled a message: restart the idle timer unless the
            // handler already replaced it.
            if ctx.timeout_id == timeout_id && ctx.has_timeout {
                let timeout = ctx.stack.top().and_then(Behavior::timeout);
                ctx.request_timeout(timeout);
            }
            ctx.stack.cleanup();
            Dispatch::Handled
        }
    }
}

pub(crate) fn handle_timeout(ctx: &mut Context) {
    let Some(behavior) = ctx.stack.top().cloned() else {
        return;
    };
    let timeout_id = ctx.timeout_id;
    behavior.handle_timeout(ctx);
    if ctx.timeout_id == timeout_id && !ctx.stack.is_empty() {
        let timeout = ctx.stack.top().and_then(Behavior::timeout);
        ctx.request_timeout(timeout);
    }
    ctx.stack.cleanup();
}

fn handle_response(ctx: &mut Context, elem: MailboxElement) -> Dispatch {
    let Some(handler) = ctx.stack.sync_handler(elem.mid).cloned() else {
        tracing::trace!(actor = ctx.id(), mid = ?elem.mid, "late response");
        return Dispatch::Dropped;
    };
    ctx.stack.erase(elem.mid);
    let msg = elem.msg.clone();
    ctx.current = Some(elem);
    match handler.invoke(ctx, &msg) {
        Some(Reply::Failed(err)) => {
            tracing::warn!(actor = ctx.id(), error = %err, "response handler failed");
            ctx.quit(ExitReason::UNHANDLED_EXCEPTION);
        }
        Some(_) => {}
        None => ctx.quit(ExitReason::UNHANDLED_SYNC_FAILURE),
    }
    ctx.current = None;
    ctx.stack.cleanup();
    Dispatch::Handled
}

/// Offer every cached element to the current stack once. Returns how
/// many were handled.
pub(crate) fn drain_cache(ctx: &mut Context) -> usize {
    let mut handled = 0;
    let mut i = 0;
    while i < ctx.cache.len() {
        if ctx.planned_exit.is_some() {
            break;
        }
        let Some(elem) = ctx.cache.remove(i) else {
            break;
        };
        let generation = ctx.stack.generation();
        match dispatch(ctx, elem) {
            Dispatch::Skipped(elem) => {
                ctx.cache.insert(i, elem);
                i += 1;
            }
            Dispatch::Handled => {
                handled += 1;
                // The handler may have changed the stack: older skipped
                // elements get another chance, oldest first.
                if ctx.stack.generation() != generation {
                    i = 0;
                }
            }
            Dispatch::Dropped => {}
        }
    }
    handled
}
