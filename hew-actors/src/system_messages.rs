//! Messages generated by the runtime itself.
//!
//! All of these travel through ordinary mailboxes as single-element
//! [`Message`](crate::Message)s and can be matched like any user type,
//! e.g. `on(|ctx, (down,): (DownMsg,)| ...)`.

use crate::actor::ActorAddr;
use crate::exit_reason::ExitReason;

/// Sent to linked actors when an actor terminates.
///
/// Actors that do not trap exits quit with `reason` on receipt, unless
/// the reason is [`ExitReason::NORMAL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitMsg {
    pub source: ActorAddr,
    pub reason: ExitReason,
}

/// Sent to monitoring actors when the monitored actor terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownMsg {
    pub source: ActorAddr,
    pub reason: ExitReason,
}

/// Behavior timeout tick. Only the most recently requested id fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutMsg {
    pub(crate) id: u64,
}

/// Delivered on a response id when a timed synchronous request expires
/// before its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncTimeoutMsg;

/// Delivered on a response id when the request reached an actor that
/// had already terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncExitedMsg {
    pub source: ActorAddr,
    pub reason: ExitReason,
}
