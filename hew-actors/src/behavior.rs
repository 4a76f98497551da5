//! Behaviors: ordered match cases plus an optional idle timeout.
//!
//! A [`Case`] pairs a type pattern with a handler. Cases built with
//! [`on`] carry the exact element types they accept, so dispatch rejects
//! a mismatching message with a token comparison before extracting
//! anything. [`others`] matches every message.
//!
//! ```
//! use hew_actors::{behavior, msg, on, others, Context, Message};
//!
//! let b = behavior![
//!     on(|_ctx: &mut Context, (n,): (i32,)| msg![n * 2]),
//!     others(|_ctx: &mut Context, _msg: &Message| {}),
//! ];
//! assert_eq!(b.len(), 2);
//! ```

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::context::Context;
use crate::error::Error;
use crate::message::{FromMessage, Message};

// ── Replies ─────────────────────────────────────────────────────────────

/// What a handler produced.
#[derive(Debug)]
pub enum Reply {
    /// Nothing to send back.
    Silent,
    /// Answer the current request with this message.
    Message(Message),
    /// The handler failed; the actor quits with `UNHANDLED_EXCEPTION`.
    Failed(Error),
}

/// Handler return types.
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply {
        self
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply {
        Reply::Silent
    }
}

impl IntoReply for Message {
    fn into_reply(self) -> Reply {
        Reply::Message(self)
    }
}

impl IntoReply for Option<Message> {
    fn into_reply(self) -> Reply {
        self.map_or(Reply::Silent, Reply::Message)
    }
}

impl<R: IntoReply> IntoReply for Result<R, Error> {
    fn into_reply(self) -> Reply {
        match self {
            Ok(r) => r.into_reply(),
            Err(e) => Reply::Failed(e),
        }
    }
}

// ── Cases ───────────────────────────────────────────────────────────────

type Invoke = Box<dyn FnMut(&mut Context, &Message) -> Option<Reply> + Send>;

/// One pattern → handler entry.
pub struct Case {
    /// `None` matches any message.
    tokens: Option<Vec<TypeId>>,
    invoke: Invoke,
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("arity", &self.tokens.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

impl Case {
    fn try_invoke(&mut self, ctx: &mut Context, msg: &Message) -> Option<Reply> {
        if let Some(tokens) = &self.tokens {
            if !msg.match_tokens(tokens) {
                return None;
            }
        }
        (self.invoke)(ctx, msg)
    }
}

/// Match messages whose elements are exactly `Args`.
pub fn on<Args, R, F>(mut handler: F) -> Case
where
    Args: FromMessage + 'static,
    R: IntoReply,
    F: FnMut(&mut Context, Args) -> R + Send + 'static,
{
    Case {
        tokens: Some(Args::type_tokens()),
        invoke: Box::new(move |ctx, msg| {
            let args = Args::from_message(msg)?;
            Some(handler(ctx, args).into_reply())
        }),
    }
}

/// Like [`on`], but only if `guard` accepts the extracted values.
pub fn on_if<Args, G, R, F>(guard: G, mut handler: F) -> Case
where
    Args: FromMessage + 'static,
    G: Fn(&Args) -> bool + Send + 'static,
    R: IntoReply,
    F: FnMut(&mut Context, Args) -> R + Send + 'static,
{
    Case {
        tokens: Some(Args::type_tokens()),
        invoke: Box::new(move |ctx, msg| {
            let args = Args::from_message(msg).filter(|a| guard(a))?;
            Some(handler(ctx, args).into_reply())
        }),
    }
}

/// Match any message.
pub fn others<R, F>(mut handler: F) -> Case
where
    R: IntoReply,
    F: FnMut(&mut Context, &Message) -> R + Send + 'static,
{
    Case {
        tokens: None,
        invoke: Box::new(move |ctx, msg| Some(handler(ctx, msg).into_reply())),
    }
}

// ── Behavior ────────────────────────────────────────────────────────────

type TimeoutHandler = Box<dyn FnMut(&mut Context) + Send>;

struct BehaviorImpl {
    cases: Vec<Case>,
    timeout_handler: Option<TimeoutHandler>,
}

/// A shareable set of cases.
///
/// Clones share the same cases; the stack keeps clones of erased
/// behaviors alive while one of their handlers may still be running.
///
/// A behavior is locked while one of its handlers runs. A handler that
/// blocks on a receive using a clone of its own behavior, for example
/// through a [`ScopedActor`](crate::ScopedActor) it opened, deadlocks.
/// Nested receives with a different behavior are fine.
#[derive(Clone)]
pub struct Behavior {
    inner: Arc<Mutex<BehaviorImpl>>,
    timeout: Option<Duration>,
    len: usize,
}

impl Default for Behavior {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Behavior")
            .field("cases", &self.len)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Behavior {
    #[must_use]
    pub fn new(cases: Vec<Case>) -> Self {
        let len = cases.len();
        Self {
            inner: Arc::new(Mutex::new(BehaviorImpl {
                cases,
                timeout_handler: None,
            })),
            timeout: None,
            len,
        }
    }

    /// Run `handler` if no message matched within `after`.
    ///
    /// The timer restarts after every handled message.
    #[must_use]
    pub fn with_timeout<F>(self, after: Duration, handler: F) -> Self
    where
        F: FnMut(&mut Context) + Send + 'static,
    {
        self.inner.lock().timeout_handler = Some(Box::new(handler));
        Self {
            timeout: Some(after),
            ..self
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Number of cases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// No cases and no timeout: installing it would never do anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0 && self.timeout.is_none()
    }

    /// Whether `self` and `other` are clones of the same behavior.
    #[must_use]
    pub fn same_as(&self, other: &Behavior) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Try cases in declaration order; `None` if none matched.
    pub(crate) fn invoke(&self, ctx: &mut Context, msg: &Message) -> Option<Reply> {
        let mut inner = self.inner.lock();
        inner.cases.iter_mut().find_map(|case| case.try_invoke(ctx, msg))
    }

    pub(crate) fn handle_timeout(&self, ctx: &mut Context) {
        let mut inner = self.inner.lock();
        if let Some(handler) = inner.timeout_handler.as_mut() {
            handler(ctx);
        }
    }
}

/// Build a [`Behavior`] from a list of cases.
#[macro_export]
macro_rules! behavior {
    ($($case:expr),* $(,)?) => {
        $crate::Behavior::new(vec![$($case),*])
    };
}
