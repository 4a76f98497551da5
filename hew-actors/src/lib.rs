//! Work-stealing actor runtime with behavior-based message dispatch.
//!
//! Actors are isolated units of sequential computation that talk only
//! through messages. Event-based actors are cooperative jobs multiplexed
//! over a fixed pool of worker threads; blocking actors own a thread and
//! pull messages with explicit receives. Both share one mailbox and
//! dispatch implementation.
//!
//! ```no_run
//! use std::time::Duration;
//! use hew_actors::{behavior, msg, on, Runtime, RuntimeConfig, Context};
//!
//! let rt = Runtime::new(RuntimeConfig::default())?;
//! let doubler = rt.spawn(|_ctx| behavior![on(|_ctx: &mut Context, (n,): (i32,)| msg![n * 2])])?;
//!
//! let mut me = rt.scoped()?;
//! me.timed_sync_send(&doubler, Duration::from_millis(100), msg![21i32])?
//!     .receive(behavior![on(|_ctx: &mut Context, (n,): (i32,)| assert_eq!(n, 42))])?;
//! drop(me);
//! rt.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! Layer 0: internal::spin, queue, atom, message, message_id, exit_reason
//! Layer 1: mailbox, behavior, behavior_stack, resumable
//! Layer 2: worker, coordinator (L1)
//! Layer 3: actor, context, invoke, response (L1+L2)
//! Layer 4: event_based, blocking (L3)
//! Layer 5: timer, printer, registry, group (L4)
//! Layer 6: runtime (everything)
//! ```

pub(crate) mod internal;

pub mod atom;
pub mod config;
pub mod error;
pub mod exit_reason;
pub mod message;
pub mod message_id;
pub mod queue;
pub mod system_messages;

pub(crate) mod mailbox;

pub mod behavior;
pub(crate) mod behavior_stack;
pub mod resumable;

pub(crate) mod coordinator;
pub(crate) mod worker;

pub mod actor;
pub mod context;
pub(crate) mod invoke;
pub mod response;

pub mod blocking;
pub(crate) mod event_based;

pub mod group;
pub(crate) mod printer;
pub mod registry;
pub(crate) mod timer;

pub mod runtime;

pub use actor::{ActorAddr, ActorId, ActorRef, Channel, NodeId, SpawnFlags};
pub use atom::{atom, Atom};
pub use behavior::{on, on_if, others, Behavior, Case, IntoReply, Reply};
pub use blocking::{BlockingContext, ScopedActor};
pub use config::RuntimeConfig;
pub use context::Context;
pub use coordinator::SchedulerMetrics;
pub use error::{ActorExited, Error, Result};
pub use exit_reason::ExitReason;
pub use group::{Group, GroupManager, Subscription};
pub use message::{FromMessage, Message};
pub use message_id::MessageId;
pub use queue::ProducerConsumerList;
pub use registry::ActorRegistry;
pub use response::{ResponseHandle, ResponsePromise};
pub use resumable::{ExecutionUnit, Job, ResumeResult, Resumable};
pub use runtime::Runtime;
pub use system_messages::{DownMsg, ExitMsg, SyncExitedMsg, SyncTimeoutMsg, TimeoutMsg};
