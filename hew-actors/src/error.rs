//! Error types.

use std::io;

use crate::exit_reason::ExitReason;

/// Errors reported synchronously by runtime operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The target handle does not refer to a live actor.
    #[error("invalid actor handle")]
    InvalidActor,

    /// A configuration value was rejected.
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),

    /// The name is already bound to a live actor.
    #[error("name `{0}` is already registered")]
    NameTaken(String),

    /// An OS thread could not be created.
    #[error("failed to spawn thread `{name}`")]
    ThreadSpawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The runtime has been shut down.
    #[error("runtime is stopped")]
    RuntimeStopped,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Termination signal for blocking actors.
///
/// Every blocking receive returns this once the actor has decided to
/// quit (explicitly, or because a linked actor died); the actor body
/// propagates it with `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("actor exited: {0}")]
pub struct ActorExited(pub ExitReason);

impl ActorExited {
    #[must_use]
    pub fn reason(self) -> ExitReason {
        self.0
    }
}
