//! Actor exit reasons.
//!
//! An exit reason is a small integer delivered to linked actors
//! (`ExitMsg`) and monitors (`DownMsg`) when an actor terminates.
//! Reasons below [`ExitReason::USER_DEFINED`] are reserved for the
//! runtime.

use std::fmt;

/// Why an actor terminated.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExitReason(u32);

impl ExitReason {
    /// The actor is still running.
    pub const NOT_EXITED: Self = Self(0);
    /// Regular termination.
    pub const NORMAL: Self = Self(1);
    /// A handler panicked or returned an error.
    pub const UNHANDLED_EXCEPTION: Self = Self(2);
    /// An operation was called from a context that does not allow it.
    pub const UNALLOWED_FUNCTION_CALL: Self = Self(3);
    /// A synchronous request failed and no failure handler was installed.
    pub const UNHANDLED_SYNC_FAILURE: Self = Self(4);
    /// A synchronous request timed out and no timeout handler was installed.
    pub const UNHANDLED_SYNC_TIMEOUT: Self = Self(5);
    /// The runtime was shut down.
    pub const USER_SHUTDOWN: Self = Self(16);
    /// A link to a remote actor was lost.
    pub const REMOTE_LINK_UNREACHABLE: Self = Self(0x101);
    /// First value available to applications.
    pub const USER_DEFINED: Self = Self(0x1_0000);

    /// Build a reason from its raw code.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        Self(code)
    }

    /// An application reason, `USER_DEFINED + offset`.
    #[must_use]
    pub const fn user_defined(offset: u32) -> Self {
        Self(Self::USER_DEFINED.0.saturating_add(offset))
    }

    /// The raw code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_normal(self) -> bool {
        self.0 == Self::NORMAL.0
    }

    #[must_use]
    pub const fn is_exited(self) -> bool {
        self.0 != Self::NOT_EXITED.0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::NOT_EXITED => "not_exited",
            Self::NORMAL => "normal",
            Self::UNHANDLED_EXCEPTION => "unhandled_exception",
            Self::UNALLOWED_FUNCTION_CALL => "unallowed_function_call",
            Self::UNHANDLED_SYNC_FAILURE => "unhandled_sync_failure",
            Self::UNHANDLED_SYNC_TIMEOUT => "unhandled_sync_timeout",
            Self::USER_SHUTDOWN => "user_shutdown",
            Self::REMOTE_LINK_UNREACHABLE => "remote_link_unreachable",
            _ => return None,
        })
    }
}

impl Default for ExitReason {
    fn default() -> Self {
        Self::NOT_EXITED
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None if self.0 >= Self::USER_DEFINED.0 => {
                write!(f, "user_defined+{}", self.0 - Self::USER_DEFINED.0)
            }
            None => write!(f, "exit_reason({:#x})", self.0),
        }
    }
}

impl fmt::Debug for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExitReason({self})")
    }
}
