//! Bit-packed message identifiers.
//!
//! ```text
//!  63         62         61          60 ................... 0
//! ┌──────────┬──────────┬───────────┬────────────────────────┐
//! │ response │ answered │ high prio │ request id (61 bits)   │
//! └──────────┴──────────┴───────────┴────────────────────────┘
//! ```
//!
//! A zero request id means "asynchronous": the message expects no reply.
//! A synchronous send allocates a fresh non-zero request id; the reply
//! carries [`MessageId::response_id`] of that request, which sets the
//! response bit and keeps the id so the requester can correlate it.

use std::fmt;

const RESPONSE_FLAG: u64 = 0x8000_0000_0000_0000;
const ANSWERED_FLAG: u64 = 0x4000_0000_0000_0000;
const HIGH_PRIORITY_FLAG: u64 = 0x2000_0000_0000_0000;
const REQUEST_ID_MASK: u64 = 0x1FFF_FFFF_FFFF_FFFF;

/// Correlation token attached to every mailbox element.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageId(u64);

impl MessageId {
    /// A request id. Bits outside the 61-bit id field are discarded.
    #[must_use]
    pub const fn request(id: u64) -> Self {
        Self(id & REQUEST_ID_MASK)
    }

    /// Reconstruct an id from [`integer_value`](Self::integer_value).
    #[must_use]
    pub const fn from_integer_value(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn integer_value(self) -> u64 {
        self.0
    }

    /// Whether a request id is present (i.e. not asynchronous).
    #[must_use]
    pub const fn valid(self) -> bool {
        self.0 & REQUEST_ID_MASK != 0
    }

    #[must_use]
    pub const fn is_async(self) -> bool {
        !self.valid()
    }

    #[must_use]
    pub const fn is_response(self) -> bool {
        self.0 & RESPONSE_FLAG != 0
    }

    #[must_use]
    pub const fn is_request(self) -> bool {
        self.valid() && !self.is_response()
    }

    #[must_use]
    pub const fn is_answered(self) -> bool {
        self.0 & ANSWERED_FLAG != 0
    }

    #[must_use]
    pub const fn is_high_priority(self) -> bool {
        self.0 & HIGH_PRIORITY_FLAG != 0
    }

    /// The id a reply to this message must carry, or an invalid id if
    /// this message is not a request.
    #[must_use]
    pub const fn response_id(self) -> Self {
        if self.is_request() {
            Self((self.0 & REQUEST_ID_MASK) | RESPONSE_FLAG)
        } else {
            Self(0)
        }
    }

    /// The bare correlation key with every flag stripped.
    #[must_use]
    pub const fn request_id(self) -> Self {
        Self(self.0 & REQUEST_ID_MASK)
    }

    #[must_use]
    pub const fn with_high_priority(self) -> Self {
        Self(self.0 | HIGH_PRIORITY_FLAG)
    }

    #[must_use]
    pub const fn with_normal_priority(self) -> Self {
        Self(self.0 & !HIGH_PRIORITY_FLAG)
    }

    pub fn mark_as_answered(&mut self) {
        self.0 |= ANSWERED_FLAG;
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_async() {
            return f.write_str(if self.is_high_priority() {
                "MessageId(async, high)"
            } else {
                "MessageId(async)"
            });
        }
        let kind = if self.is_response() { "response" } else { "request" };
        write!(f, "MessageId({kind} {}", self.0 & REQUEST_ID_MASK)?;
        if self.is_answered() {
            f.write_str(", answered")?;
        }
        if self.is_high_priority() {
            f.write_str(", high")?;
        }
        f.write_str(")")
    }
}
