//! Timer actor: delivers messages after a delay.
//!
//! Pending deliveries sit in a map ordered by `(deadline, sequence)`.
//! The actor sleeps until either a new request arrives or the earliest
//! deadline passes, then delivers everything that is due in one sweep.
//!
//! Entries are never cancelled. Stale timeouts are recognised and
//! ignored by their receivers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::actor::{ActorAddr, Channel};
use crate::blocking::BlockingContext;
use crate::error::ActorExited;
use crate::message::Message;
use crate::message_id::MessageId;

/// Request to the timer actor.
#[derive(Clone)]
pub(crate) struct DelayedSend {
    pub(crate) deadline: Instant,
    pub(crate) target: Arc<dyn Channel>,
    pub(crate) sender: ActorAddr,
    pub(crate) mid: MessageId,
    pub(crate) msg: Message,
}

impl fmt::Debug for DelayedSend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedSend")
            .field("deadline", &self.deadline)
            .field("sender", &self.sender)
            .field("mid", &self.mid)
            .finish_non_exhaustive()
    }
}

impl DelayedSend {
    fn fire(self) {
        self.target.enqueue(&self.sender, self.mid, self.msg, None);
    }
}

/// Body of the timer actor. Runs until told to exit.
pub(crate) fn run(bctx: &mut BlockingContext) -> Result<(), ActorExited> {
    let mut pending: BTreeMap<(Instant, u64), DelayedSend> = BTreeMap::new();
    let mut seq: u64 = 0;
    loop {
        let next_deadline = pending.keys().next().map(|&(at, _)| at);
        if let Some(elem) = bctx.next_message(next_deadline)? {
            match elem.msg.single::<DelayedSend>() {
                Some(request) => {
                    seq += 1;
                    pending.insert((request.deadline, seq), request.clone());
                }
                None => tracing::trace!(len = elem.msg.len(), "timer ignoring unexpected message"),
            }
        }
        let now = Instant::now();
        while let Some(entry) = pending.first_entry() {
            if entry.key().0 > now {
                break;
            }
            entry.remove().fire();
        }
    }
}
