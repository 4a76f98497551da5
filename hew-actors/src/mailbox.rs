//! Per-actor mailbox.
//!
//! Built on two [`ProducerConsumerList`]s: the ordinary queue and, for
//! priority-aware actors, a high-priority queue that is always drained
//! first. Elements from one producer stay in FIFO order within their
//! priority class.
//!
//! # Suspension protocol
//!
//! The mailbox carries a three-valued state word:
//!
//! ```text
//!          try_block (queue empty)
//!   READY ─────────────────────────▶ BLOCKED
//!     ▲                                 │
//!     └──── push (CAS BLOCKED→READY) ◀──┘   ⇒ push reports UnblockedReader
//!
//!   any ──── close ───▶ CLOSED (terminal)
//! ```
//!
//! `READY` means the owner is running or scheduled; `BLOCKED` means it
//! is suspended and the next producer is responsible for waking it.
//! Exactly one producer wins the `BLOCKED → READY` CAS, so an actor is
//! never scheduled twice.
//!
//! # Memory ordering
//!
//! The lost-wakeup race (consumer sees an empty queue, producer pushes,
//! consumer blocks) is closed Dekker-style: the consumer publishes
//! `BLOCKED` then re-checks the queue; the producer publishes the node
//! then CASes the state. A `SeqCst` fence on each side guarantees at
//! least one of them observes the other's write.

use std::sync::atomic::{fence, AtomicU8, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::actor::ActorAddr;
use crate::message::Message;
use crate::message_id::MessageId;
use crate::queue::ProducerConsumerList;

const READY: u8 = 0;
const BLOCKED: u8 = 1;
const CLOSED: u8 = 2;

// ── Element ─────────────────────────────────────────────────────────────

/// One queued message plus its routing metadata.
#[derive(Debug, Clone)]
pub(crate) struct MailboxElement {
    pub(crate) sender: ActorAddr,
    pub(crate) mid: MessageId,
    pub(crate) msg: Message,
    /// Actor that forwarded this element, if any.
    pub(crate) forwarded_by: Option<ActorAddr>,
}

impl MailboxElement {
    pub(crate) fn new(sender: ActorAddr, mid: MessageId, msg: Message) -> Self {
        Self {
            sender,
            mid,
            msg,
            forwarded_by: None,
        }
    }
}

/// Outcome of [`Mailbox::push`].
#[derive(Debug)]
pub(crate) enum Push {
    Enqueued,
    /// The owner was suspended; the caller must reschedule it.
    UnblockedReader,
    /// The owner has terminated. Holds every element the caller must
    /// bounce (its own, plus anything it raced with).
    Closed(Vec<MailboxElement>),
}

/// Mutex + condvar that blocking owners park on.
struct Waiter {
    lock: Mutex<()>,
    cond: Condvar,
}

// ── Mailbox ─────────────────────────────────────────────────────────────

pub(crate) struct Mailbox {
    normal: ProducerConsumerList<MailboxElement>,
    high: Option<ProducerConsumerList<MailboxElement>>,
    state: AtomicU8,
    /// Present for actors that own an OS thread.
    waiter: Option<Waiter>,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("len", &self.len())
            .field("state", &self.state.load(Ordering::Relaxed))
            .field("priority_aware", &self.high.is_some())
            .field("blocking", &self.waiter.is_some())
            .finish()
    }
}

impl Mailbox {
    /// `start_blocked` is used for lazily initialized actors: the first
    /// push then schedules the owner.
    pub(crate) fn new(priority_aware: bool, blocking: bool, start_blocked: bool) -> Self {
        Self {
            normal: ProducerConsumerList::new(),
            high: priority_aware.then(ProducerConsumerList::new),
            state: AtomicU8::new(if start_blocked { BLOCKED } else { READY }),
            waiter: blocking.then(|| Waiter {
                lock: Mutex::new(()),
                cond: Condvar::new(),
            }),
        }
    }

    // ── Producer side ───────────────────────────────────────────────────

    /// Enqueue `elem`. Callable from any thread.
    pub(crate) fn push(&self, elem: MailboxElement) -> Push {
        if self.state.load(Ordering::Acquire) == CLOSED {
            return Push::Closed(vec![elem]);
        }
        match &self.high {
            Some(high) if elem.mid.is_high_priority() => high.push_back(elem),
            _ => self.normal.push_back(elem),
        }
        fence(Ordering::SeqCst);
        match self
            .state
            .compare_exchange(BLOCKED, READY, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                if let Some(w) = &self.waiter {
                    // Taking the lock orders this notify after the owner
                    // has entered `wait`.
                    let _guard = w.lock.lock();
                    w.cond.notify_one();
                }
                Push::UnblockedReader
            }
            // Closed after our push: nobody else will drain it.
            Err(CLOSED) => Push::Closed(self.drain()),
            Err(_) => Push::Enqueued,
        }
    }

    // ── Consumer side ───────────────────────────────────────────────────

    /// Next element, high priority first.
    pub(crate) fn try_pop(&self) -> Option<MailboxElement> {
        if let Some(high) = &self.high {
            if let Some(elem) = high.try_pop() {
                return Some(elem);
            }
        }
        self.normal.try_pop()
    }

    /// Try to suspend the owner.
    ///
    /// Returns `true` if the owner must stop running: either the queue
    /// is empty and the mailbox is now `BLOCKED`, or a producer already
    /// flipped it back to `READY` and has taken over rescheduling.
    /// Returns `false` if the owner should keep consuming.
    pub(crate) fn try_block(&self) -> bool {
        if self
            .state
            .compare_exchange(READY, BLOCKED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        fence(Ordering::SeqCst);
        if self.is_empty() {
            return true;
        }
        // Mail raced in. If we can take READY back we keep running;
        // otherwise the producer won the CAS and reschedules us.
        self.state
            .compare_exchange(BLOCKED, READY, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
    }

    /// Park the calling thread until mail arrives or `deadline` passes.
    ///
    /// Returns `true` if the mailbox is non-empty. Only meaningful for
    /// mailboxes created with `blocking = true`.
    pub(crate) fn await_data(&self, deadline: Option<Instant>) -> bool {
        if !self.is_empty() {
            return true;
        }
        let Some(w) = &self.waiter else {
            return !self.is_empty();
        };
        let mut guard = w.lock.lock();
        loop {
            if !self.try_block() {
                return true;
            }
            let timed_out = match deadline {
                Some(at) => w.cond.wait_until(&mut guard, at).timed_out(),
                None => {
                    w.cond.wait(&mut guard);
                    false
                }
            };
            // Producers flip the state before notifying; after a timeout
            // or spurious wake we restore it ourselves.
            let _ = self
                .state
                .compare_exchange(BLOCKED, READY, Ordering::SeqCst, Ordering::SeqCst);
            if !self.is_empty() {
                return true;
            }
            if timed_out {
                return false;
            }
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Close the mailbox and return everything still queued.
    pub(crate) fn close(&self) -> Vec<MailboxElement> {
        self.state.store(CLOSED, Ordering::SeqCst);
        self.drain()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == CLOSED
    }

    fn drain(&self) -> Vec<MailboxElement> {
        let mut out = self.high.as_ref().map(ProducerConsumerList::drain).unwrap_or_default();
        out.extend(self.normal.drain());
        out
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub(crate) fn is_empty(&self) -> bool {
        self.normal.is_empty() && self.high.as_ref().map_or(true, ProducerConsumerList::is_empty)
    }

    pub(crate) fn len(&self) -> usize {
        self.normal.len() + self.high.as_ref().map_or(0, ProducerConsumerList::len)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn elem(n: i32) -> MailboxElement {
        MailboxElement::new(ActorAddr::default(), MessageId::default(), msg![n])
    }

    fn value(e: &MailboxElement) -> i32 {
        *e.msg.get::<i32>(0).unwrap()
    }

    #[test]
    fn fifo_within_priority_class() {
        let mb = Mailbox::new(false, false, false);
        for i in 0..3 {
            assert!(matches!(mb.push(elem(i)), Push::Enqueued));
        }
        assert_eq!(mb.len(), 3);
        let got: Vec<_> = std::iter::from_fn(|| mb.try_pop()).map(|e| value(&e)).collect();
        assert_eq!(got, vec![0, 1, 2]);
    }

    #[test]
    fn high_priority_overtakes() {
        let mb = Mailbox::new(true, false, false);
        mb.push(elem(1));
        let mut urgent = elem(2);
        urgent.mid = MessageId::default().with_high_priority();
        mb.push(urgent);
        assert_eq!(value(&mb.try_pop().unwrap()), 2);
        assert_eq!(value(&mb.try_pop().unwrap()), 1);
    }

    #[test]
    fn priority_ignored_without_flag() {
        let mb = Mailbox::new(false, false, false);
        mb.push(elem(1));
        let mut urgent = elem(2);
        urgent.mid = MessageId::default().with_high_priority();
        mb.push(urgent);
        assert_eq!(value(&mb.try_pop().unwrap()), 1);
    }

    #[test]
    fn block_then_push_unblocks_once() {
        let mb = Mailbox::new(false, false, false);
        assert!(mb.try_block());
        assert!(matches!(mb.push(elem(1)), Push::UnblockedReader));
        assert!(matches!(mb.push(elem(2)), Push::Enqueued));
    }

    #[test]
    fn try_block_refuses_with_pending_mail() {
        let mb = Mailbox::new(false, false, false);
        mb.push(elem(1));
        assert!(!mb.try_block());
        assert!(mb.try_pop().is_some());
        assert!(mb.try_block());
    }

    #[test]
    fn lazy_mailbox_starts_blocked() {
        let mb = Mailbox::new(false, false, true);
        assert!(matches!(mb.push(elem(1)), Push::UnblockedReader));
    }

    #[test]
    fn closed_mailbox_returns_elements() {
        let mb = Mailbox::new(false, false, false);
        mb.push(elem(1));
        let left = mb.close();
        assert_eq!(left.len(), 1);
        assert!(mb.is_closed());
        match mb.push(elem(2)) {
            Push::Closed(back) => assert_eq!(value(&back[0]), 2),
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn await_data_times_out() {
        let mb = Mailbox::new(false, true, false);
        let start = Instant::now();
        assert!(!mb.await_data(Some(start + Duration::from_millis(20))));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(mb.try_pop().is_none());
    }

    #[test]
    fn await_data_wakes_on_push() {
        let mb = Arc::new(Mailbox::new(false, true, false));
        let producer = {
            let mb = Arc::clone(&mb);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                mb.push(elem(7));
            })
        };
        assert!(mb.await_data(Some(Instant::now() + Duration::from_secs(5))));
        assert_eq!(value(&mb.try_pop().unwrap()), 7);
        producer.join().unwrap();
    }

    /// Exactly one wake-up per suspension, regardless of interleaving.
    #[test]
    fn no_lost_or_double_wakeups() {
        const N: usize = 10_000;
        let mb = Arc::new(Mailbox::new(false, false, false));
        let producer = {
            let mb = Arc::clone(&mb);
            thread::spawn(move || {
                let mut wakes = 0usize;
                for i in 0..N {
                    let n = i32::try_from(i).unwrap();
                    if matches!(mb.push(elem(n)), Push::UnblockedReader) {
                        wakes += 1;
                    }
                }
                wakes
            })
        };
        let mut received = 0usize;
        let mut suspensions = 0usize;
        while received < N {
            match mb.try_pop() {
                Some(_) => received += 1,
                None => {
                    if mb.try_block() {
                        suspensions += 1;
                        // Wait for the producer to hand us the wake-up.
                        while mb.state.load(Ordering::SeqCst) == BLOCKED {
                            thread::yield_now();
                        }
                    }
                }
            }
        }
        let wakes = producer.join().unwrap();
        assert_eq!(wakes, suspensions);
    }
}
