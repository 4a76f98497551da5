//! Two-lock MPSC (Multiple Producer, Single Consumer) linked list.
//!
//! This is the job queue every worker exposes to its peers and the
//! storage behind each actor's mailbox. Any number of threads may call
//! [`push_back`](ProducerConsumerList::push_back) concurrently;
//! [`try_pop`](ProducerConsumerList::try_pop) is meant for the owning
//! consumer but is serialized by its own lock, so thieves may call it too.
//!
//! The list always holds a sentinel node. Producers only touch `tail`
//! (and the sentinel-or-last node's `next`) under the producer lock;
//! the consumer only touches `head` under the consumer lock. Neither
//! side ever waits for the other.
//!
//! `head` and `tail` live on separate cache lines so that a busy producer
//! does not invalidate the consumer's line (and vice versa).
//!
//! # Memory ordering
//!
//! - **push**: `Release` on `last.next` publishes the node payload.
//! - **pop**: `Acquire` on `first.next` observes the producer's writes.
//! - [`is_empty`](ProducerConsumerList::is_empty) compares `head` and
//!   `tail` without dereferencing either, so it is safe from any thread
//!   but only a hint.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::internal::spin::SpinLock;

// ── Node ────────────────────────────────────────────────────────────────

struct Node<T> {
    /// `None` for the sentinel; taken by the consumer when the node
    /// becomes the new sentinel.
    value: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn alloc(value: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

// ── List ────────────────────────────────────────────────────────────────

/// Sentinel-headed MPSC list with independent producer and consumer locks.
pub struct ProducerConsumerList<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    head_lock: CachePadded<SpinLock>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    tail_lock: CachePadded<SpinLock>,
    /// Approximate element count (diagnostics only).
    len: AtomicUsize,
}

// SAFETY: Values are moved in by producers and out by the consumer; the
// list never hands out shared references to `T`. Node pointers are only
// dereferenced under the lock of the side that owns them.
unsafe impl<T: Send> Send for ProducerConsumerList<T> {}
// SAFETY: See above; all mutation is serialized by the two spin locks.
unsafe impl<T: Send> Sync for ProducerConsumerList<T> {}

impl<T> std::fmt::Debug for ProducerConsumerList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerConsumerList")
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .field("len", &self.len.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> ProducerConsumerList<T> {
    /// Creates an empty list containing only the sentinel.
    #[must_use]
    pub fn new() -> Self {
        let sentinel = Node::alloc(None);
        Self {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            head_lock: CachePadded::new(SpinLock::new()),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            tail_lock: CachePadded::new(SpinLock::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Appends `value`. Safe for any number of concurrent producers.
    pub fn push_back(&self, value: T) {
        let node = Node::alloc(Some(value));
        // Count before publishing so a racing pop never underflows.
        self.len.fetch_add(1, Ordering::Relaxed);
        let _guard = self.tail_lock.lock();
        let last = self.tail.load(Ordering::Relaxed);
        // SAFETY: `last` is the current tail. The consumer only frees a
        // node after it has a non-null `next`, and only producers (holding
        // `tail_lock`) ever set the tail's `next`, so `last` is live.
        unsafe { (*last).next.store(node, Ordering::Release) };
        self.tail.store(node, Ordering::Release);
    }

    /// Removes the oldest element, or returns `None` if the list is empty.
    ///
    /// Never blocks on producers.
    pub fn try_pop(&self) -> Option<T> {
        let guard = self.head_lock.lock();
        let first = self.head.load(Ordering::Relaxed);
        // SAFETY: `first` is the sentinel, owned by the consumer side and
        // only freed below while `head_lock` is held.
        let next = unsafe { (*first).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }
        // SAFETY: `next` was published by a producer with `Release`; it
        // becomes the new sentinel and its payload moves out exactly once.
        let value = unsafe { (*next).value.take() };
        self.head.store(next, Ordering::Release);
        drop(guard);
        // SAFETY: `first` was allocated by `Node::alloc`, is no longer
        // reachable from `head`, and producers never touch it again
        // because its `next` is already set.
        drop(unsafe { Box::from_raw(first) });
        self.len.fetch_sub(1, Ordering::Relaxed);
        value
    }

    /// Best-effort emptiness check (`head == tail`).
    ///
    /// Does not synchronize with in-flight pushes; use only as a hint.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Approximate number of queued elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Pops everything currently reachable.
    pub fn drain(&self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(v) = self.try_pop() {
            out.push(v);
        }
        out
    }
}

impl<T> Default for ProducerConsumerList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ProducerConsumerList<T> {
    fn drop(&mut self) {
        let mut cur = self.head.load(Ordering::Relaxed);
        while !cur.is_null() {
            // SAFETY: `&mut self` guarantees no concurrent access; every
            // node in the chain was allocated by `Node::alloc`.
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next.load(Ordering::Relaxed);
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
