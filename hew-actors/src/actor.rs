//! Actor cells and the handles that point at them.
//!
//! An [`ActorCell`] is the shared part of an actor: identity, mailbox,
//! exit reason, and the attachables notified on termination (links,
//! monitors, functors). Everything else (behavior stack, skipped-message
//! cache, request counter) belongs to the single thread of control that
//! runs the actor and lives in its [`Context`](crate::Context).
//!
//! - [`ActorRef`] is a strong handle. Holding one keeps the cell alive
//!   and lets you enqueue messages.
//! - [`ActorAddr`] is a weak handle. It compares and hashes by cell
//!   identity, stays valid after the actor terminates, and only
//!   dereferences while someone else still holds the cell.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use parking_lot::Mutex;
use rand::Rng;

use crate::event_based::EventState;
use crate::exit_reason::ExitReason;
use crate::mailbox::{Mailbox, MailboxElement, Push};
use crate::message::Message;
use crate::message_id::MessageId;
use crate::msg;
use crate::resumable::{ExecutionUnit, Job};
use crate::runtime::Runtime;
use crate::system_messages::{DownMsg, ExitMsg, SyncExitedMsg};

/// Process-unique actor id. Ids are never reused.
pub type ActorId = u64;

/// Identifies the runtime instance hosting an actor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn random() -> Self {
        Self(rand::rng().random())
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

bitflags! {
    /// Options for spawning an actor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SpawnFlags: u32 {
        /// Run on a dedicated OS thread instead of the worker pool.
        const DETACHED = 1;
        /// Not counted by the running-actor barrier.
        const HIDDEN = 1 << 1;
        /// Do not schedule until the first message arrives.
        const LAZY_INIT = 1 << 2;
        /// High-priority messages overtake ordinary ones.
        const PRIORITY_AWARE = 1 << 3;
        /// The spawning actor monitors the new one.
        const MONITORED = 1 << 4;
        /// The spawning actor links to the new one.
        const LINKED = 1 << 5;
        /// Handlers may block; implies a dedicated thread.
        const BLOCKING_API = 1 << 6;
    }
}

// ── Cell ────────────────────────────────────────────────────────────────

type Functor = Box<dyn FnOnce(ExitReason) + Send>;

#[derive(Default)]
struct Attachables {
    exited: bool,
    links: Vec<ActorAddr>,
    monitors: Vec<ActorAddr>,
    functors: Vec<Functor>,
}

pub(crate) struct ActorCell {
    pub(crate) id: ActorId,
    pub(crate) runtime: Runtime,
    pub(crate) flags: SpawnFlags,
    pub(crate) mailbox: Mailbox,
    exit_reason: AtomicU32,
    attachables: Mutex<Attachables>,
    /// Dedicated execution unit for detached event-based actors.
    pub(crate) home: Option<Arc<dyn ExecutionUnit>>,
    /// Present for event-based actors; `None` inside once terminated.
    pub(crate) event: Option<Mutex<Option<EventState>>>,
}

impl ActorCell {
    pub(crate) fn new(
        id: ActorId,
        runtime: Runtime,
        flags: SpawnFlags,
        mailbox: Mailbox,
        home: Option<Arc<dyn ExecutionUnit>>,
        event_based: bool,
    ) -> Self {
        Self {
            id,
            runtime,
            flags,
            mailbox,
            exit_reason: AtomicU32::new(ExitReason::NOT_EXITED.code()),
            attachables: Mutex::new(Attachables::default()),
            home,
            event: event_based.then(|| Mutex::new(None)),
        }
    }

    pub(crate) fn exit_reason(&self) -> ExitReason {
        ExitReason::from_code(self.exit_reason.load(Ordering::Acquire))
    }

    pub(crate) fn is_hidden(&self) -> bool {
        self.flags.contains(SpawnFlags::HIDDEN)
    }

    // ── Delivery ────────────────────────────────────────────────────────

    pub(crate) fn enqueue(
        self: &Arc<Self>,
        sender: &ActorAddr,
        mid: MessageId,
        msg: Message,
        host: Option<&Arc<dyn ExecutionUnit>>,
    ) {
        self.push_element(MailboxElement::new(sender.clone(), mid, msg), host);
    }

    pub(crate) fn push_element(
        self: &Arc<Self>,
        elem: MailboxElement,
        host: Option<&Arc<dyn ExecutionUnit>>,
    ) {
        match self.mailbox.push(elem) {
            Push::Enqueued => {}
            Push::UnblockedReader => self.schedule(host),
            Push::Closed(elems) => {
                let me = ActorAddr::from_cell(self);
                let reason = self.exit_reason();
                for elem in elems {
                    bounce(&me, elem, reason);
                }
            }
        }
    }

    /// Hand the actor to an execution unit after its mailbox unblocked.
    /// Blocking actors are woken by the mailbox itself.
    pub(crate) fn schedule(self: &Arc<Self>, host: Option<&Arc<dyn ExecutionUnit>>) {
        if self.event.is_none() {
            return;
        }
        let job: Job = Arc::clone(self) as Job;
        match (&self.home, host) {
            (Some(home), _) => home.exec_later(job),
            (None, Some(host)) => host.exec_later(job),
            (None, None) => self.runtime.coordinator().enqueue(job),
        }
    }

    // ── Attachables ─────────────────────────────────────────────────────

    /// Run `f` with the exit reason when the actor terminates, or right
    /// away if it already has.
    pub(crate) fn attach_functor(&self, f: Functor) {
        let mut att = self.attachables.lock();
        if att.exited {
            drop(att);
            f(self.exit_reason());
        } else {
            att.functors.push(f);
        }
    }

    /// Record `peer` in our own link set (no notification).
    pub(crate) fn add_link_entry(&self, peer: &ActorAddr) -> bool {
        let mut att = self.attachables.lock();
        if att.exited {
            return false;
        }
        if !att.links.contains(peer) {
            att.links.push(peer.clone());
        }
        true
    }

    pub(crate) fn remove_link_entry(&self, peer: &ActorAddr) {
        self.attachables.lock().links.retain(|l| l != peer);
    }

    pub(crate) fn add_monitor_entry(&self, watcher: &ActorAddr) -> bool {
        let mut att = self.attachables.lock();
        if att.exited {
            return false;
        }
        att.monitors.push(watcher.clone());
        true
    }

    pub(crate) fn remove_monitor_entry(&self, watcher: &ActorAddr) {
        let mut att = self.attachables.lock();
        if let Some(pos) = att.monitors.iter().position(|m| m == watcher) {
            att.monitors.remove(pos);
        }
    }

    #[cfg(test)]
    pub(crate) fn link_count(&self) -> usize {
        self.attachables.lock().links.len()
    }

    // ── Termination ─────────────────────────────────────────────────────

    /// Final bookkeeping for a terminating actor. Idempotent.
    ///
    /// Closes the mailbox (bouncing pending requests), notifies links
    /// and monitors, runs attached functors, and finally releases the
    /// registry slot.
    pub(crate) fn cleanup(self: &Arc<Self>, reason: ExitReason) {
        if self
            .exit_reason
            .compare_exchange(
                ExitReason::NOT_EXITED.code(),
                reason.code(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        let me = ActorAddr::from_cell(self);
        for elem in self.mailbox.close() {
            bounce(&me, elem, reason);
        }
        let att = {
            let mut guard = self.attachables.lock();
            let att = std::mem::take(&mut *guard);
            guard.exited = true;
            att
        };
        for link in &att.links {
            link.enqueue_raw(
                &me,
                MessageId::default(),
                msg![ExitMsg {
                    source: me.clone(),
                    reason,
                }],
            );
        }
        for watcher in &att.monitors {
            watcher.enqueue_raw(
                &me,
                MessageId::default(),
                msg![DownMsg {
                    source: me.clone(),
                    reason,
                }],
            );
        }
        for f in att.functors {
            f(reason);
        }
        tracing::debug!(actor = self.id, %reason, "actor terminated");
        self.runtime.registry().erase(self.id, reason, !self.is_hidden());
    }
}

/// Answer an undeliverable request with `SyncExitedMsg`.
pub(crate) fn bounce(source: &ActorAddr, elem: MailboxElement, reason: ExitReason) {
    if !elem.mid.is_request() || elem.mid.is_answered() {
        return;
    }
    if let Some(requester) = elem.sender.upgrade() {
        tracing::trace!(from = source.id(), to = requester.id(), "bouncing request");
        requester.0.enqueue(
            source,
            elem.mid.response_id(),
            msg![SyncExitedMsg {
                source: source.clone(),
                reason,
            }],
            None,
        );
    }
}

/// Link `a` and `b`. If `b` already exited, `a` receives its `ExitMsg`.
pub(crate) fn link(a: &ActorRef, b: &ActorRef) {
    if a == b {
        return;
    }
    let (a_addr, b_addr) = (a.addr(), b.addr());
    if b.0.add_link_entry(&a_addr) {
        if !a.0.add_link_entry(&b_addr) {
            // `a` is gone; undo so `b` does not notify a dead peer.
            b.0.remove_link_entry(&a_addr);
        }
    } else {
        a.0.enqueue(
            &b_addr,
            MessageId::default(),
            msg![ExitMsg {
                source: b_addr.clone(),
                reason: b.exit_reason(),
            }],
            None,
        );
    }
}

pub(crate) fn unlink(a: &ActorRef, b: &ActorRef) {
    a.0.remove_link_entry(&b.addr());
    b.0.remove_link_entry(&a.addr());
}

/// `watcher` monitors `target`. If `target` already exited, `watcher`
/// receives its `DownMsg`.
pub(crate) fn monitor(watcher: &ActorRef, target: &ActorRef) {
    let target_addr = target.addr();
    if !target.0.add_monitor_entry(&watcher.addr()) {
        watcher.0.enqueue(
            &target_addr,
            MessageId::default(),
            msg![DownMsg {
                source: target_addr.clone(),
                reason: target.exit_reason(),
            }],
            None,
        );
    }
}

// ── Channel ─────────────────────────────────────────────────────────────

/// Anything that accepts messages.
pub trait Channel: Send + Sync {
    /// Deliver `msg`. The only way mail enters a mailbox; callable from
    /// any thread. `host` is the execution unit of the calling actor, if
    /// any, and receives the destination's job should it need waking.
    fn enqueue(
        &self,
        sender: &ActorAddr,
        mid: MessageId,
        msg: Message,
        host: Option<&Arc<dyn ExecutionUnit>>,
    );
}

// ── ActorRef ────────────────────────────────────────────────────────────

/// Strong handle to an actor.
#[derive(Clone)]
pub struct ActorRef(pub(crate) Arc<ActorCell>);

impl ActorRef {
    #[must_use]
    pub fn id(&self) -> ActorId {
        self.0.id
    }

    #[must_use]
    pub fn node(&self) -> NodeId {
        self.0.runtime.node_id()
    }

    #[must_use]
    pub fn addr(&self) -> ActorAddr {
        ActorAddr::from_cell(&self.0)
    }

    /// `NOT_EXITED` while running.
    #[must_use]
    pub fn exit_reason(&self) -> ExitReason {
        self.0.exit_reason()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.exit_reason().is_exited()
    }

    #[must_use]
    pub fn flags(&self) -> SpawnFlags {
        self.0.flags
    }

    /// Send `msg` without a sender address.
    pub fn send(&self, msg: Message) {
        self.0
            .enqueue(&ActorAddr::default(), MessageId::default(), msg, None);
    }

    /// Run `f` with the exit reason once this actor terminates (or now,
    /// if it already has).
    pub fn attach_functor<F>(&self, f: F)
    where
        F: FnOnce(ExitReason) + Send + 'static,
    {
        self.0.attach_functor(Box::new(f));
    }
}

impl Channel for ActorRef {
    fn enqueue(
        &self,
        sender: &ActorAddr,
        mid: MessageId,
        msg: Message,
        host: Option<&Arc<dyn ExecutionUnit>>,
    ) {
        self.0.enqueue(sender, mid, msg, host);
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ActorRef {}

impl Hash for ActorRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef(#{})", self.0.id)
    }
}

// ── ActorAddr ───────────────────────────────────────────────────────────

/// Weak, comparable actor address.
///
/// The default value is the invalid address.
#[derive(Clone, Default)]
pub struct ActorAddr {
    cell: Weak<ActorCell>,
    id: ActorId,
}

impl ActorAddr {
    pub(crate) fn from_cell(cell: &Arc<ActorCell>) -> Self {
        Self {
            cell: Arc::downgrade(cell),
            id: cell.id,
        }
    }

    /// Id of the addressed actor, `0` for the invalid address.
    #[must_use]
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// A strong handle, if the cell is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<ActorRef> {
        self.cell.upgrade().map(ActorRef)
    }

    /// Whether this address was ever bound to an actor.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }

    /// Deliver without a host unit; dropped if the cell is gone.
    pub(crate) fn enqueue_raw(&self, sender: &ActorAddr, mid: MessageId, msg: Message) {
        self.enqueue(sender, mid, msg, None);
    }
}

impl Channel for ActorAddr {
    fn enqueue(
        &self,
        sender: &ActorAddr,
        mid: MessageId,
        msg: Message,
        host: Option<&Arc<dyn ExecutionUnit>>,
    ) {
        match self.cell.upgrade() {
            Some(cell) => cell.enqueue(sender, mid, msg, host),
            None => tracing::trace!(to = self.id, "dropping message to vanished actor"),
        }
    }
}

impl From<&ActorRef> for ActorAddr {
    fn from(actor: &ActorRef) -> Self {
        actor.addr()
    }
}

impl From<ActorRef> for ActorAddr {
    fn from(actor: ActorRef) -> Self {
        actor.addr()
    }
}

impl From<&ActorAddr> for ActorAddr {
    fn from(addr: &ActorAddr) -> Self {
        addr.clone()
    }
}

impl PartialEq for ActorAddr {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for ActorAddr {}

impl Hash for ActorAddr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cell.as_ptr().hash(state);
    }
}

impl PartialEq<ActorRef> for ActorAddr {
    fn eq(&self, other: &ActorRef) -> bool {
        std::ptr::eq(self.cell.as_ptr(), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for ActorAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ActorAddr(#{})", self.id)
        } else {
            f.write_str("ActorAddr(invalid)")
        }
    }
}
