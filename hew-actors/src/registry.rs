//! Actor registry: id lookup, exit reasons, the running-actor barrier,
//! and the name table.
//!
//! Entries are keyed by [`ActorId`] and never removed. Erasing an actor
//! drops the strong handle and records its exit reason, which stays
//! readable for the lifetime of the runtime.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::actor::{ActorAddr, ActorId, ActorRef};
use crate::error::{Error, Result};
use crate::exit_reason::ExitReason;

#[derive(Debug)]
struct Entry {
    actor: Option<ActorRef>,
    reason: ExitReason,
}

#[derive(Debug, Default)]
pub struct ActorRegistry {
    entries: RwLock<HashMap<ActorId, Entry>>,
    running: Mutex<usize>,
    running_changed: Condvar,
    names: RwLock<HashMap<String, ActorAddr>>,
}

impl ActorRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // ── Entries ─────────────────────────────────────────────────────────

    /// The live actor with `id`, if any.
    #[must_use]
    pub fn get(&self, id: ActorId) -> Option<ActorRef> {
        self.entries.read().get(&id).and_then(|e| e.actor.clone())
    }

    /// Exit reason recorded for `id`: `NOT_EXITED` while it runs, `None`
    /// for ids never registered.
    #[must_use]
    pub fn exit_reason(&self, id: ActorId) -> Option<ExitReason> {
        self.entries.read().get(&id).map(|e| e.reason)
    }

    pub(crate) fn put(&self, actor: &ActorRef) {
        self.entries.write().insert(
            actor.id(),
            Entry {
                actor: Some(actor.clone()),
                reason: ExitReason::NOT_EXITED,
            },
        );
    }

    /// Drop the handle for `id` and record `reason`. Only the first call
    /// for an id has any effect.
    pub(crate) fn erase(&self, id: ActorId, reason: ExitReason, counted: bool) {
        let erased = {
            let mut entries = self.entries.write();
            match entries.get_mut(&id) {
                Some(entry) if entry.actor.is_some() => {
                    entry.actor = None;
                    entry.reason = reason;
                    true
                }
                _ => false,
            }
        };
        if erased && counted {
            self.dec_running();
        }
    }

    /// Every actor that has not terminated yet.
    pub(crate) fn live_actors(&self) -> Vec<ActorRef> {
        self.entries
            .read()
            .values()
            .filter_map(|e| e.actor.clone())
            .collect()
    }

    // ── Running counter ─────────────────────────────────────────────────

    pub(crate) fn inc_running(&self) {
        *self.running.lock() += 1;
    }

    pub(crate) fn dec_running(&self) {
        let mut running = self.running.lock();
        *running = running.saturating_sub(1);
        self.running_changed.notify_all();
    }

    /// Number of visible actors that have not terminated.
    #[must_use]
    pub fn running(&self) -> usize {
        *self.running.lock()
    }

    /// Block until exactly `n` visible actors are running.
    pub fn await_running_count_equal(&self, n: usize) {
        let mut running = self.running.lock();
        while *running != n {
            self.running_changed.wait(&mut running);
        }
    }

    /// Like [`await_running_count_equal`](Self::await_running_count_equal)
    /// but gives up after `timeout`. Returns whether the count was reached.
    #[must_use]
    pub fn await_running_count_equal_timeout(&self, n: usize, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.await_running_count_equal(n);
            return true;
        };
        let mut running = self.running.lock();
        while *running != n {
            if self
                .running_changed
                .wait_until(&mut running, deadline)
                .timed_out()
            {
                return *running == n;
            }
        }
        true
    }

    // ── Names ───────────────────────────────────────────────────────────

    /// Bind `name` to `actor` until it terminates or is unregistered.
    ///
    /// # Errors
    ///
    /// [`Error::NameTaken`] if `name` is bound to a live actor.
    pub fn register_name(self: &Arc<Self>, name: impl Into<String>, actor: &ActorRef) -> Result<()> {
        let name = name.into();
        {
            let mut names = self.names.write();
            if let Some(current) = names.get(&name) {
                if current.upgrade().is_some_and(|a| a.is_alive()) {
                    return Err(Error::NameTaken(name));
                }
            }
            names.insert(name.clone(), actor.addr());
        }
        let registry: Weak<Self> = Arc::downgrade(self);
        let addr = actor.addr();
        actor.attach_functor(move |_| {
            if let Some(registry) = registry.upgrade() {
                registry.release_name(&name, &addr);
            }
        });
        Ok(())
    }

    /// The actor currently bound to `name`.
    #[must_use]
    pub fn whereis(&self, name: &str) -> Option<ActorRef> {
        self.names
            .read()
            .get(name)
            .and_then(ActorAddr::upgrade)
            .filter(ActorRef::is_alive)
    }

    /// Remove `name`. Returns whether it was bound.
    pub fn unregister_name(&self, name: &str) -> bool {
        self.names.write().remove(name).is_some()
    }

    /// Remove `name` only if it still points at `addr`.
    fn release_name(&self, name: &str, addr: &ActorAddr) {
        let mut names = self.names.write();
        if names.get(name) == Some(addr) {
            names.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn barrier_waits_for_count() {
        let reg = Arc::new(ActorRegistry::new());
        for _ in 0..3 {
            reg.inc_running();
        }
        let waiter = {
            let reg = Arc::clone(&reg);
            thread::spawn(move || reg.await_running_count_equal(0))
        };
        for _ in 0..3 {
            reg.dec_running();
        }
        waiter.join().unwrap();
        assert_eq!(reg.running(), 0);
    }

    #[test]
    fn barrier_timeout() {
        let reg = ActorRegistry::new();
        reg.inc_running();
        assert!(!reg.await_running_count_equal_timeout(0, Duration::from_millis(20)));
        assert!(reg.await_running_count_equal_timeout(1, Duration::from_millis(20)));
    }

    #[test]
    fn unbounded_barrier_timeout() {
        let reg = Arc::new(ActorRegistry::new());
        assert!(reg.await_running_count_equal_timeout(0, Duration::MAX));
        reg.inc_running();
        let waiter = {
            let reg = Arc::clone(&reg);
            thread::spawn(move || reg.await_running_count_equal_timeout(0, Duration::MAX))
        };
        thread::sleep(Duration::from_millis(10));
        reg.dec_running();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn unknown_ids() {
        let reg = ActorRegistry::new();
        assert!(reg.get(42).is_none());
        assert!(reg.exit_reason(42).is_none());
        reg.erase(42, ExitReason::NORMAL, true);
        assert_eq!(reg.running(), 0);
        assert!(reg.whereis("nobody").is_none());
        assert!(!reg.unregister_name("nobody"));
    }
}
