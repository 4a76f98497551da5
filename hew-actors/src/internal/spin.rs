//! Minimal test-and-test-and-set spin lock.
//!
//! Used where the critical section is a handful of pointer swings and a
//! kernel-backed mutex would cost more than the work it protects (the
//! producer and consumer sides of [`ProducerConsumerList`]).
//!
//! [`ProducerConsumerList`]: crate::queue::ProducerConsumerList

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_utils::Backoff;

/// Spin lock guarding no data of its own; callers pair it with the
/// pointers it protects.
#[derive(Debug, Default)]
pub(crate) struct SpinLock {
    locked: AtomicBool,
}

/// Releases the owning [`SpinLock`] on drop.
#[derive(Debug)]
pub(crate) struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl SpinLock {
    pub(crate) const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquire the lock, spinning (then yielding) while it is held.
    pub(crate) fn lock(&self) -> SpinGuard<'_> {
        let backoff = Backoff::new();
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SpinGuard { lock: self };
            }
            // Spin on a plain load so contending threads don't bounce the
            // cache line with failed RMWs.
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn guard_releases_on_drop() {
        let lock = SpinLock::new();
        {
            let _g = lock.lock();
            assert!(lock.locked.load(Ordering::Relaxed));
        }
        assert!(!lock.locked.load(Ordering::Relaxed));
    }

    #[test]
    fn serializes_increments() {
        struct Shared {
            lock: SpinLock,
            value: std::cell::UnsafeCell<u64>,
        }
        // SAFETY: `value` is only touched while `lock` is held.
        unsafe impl Sync for Shared {}

        let shared = Arc::new(Shared {
            lock: SpinLock::new(),
            value: std::cell::UnsafeCell::new(0),
        });
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let s = Arc::clone(&shared);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        let _g = s.lock.lock();
                        // SAFETY: exclusive access under the spin lock.
                        unsafe { *s.value.get() += 1 };
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // SAFETY: all writers have been joined.
        assert_eq!(unsafe { *shared.value.get() }, 40_000);
    }
}
