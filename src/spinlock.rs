// SPDX-License-Identifier: MIT OR Apache-2.0
//! A spinlock for the handful of words that must be touched from the reader
//! release path.
//!
//! Readers kick a waiting writer from [`release_read`](crate::GraphLock::release_read),
//! which runs on every execution context. Taking the registry mutex there would
//! put a shared cache line back on the hot path, so the writer's wake slot lives
//! behind this lock instead. Critical sections are a clone or a store.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Spinlock<T> {
    data: UnsafeCell<T>,
    locked: AtomicBool,
}

/// Releases the spinlock even if the closure unwinds.
struct Unlock<'a>(&'a AtomicBool);

impl Drop for Unlock<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> Spinlock<T> {
    pub(crate) const fn new(data: T) -> Self {
        Spinlock {
            data: UnsafeCell::new(data),
            locked: AtomicBool::new(false),
        }
    }

    /// Runs `f` with exclusive access to the protected value.
    ///
    /// Spins on a relaxed load between attempts so a waiting thread doesn't
    /// keep stealing the line from the holder.
    pub(crate) fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
        let _unlock = Unlock(&self.locked);
        // SAFETY: `locked` was acquired above and is held until `_unlock` drops.
        unsafe { f(&mut *self.data.get()) }
    }
}

unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send> Sync for Spinlock<T> {}
