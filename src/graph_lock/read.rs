// SPDX-License-Identifier: MIT OR Apache-2.0
use super::NO_WRITER;
use super::inner::GraphLock;
use crate::context;
use crate::error::NotAvailable;
use crate::guard::ReadGuard;
use crate::registry::Waiter;
use std::sync::atomic::{Ordering, fence};
use std::thread;

/// The result of one pass over the read protocol.
enum Attempt<W> {
    Entered,
    /// Queued behind the writer; `W` is what to wait on.
    Queued(W),
}

impl GraphLock {
    /// Adds `delta` to the reader counter of the calling thread's context.
    ///
    /// Returns `false` without touching anything if the thread isn't running in a
    /// context registered with this lock; such reads belong to the orphan bucket.
    fn adjust_local(&self, delta: i64) -> bool {
        context::with_current(|current| match current {
            Some(ctx) if ctx.is_owned_by(self.id) => {
                ctx.reader_count.fetch_add(delta, Ordering::SeqCst);
                true
            }
            _ => false,
        })
    }

    pub(crate) fn writer_flagged(&self) -> bool {
        self.has_writer.load(Ordering::Acquire) != NO_WRITER
    }

    fn attempt_read<W>(&self, enqueue: impl FnOnce() -> (Waiter, W)) -> Attempt<W> {
        let local = self.adjust_local(1);
        if local {
            // Pairs with the fence between the writer's flag store and its recount.
            fence(Ordering::SeqCst);
            if !self.writer_flagged() {
                return Attempt::Entered;
            }
        }

        let mut registry = self.registry.lock_sync();
        if !local {
            registry.orphaned_reader_count += 1;
        }
        // The writer may have released between the fast-path load and taking the
        // mutex. Release clears the flag under this mutex, so this load is final.
        if !self.writer_flagged() {
            return Attempt::Entered;
        }
        if local {
            self.adjust_local(-1);
        } else {
            registry.orphaned_reader_count -= 1;
        }
        self.kick();
        let (waiter, wait) = enqueue();
        registry.wait_queue.push_back(waiter);
        log::trace!(
            "{self}: reader queued behind writer ({} waiting)",
            registry.wait_queue.len()
        );
        Attempt::Queued(wait)
    }

    /// Acquires the graph for reading, suspending the calling task while a writer
    /// is draining or active.
    ///
    /// The read is counted against the execution context the task is polled in.
    /// After a suspension the task may resume on another context; it is then
    /// counted there. Outside any context registered with this lock the read is
    /// counted in the orphan bucket, which costs a trip through the registry mutex.
    ///
    /// Every call must be paired with one [`release_read`](Self::release_read).
    ///
    /// # Examples
    ///
    /// ```
    /// # test_executors::spin_on(async {
    /// use graph_access_lock::{ExecutionContext, GraphLock};
    ///
    /// let lock = GraphLock::new();
    /// let ctx = ExecutionContext::new();
    /// lock.register_context(&ctx).unwrap();
    /// let _entered = ctx.enter();
    ///
    /// lock.acquire_read().await;
    /// lock.acquire_read().await;
    /// assert_eq!(lock.reader_count(), 2);
    /// lock.release_read();
    /// lock.release_read();
    /// # });
    /// ```
    pub async fn acquire_read(&self) {
        loop {
            let attempt = self.attempt_read(|| {
                let (sender, receiver) = r#continue::continuation();
                (Waiter::Task(sender), receiver)
            });
            match attempt {
                Attempt::Entered => return,
                Attempt::Queued(receiver) => {
                    receiver.await;
                    log::trace!("{self}: queued reader resumed");
                }
            }
        }
    }

    /// Acquires the graph for reading, parking the calling thread while a writer is
    /// draining or active.
    ///
    /// Same protocol and attribution as [`acquire_read`](Self::acquire_read), for
    /// callers that aren't tasks.
    pub fn acquire_read_blocking(&self) {
        loop {
            match self.attempt_read(|| (Waiter::Thread(thread::current()), ())) {
                Attempt::Entered => return,
                Attempt::Queued(()) => thread::park(),
            }
        }
    }

    /// Acquires the graph for reading only if no writer is draining or active.
    ///
    /// Never waits.
    pub fn try_acquire_read(&self) -> Result<(), NotAvailable> {
        if self.adjust_local(1) {
            fence(Ordering::SeqCst);
            if !self.writer_flagged() {
                return Ok(());
            }
            self.adjust_local(-1);
            fence(Ordering::SeqCst);
            // The writer may have counted us while draining.
            self.kick();
            Err(NotAvailable)
        } else {
            let mut registry = self.registry.lock_sync();
            if self.writer_flagged() {
                return Err(NotAvailable);
            }
            registry.orphaned_reader_count += 1;
            Ok(())
        }
    }

    /// Releases a read acquired by any of the `acquire_read` variants.
    ///
    /// May run on a different context than the acquisition. A release with no
    /// matching acquisition is caught in debug builds by the next
    /// [`release_write`](Self::release_write).
    pub fn release_read(&self) {
        if !self.adjust_local(-1) {
            self.registry.lock_sync().orphaned_reader_count -= 1;
        }
        fence(Ordering::SeqCst);
        if self.writer_flagged() || self.writer_waiting.load(Ordering::SeqCst) {
            self.kick();
        }
    }

    /// A read by the coordinator from its own main loop.
    ///
    /// The coordinator is the only writer and can't race itself, so nothing is
    /// counted; in debug builds this asserts the caller is the coordinator. Pair
    /// with [`release_read_coordinator`](Self::release_read_coordinator).
    pub fn acquire_read_coordinator(&self) {
        debug_assert!(
            self.is_coordinator(),
            "{self}: coordinator read taken off the coordinator thread"
        );
    }

    pub fn release_read_coordinator(&self) {
        debug_assert!(
            self.is_coordinator(),
            "{self}: coordinator read released off the coordinator thread"
        );
    }

    /// Acquires a read and returns a guard that releases it on drop.
    pub async fn read(&self) -> ReadGuard<'_> {
        self.acquire_read().await;
        ReadGuard { lock: self }
    }

    pub fn read_blocking(&self) -> ReadGuard<'_> {
        self.acquire_read_blocking();
        ReadGuard { lock: self }
    }

    pub fn try_read(&self) -> Result<ReadGuard<'_>, NotAvailable> {
        self.try_acquire_read()?;
        Ok(ReadGuard { lock: self })
    }

    /// Runs `f` while holding a read.
    ///
    /// # Examples
    ///
    /// ```
    /// # test_executors::spin_on(async {
    /// use graph_access_lock::{ExecutionContext, GraphLock};
    ///
    /// let lock = GraphLock::new();
    /// let ctx = ExecutionContext::new();
    /// lock.register_context(&ctx).unwrap();
    /// let _entered = ctx.enter();
    ///
    /// let edges = vec![(0, 1), (1, 2)];
    /// let count = lock.with_read(|| edges.len()).await;
    /// assert_eq!(count, 2);
    /// # });
    /// ```
    pub async fn with_read<R, F: FnOnce() -> R>(&self, f: F) -> R {
        let _guard = self.read().await;
        f()
    }

    pub fn with_read_blocking<R, F: FnOnce() -> R>(&self, f: F) -> R {
        let _guard = self.read_blocking();
        f()
    }
}
