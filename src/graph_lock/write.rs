// SPDX-License-Identifier: MIT OR Apache-2.0
use super::inner::GraphLock;
use super::{DRAINING, NO_WRITER, WRITING};
use crate::guard::WriteGuard;
use std::sync::atomic::{Ordering, fence};
use std::thread;

impl GraphLock {
    /// Acquires the graph for writing, blocking the calling thread until no reader
    /// holds it.
    ///
    /// Admission is paused first so the reader total can reach zero. The writer then
    /// waits with its intent flag clear, so that in-flight readers which need further
    /// reads to finish can still get them. Once the total is zero it flags its intent,
    /// fences and recounts. A reader that slipped in between the two counts sends it
    /// back to waiting.
    ///
    /// There is no timeout. Calling this from a thread that some reader depends on
    /// for progress deadlocks.
    ///
    /// # Panics
    ///
    /// If a writer is already draining or active, and in debug builds if the caller
    /// isn't the coordinator.
    ///
    /// # Examples
    ///
    /// ```
    /// use graph_access_lock::{GraphLock, WriterState};
    ///
    /// let lock = GraphLock::new();
    /// lock.acquire_write();
    /// assert_eq!(lock.writer_state(), WriterState::Writing);
    /// lock.release_write();
    /// assert_eq!(lock.writer_state(), WriterState::Idle);
    /// ```
    pub fn acquire_write(&self) {
        assert_eq!(
            self.has_writer.load(Ordering::Relaxed),
            NO_WRITER,
            "{self}: acquire_write while a writer is already active"
        );
        debug_assert!(
            self.is_coordinator(),
            "{self}: acquire_write called off the coordinator thread"
        );
        log::debug!("{self}: acquiring for write");

        self.admission.pause();
        self.writer_thread
            .with_mut(|slot| *slot = Some(thread::current()));
        self.writer_waiting.store(true, Ordering::SeqCst);

        let mut retries = 0u32;
        loop {
            self.has_writer.store(NO_WRITER, Ordering::SeqCst);
            self.wait_for_readers();
            self.has_writer.store(DRAINING, Ordering::SeqCst);
            // Pairs with the fence between a reader's increment and its flag load.
            fence(Ordering::SeqCst);
            if self.reader_count() == 0 {
                break;
            }
            retries += 1;
            log::trace!("{self}: reader slipped in while draining, retry {retries}");
        }

        self.has_writer.store(WRITING, Ordering::SeqCst);
        self.writer_waiting.store(false, Ordering::SeqCst);
        self.writer_thread.with_mut(|slot| *slot = None);
        self.admission.resume();
        log::debug!("{self}: acquired for write");
    }

    fn wait_for_readers(&self) {
        loop {
            // Readers still run freely here, so a negative sum is a scan that caught
            // a migrating read half way. Only zero ends the wait.
            let readers = self.reader_count();
            if readers == 0 {
                return;
            }
            log::trace!("{self}: waiting for {readers} readers");
            thread::park_timeout(self.poll_interval);
        }
    }

    /// Releases the write lock and resumes every queued reader.
    ///
    /// # Panics
    ///
    /// If the write lock isn't held, and in debug builds if a read was released
    /// without a matching acquisition.
    pub fn release_write(&self) {
        assert_eq!(
            self.has_writer.load(Ordering::Relaxed),
            WRITING,
            "{self}: release_write without holding the write lock"
        );
        let waiters = {
            let mut registry = self.registry.lock_sync();
            // Nothing can be in flight while writing: readers that bumped a
            // counter since undo it on the same counter, so the sum can't read low.
            if cfg!(debug_assertions) {
                let readers = registry.reader_count();
                assert!(
                    readers >= 0,
                    "{self}: reader count went negative while writing: {readers}"
                );
            }
            self.has_writer.store(NO_WRITER, Ordering::Release);
            std::mem::take(&mut registry.wait_queue)
        };
        log::debug!("{self}: released write, waking {} readers", waiters.len());
        for waiter in waiters {
            waiter.wake();
        }
    }

    /// Acquires the write lock and returns a guard that releases it on drop.
    pub fn write(&self) -> WriteGuard<'_> {
        self.acquire_write();
        WriteGuard { lock: self }
    }

    /// Runs `f` while holding the write lock.
    ///
    /// # Examples
    ///
    /// ```
    /// use graph_access_lock::GraphLock;
    ///
    /// let lock = GraphLock::new();
    /// let mut edges = vec![(0, 1)];
    /// lock.with_write(|| edges.push((1, 2)));
    /// assert_eq!(edges.len(), 2);
    /// ```
    pub fn with_write<R, F: FnOnce() -> R>(&self, f: F) -> R {
        let _guard = self.write();
        f()
    }
}
