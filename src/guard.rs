// SPDX-License-Identifier: MIT OR Apache-2.0
//! Guard types for the graph lock.
//!
//! The lock protects no data of its own, so the guards carry no `Deref`. They exist
//! to tie a release to a scope.

use crate::GraphLock;

/// An outstanding read on a [`GraphLock`], released on drop.
///
/// Created by [`GraphLock::read`], [`GraphLock::read_blocking`] and
/// [`GraphLock::try_read`]. The guard may be moved to and dropped on another thread;
/// the release is then counted against that thread's context.
///
/// # Examples
///
/// ```
/// use graph_access_lock::{ExecutionContext, GraphLock};
///
/// let lock = GraphLock::new();
/// let ctx = ExecutionContext::new();
/// lock.register_context(&ctx).unwrap();
/// let _entered = ctx.enter();
///
/// {
///     let _a = lock.read_blocking();
///     let _b = lock.try_read().unwrap();
///     assert_eq!(lock.reader_count(), 2);
/// }
/// assert_eq!(lock.reader_count(), 0);
/// ```
#[derive(Debug)]
#[must_use = "the read is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    pub(crate) lock: &'a GraphLock,
}

/// The write lock on a [`GraphLock`], released on drop.
///
/// Created by [`GraphLock::write`].
///
/// # Examples
///
/// ```
/// use graph_access_lock::{GraphLock, WriterState};
///
/// let lock = GraphLock::new();
/// {
///     let _write = lock.write();
///     lock.assert_writable();
/// }
/// assert_eq!(lock.writer_state(), WriterState::Idle);
/// ```
#[derive(Debug)]
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    pub(crate) lock: &'a GraphLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}
