// SPDX-License-Identifier: MIT OR Apache-2.0
//! The state behind a graph lock's registry mutex.
//!
//! The registered contexts, the orphan bucket and the wait queue are only ever
//! read or changed together, under one mutex, so the reader total computed from
//! them is consistent with who is queued.

use crate::context::ContextInner;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

/// A reader suspended on the slow path, waiting for the writer to release.
pub(crate) enum Waiter {
    /// An async task; resumed by completing its continuation.
    Task(r#continue::Sender<()>),
    /// A thread blocked in `acquire_read_blocking`.
    Thread(thread::Thread),
}

impl Waiter {
    pub(crate) fn wake(self) {
        match self {
            Waiter::Task(sender) => sender.send(()),
            Waiter::Thread(thread) => thread.unpark(),
        }
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Waiter::Task(_) => f.write_str("Task"),
            Waiter::Thread(thread) => f.debug_tuple("Thread").field(&thread.id()).finish(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) contexts: Vec<Arc<ContextInner>>,
    /// Reads attributed to contexts that no longer exist, or to callers that ran
    /// outside any registered context.
    pub(crate) orphaned_reader_count: i64,
    pub(crate) wait_queue: VecDeque<Waiter>,
}

impl Registry {
    pub(crate) fn position(&self, ctx: &Arc<ContextInner>) -> Option<usize> {
        self.contexts.iter().position(|c| Arc::ptr_eq(c, ctx))
    }

    /// Sums the orphan bucket and every context's counter.
    ///
    /// The counters are read one at a time while readers keep running, so a read
    /// that migrates during the scan may be seen released but not acquired. The sum
    /// can then be off, even negative. It is exact when no read is in flight, and
    /// never low once the writer has flagged its intent.
    pub(crate) fn reader_count(&self) -> i64 {
        self.contexts
            .iter()
            .fold(self.orphaned_reader_count, |sum, ctx| {
                sum + ctx.reader_count.load(Ordering::SeqCst)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{Registry, Waiter};
    use crate::context::ExecutionContext;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_sum_includes_orphans_and_negative_terms() {
        let a = ExecutionContext::new();
        let b = ExecutionContext::new();
        a.inner().reader_count.store(3, Ordering::SeqCst);
        b.inner().reader_count.store(-1, Ordering::SeqCst);
        let registry = Registry {
            contexts: vec![Arc::clone(a.inner()), Arc::clone(b.inner())],
            orphaned_reader_count: 2,
            ..Registry::default()
        };
        assert_eq!(registry.reader_count(), 4);
        assert_eq!(registry.position(b.inner()), Some(1));
        assert_eq!(registry.position(ExecutionContext::new().inner()), None);
    }

    #[test]
    fn test_torn_sum_is_reported_as_is() {
        //a read released on `b` whose acquisition on `a` the scan hasn't seen yet
        let a = ExecutionContext::new();
        let b = ExecutionContext::new();
        b.inner().reader_count.store(-1, Ordering::SeqCst);
        let registry = Registry {
            contexts: vec![Arc::clone(a.inner()), Arc::clone(b.inner())],
            ..Registry::default()
        };
        assert_eq!(registry.reader_count(), -1);
        a.inner().reader_count.store(1, Ordering::SeqCst);
        assert_eq!(registry.reader_count(), 0);
    }

    #[test_executors::async_test]
    async fn test_task_waiter_wakes() {
        let (sender, receiver) = r#continue::continuation();
        Waiter::Task(sender).wake();
        receiver.await;
    }
}
