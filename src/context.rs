// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution contexts: the places reader tasks run.
//!
//! An [`ExecutionContext`] is usually one per OS thread. A thread enters a context
//! with [`ExecutionContext::enter`]; from then on every read acquisition made by a
//! task polled on that thread is counted against that context's reader counter.
//! Because the counter is only touched by the threads running in the context, the
//! reader fast path never bounces a cache line between contexts.
//!
//! A task that suspends on one thread and is resumed on another simply counts
//! against whichever context is current when it next runs. Individual counters can
//! therefore drift positive or negative; only their sum (plus the orphan bucket of
//! the [`GraphLock`](crate::GraphLock)) means anything.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Owner id of a context that isn't registered with any lock.
pub(crate) const NO_OWNER: u64 = 0;

thread_local! {
    static CURRENT: RefCell<Option<ExecutionContext>> = const { RefCell::new(None) };
}

#[derive(Debug)]
pub(crate) struct ContextInner {
    pub(crate) id: u64,
    name: Option<String>,
    pub(crate) reader_count: AtomicI64,
    /// Id of the [`GraphLock`](crate::GraphLock) this context is registered with.
    pub(crate) owner: AtomicU64,
}

impl ContextInner {
    pub(crate) fn is_owned_by(&self, lock_id: u64) -> bool {
        self.owner.load(Ordering::Relaxed) == lock_id
    }
}

/// An independent scheduling domain that can host reader tasks.
///
/// Cloning an `ExecutionContext` yields another handle to the same context.
///
/// # Examples
///
/// ```
/// use graph_access_lock::{ExecutionContext, GraphLock};
///
/// let lock = GraphLock::new();
/// let ctx = ExecutionContext::named("worker-0");
/// lock.register_context(&ctx).unwrap();
///
/// let _entered = ctx.enter();
/// lock.acquire_read_blocking();
/// assert_eq!(ctx.reader_count(), 1);
/// lock.release_read();
/// assert_eq!(ctx.reader_count(), 0);
/// ```
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl ExecutionContext {
    /// Creates a new, unregistered context.
    pub fn new() -> Self {
        Self::with_name(None)
    }

    /// Creates a new, unregistered context with a name used in log output.
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_name(Some(name.into()))
    }

    fn with_name(name: Option<String>) -> Self {
        ExecutionContext {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                name,
                reader_count: AtomicI64::new(0),
                owner: AtomicU64::new(NO_OWNER),
            }),
        }
    }

    /// A process-unique identifier for this context.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// The reader counter attributed to this context.
    ///
    /// This is a diagnostic: readers that migrated between contexts make the
    /// value meaningless on its own, and it may be negative.
    pub fn reader_count(&self) -> i64 {
        self.inner.reader_count.load(Ordering::Relaxed)
    }

    /// Whether this context is currently registered with some lock.
    pub fn is_registered(&self) -> bool {
        self.inner.owner.load(Ordering::Relaxed) != NO_OWNER
    }

    /// Makes this the current context of the calling thread.
    ///
    /// The previous context (if any) is restored when the returned guard is
    /// dropped, so entering nests.
    pub fn enter(&self) -> EnterGuard {
        let previous = CURRENT.with(|current| current.replace(Some(self.clone())));
        EnterGuard {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Returns the context the calling thread is running in, if any.
    pub fn current() -> Option<ExecutionContext> {
        CURRENT.with(|current| current.borrow().clone())
    }

    pub(crate) fn inner(&self) -> &Arc<ContextInner> {
        &self.inner
    }
}

/// Runs `f` against the calling thread's current context without cloning it.
pub(crate) fn with_current<R>(f: impl FnOnce(Option<&ContextInner>) -> R) -> R {
    CURRENT.with(|current| f(current.borrow().as_ref().map(|ctx| &*ctx.inner)))
}

impl Default for ExecutionContext {
    fn default() -> Self {
        ExecutionContext::new()
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ExecutionContext {}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("reader_count", &self.reader_count())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.name {
            Some(name) => write!(f, "{name}#{}", self.inner.id),
            None => write!(f, "context#{}", self.inner.id),
        }
    }
}

/// Restores the previously current context when dropped.
///
/// Returned by [`ExecutionContext::enter`]. Not `Send`: it must be dropped on the
/// thread that entered.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct EnterGuard {
    previous: Option<ExecutionContext>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

impl fmt::Debug for EnterGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnterGuard")
            .field("previous", &self.previous)
            .finish()
    }
}
