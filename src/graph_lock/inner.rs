// SPDX-License-Identifier: MIT OR Apache-2.0
use super::{Builder, NO_WRITER, WriterState};
use crate::admission::Admission;
use crate::context::{ExecutionContext, NO_OWNER};
use crate::error::RegistryError;
use crate::registry::Registry;
use crate::spinlock::Spinlock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;
use wasm_safe_mutex::Mutex;

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

/// A reader/writer lock for a graph walked by many execution contexts and mutated
/// by one coordinator.
///
/// The lock protects no data of its own; it hands out permission to walk or to
/// rewire. The graph lives elsewhere.
///
/// - **Readers** run on any [`ExecutionContext`] registered with the lock, using
///   [`acquire_read`](Self::acquire_read) (async, suspends the task),
///   [`acquire_read_blocking`](Self::acquire_read_blocking) (parks the thread) or
///   [`try_acquire_read`](Self::try_acquire_read), and always
///   [`release_read`](Self::release_read). A release may happen on a different
///   context than the acquisition.
/// - **The writer** is the coordinator thread, using
///   [`acquire_write`](Self::acquire_write) and [`release_write`](Self::release_write).
///   There is only ever one coordinator, so writers never contend with each other.
///
/// Scoped variants ([`read`](Self::read), [`write`](Self::write), `with_*`) release
/// automatically.
///
/// # Examples
///
/// ```
/// use graph_access_lock::{ExecutionContext, GraphLock};
///
/// let lock = GraphLock::new();
/// let ctx = ExecutionContext::new();
/// lock.register_context(&ctx).unwrap();
///
/// {
///     let _entered = ctx.enter();
///     let _read = lock.read_blocking();
///     assert_eq!(lock.reader_count(), 1);
/// }
/// assert_eq!(lock.reader_count(), 0);
///
/// lock.unregister_context(&ctx).unwrap();
/// assert!(!lock.is_registered(&ctx));
/// ```
pub struct GraphLock {
    pub(crate) id: u64,
    name: Option<String>,
    pub(crate) coordinator: ThreadId,
    pub(crate) poll_interval: Duration,
    pub(crate) admission: Box<dyn Admission>,
    pub(crate) has_writer: AtomicU8,
    pub(crate) registry: Mutex<Registry>,
    /// Set for the whole of `acquire_write`; readers kick while it is set.
    pub(crate) writer_waiting: AtomicBool,
    pub(crate) writer_thread: Spinlock<Option<thread::Thread>>,
}

/// A point-in-time view of a [`GraphLock`], for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSnapshot {
    pub writer: WriterState,
    /// Readers in flight, orphans included. Same caveat as
    /// [`GraphLock::reader_count`].
    pub readers: i64,
    pub orphaned_readers: i64,
    /// Registered execution contexts.
    pub contexts: usize,
    /// Readers suspended waiting for the writer.
    pub waiting: usize,
}

impl GraphLock {
    /// Creates a lock whose coordinator is the calling thread.
    pub fn new() -> GraphLock {
        Builder::new().build()
    }

    pub(crate) fn from_builder(
        name: Option<String>,
        coordinator: ThreadId,
        poll_interval: Duration,
        admission: Box<dyn Admission>,
    ) -> GraphLock {
        GraphLock {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            name,
            coordinator,
            poll_interval,
            admission,
            has_writer: AtomicU8::new(NO_WRITER),
            registry: Mutex::new(Registry::default()),
            writer_waiting: AtomicBool::new(false),
            writer_thread: Spinlock::new(None),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether the calling thread is this lock's coordinator.
    pub fn is_coordinator(&self) -> bool {
        thread::current().id() == self.coordinator
    }

    /// Adds `ctx` to the set of contexts that may host readers.
    ///
    /// # Panics
    ///
    /// If the context's reader counter isn't zero.
    pub fn register_context(&self, ctx: &ExecutionContext) -> Result<(), RegistryError> {
        let inner = ctx.inner();
        let mut registry = self.registry.lock_sync();
        if inner
            .owner
            .compare_exchange(NO_OWNER, self.id, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return Err(RegistryError::AlreadyRegistered { context: ctx.id() });
        }
        assert_eq!(
            inner.reader_count.load(Ordering::SeqCst),
            0,
            "registering {ctx} with readers attributed to it"
        );
        registry.contexts.push(Arc::clone(inner));
        log::debug!("{self}: registered {ctx}");
        Ok(())
    }

    /// Removes `ctx`, moving the readers attributed to it into the orphan bucket.
    ///
    /// The host calls this right before the context goes away. No task may be
    /// running in the context at that point.
    pub fn unregister_context(&self, ctx: &ExecutionContext) -> Result<(), RegistryError> {
        let inner = ctx.inner();
        let mut registry = self.registry.lock_sync();
        let position = registry
            .position(inner)
            .ok_or(RegistryError::NotRegistered { context: ctx.id() })?;
        let orphaned = inner.reader_count.swap(0, Ordering::SeqCst);
        registry.orphaned_reader_count += orphaned;
        registry.contexts.remove(position);
        inner.owner.store(NO_OWNER, Ordering::SeqCst);
        log::debug!(
            "{self}: unregistered {ctx}, orphaned {orphaned} readers ({} total)",
            registry.orphaned_reader_count
        );
        Ok(())
    }

    pub fn is_registered(&self, ctx: &ExecutionContext) -> bool {
        ctx.inner().is_owned_by(self.id)
    }

    /// The number of readers in flight: the orphan bucket plus every registered
    /// context's counter.
    ///
    /// Exact when no read is in flight. While reads migrate between contexts the
    /// counters are summed mid-flight, and the result may be off in either
    /// direction, negative included.
    pub fn reader_count(&self) -> i64 {
        self.registry.lock_sync().reader_count()
    }

    pub fn orphaned_reader_count(&self) -> i64 {
        self.registry.lock_sync().orphaned_reader_count
    }

    pub fn writer_state(&self) -> WriterState {
        WriterState::from_raw(self.has_writer.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> LockSnapshot {
        let registry = self.registry.lock_sync();
        LockSnapshot {
            writer: self.writer_state(),
            readers: registry.reader_count(),
            orphaned_readers: registry.orphaned_reader_count,
            contexts: registry.contexts.len(),
            waiting: registry.wait_queue.len(),
        }
    }

    /// Wakes the writer if it is waiting for readers to drain.
    pub(crate) fn kick(&self) {
        if let Some(writer) = self.writer_thread.with_mut(|slot| slot.clone()) {
            writer.unpark();
        }
    }
}

impl Default for GraphLock {
    fn default() -> Self {
        GraphLock::new()
    }
}

impl Drop for GraphLock {
    fn drop(&mut self) {
        let registry = self.registry.lock_sync();
        for ctx in &registry.contexts {
            ctx.owner.store(NO_OWNER, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for GraphLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphLock")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("writer", &self.writer_state())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for GraphLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "graph lock {name}"),
            None => write!(f, "graph lock #{}", self.id),
        }
    }
}
