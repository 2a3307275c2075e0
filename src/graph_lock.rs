// SPDX-License-Identifier: MIT OR Apache-2.0
//! The graph access lock.
//!
//! # The Core Problem
//!
//! A graph of nodes and edges is walked constantly by tasks spread over many
//! execution contexts, and occasionally rewired by a single coordinator. Walks must
//! never observe a half-applied rewiring. A general-purpose reader/writer lock would
//! make every walk touch one shared counter, which is exactly the cache line all
//! contexts would fight over.
//!
//! # The Solution
//!
//! Each [`ExecutionContext`](crate::ExecutionContext) keeps its own reader counter.
//! Readers bump the counter of the context they run in, issue a full fence and
//! check a single writer flag. If no writer is around, that's the whole cost.
//!
//! The writer flags its intent, fences, and sums all counters (plus the orphan
//! bucket of destroyed contexts) under the registry mutex. It only proceeds once it
//! has seen that sum at zero *after* flagging. The reader's increment-fence-check and
//! the writer's flag-fence-sum form a Dekker pair: at least one side always sees the
//! other.
//!
//! Readers that find the flag set take the registry mutex, check again, hand their
//! count back, kick the writer and queue themselves. The writer wakes the whole
//! queue on release.
//!
//! # Examples
//!
//! ```
//! # test_executors::spin_on(async {
//! use graph_access_lock::{ExecutionContext, GraphLock};
//!
//! let lock = GraphLock::new();
//! let ctx = ExecutionContext::named("worker");
//! lock.register_context(&ctx).unwrap();
//! let _entered = ctx.enter();
//!
//! // a walk
//! lock.acquire_read().await;
//! lock.assert_readable();
//! lock.release_read();
//!
//! // a rewiring, from the coordinator
//! lock.acquire_write();
//! lock.assert_writable();
//! lock.release_write();
//! # });
//! ```
//!
//! ## Readers on many threads
//!
//! ```
//! use graph_access_lock::{ExecutionContext, GraphLock};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let lock = Arc::new(GraphLock::new());
//! let handles: Vec<_> = (0..4)
//!     .map(|i| {
//!         let lock = Arc::clone(&lock);
//!         let ctx = ExecutionContext::named(format!("worker-{i}"));
//!         lock.register_context(&ctx).unwrap();
//!         thread::spawn(move || {
//!             let _entered = ctx.enter();
//!             for _ in 0..100 {
//!                 lock.with_read_blocking(|| ());
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for _ in 0..10 {
//!     lock.with_write(|| ());
//! }
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! assert_eq!(lock.reader_count(), 0);
//! ```

mod builder;
mod debug;
mod inner;
mod read;
mod write;


pub use builder::{Builder, DEFAULT_POLL_INTERVAL};
pub use inner::{GraphLock, LockSnapshot};

pub(crate) const NO_WRITER: u8 = 0;
/// Intent is flagged but the writer hasn't yet confirmed the reader total is zero.
pub(crate) const DRAINING: u8 = 1;
pub(crate) const WRITING: u8 = 2;

/// What the writer side of a [`GraphLock`] is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriterState {
    /// No writer; readers take the fast path.
    Idle,
    /// A writer has flagged its intent and is confirming no reader slipped in.
    /// New readers queue up.
    Draining,
    /// A writer holds the lock exclusively.
    Writing,
}

impl WriterState {
    pub(crate) fn from_raw(raw: u8) -> WriterState {
        match raw {
            NO_WRITER => WriterState::Idle,
            DRAINING => WriterState::Draining,
            _ => WriterState::Writing,
        }
    }
}
