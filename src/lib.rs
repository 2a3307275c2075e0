// SPDX-License-Identifier: MIT OR Apache-2.0
//! A reader/writer lock for a graph that many execution contexts walk and one
//! coordinator mutates.
//!
//! Readers count themselves on their own [`ExecutionContext`], so concurrent walks
//! don't contend. The single writer flags its intent and waits for the sum of all
//! counters to reach zero. Readers that arrive while a writer is around queue up and
//! are resumed together when it releases.
//!
//! See [`GraphLock`] for the API and [`graph_lock`] for how the protocol works.
//!
//! # Examples
//!
//! ```
//! use graph_access_lock::{ExecutionContext, GraphLock};
//!
//! let lock = GraphLock::new();
//! let ctx = ExecutionContext::named("worker");
//! lock.register_context(&ctx).unwrap();
//!
//! let entered = ctx.enter();
//! let count = lock.with_read_blocking(|| 3);
//! assert_eq!(count, 3);
//! drop(entered);
//!
//! lock.with_write(|| {
//!     lock.assert_writable();
//! });
//!
//! lock.unregister_context(&ctx).unwrap();
//! ```

pub mod admission;
mod context;
mod error;
pub mod graph_lock;
mod guard;
mod registry;
mod spinlock;

#[cfg(test)]
mod sync_tests;
#[cfg(test)]
mod test_executor;

pub use admission::{Admission, NoAdmission};
pub use context::{EnterGuard, ExecutionContext};
pub use error::{NotAvailable, RegistryError};
pub use graph_lock::{GraphLock, LockSnapshot, WriterState};
pub use guard::{ReadGuard, WriteGuard};
