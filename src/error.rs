// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types.
//!
//! The lock itself has no recoverable failures: misuse is caught by assertions.
//! What remains are registry bookkeeping errors and the refusal of the `try_`
//! operations.

/// Error returned when a read cannot be taken without waiting.
///
/// Returned by [`GraphLock::try_acquire_read`](crate::GraphLock::try_acquire_read) and
/// [`GraphLock::try_read`](crate::GraphLock::try_read) while a writer is draining or
/// active.
///
/// # Examples
///
/// ```
/// use graph_access_lock::{ExecutionContext, GraphLock, NotAvailable};
///
/// let lock = GraphLock::new();
/// let ctx = ExecutionContext::new();
/// lock.register_context(&ctx).unwrap();
/// let _entered = ctx.enter();
///
/// lock.acquire_write();
/// assert_eq!(lock.try_acquire_read(), Err(NotAvailable));
/// lock.release_write();
/// assert_eq!(lock.try_acquire_read(), Ok(()));
/// lock.release_read();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotAvailable;

impl std::fmt::Display for NotAvailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "graph is being written")
    }
}

impl std::error::Error for NotAvailable {}

/// Errors from registering and unregistering execution contexts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The context is already registered, with this lock or another one.
    #[error("execution context {context} is already registered")]
    AlreadyRegistered { context: u64 },
    /// The context is not registered with this lock.
    #[error("execution context {context} is not registered with this graph lock")]
    NotRegistered { context: u64 },
}
