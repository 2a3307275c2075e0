// SPDX-License-Identifier: MIT OR Apache-2.0
//! Admission control for writers.
//!
//! A writer can only finish draining once in-flight readers are done. If new
//! externally-triggered graph I/O keeps arriving, the reader total may never touch
//! zero. [`GraphLock::acquire_write`](crate::GraphLock::acquire_write) therefore
//! pauses admission before it drains and resumes it once exclusivity is confirmed.
//!
//! The lock doesn't know what "graph I/O" is; the host plugs in an [`Admission`]
//! through [`Builder::admission`](crate::graph_lock::Builder::admission).

/// Stops and restarts the flow of new externally-triggered graph I/O.
///
/// `pause` and `resume` are always called in pairs, from the coordinator, once per
/// [`acquire_write`](crate::GraphLock::acquire_write).
///
/// # Examples
///
/// ```
/// use graph_access_lock::Admission;
/// use graph_access_lock::graph_lock::Builder;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Gate(AtomicBool);
///
/// impl Admission for Gate {
///     fn pause(&self) {
///         self.0.store(true, Ordering::SeqCst);
///     }
///     fn resume(&self) {
///         self.0.store(false, Ordering::SeqCst);
///     }
/// }
///
/// let gate = Arc::new(Gate::default());
/// let lock = Builder::new().admission(Arc::clone(&gate)).build();
/// lock.with_write(|| assert!(!gate.0.load(Ordering::SeqCst)));
/// ```
pub trait Admission: Send + Sync {
    /// Stop accepting new graph I/O. In-flight I/O keeps running.
    fn pause(&self);
    /// Accept new graph I/O again.
    fn resume(&self);
}

impl<A: Admission + ?Sized> Admission for std::sync::Arc<A> {
    fn pause(&self) {
        (**self).pause()
    }
    fn resume(&self) {
        (**self).resume()
    }
}

/// An [`Admission`] that never holds anything back.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAdmission;

impl Admission for NoAdmission {
    fn pause(&self) {}
    fn resume(&self) {}
}
