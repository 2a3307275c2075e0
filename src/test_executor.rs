// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-step polling for tests that need to place a reader at an exact point of
//! the protocol, on an exact thread and context.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// Polls `future` exactly once with a waker that does nothing.
///
/// Callers re-poll after whatever event should have made progress possible, so a
/// lost wakeup shows up as a `Pending` that should have been `Ready`.
pub(crate) fn poll_once<F: Future + ?Sized>(future: Pin<&mut F>) -> Poll<F::Output> {
    let mut cx = Context::from_waker(Waker::noop());
    future.poll(&mut cx)
}
