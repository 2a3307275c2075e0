// SPDX-License-Identifier: MIT OR Apache-2.0
use super::GraphLock;
use crate::admission::{Admission, NoAdmission};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// How long the writer sleeps between recounts when nobody kicks it.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Graph lock factory, which can be used in order to configure the properties of
/// a new [`GraphLock`].
///
/// # Examples
///
/// ```
/// use graph_access_lock::graph_lock::Builder;
/// use std::time::Duration;
///
/// let lock = Builder::new()
///     .name("block-graph")
///     .poll_interval(Duration::from_millis(1))
///     .build();
/// assert_eq!(lock.name(), Some("block-graph"));
/// assert!(lock.is_coordinator());
/// ```
pub struct Builder {
    name: Option<String>,
    coordinator: Option<ThreadId>,
    poll_interval: Duration,
    admission: Box<dyn Admission>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            name: None,
            coordinator: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            admission: Box::new(NoAdmission),
        }
    }

    /// Names the lock in log output.
    pub fn name(mut self, name: impl Into<String>) -> Builder {
        self.name = Some(name.into());
        self
    }

    /// Designates the coordinator thread, the only thread allowed to write.
    ///
    /// Defaults to the thread calling [`build`](Self::build).
    pub fn coordinator(mut self, coordinator: ThreadId) -> Builder {
        self.coordinator = Some(coordinator);
        self
    }

    /// Upper bound on how long a draining writer sleeps before recounting readers.
    ///
    /// Releasing readers kick the writer awake before this elapses. The writer
    /// never gives up.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Builder {
        self.poll_interval = poll_interval;
        self
    }

    /// Installs the admission control paused around each write acquisition.
    pub fn admission(mut self, admission: impl Admission + 'static) -> Builder {
        self.admission = Box::new(admission);
        self
    }

    pub fn build(self) -> GraphLock {
        let coordinator = self.coordinator.unwrap_or_else(|| thread::current().id());
        GraphLock::from_builder(self.name, coordinator, self.poll_interval, self.admission)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("name", &self.name)
            .field("coordinator", &self.coordinator)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
