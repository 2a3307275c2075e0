// SPDX-License-Identifier: MIT OR Apache-2.0
use super::WRITING;
use super::inner::GraphLock;
use std::sync::atomic::Ordering;
use std::thread;

const READABLE_SCANS: usize = 4;

impl GraphLock {
    /// Asserts the caller may read the graph.
    ///
    /// Passes on the coordinator, or while any read is outstanding. The check is on
    /// the total because a task's reads can't be told apart from its neighbours'
    /// once they migrate. A single scan of the counters can read low while other
    /// reads migrate, so the total is rescanned a few times before failing.
    /// Compiles to nothing without `debug_assertions`.
    pub fn assert_readable(&self) {
        if cfg!(debug_assertions) && !self.is_coordinator() {
            assert_ne!(
                self.has_writer.load(Ordering::Acquire),
                WRITING,
                "{self}: graph read while the writer holds the graph lock"
            );
            let held = (0..READABLE_SCANS).any(|_| {
                let held = self.reader_count() > 0;
                if !held {
                    thread::yield_now();
                }
                held
            });
            assert!(held, "{self}: graph read without holding the graph lock");
        }
    }

    /// Asserts the caller may mutate the graph: it is the coordinator and holds the
    /// write lock. Compiles to nothing without `debug_assertions`.
    pub fn assert_writable(&self) {
        if cfg!(debug_assertions) {
            assert!(
                self.is_coordinator(),
                "{self}: graph write off the coordinator thread"
            );
            assert_eq!(
                self.has_writer.load(Ordering::Acquire),
                WRITING,
                "{self}: graph write without holding the graph lock"
            );
        }
    }
}
