// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-thread scenarios for the graph lock.

use crate::graph_lock::Builder;
use crate::test_executor::poll_once;
use crate::{Admission, ExecutionContext, GraphLock};
use proptest::prelude::*;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::mpsc;
use std::task::Poll;
use std::thread;
use std::time::Duration;

const READERS: usize = 8;
const READ_CYCLES: usize = 10_000;
const WRITES: u64 = 100;
const EDGES: usize = 16;

/// A stand-in graph: every edge carries the generation of the last rewiring.
/// A walk that sees two generations saw a rewiring half done.
struct Graph {
    edges: Vec<AtomicU64>,
    /// Readers currently between acquire and release.
    walkers: AtomicI64,
}

impl Graph {
    fn new() -> Graph {
        Graph {
            edges: (0..EDGES).map(|_| AtomicU64::new(0)).collect(),
            walkers: AtomicI64::new(0),
        }
    }

    /// Returns `true` if the walk was torn.
    fn walk(&self) -> bool {
        self.walkers.fetch_add(1, Ordering::SeqCst);
        let first = self.edges[0].load(Ordering::Relaxed);
        let torn = self.edges.iter().any(|e| e.load(Ordering::Relaxed) != first);
        self.walkers.fetch_sub(1, Ordering::SeqCst);
        torn
    }

    fn rewire(&self, generation: u64) {
        for edge in &self.edges {
            edge.store(generation, Ordering::Relaxed);
            thread::yield_now();
        }
    }
}

/// Holds back new walks while a writer drains.
#[derive(Default)]
struct WalkGate {
    paused: AtomicBool,
}

impl WalkGate {
    fn wait_open(&self) {
        while self.paused.load(Ordering::SeqCst) {
            thread::yield_now();
        }
    }
}

impl Admission for WalkGate {
    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }
    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
}

/// Runs the coordinator side of the stress scenario and returns the number of
/// torn walks seen by readers.
///
/// With `migrate`, reader `i` acquires on its own context and releases on reader
/// `i + 1`'s, the way a task resumed elsewhere would. `idle_contexts` more contexts
/// are registered and never used, which widens the writer's scan.
fn run_stress(migrate: bool, idle_contexts: usize) -> usize {
    let gate = Arc::new(WalkGate::default());
    let lock = Arc::new(Builder::new().admission(Arc::clone(&gate)).build());
    let graph = Arc::new(Graph::new());

    let contexts: Vec<_> = (0..READERS)
        .map(|i| ExecutionContext::named(format!("reader-{i}")))
        .collect();
    let idle: Vec<_> = (0..idle_contexts).map(|_| ExecutionContext::new()).collect();
    for ctx in contexts.iter().chain(&idle) {
        lock.register_context(ctx).unwrap();
    }

    let readers: Vec<_> = (0..READERS)
        .map(|i| {
            let home = contexts[i].clone();
            let away = if migrate {
                contexts[(i + 1) % READERS].clone()
            } else {
                home.clone()
            };
            let lock = Arc::clone(&lock);
            let graph = Arc::clone(&graph);
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let mut torn = 0;
                for cycle in 0..READ_CYCLES {
                    gate.wait_open();
                    let entered = home.enter();
                    if cycle % 2 == 0 {
                        lock.acquire_read_blocking();
                    } else {
                        test_executors::spin_on(lock.acquire_read());
                    }
                    let mut walk_torn = graph.walk();
                    drop(entered);

                    let _entered = away.enter();
                    walk_torn |= graph.walk();
                    lock.release_read();
                    if walk_torn {
                        torn += 1;
                    }
                }
                torn
            })
        })
        .collect();

    for generation in 1..=WRITES {
        lock.acquire_write();
        lock.assert_writable();
        assert_eq!(graph.walkers.load(Ordering::SeqCst), 0);
        graph.rewire(generation);
        assert_eq!(graph.walkers.load(Ordering::SeqCst), 0);
        lock.release_write();
        //scans racing migrating readers
        for _ in 0..10 {
            lock.snapshot();
        }
        thread::sleep(Duration::from_micros(200));
    }

    let torn = readers.into_iter().map(|r| r.join().unwrap()).sum();
    let snapshot = lock.snapshot();
    assert_eq!(snapshot.readers, 0);
    assert_eq!(snapshot.orphaned_readers, 0);
    assert_eq!(snapshot.waiting, 0);
    torn
}

fn stress_with_timeout(migrate: bool, idle_contexts: usize) -> usize {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        tx.send(run_stress(migrate, idle_contexts)).unwrap();
    });
    match rx.recv_timeout(Duration::from_secs(120)) {
        Ok(torn) => torn,
        Err(mpsc::RecvTimeoutError::Timeout) => panic!("graph lock deadlocked"),
        Err(mpsc::RecvTimeoutError::Disconnected) => panic!("stress coordinator panicked"),
    }
}

#[test]
fn test_stress_readers_and_writer() {
    assert_eq!(stress_with_timeout(false, 0), 0);
}

#[test]
fn test_stress_migrating_readers_and_writer() {
    assert_eq!(stress_with_timeout(true, 256), 0);
}

#[test]
fn test_queued_reader_thread_resumes() {
    let lock = Arc::new(GraphLock::new());
    let ctx = ExecutionContext::new();
    lock.register_context(&ctx).unwrap();
    lock.acquire_write();

    let (tx, rx) = mpsc::channel();
    let lock_clone = Arc::clone(&lock);
    thread::spawn(move || {
        let _entered = ctx.enter();
        lock_clone.acquire_read_blocking();
        tx.send(()).unwrap();
        lock_clone.release_read();
    });

    //enqueue happens before the flag is cleared
    while lock.snapshot().waiting == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    lock.release_write();
    rx.recv_timeout(Duration::from_secs(10))
        .expect("queued reader was never resumed");
}

#[test]
fn test_release_races_reader_recheck() {
    for _ in 0..50 {
        let lock = Arc::new(GraphLock::new());
        let ctx = ExecutionContext::new();
        lock.register_context(&ctx).unwrap();
        lock.acquire_write();

        //hold the registry mutex so the reader stalls between its fast-path load
        //and its recheck, then let it race release_write for the mutex
        let registry = lock.registry.lock_sync();

        let (tx, rx) = mpsc::channel();
        let reader_lock = Arc::clone(&lock);
        thread::spawn(move || {
            let _entered = ctx.enter();
            reader_lock.acquire_read_blocking();
            reader_lock.release_read();
            tx.send(()).unwrap();
        });
        thread::sleep(Duration::from_millis(2));

        let releaser_lock = Arc::clone(&lock);
        let releaser = thread::spawn(move || releaser_lock.release_write());
        thread::sleep(Duration::from_millis(2));
        drop(registry);

        releaser.join().unwrap();
        rx.recv_timeout(Duration::from_secs(10))
            .expect("reader lost its wakeup");
        assert_eq!(lock.reader_count(), 0);
    }
}

#[test]
fn test_migrating_task_across_threads() {
    let lock = Arc::new(GraphLock::new());
    let home = ExecutionContext::named("home");
    let away = ExecutionContext::named("away");
    lock.register_context(&home).unwrap();
    lock.register_context(&away).unwrap();

    let reader_lock = Arc::clone(&lock);
    let away = thread::spawn(move || {
        let _entered = away.enter();
        test_executors::spin_on(reader_lock.acquire_read());
        away
    })
    .join()
    .unwrap();

    //release on the coordinator thread, in another context
    {
        let _entered = home.enter();
        lock.release_read();
    }
    assert_eq!(away.reader_count(), 1);
    assert_eq!(home.reader_count(), -1);
    assert_eq!(lock.reader_count(), 0);

    lock.with_write(|| lock.assert_writable());
}

/// One read that may suspend on one context, resume on another and release on a
/// third, with contexts possibly torn down along the way.
#[derive(Debug, Clone)]
struct Trial {
    acquire_on: usize,
    resume_on: usize,
    release_on: usize,
    writer_active: bool,
    replace_acquiring_context: bool,
}

fn trial() -> impl Strategy<Value = Trial> {
    (0..3usize, 0..3usize, 0..3usize, any::<bool>(), any::<bool>()).prop_map(
        |(acquire_on, resume_on, release_on, writer_active, replace_acquiring_context)| Trial {
            acquire_on,
            resume_on,
            release_on,
            writer_active,
            replace_acquiring_context,
        },
    )
}

fn run_trial(lock: &GraphLock, contexts: &mut [ExecutionContext], trial: &Trial) {
    if trial.writer_active {
        lock.acquire_write();
    }
    let mut read = pin!(lock.acquire_read());
    let first = {
        let _entered = contexts[trial.acquire_on].enter();
        poll_once(read.as_mut())
    };
    assert_eq!(first.is_pending(), trial.writer_active);

    if trial.replace_acquiring_context {
        let old = &contexts[trial.acquire_on];
        lock.unregister_context(old).unwrap();
        let fresh = ExecutionContext::new();
        lock.register_context(&fresh).unwrap();
        contexts[trial.acquire_on] = fresh;
    }

    if trial.writer_active {
        lock.release_write();
        let _entered = contexts[trial.resume_on].enter();
        assert_eq!(poll_once(read.as_mut()), Poll::Ready(()));
    }
    assert_eq!(lock.reader_count(), 1);

    let _entered = contexts[trial.release_on].enter();
    lock.release_read();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn migration_keeps_reader_total(trials in prop::collection::vec(trial(), 1..64)) {
        let lock = GraphLock::new();
        let mut contexts: Vec<_> = (0..3)
            .map(|i| ExecutionContext::named(format!("ctx-{i}")))
            .collect();
        for ctx in &contexts {
            lock.register_context(ctx).unwrap();
        }

        for trial in &trials {
            run_trial(&lock, &mut contexts, trial);
            let snapshot = lock.snapshot();
            prop_assert_eq!(snapshot.readers, 0);
            prop_assert_eq!(snapshot.waiting, 0);
            prop_assert_eq!(snapshot.contexts, 3);
        }

        //a writer still gets through after all that drift
        lock.with_write(|| lock.assert_writable());
    }
}
