// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use crate::loom::sync::{Arc, Condvar, Mutex};
use crate::loom::{lock, thread};
use crate::runtime::Inner;
use crate::stats::Stats;
use core::time::Duration;

/// Sentinel for "no preferred free worker".
const NO_HINT: usize = usize::MAX;

/// One pool thread's shared state. The OS thread owns the other half of it
/// on its stack.
pub(crate) struct WorkerHandle {
    id: usize,
    /// Sleeping pad. The condvar is signalled by `wake_up` and during stop.
    sleep: Mutex<()>,
    cv: Condvar,
    is_free: AtomicBool,
    is_end: AtomicBool,
}

impl WorkerHandle {
    fn new(id: usize) -> Self {
        Self {
            id,
            sleep: Mutex::new(()),
            cv: Condvar::new(),
            is_free: AtomicBool::new(true),
            is_end: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn set_free(&self, free: bool) {
        self.is_free.store(free, Ordering::Release);
    }

    fn is_free(&self) -> bool {
        self.is_free.load(Ordering::Acquire)
    }

    fn is_end(&self) -> bool {
        self.is_end.load(Ordering::Acquire)
    }

    /// Parks until notified or `timeout` elapses; returns whether the wait
    /// timed out. A notification racing ahead of the wait is lost, which the
    /// timeout papers over; the wake-up protocol only needs progress.
    pub(crate) fn sleep(&self, timeout: Duration) -> bool {
        let guard = lock(&self.sleep);
        self.is_free.store(true, Ordering::Release);
        let (_guard, result) = self
            .cv
            .wait_timeout(guard, timeout)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        result.timed_out()
    }

    fn notify(&self) {
        self.cv.notify_one();
    }
}

/// Elastic set of worker threads.
///
/// Workers are created on wake-up demand when none is free, numbered densely
/// from zero. An idle worker holding the largest id exits after its sleep
/// timeout; its slot is overwritten by the next creation.
pub(crate) struct ThreadPool {
    /// Dense worker slots; the first `count` are alive.
    workers: Mutex<Vec<Arc<WorkerHandle>>>,
    count: AtomicUsize,
    /// Racy preferred-wake-up target: the smallest-id free worker, maintained
    /// by compare-and-swap. Accuracy is best-effort.
    free_hint: AtomicUsize,
    stop: AtomicBool,
    /// Completion pad for `wait_all`: signalled whenever the pool goes idle
    /// or a worker retires.
    done: Mutex<()>,
    done_cv: Condvar,
}

impl ThreadPool {
    pub(crate) fn new() -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
            free_hint: AtomicUsize::new(NO_HINT),
            stop: AtomicBool::new(false),
            done: Mutex::new(()),
            done_cv: Condvar::new(),
        }
    }

    /// Live (not yet retired) workers.
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Workers currently executing actors.
    pub(crate) fn working_count(&self, stats: &Stats) -> usize {
        let workers = lock(&self.workers);
        let live = self.count.load(Ordering::Acquire).min(workers.len());
        let working = workers[..live]
            .iter()
            .filter(|worker| !worker.is_free())
            .count();
        stats.parallel_peak.peak(working as u64);
        working
    }

    /// Wakes the preferred free worker, or grows the pool when every worker
    /// is busy.
    pub(crate) fn wake_up(&self, inner: &Arc<Inner>) {
        if let Some(worker) = self.find_free() {
            inner.stats.try_wake_up.incr();
            worker.notify();
        } else {
            self.create_thread(inner);
        }
    }

    fn find_free(&self) -> Option<Arc<WorkerHandle>> {
        let workers = lock(&self.workers);

        let hint = self.free_hint.load(Ordering::Acquire);
        if let Some(worker) = workers.get(hint) {
            if worker.is_free() && !worker.is_end() {
                return Some(Arc::clone(worker));
            }
        }

        let live = self.count.load(Ordering::Acquire).min(workers.len());
        let found = workers[..live]
            .iter()
            .find(|worker| worker.is_free() && !worker.is_end())
            .map(Arc::clone);
        self.free_hint.store(
            found.as_ref().map_or(NO_HINT, |worker| worker.id),
            Ordering::Release,
        );
        found
    }

    /// Starts one more worker thread in the next dense slot. Retired
    /// handles left behind by pool shrinkage are overwritten in place.
    pub(crate) fn create_thread(&self, inner: &Arc<Inner>) {
        if self.stopping() {
            return;
        }
        let handle = {
            let mut workers = lock(&self.workers);
            let id = self.count.load(Ordering::Acquire);
            let handle = Arc::new(WorkerHandle::new(id));
            if workers.len() == id {
                workers.push(Arc::clone(&handle));
            } else {
                debug_assert!(id < workers.len());
                debug_assert!(workers[id].is_end());
                workers[id] = Arc::clone(&handle);
            }
            self.count.fetch_add(1, Ordering::AcqRel);
            inner.stats.thread_create.incr();
            inner
                .stats
                .thread_peak
                .peak(self.count.load(Ordering::Acquire) as u64);
            handle
        };

        let inner = Arc::clone(inner);
        let id = handle.id;
        thread::Builder::new()
            .name(format!("hive-worker-{id}"))
            .spawn(move || crate::worker::worker_main(inner, handle))
            .expect("failed to spawn worker thread");
    }

    /// Publishes `id` as wake-up target if it improves on the current hint.
    /// Smaller ids are preferred so the pool drains from the top.
    pub(crate) fn publish_free_hint(&self, id: usize) {
        let mut current = self.free_hint.load(Ordering::Acquire);
        while current == NO_HINT || current > id {
            match self.free_hint.compare_exchange_weak(
                current,
                id,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub(crate) fn clear_free_hint(&self, id: usize) {
        let _ = self
            .free_hint
            .compare_exchange(id, NO_HINT, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Whether `id` is the largest live worker id, i.e. the one allowed to
    /// exit on idle timeout.
    pub(crate) fn is_highest(&self, id: usize) -> bool {
        id + 1 == self.count.load(Ordering::Acquire)
    }

    /// Marks a worker gone. Called by the worker thread on its way out.
    pub(crate) fn retire(&self, worker: &WorkerHandle) {
        let _workers = lock(&self.workers);
        worker.is_end.store(true, Ordering::Release);
        worker.is_free.store(false, Ordering::Release);
        self.count.fetch_sub(1, Ordering::AcqRel);
        self.done_cv.notify_one();
    }

    pub(crate) fn notify_done(&self) {
        self.done_cv.notify_one();
    }

    /// Blocks until `predicate` turns false, re-checking every `poll`.
    pub(crate) fn wait_done_while(&self, poll: Duration, mut predicate: impl FnMut() -> bool) {
        while predicate() {
            let guard = lock(&self.done);
            drop(
                self.done_cv
                    .wait_timeout(guard, poll)
                    .unwrap_or_else(std::sync::PoisonError::into_inner),
            );
        }
    }

    /// Stops every worker and waits for all of them to retire, then releases
    /// the slots. The stop flag stays set until `reset`.
    pub(crate) fn stop_and_join(&self) {
        self.stop.store(true, Ordering::Release);
        loop {
            let all_end = {
                let workers = lock(&self.workers);
                let mut all_end = true;
                for worker in workers.iter() {
                    if !worker.is_end() {
                        worker.notify();
                        all_end = false;
                    }
                }
                all_end
            };
            if all_end {
                break;
            }
            let guard = lock(&self.done);
            drop(
                self.done_cv
                    .wait_timeout(guard, Duration::from_millis(100))
                    .unwrap_or_else(std::sync::PoisonError::into_inner),
            );
        }
        debug_assert_eq!(self.count.load(Ordering::Acquire), 0);
        lock(&self.workers).clear();
        self.free_hint.store(NO_HINT, Ordering::Release);
    }

    /// Re-arms the pool after teardown so the runtime can be used again.
    pub(crate) fn reset(&self) {
        self.stop.store(false, Ordering::Release);
    }
}
