// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::message::{MSG_CREATED, MSG_ERASED};
use core::sync::atomic::{AtomicU64, Ordering};

/// A relaxed event counter. Cheap enough to bump unconditionally; whether
/// the numbers are reported is the runtime configuration's business.
pub(crate) struct Counter(AtomicU64);

impl Counter {
    pub(crate) const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    pub(crate) fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a high-water mark.
    #[inline]
    pub(crate) fn peak(&self, value: u64) {
        self.0.fetch_max(value, Ordering::Relaxed);
    }

    pub(crate) fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-runtime scheduler counters, reported at teardown when the `stats`
/// config flag is set.
pub(crate) struct Stats {
    /// Worker threads created.
    pub(crate) thread_create: Counter,
    /// Most workers alive at once.
    pub(crate) thread_peak: Counter,
    /// Most workers busy at once.
    pub(crate) parallel_peak: Counter,
    /// Wake-up notifications sent.
    pub(crate) try_wake_up: Counter,
    /// Sleeps ended by a notification rather than the timeout.
    pub(crate) thread_wake_up: Counter,
    /// Actor resolutions by (function, environment).
    pub(crate) actor_get: Counter,
    /// Registry scans for a ready actor.
    pub(crate) actor_find: Counter,
    /// Claims lost to the parallelism cap.
    pub(crate) cap_miss: Counter,
    /// Ready-cache hits.
    pub(crate) cache_found: Counter,
    /// Cached actors that turned out not ready.
    pub(crate) cache_bad: Counter,
    /// Cache inserts dropped because the slot was occupied.
    pub(crate) cache_full: Counter,
    /// Resource acquisition attempts.
    pub(crate) res_lock: Counter,
    /// Deepest queue observed (collected when `stats_queue` is set).
    pub(crate) queue_peak: Counter,
    /// Messages delivered to callables.
    pub(crate) msg_processed: Counter,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self {
            thread_create: Counter::new(),
            thread_peak: Counter::new(),
            parallel_peak: Counter::new(),
            try_wake_up: Counter::new(),
            thread_wake_up: Counter::new(),
            actor_get: Counter::new(),
            actor_find: Counter::new(),
            cap_miss: Counter::new(),
            cache_found: Counter::new(),
            cache_bad: Counter::new(),
            cache_full: Counter::new(),
            res_lock: Counter::new(),
            queue_peak: Counter::new(),
            msg_processed: Counter::new(),
        }
    }

    /// Dumps the table to stdout. `elapsed_ms` is the runtime's age, used
    /// for the throughput line. The message create/erase balance is
    /// process-wide, so concurrent runtimes share that one line.
    pub(crate) fn print(&self, stats_queue: bool, elapsed_ms: u64) {
        let created = MSG_CREATED.load(Ordering::Relaxed);
        let erased = MSG_ERASED.load(Ordering::Relaxed);

        println!("\n------- stats -------");
        println!("thread_create  {}", self.thread_create.get());
        println!("thread_peak    {}", self.thread_peak.get());
        println!("parallel_peak  {}", self.parallel_peak.get());
        println!("try_wake_up    {}", self.try_wake_up.get());
        println!("thread_wake_up {}", self.thread_wake_up.get());
        println!("msg_create     {created}");
        println!("actor_get      {}", self.actor_get.get());
        println!("actor_find     {}", self.actor_find.get());
        println!("cap_miss       {}", self.cap_miss.get());
        println!("cache_found    {}", self.cache_found.get());
        println!("cache_bad      {}", self.cache_bad.get());
        println!("cache_full     {}", self.cache_full.get());
        println!("resource_lock  {}", self.res_lock.get());
        if stats_queue {
            println!("queue_peak     {}", self.queue_peak.get());
        }
        let processed = self.msg_processed.get();
        println!("msg_processed  {processed}");
        println!("msg/sec        {}", processed * 1000 / elapsed_ms.max(1));
        println!();
        if created != erased {
            println!("!!! ERROR: lost {} messages\n", created.abs_diff(erased));
        }
    }
}
