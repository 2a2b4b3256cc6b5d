// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::actor::{Actor, ActorRef};
use crate::loom::sync::Arc;
use crate::loom::thread_local;
use crate::pool::WorkerHandle;
use crate::resource::Resource;
use crate::runtime::{Inner, Runtime};
use crate::stats::Stats;
use core::cell::Cell;
use core::time::Duration;

thread_local! {
    static WORKER_ID: Cell<Option<usize>> = Cell::new(None);
}

/// The dense id of the worker executing the current thread, `None` outside
/// the pool.
#[must_use]
pub fn current_worker() -> Option<usize> {
    WORKER_ID.with(Cell::get)
}

/// Per-thread execution state: the resource currently held and the locally
/// cached next-ready actor. One per worker, plus a transient one on any
/// thread that drains messages during teardown.
pub(crate) struct WorkerCtx {
    rt: Runtime,
    held: Option<Arc<Resource>>,
    next: Option<ActorRef>,
}

impl WorkerCtx {
    pub(crate) fn new(rt: Runtime) -> Self {
        Self {
            rt,
            held: None,
            next: None,
        }
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.rt
    }

    pub(crate) fn stats(&self) -> &Stats {
        &self.rt.inner.stats
    }

    pub(crate) fn held(&self) -> Option<&Arc<Resource>> {
        self.held.as_ref()
    }

    pub(crate) fn next_is_empty(&self) -> bool {
        self.next.is_none()
    }

    pub(crate) fn set_next(&mut self, actor: ActorRef) {
        self.next = Some(actor);
    }

    pub(crate) fn clear_next(&mut self) {
        self.next = None;
    }

    /// Ensures this worker holds `resource`. Moving to a different resource
    /// releases the old one first; acquisition itself never blocks.
    pub(crate) fn acquire(&mut self, resource: Arc<Resource>) -> bool {
        if let Some(held) = &self.held {
            if Arc::ptr_eq(held, &resource) {
                return true;
            }
            held.release();
            self.held = None;
        }
        self.rt.inner.stats.res_lock.incr();
        if resource.try_acquire() {
            self.held = Some(resource);
            true
        } else {
            false
        }
    }

    pub(crate) fn release_held(&mut self) {
        if let Some(held) = self.held.take() {
            held.release();
        }
    }
}

/// Three-tier ready-actor discovery: the worker-local slot, then the held
/// resource's slot, then the registry scan.
pub(crate) fn find_ready(inner: &Inner, ctx: &mut WorkerCtx) -> Option<Arc<Actor>> {
    use crate::loom::sync::atomic::Ordering;

    if let Some(cached) = ctx.next.take() {
        if cached.inner.is_ready(ctx.held.as_ref()) {
            inner.stats.cache_found.incr();
            cached.inner.in_cache.store(true, Ordering::Release);
            return Some(cached.inner);
        }
        inner.stats.cache_bad.incr();
    }

    if let Some(held) = ctx.held.clone() {
        while let Some(actor) = held.ready.take() {
            if actor.is_ready(Some(&held)) {
                inner.stats.cache_found.incr();
                actor.in_cache.store(true, Ordering::Release);
                return Some(actor);
            }
            inner.stats.cache_bad.incr();
        }
    }

    inner.stats.actor_find.incr();
    inner.registry.find_ready_scan(ctx.held.as_ref())
}

/// Runs ready actors until none remain, then drops the held resource.
pub(crate) fn work_msg(inner: &Inner, ctx: &mut WorkerCtx, first: Option<Arc<Actor>>) {
    let mut actor = first.or_else(|| find_ready(inner, ctx));
    while let Some(current) = actor {
        current.run_all(ctx);
        actor = find_ready(inner, ctx);
    }
    ctx.release_held();
}

/// Body of one pool thread.
pub(crate) fn worker_main(inner: Arc<Inner>, me: Arc<WorkerHandle>) {
    WORKER_ID.with(|id| id.set(Some(me.id())));
    tracing::debug!(worker = me.id(), "worker start");

    let mut ctx = WorkerCtx::new(Runtime::from_inner(Arc::clone(&inner)));

    // More than one actor waiting means this thread alone won't keep up.
    if inner.registry.count_ready(None) > 1 {
        me.set_free(false);
        inner.pool.wake_up(&inner);
    }

    loop {
        if let Some(actor) = find_ready(&inner, &mut ctx) {
            me.set_free(false);
            work_msg(&inner, &mut ctx, Some(actor));
            me.set_free(true);
        }

        if inner.pool.stopping() {
            break;
        }

        tracing::trace!(worker = me.id(), "worker sleep");
        if inner.pool.working_count(&inner.stats) == 0 {
            // nobody is busy; let a completion waiter re-check
            inner.pool.notify_done();
        }
        inner.pool.publish_free_hint(me.id());

        let timed_out = me.sleep(Duration::from_secs(1));
        inner.pool.clear_free_hint(me.id());

        if timed_out {
            tracing::trace!(worker = me.id(), "idle timeout");
            // only the top of the dense id range may shrink the pool
            if inner.pool.is_highest(me.id()) {
                me.set_free(false);
                break;
            }
        } else {
            inner.stats.thread_wake_up.incr();
        }
    }

    inner.pool.retire(&me);
    WORKER_ID.with(|id| id.set(None));
    tracing::debug!(worker = me.id(), "worker stop");
}
