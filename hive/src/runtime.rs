// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::actor::{Actor, ActorFn, ActorRef, Env, Receive};
use crate::loom::lock;
use crate::loom::sync::Arc;
use crate::loom::sync::atomic::Ordering;
use crate::message::Message;
use crate::pool::ThreadPool;
use crate::registry::{NameError, Registry};
use crate::resource::{Resource, ResourceError, ResourceRegistry};
use crate::stats::Stats;
use crate::worker::{WorkerCtx, work_msg};
use core::sync::atomic::AtomicUsize;
use core::time::Duration;
use static_assertions::assert_impl_all;
use std::time::Instant;

/// Runtime configuration. All knobs are plain values on the context; none
/// require a rebuild.
#[derive(Clone, Debug)]
pub struct Config {
    /// Initial capacity of the default resource, which bounds how many
    /// actors without an explicit resource binding run at once. At least 1.
    pub default_capacity: usize,
    /// Write log and error lines to stdout synchronously instead of through
    /// the "log" queue, so nothing is lost on abnormal termination.
    pub debug_log_immediate: bool,
    /// Print scheduler counters when `wait_all` completes.
    pub stats: bool,
    /// Include the per-queue high-water mark in the counters.
    pub stats_queue: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_capacity: 32,
            debug_log_immediate: false,
            stats: false,
            stats_queue: false,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) cfg: Config,
    pub(crate) registry: Registry,
    pub(crate) resources: ResourceRegistry,
    pub(crate) default_resource: Arc<Resource>,
    pub(crate) pool: ThreadPool,
    pub(crate) stats: Stats,
    pub(crate) started: Instant,
}

/// The actor runtime.
///
/// Cloning is cheap and every clone drives the same runtime; worker threads
/// hold one internally. Dropping the last handle while work is queued simply
/// abandons the queued work, so call [`Runtime::wait_all`] first.
///
/// ```
/// use hive::{Message, Runtime, Scope};
///
/// fn double(scope: &mut Scope<'_>) {
///     if let Some(msg) = scope.message() {
///         if let Some(value) = msg.downcast_mut::<u32>() {
///             *value *= 2;
///         }
///     }
/// }
///
/// let rt = Runtime::new();
/// let actor = rt.actor(double);
/// rt.send(Message::new(100_500u32), &actor);
/// rt.wait_all();
/// ```
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<Inner>,
}

assert_impl_all!(Runtime: Send, Sync);

impl Runtime {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    #[must_use]
    pub fn with_config(cfg: Config) -> Self {
        let default_resource = Arc::new(Resource::new("default", cfg.default_capacity));
        Self {
            inner: Arc::new(Inner {
                cfg,
                registry: Registry::new(),
                resources: ResourceRegistry::new(),
                default_resource,
                pool: ThreadPool::new(),
                stats: Stats::new(),
                started: Instant::now(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    /// Resolves the actor for `func`, creating it on first sight.
    ///
    /// The lookup costs an index probe; hold on to the returned handle when
    /// sending repeatedly.
    pub fn actor(&self, func: ActorFn) -> ActorRef {
        self.inner.registry.get_or_create_fn(
            func,
            None,
            &self.inner.default_resource,
            &self.inner.stats,
        )
    }

    /// Resolves the actor for the (`func`, `env`) pair. Each distinct pair
    /// is its own actor with its own queue.
    pub fn actor_with_env(&self, func: ActorFn, env: Env) -> ActorRef {
        self.inner.registry.get_or_create_fn(
            func,
            Some(env),
            &self.inner.default_resource,
            &self.inner.stats,
        )
    }

    /// Finds an actor by its bound name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ActorRef> {
        self.inner.registry.find_name(name)
    }

    /// Registers a stateful actor object under a generated unique name.
    pub fn spawn_object<T: Receive + 'static>(&self, object: T) -> ActorRef {
        static OBJECT_SEQ: AtomicUsize = AtomicUsize::new(0);
        let actor = self.register_object(object);
        let seq = OBJECT_SEQ.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
        let name = format!("{}#{seq}", core::any::type_name::<T>());
        let _ = self.inner.registry.set_name(&actor, &name);
        actor
    }

    /// Registers a stateful actor object under `name`.
    ///
    /// The reserved sink names are rejected with an error report (sinks must
    /// outlive every other actor); the object is still registered, unnamed.
    pub fn spawn_object_named<T: Receive + 'static>(&self, object: T, name: &str) -> ActorRef {
        let actor = self.register_object(object);
        if name == "log" || name == "error" {
            self.error_args(format_args!(
                "actor '{name}' cannot be registered through spawn_object_named",
            ));
        } else {
            self.set_name(&actor, name);
        }
        actor
    }

    fn register_object(&self, object: impl Receive + 'static) -> ActorRef {
        let actor = Arc::new(Actor::from_object(
            Box::new(object),
            &self.inner.default_resource,
        ));
        self.inner.registry.insert_object(actor)
    }

    /// Binds `name` to the actor. A taken name or an already-named actor is
    /// an error report; the first binding prevails.
    pub fn set_name(&self, actor: &ActorRef, name: &str) {
        match self.inner.registry.set_name(actor, name) {
            Ok(()) => {}
            Err(NameError::Taken) => {
                self.error_args(format_args!("actor '{name}' already exists"));
            }
            Err(NameError::AlreadyNamed(current)) => {
                self.error_args(format_args!(
                    "cannot rename actor '{current}' to '{name}'",
                ));
            }
        }
    }

    /// Sets how many invocations of the actor may run concurrently. Clamped
    /// to at least 1. Safe to call while messages are in flight.
    pub fn parallel_set(&self, count: usize, actor: &ActorRef) {
        actor.inner.parallel_set(count);
    }

    /// Creates the named resource with the given capacity, or verifies an
    /// existing one. A capacity disagreement is an error report; the
    /// existing resource prevails.
    pub fn resource(&self, name: &str, capacity: usize) {
        if let Err((_, ResourceError::CapacityMismatch { existing })) =
            self.inner.resources.create(name, capacity)
        {
            self.error_args(format_args!(
                "resource '{name}' already exists with capacity {existing}",
            ));
        }
    }

    /// Binds the actor to the named resource. Binding twice or to an
    /// unknown resource is an error report; the first binding prevails.
    pub fn bind_resource(&self, name: &str, actor: &ActorRef) {
        let Some(resource) = self.inner.resources.find(name) else {
            self.error_args(format_args!("resource '{name}' does not exist"));
            return;
        };
        if let Err(current) = actor
            .inner
            .bind_resource(resource, &self.inner.default_resource)
        {
            self.error_args(format_args!(
                "{} already uses resource '{}'",
                actor.inner.display_name(),
                current.name(),
            ));
        }
    }

    /// Adjusts the default resource's capacity, i.e. the effective number of
    /// threads available to unbound actors.
    pub fn thread_max(&self, max: usize) {
        self.inner.default_resource.set_max(max);
    }

    /// Registers a message to be delivered to the actor during teardown,
    /// after all its ordinary messages. Replaces any earlier registration.
    pub fn set_end_of_life(&self, msg: Box<Message>, actor: &ActorRef) {
        *lock(&actor.inner.end_of_life) = Some(msg);
    }

    /// Enqueues `msg` for delivery to `to` and arbitrates a worker wake-up.
    /// Never blocks.
    pub fn send(&self, msg: Box<Message>, to: &ActorRef) {
        self.inner.send_external(msg, to);
    }

    /// Completes all queued work, delivers end-of-life messages, then tears
    /// the pool and registries down.
    ///
    /// Returns once the worker count is zero and every registry is empty.
    /// The runtime is reusable afterwards; new sends start a fresh pool.
    pub fn wait_all(&self) {
        let inner = &self.inner;

        // a lone just-spawned worker may not have picked anything up yet
        if inner.pool.count() == 1 && inner.pool.working_count(&inner.stats) == 0 {
            std::thread::sleep(Duration::from_millis(100));
        }

        tracing::debug!("waiting for workers to drain");
        inner.pool.wait_done_while(Duration::from_millis(300), || {
            inner.pool.working_count(&inner.stats) > 0
        });

        tracing::debug!("stopping workers");
        inner.pool.stop_and_join();

        // whatever the workers left behind is drained right here
        let mut ctx = WorkerCtx::new(self.clone());
        work_msg(inner, &mut ctx, None);

        // end-of-life notifications, strictly after ordinary traffic
        for actor in inner.registry.actors() {
            let msg = lock(&actor.inner.end_of_life).take();
            if let Some(msg) = msg {
                tracing::trace!(
                    actor = %actor.inner.display_name(),
                    "delivering end-of-life message"
                );
                actor.inner.run_end_of_life(&mut ctx, msg);
            }
        }

        // error/log traffic produced during teardown still gets flushed
        work_msg(inner, &mut ctx, None);

        inner.registry.clear();
        inner.resources.clear();
        drop(inner.default_resource.ready.take());

        if inner.cfg.stats {
            let elapsed = u64::try_from(inner.started.elapsed().as_millis()).unwrap_or(u64::MAX);
            inner.stats.print(inner.cfg.stats_queue, elapsed);
        }

        inner.pool.reset();
        tracing::debug!("teardown complete");
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// The send path for callers outside a delivery: push, cache the target
    /// if it became ready, wake a worker if that could help.
    pub(crate) fn send_external(self: &Arc<Self>, msg: Box<Message>, to: &ActorRef) {
        let depth = to.inner.queue.push(msg);
        if self.cfg.stats_queue {
            self.stats.queue_peak.peak(depth as u64);
        }

        let actor = &to.inner;
        let mut wake = false;
        if actor.is_ready(None) && !actor.in_cache.load(Ordering::Acquire) {
            let resource = actor.resource();
            if !resource.ready.offer(Arc::clone(actor)) {
                self.stats.cache_full.incr();
            }
            wake = resource.has_free();
        }

        if wake || self.pool.count() == 0 {
            self.pool.wake_up(self);
        }
    }
}
