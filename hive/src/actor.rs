// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::loom::lock;
use crate::loom::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use crate::loom::sync::{Arc, Mutex};
use crate::message::{Message, TypeTag};
use crate::queue::MessageQueue;
use crate::resource::Resource;
use crate::scope::Scope;
use crate::worker::WorkerCtx;
use core::any::Any;
use core::fmt;
use std::panic::{self, AssertUnwindSafe};

/// A plain actor callable. The environment registered alongside it is
/// reachable through [`Scope::env`].
pub type ActorFn = fn(&mut Scope<'_>);

/// Opaque environment attached to a function actor. Each distinct
/// (function, environment) pair is its own actor.
pub type Env = Arc<dyn Any + Send + Sync>;

/// A stateful actor object.
///
/// The runtime guarantees at most one concurrent invocation per actor unless
/// the cap is raised with `parallel_set`, so `receive` takes `&mut self`
/// without further synchronisation on the implementor's part.
pub trait Receive: Send {
    /// Message types this actor accepts. An empty list accepts everything.
    /// Messages with an unlisted tag are rejected with an error report and
    /// never reach [`Receive::receive`].
    fn allowed_types(&self) -> Vec<TypeTag> {
        Vec::new()
    }

    /// Handles one message.
    fn receive(&mut self, scope: &mut Scope<'_>);
}

pub(crate) enum Callable {
    Func { func: ActorFn, env: Option<Env> },
    Object(Mutex<Box<dyn Receive>>),
}

/// An actor: a callable, its FIFO queue, a resource binding and a
/// parallelism cap.
#[repr(align(64))]
pub(crate) struct Actor {
    pub(crate) queue: MessageQueue,
    /// Swapped at most once, from the default resource to a named one.
    resource: Mutex<Arc<Resource>>,
    callable: Callable,
    /// Accepted tags for object actors; empty accepts all.
    whitelist: Vec<TypeTag>,
    /// Remaining invocation slots. Dips below zero transiently while a
    /// failed claim is rolled back.
    free: AtomicIsize,
    cap: AtomicUsize,
    /// Set while a worker has claimed this actor through the ready caches or
    /// the registry scan, so overlapping cache writes cannot double-enqueue.
    pub(crate) in_cache: AtomicBool,
    pub(crate) name: Mutex<Option<String>>,
    pub(crate) end_of_life: Mutex<Option<Box<Message>>>,
}

impl Actor {
    pub(crate) fn from_fn(func: ActorFn, env: Option<Env>, default: &Arc<Resource>) -> Self {
        Self::build(Callable::Func { func, env }, Vec::new(), default)
    }

    pub(crate) fn from_object(object: Box<dyn Receive>, default: &Arc<Resource>) -> Self {
        let whitelist = object.allowed_types();
        Self::build(Callable::Object(Mutex::new(object)), whitelist, default)
    }

    fn build(callable: Callable, whitelist: Vec<TypeTag>, default: &Arc<Resource>) -> Self {
        Self {
            queue: MessageQueue::new(),
            resource: Mutex::new(Arc::clone(default)),
            callable,
            whitelist,
            free: AtomicIsize::new(1),
            cap: AtomicUsize::new(1),
            in_cache: AtomicBool::new(false),
            name: Mutex::new(None),
            end_of_life: Mutex::new(None),
        }
    }

    /// Ready iff the queue is non-empty, an invocation slot is free and the
    /// bound resource is either already held by the asking worker or has
    /// spare capacity. Advisory; `run_all` re-checks authoritatively.
    pub(crate) fn is_ready(&self, held: Option<&Arc<Resource>>) -> bool {
        if self.queue.is_empty() || self.free.load(Ordering::Acquire) <= 0 {
            return false;
        }
        let resource = lock(&self.resource);
        match held {
            Some(held) if Arc::ptr_eq(held, &resource) => true,
            _ => resource.has_free(),
        }
    }

    pub(crate) fn resource(&self) -> Arc<Resource> {
        Arc::clone(&lock(&self.resource))
    }

    /// Binds to `resource`. Fails with the current binding if the actor
    /// already left the default resource.
    pub(crate) fn bind_resource(
        &self,
        resource: Arc<Resource>,
        default: &Arc<Resource>,
    ) -> Result<(), Arc<Resource>> {
        let mut current = lock(&self.resource);
        if !Arc::ptr_eq(&current, default) {
            return Err(Arc::clone(&current));
        }
        *current = resource;
        Ok(())
    }

    /// Sets the parallelism cap, clamped to at least one. The free-slot
    /// counter is adjusted by the difference, tolerating concurrent sends
    /// and running invocations.
    pub(crate) fn parallel_set(&self, count: usize) {
        let count = count.max(1);
        let old = self.cap.swap(count, Ordering::AcqRel);
        if count != old {
            let delta = isize::try_from(count).unwrap_or(isize::MAX)
                - isize::try_from(old).unwrap_or(isize::MAX);
            self.free.fetch_add(delta, Ordering::AcqRel);
        }
    }

    /// Currently unclaimed invocation slots.
    pub(crate) fn free_slots(&self) -> usize {
        usize::try_from(self.free.load(Ordering::Acquire)).unwrap_or(0)
    }

    pub(crate) fn display_name(&self) -> String {
        lock(&self.name)
            .clone()
            .unwrap_or_else(|| format!("actor@{:p}", core::ptr::from_ref(self)))
    }

    /// Drains this actor's queue on the calling worker.
    ///
    /// Claims an invocation slot and the bound resource first; on either
    /// miss the claim is rolled back and the caller moves on.
    pub(crate) fn run_all(&self, ctx: &mut WorkerCtx) {
        let free_now = self.free.fetch_sub(1, Ordering::AcqRel) - 1;
        if free_now < 0 {
            ctx.stats().cap_miss.incr();
        } else if ctx.acquire(self.resource()) {
            ctx.clear_next();
            loop {
                let Some(msg) = self.queue.pop() else { break };
                {
                    let mut scope = Scope::new(&mut *ctx, self, msg);
                    self.invoke(&mut scope);
                }
                // the scope dropped here, auto-freeing the message unless it
                // was forwarded or taken
                ctx.stats().msg_processed.incr();
            }
        }
        self.in_cache.store(false, Ordering::Release);
        self.free.fetch_add(1, Ordering::AcqRel);
    }

    /// Delivers one message outside the normal scheduling path, in
    /// end-of-life mode: sends from the callable are dropped with an error
    /// report.
    pub(crate) fn run_end_of_life(&self, ctx: &mut WorkerCtx, msg: Box<Message>) {
        let mut scope = Scope::new_end_of_life(ctx, self, msg);
        self.invoke(&mut scope);
    }

    fn invoke(&self, scope: &mut Scope<'_>) {
        match &self.callable {
            Callable::Func { func, .. } => self.call_guarded(scope, |scope| func(scope)),
            Callable::Object(object) => {
                if !self.whitelist.is_empty() {
                    let tag = scope.message().map(|msg| (msg.tag(), msg.type_name()));
                    if let Some((tag, type_name)) = tag {
                        if !self.whitelist.contains(&tag) {
                            let rt = scope.runtime().clone();
                            rt.error_args(format_args!(
                                "{} received unhandled message type {type_name}",
                                self.display_name(),
                            ));
                            return;
                        }
                    }
                }
                let mut object = lock(object);
                self.call_guarded(scope, |scope| object.receive(scope));
            }
        }
    }

    /// A panicking callable must not take the worker down; the panic is
    /// caught and reported, and the message is freed as usual.
    fn call_guarded(&self, scope: &mut Scope<'_>, f: impl FnOnce(&mut Scope<'_>)) {
        if panic::catch_unwind(AssertUnwindSafe(|| f(&mut *scope))).is_err() {
            let rt = scope.runtime().clone();
            rt.error_args(format_args!(
                "{} panicked while handling a message",
                self.display_name(),
            ));
        }
    }

    pub(crate) fn env_ref(&self) -> Option<&Env> {
        match &self.callable {
            Callable::Func { env, .. } => env.as_ref(),
            Callable::Object(_) => None,
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("name", &*lock(&self.name))
            .field("cap", &self.cap.load(Ordering::Relaxed))
            .field("free", &self.free.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A cheap, cloneable handle to an actor.
///
/// Handles stay valid for the life of the runtime; resolving one through
/// [`Runtime::actor`](crate::Runtime::actor) or by name each time a message
/// is sent works but costs an index lookup.
#[derive(Clone)]
pub struct ActorRef {
    pub(crate) inner: Arc<Actor>,
}

impl ActorRef {
    /// The bound name, if any.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        lock(&self.inner.name).clone()
    }

    /// Whether two handles refer to the same actor.
    #[must_use]
    pub fn same(&self, other: &ActorRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
