// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::actor::{Actor, ActorRef};
use crate::loom::sync::Arc;
use crate::loom::sync::atomic::Ordering;
use crate::message::Message;
use crate::runtime::Runtime;
use crate::worker::WorkerCtx;
use core::any::Any;

/// Delivery context handed to an actor callable for exactly one message.
///
/// The scope owns the message being delivered. When the callable returns
/// with the message still in place, the runtime frees it; [`Scope::forward`]
/// and [`Scope::take`] move ownership out first. Sending the same message
/// twice is therefore unrepresentable.
pub struct Scope<'a> {
    ctx: &'a mut WorkerCtx,
    actor: &'a Actor,
    msg: Option<Box<Message>>,
    /// Set when a send could not be served by this worker in its current
    /// run; arbitrates a wake-up on that and every later send of this
    /// delivery.
    wake_hint: bool,
    end_of_life: bool,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(ctx: &'a mut WorkerCtx, actor: &'a Actor, msg: Box<Message>) -> Self {
        Self {
            ctx,
            actor,
            msg: Some(msg),
            wake_hint: false,
            end_of_life: false,
        }
    }

    pub(crate) fn new_end_of_life(
        ctx: &'a mut WorkerCtx,
        actor: &'a Actor,
        msg: Box<Message>,
    ) -> Self {
        Self {
            ctx,
            actor,
            msg: Some(msg),
            wake_hint: false,
            end_of_life: true,
        }
    }

    /// The message being delivered, `None` once forwarded or taken.
    pub fn message(&mut self) -> Option<&mut Message> {
        self.msg.as_deref_mut()
    }

    /// The runtime this delivery belongs to.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        self.ctx.runtime()
    }

    /// The environment registered with this actor, if it is a function actor
    /// created with an environment of type `T`.
    #[must_use]
    pub fn env<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.actor.env_ref()?.downcast_ref::<T>()
    }

    /// Takes ownership of the current message away from the runtime, without
    /// copying. The runtime will no longer free it; the caller must send or
    /// drop it.
    ///
    /// Taking a message that was already forwarded or taken is an error,
    /// reported through the "error" actor; `None` is returned.
    pub fn take(&mut self) -> Option<Box<Message>> {
        if self.msg.is_none() {
            let rt = self.runtime().clone();
            rt.error_args(format_args!(
                "{}: copy of a message that was already given away",
                self.actor.display_name(),
            ));
        }
        self.msg.take()
    }

    /// Transfers the current message to another actor. The runtime will not
    /// free it; it now lives in the target's queue.
    ///
    /// Forwarding twice is an error, reported through the "error" actor.
    pub fn forward(&mut self, to: &ActorRef) {
        match self.msg.take() {
            Some(msg) => self.deliver(msg, to),
            None => {
                let rt = self.runtime().clone();
                rt.error_args(format_args!(
                    "{}: forward of a message that was already given away",
                    self.actor.display_name(),
                ));
            }
        }
    }

    /// Enqueues an owned message for delivery to `to`. Never blocks.
    pub fn send(&mut self, msg: Box<Message>, to: &ActorRef) {
        self.deliver(msg, to);
    }

    fn deliver(&mut self, msg: Box<Message>, to: &ActorRef) {
        if self.end_of_life {
            let rt = self.runtime().clone();
            rt.error_args(format_args!(
                "{}: send during end-of-life delivery dropped",
                self.actor.display_name(),
            ));
            return;
        }

        let inner = Arc::clone(&self.ctx.runtime().inner);
        let depth = to.inner.queue.push(msg);
        if inner.cfg.stats_queue {
            inner.stats.queue_peak.peak(depth as u64);
        }

        self.cache_insert(&inner, to);

        if self.wake_hint || inner.pool.count() == 0 {
            inner.pool.wake_up(&inner);
        }
    }

    /// Places `to` in the most specific ready cache that applies, per the
    /// scheduler's tiers.
    fn cache_insert(&mut self, inner: &crate::runtime::Inner, to: &ActorRef) {
        let actor = &to.inner;
        if !actor.is_ready(self.ctx.held()) || actor.in_cache.load(Ordering::Acquire) {
            return;
        }
        let resource = actor.resource();

        // Draining our own last message and the target shares the held
        // resource: remember it thread-locally, this worker runs it next.
        if self.actor.queue.is_empty()
            && self.ctx.next_is_empty()
            && self.ctx.held().is_some_and(|held| Arc::ptr_eq(held, &resource))
        {
            self.ctx.set_next(to.clone());
            return;
        }

        // Otherwise the resource's one-slot cache. A full slot is fine, the
        // registry scan will still find the actor.
        if !resource.ready.offer(Arc::clone(actor)) {
            inner.stats.cache_full.incr();
        }
        if !self.wake_hint {
            self.wake_hint = resource.has_free();
        }
    }
}
