// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Restoring the order of a message stream scattered by a parallel stage.

use crate::actor::{ActorRef, Receive};
use crate::message::{Message, TypeTag};
use crate::runtime::Runtime;
use crate::scope::Scope;
use core::any::Any;
use core::marker::PhantomData;
use std::collections::BTreeMap;

/// A payload with a position in its stream. Number indices from zero when
/// sending through a [`Sequencer`].
pub trait Sequenced: Any + Send {
    fn index(&self) -> u64;
}

/// An actor that re-emits an indexed message stream in index order.
///
/// A stage with a parallelism cap above one delivers its output in whatever
/// order its invocations finish. Routing that output through a `Sequencer`
/// restores send order: in-order messages are forwarded downstream
/// immediately, early arrivals are parked until the gap closes.
///
/// The first message must carry the downstream [`ActorRef`]; use
/// [`sequencer`] to set both up in one step.
pub struct Sequencer<T> {
    next: u64,
    downstream: Option<ActorRef>,
    stash: BTreeMap<u64, Box<Message>>,
    _payload: PhantomData<fn(T)>,
}

impl<T> Sequencer<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 0,
            downstream: None,
            stash: BTreeMap::new(),
            _payload: PhantomData,
        }
    }
}

impl<T> Default for Sequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Sequenced> Receive for Sequencer<T> {
    fn allowed_types(&self) -> Vec<TypeTag> {
        vec![TypeTag::of::<T>(), TypeTag::of::<ActorRef>()]
    }

    fn receive(&mut self, scope: &mut Scope<'_>) {
        let downstream_update = scope
            .message()
            .and_then(|msg| msg.downcast_ref::<ActorRef>())
            .cloned();
        if let Some(downstream) = downstream_update {
            self.downstream = Some(downstream);
            return;
        }

        let Some(idx) = scope
            .message()
            .and_then(|msg| msg.downcast_ref::<T>())
            .map(Sequenced::index)
        else {
            return;
        };
        let Some(downstream) = self.downstream.clone() else {
            let rt = scope.runtime().clone();
            rt.error_args(format_args!(
                "sequencer received index {idx} before a downstream actor",
            ));
            return;
        };

        if idx == self.next {
            scope.forward(&downstream);
            self.next += 1;
            // release any run the arrival just completed
            while let Some(stashed) = self.stash.remove(&self.next) {
                scope.send(stashed, &downstream);
                self.next += 1;
            }
        } else if self.stash.contains_key(&idx) {
            let rt = scope.runtime().clone();
            rt.error_args(format_args!(
                "sequencer received two messages with index {idx}",
            ));
        } else if let Some(msg) = scope.take() {
            self.stash.insert(idx, msg);
        }
    }
}

impl<T> Drop for Sequencer<T> {
    fn drop(&mut self) {
        if !self.stash.is_empty() {
            tracing::warn!(
                stranded = self.stash.len(),
                next = self.next,
                "sequencer dropped with parked messages",
            );
        }
    }
}

/// Registers a named [`Sequencer`] for `T` and points it at `downstream`.
pub fn sequencer<T: Sequenced>(rt: &Runtime, name: &str, downstream: &ActorRef) -> ActorRef {
    let actor = rt.spawn_object_named(Sequencer::<T>::new(), name);
    rt.send(Message::new(downstream.clone()), &actor);
    actor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loom::lock;
    use crate::loom::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct Item {
        idx: u64,
    }

    impl Sequenced for Item {
        fn index(&self) -> u64 {
            self.idx
        }
    }

    fn collect(scope: &mut Scope<'_>) {
        let idx = scope
            .message()
            .and_then(|msg| msg.downcast_ref::<Item>())
            .map(|item| item.idx);
        if let (Some(idx), Some(seen)) = (idx, scope.env::<Mutex<Vec<u64>>>()) {
            lock(seen).push(idx);
        }
    }

    #[test]
    fn restores_index_order() {
        let rt = Runtime::new();
        let seen = Arc::new(Mutex::new(Vec::<u64>::new()));
        let sink = rt.actor_with_env(collect, seen.clone());
        let seq = sequencer::<Item>(&rt, "reorder", &sink);

        for idx in [3u64, 0, 2, 5, 1, 4] {
            rt.send(Message::new(Item { idx }), &seq);
        }
        rt.wait_all();

        assert_eq!(*lock(&seen), vec![0u64, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn unlisted_types_are_rejected() {
        let rt = Runtime::new();
        let seen = Arc::new(Mutex::new(Vec::<u64>::new()));
        let sink = rt.actor_with_env(collect, seen.clone());
        let seq = sequencer::<Item>(&rt, "filter", &sink);

        // not in the whitelist; reported and never delivered
        rt.send(Message::new(String::from("noise")), &seq);
        rt.send(Message::new(Item { idx: 0 }), &seq);
        rt.wait_all();

        assert_eq!(*lock(&seen), vec![0u64]);
    }
}
