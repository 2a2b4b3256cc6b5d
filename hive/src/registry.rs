// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::actor::{Actor, ActorFn, ActorRef, Env};
use crate::loom::lock;
use crate::loom::sync::atomic::Ordering;
use crate::loom::sync::{Arc, Mutex};
use crate::resource::Resource;
use crate::stats::Stats;
use hashbrown::HashMap;

/// Identity of a function actor: the function pointer plus the address of
/// its environment. Each distinct pair is one actor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct FuncKey {
    func: usize,
    env: usize,
}

impl FuncKey {
    fn new(func: ActorFn, env: Option<&Env>) -> Self {
        Self {
            func: func as usize,
            env: env.map_or(0, |env| Arc::as_ptr(env).cast::<()>() as usize),
        }
    }
}

struct Indexes {
    by_key: HashMap<FuncKey, Arc<Actor>>,
    by_name: HashMap<String, Arc<Actor>>,
}

/// The actor registry: two indexes plus the flat list the scanning scheduler
/// walks.
///
/// Lock order: `indexes` before `list`, never the other way around.
pub(crate) struct Registry {
    indexes: Mutex<Indexes>,
    /// Scan order. A hint only; promotion keeps busy actors near the front.
    list: Mutex<Vec<Arc<Actor>>>,
}

pub(crate) enum NameError {
    /// The name already belongs to a different actor.
    Taken,
    /// The actor already carries a different name.
    AlreadyNamed(String),
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            indexes: Mutex::new(Indexes {
                by_key: HashMap::new(),
                by_name: HashMap::new(),
            }),
            list: Mutex::new(Vec::new()),
        }
    }

    /// Resolves the actor for `(func, env)`, creating and registering it on
    /// first sight.
    pub(crate) fn get_or_create_fn(
        &self,
        func: ActorFn,
        env: Option<Env>,
        default: &Arc<Resource>,
        stats: &Stats,
    ) -> ActorRef {
        stats.actor_get.incr();
        let key = FuncKey::new(func, env.as_ref());
        let mut indexes = lock(&self.indexes);
        if let Some(actor) = indexes.by_key.get(&key) {
            return ActorRef {
                inner: Arc::clone(actor),
            };
        }
        let actor = Arc::new(Actor::from_fn(func, env, default));
        indexes.by_key.insert(key, Arc::clone(&actor));
        lock(&self.list).push(Arc::clone(&actor));
        ActorRef { inner: actor }
    }

    /// Registers an object actor. Object actors have no key; they are
    /// reachable through the returned handle or a bound name.
    pub(crate) fn insert_object(&self, actor: Arc<Actor>) -> ActorRef {
        lock(&self.list).push(Arc::clone(&actor));
        ActorRef { inner: actor }
    }

    pub(crate) fn set_name(&self, actor: &ActorRef, name: &str) -> Result<(), NameError> {
        let mut indexes = lock(&self.indexes);
        if let Some(existing) = indexes.by_name.get(name) {
            if Arc::ptr_eq(existing, &actor.inner) {
                return Ok(());
            }
            return Err(NameError::Taken);
        }
        let mut current = lock(&actor.inner.name);
        if let Some(current) = &*current {
            return Err(NameError::AlreadyNamed(current.clone()));
        }
        *current = Some(name.to_owned());
        drop(current);
        indexes.by_name.insert(name.to_owned(), Arc::clone(&actor.inner));
        Ok(())
    }

    pub(crate) fn find_name(&self, name: &str) -> Option<ActorRef> {
        lock(&self.indexes)
            .by_name
            .get(name)
            .map(|actor| ActorRef {
                inner: Arc::clone(actor),
            })
    }

    /// Linear scan for a ready actor. The first hit is claimed (its
    /// `in_cache` flag set) and swapped one slot towards the front so active
    /// actors cluster near the head. Deliberately unfair.
    pub(crate) fn find_ready_scan(&self, held: Option<&Arc<Resource>>) -> Option<Arc<Actor>> {
        let mut list = lock(&self.list);
        for i in 0..list.len() {
            if list[i].is_ready(held) {
                let actor = Arc::clone(&list[i]);
                actor.in_cache.store(true, Ordering::Release);
                if i > 0 {
                    list.swap(i, i - 1);
                }
                return Some(actor);
            }
        }
        None
    }

    /// Total free invocation slots over all ready actors. Used to decide
    /// whether a starting worker should wake another.
    pub(crate) fn count_ready(&self, held: Option<&Arc<Resource>>) -> usize {
        let list = lock(&self.list);
        list.iter()
            .filter(|actor| actor.is_ready(held))
            .map(|actor| actor.free_slots())
            .sum()
    }

    /// Snapshot of every registered actor, in scan order.
    pub(crate) fn actors(&self) -> Vec<ActorRef> {
        lock(&self.list)
            .iter()
            .map(|actor| ActorRef {
                inner: Arc::clone(actor),
            })
            .collect()
    }

    pub(crate) fn clear(&self) {
        let mut indexes = lock(&self.indexes);
        let mut list = lock(&self.list);
        indexes.by_key.clear();
        indexes.by_name.clear();
        list.clear();
    }
}
