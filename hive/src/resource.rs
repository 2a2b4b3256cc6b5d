// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::actor::Actor;
use crate::loom::lock;
use crate::loom::sync::atomic::{AtomicIsize, AtomicPtr, AtomicUsize, Ordering};
use crate::loom::sync::{Arc, Mutex};
use core::fmt;
use core::ptr;
use hashbrown::HashMap;

/// A named counting semaphore bounding how many actors that share it may run
/// concurrently, plus a one-slot cache of the next ready actor bound to it.
#[repr(align(64))]
pub(crate) struct Resource {
    /// Free capacity. Dips below zero transiently while a failed acquire is
    /// being rolled back.
    free: AtomicIsize,
    max: AtomicUsize,
    name: String,
    pub(crate) ready: ReadySlot,
}

impl Resource {
    pub(crate) fn new(name: impl Into<String>, max: usize) -> Self {
        let max = max.max(1);
        Self {
            free: AtomicIsize::new(isize::try_from(max).unwrap_or(isize::MAX)),
            max: AtomicUsize::new(max),
            name: name.into(),
            ready: ReadySlot::new(),
        }
    }

    /// Non-blocking acquire. Restores the count on failure.
    pub(crate) fn try_acquire(&self) -> bool {
        if self.free.fetch_sub(1, Ordering::AcqRel) <= 0 {
            self.free.fetch_add(1, Ordering::AcqRel);
            false
        } else {
            true
        }
    }

    pub(crate) fn release(&self) {
        self.free.fetch_add(1, Ordering::AcqRel);
    }

    /// Advisory: whether an acquire would currently succeed.
    pub(crate) fn has_free(&self) -> bool {
        self.free.load(Ordering::Acquire) > 0
    }

    /// Adjusts the capacity, preserving in-flight acquisitions. Lowering the
    /// capacity below the in-flight count does not abort anything; new
    /// acquires simply fail until enough releases happen.
    pub(crate) fn set_max(&self, max: usize) {
        let max = max.max(1);
        let old = self.max.swap(max, Ordering::AcqRel);
        if max != old {
            let delta = isize::try_from(max).unwrap_or(isize::MAX)
                - isize::try_from(old).unwrap_or(isize::MAX);
            self.free.fetch_add(delta, Ordering::AcqRel);
        }
    }

    pub(crate) fn max(&self) -> usize {
        self.max.load(Ordering::Acquire)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("free", &self.free.load(Ordering::Relaxed))
            .field("max", &self.max.load(Ordering::Relaxed))
            .finish()
    }
}

/// One-slot cache of a ready actor, handed off between workers without
/// touching the registry list.
///
/// The slot stores an `Arc<Actor>` as a raw pointer so insert and take are a
/// single compare-and-swap. Losing an insert race is fine; the actor stays
/// discoverable through the registry scan.
pub(crate) struct ReadySlot {
    slot: AtomicPtr<Actor>,
}

impl ReadySlot {
    pub(crate) fn new() -> Self {
        Self {
            slot: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Attempts to stash `actor`; returns false when the slot was occupied.
    pub(crate) fn offer(&self, actor: Arc<Actor>) -> bool {
        let raw = Arc::into_raw(actor).cast_mut();
        if self
            .slot
            .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            true
        } else {
            // Safety: `raw` came from `Arc::into_raw` above and was never
            // installed, so ownership is still ours to reclaim.
            drop(unsafe { Arc::from_raw(raw) });
            false
        }
    }

    pub(crate) fn take(&self) -> Option<Arc<Actor>> {
        let raw = self.slot.swap(ptr::null_mut(), Ordering::AcqRel);
        if raw.is_null() {
            None
        } else {
            // Safety: every non-null value in the slot is an `Arc::into_raw`
            // result whose ownership transferred to the slot in `offer`.
            Some(unsafe { Arc::from_raw(raw) })
        }
    }
}

impl Drop for ReadySlot {
    fn drop(&mut self) {
        drop(self.take());
    }
}

/// Process-wide index of named resources. Resources live until teardown.
pub(crate) struct ResourceRegistry {
    index: Mutex<HashMap<String, Arc<Resource>>>,
}

#[derive(Debug)]
pub(crate) enum ResourceError {
    /// `create` with a capacity that contradicts the existing resource.
    CapacityMismatch { existing: usize },
}

impl ResourceRegistry {
    pub(crate) fn new() -> Self {
        Self {
            index: Mutex::new(HashMap::new()),
        }
    }

    /// Creates the named resource, or returns the existing one. A capacity
    /// disagreement with an existing resource is an error; the existing
    /// resource wins.
    pub(crate) fn create(
        &self,
        name: &str,
        max: usize,
    ) -> Result<Arc<Resource>, (Arc<Resource>, ResourceError)> {
        let mut index = lock(&self.index);
        if let Some(existing) = index.get(name) {
            if existing.max() != max.max(1) {
                return Err((
                    Arc::clone(existing),
                    ResourceError::CapacityMismatch {
                        existing: existing.max(),
                    },
                ));
            }
            return Ok(Arc::clone(existing));
        }
        let resource = Arc::new(Resource::new(name, max));
        index.insert(name.to_owned(), Arc::clone(&resource));
        Ok(resource)
    }

    pub(crate) fn find(&self, name: &str) -> Option<Arc<Resource>> {
        lock(&self.index).get(name).map(Arc::clone)
    }

    /// Drops every registered resource, draining the ready slots first.
    pub(crate) fn clear(&self) {
        let mut index = lock(&self.index);
        for resource in index.values() {
            drop(resource.ready.take());
        }
        index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_up_to_capacity() {
        let res = Resource::new("cpu", 2);
        assert!(res.try_acquire());
        assert!(res.try_acquire());
        assert!(!res.try_acquire());
        assert!(!res.has_free());

        res.release();
        assert!(res.has_free());
        assert!(res.try_acquire());
    }

    #[test]
    fn set_max_preserves_in_flight() {
        let res = Resource::new("io", 1);
        assert!(res.try_acquire());

        res.set_max(3);
        assert!(res.try_acquire());
        assert!(res.try_acquire());
        assert!(!res.try_acquire());

        // shrink below the in-flight count: no new acquires until drained
        res.set_max(1);
        assert!(!res.try_acquire());
        res.release();
        res.release();
        assert!(!res.has_free());
        res.release();
        assert!(res.try_acquire());
    }

    #[test]
    fn capacity_clamps_to_one() {
        let res = Resource::new("zero", 0);
        assert_eq!(res.max(), 1);
        res.set_max(0);
        assert_eq!(res.max(), 1);
        assert!(res.try_acquire());
        assert!(!res.try_acquire());
    }

    #[test]
    fn registry_mismatch_keeps_existing() {
        let registry = ResourceRegistry::new();
        let first = registry.create("net", 4).unwrap();
        assert!(matches!(
            registry.create("net", 8),
            Err((_, ResourceError::CapacityMismatch { existing: 4 }))
        ));
        let again = registry.create("net", 4).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
}
