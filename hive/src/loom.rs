// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(loom)] {
        pub(crate) use loom::sync;
        pub(crate) use loom::thread;
        pub(crate) use loom::thread_local;
        #[cfg(test)]
        pub(crate) use loom::model;
    } else {
        pub(crate) use std::thread;
        pub(crate) use std::thread_local;

        #[cfg(test)]
        #[inline(always)]
        pub(crate) fn model<R>(f: impl FnOnce() -> R) -> R {
            f()
        }

        pub(crate) mod sync {
            pub(crate) use std::sync::*;
        }
    }
}

/// Locks a mutex, ignoring poisoning.
///
/// A panicking user callable must not wedge the scheduler, so every internal
/// lock goes through here.
pub(crate) fn lock<'a, T: ?Sized>(mutex: &'a sync::Mutex<T>) -> sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
