// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::loom::lock;
use crate::loom::sync::Mutex;
use crate::loom::sync::atomic::{AtomicUsize, Ordering};
use crate::message::Message;
use std::collections::VecDeque;

/// Per-actor FIFO with a two-stage head.
///
/// Producers only ever touch the staging side; the consumer drains its own
/// stage and splices the staging stage in under the staging lock only when it
/// runs dry. Push and pop therefore contend on disjoint locks in the common
/// case.
///
/// FIFO holds per producer: two messages pushed by the same thread are popped
/// in push order. Cross-producer order is whatever the staging lock
/// linearises.
pub(crate) struct MessageQueue {
    /// Producer side.
    staging: Mutex<VecDeque<Box<Message>>>,
    /// Consumer side, contended only by concurrent poppers of the same actor.
    drained: Mutex<VecDeque<Box<Message>>>,
    /// Advisory length, read without either lock.
    len: AtomicUsize,
}

impl MessageQueue {
    pub(crate) fn new() -> Self {
        Self {
            staging: Mutex::new(VecDeque::new()),
            drained: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Appends a message; returns the queue length after the push.
    pub(crate) fn push(&self, msg: Box<Message>) -> usize {
        lock(&self.staging).push_back(msg);
        self.len.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Removes the oldest message.
    pub(crate) fn pop(&self) -> Option<Box<Message>> {
        let mut drained = lock(&self.drained);
        if drained.is_empty() {
            core::mem::swap(&mut *drained, &mut *lock(&self.staging));
        }
        let msg = drained.pop_front();
        if msg.is_some() {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        msg
    }

    /// Advisory emptiness check; may be stale by the time the caller acts.
    pub(crate) fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loom;
    use crate::loom::sync::Arc;

    #[test]
    fn fifo_single_producer() {
        let queue = MessageQueue::new();
        for i in 0..16u32 {
            queue.push(Message::new(i));
        }
        for i in 0..16u32 {
            let msg = queue.pop().unwrap();
            assert_eq!(msg.downcast_ref::<u32>(), Some(&i));
        }
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn interleaved_push_pop() {
        let queue = MessageQueue::new();
        queue.push(Message::new(0u32));
        queue.push(Message::new(1u32));
        assert_eq!(queue.pop().unwrap().downcast_ref::<u32>(), Some(&0));
        queue.push(Message::new(2u32));
        // the freshly pushed message must not overtake the staged one
        assert_eq!(queue.pop().unwrap().downcast_ref::<u32>(), Some(&1));
        assert_eq!(queue.pop().unwrap().downcast_ref::<u32>(), Some(&2));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        loom::model(|| {
            const PRODUCERS: usize = 2;
            const PER_PRODUCER: u32 = 3;

            let queue = Arc::new(MessageQueue::new());

            let handles: Vec<_> = (0..PRODUCERS)
                .map(|p| {
                    let queue = Arc::clone(&queue);
                    let base = u32::try_from(p).unwrap() * 100;
                    loom::thread::spawn(move || {
                        for i in 0..PER_PRODUCER {
                            queue.push(Message::new(base + i));
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            // per-producer order must survive the interleaving
            let mut seen: Vec<Vec<u32>> = vec![Vec::new(); PRODUCERS];
            while let Some(msg) = queue.pop() {
                let value = *msg.downcast_ref::<u32>().unwrap();
                seen[value as usize / 100].push(value % 100);
            }
            for (p, values) in seen.iter().enumerate() {
                assert_eq!(values.len(), PER_PRODUCER as usize, "producer {p}");
                assert!(values.windows(2).all(|w| w[0] < w[1]));
            }
        });
    }
}
