// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use criterion::{Criterion, criterion_group, criterion_main};
use hive::{Message, Runtime, Scope};

fn countdown(scope: &mut Scope<'_>) {
    let again = scope
        .message()
        .and_then(|msg| msg.downcast_mut::<u64>())
        .map(|n| {
            if *n > 0 {
                *n -= 1;
                true
            } else {
                false
            }
        })
        .unwrap_or(false);
    if again {
        let me = scope.runtime().actor(countdown);
        scope.forward(&me);
    }
}

fn sink(scope: &mut Scope<'_>) {
    let _ = scope.message();
}

fn self_send_10k(c: &mut Criterion) {
    let rt = Runtime::new();

    c.bench_function("self_send_10k", |b| {
        b.iter(|| {
            let actor = rt.actor(countdown);
            rt.send(Message::new(10_000u64), &actor);
            rt.wait_all();
        });
    });
}

fn fanout_10k_cap1(c: &mut Criterion) {
    let rt = Runtime::new();

    c.bench_function("fanout_10k_cap1", |b| {
        b.iter(|| {
            let actor = rt.actor(sink);
            for _ in 0..10_000u32 {
                rt.send(Message::new(1u64), &actor);
            }
            rt.wait_all();
        });
    });
}

fn fanout_10k_cap4(c: &mut Criterion) {
    let rt = Runtime::new();

    c.bench_function("fanout_10k_cap4", |b| {
        b.iter(|| {
            let actor = rt.actor(sink);
            rt.parallel_set(4, &actor);
            for _ in 0..10_000u32 {
                rt.send(Message::new(1u64), &actor);
            }
            rt.wait_all();
        });
    });
}

criterion_group!(
    throughput,
    self_send_10k,
    fanout_10k_cap1,
    fanout_10k_cap4,
);
criterion_main!(throughput);
