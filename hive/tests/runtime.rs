// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! End-to-end scheduling behaviour, driven through the public surface only.

use hive::{ActorRef, LogText, Message, Runtime, Scope};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

fn trace_init() -> tracing::subscriber::DefaultGuard {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .set_default()
}

fn record_u32(scope: &mut Scope<'_>) {
    let value = scope
        .message()
        .and_then(|msg| msg.downcast_ref::<u32>())
        .copied();
    if let (Some(value), Some(seen)) = (value, scope.env::<Mutex<Vec<u32>>>()) {
        seen.lock().unwrap().push(value);
    }
}

#[test]
fn fifo_from_one_sender() {
    let _trace = trace_init();
    let rt = Runtime::new();
    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));
    let actor = rt.actor_with_env(record_u32, seen.clone());

    for i in 0..1000u32 {
        rt.send(Message::new(i), &actor);
    }
    rt.wait_all();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1000);
    assert!(seen.iter().copied().eq(0..1000));
}

/// Tracks how many invocations are inside the callable at once.
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::AcqRel);
    }
}

fn sleepy(scope: &mut Scope<'_>) {
    if let Some(gauge) = scope.env::<Gauge>() {
        gauge.enter();
        std::thread::sleep(Duration::from_millis(1));
        gauge.exit();
    }
}

#[test]
fn parallelism_cap_is_honored() {
    let _trace = trace_init();
    let rt = Runtime::new();
    rt.resource("crunch", 8);

    let gauge = Arc::new(Gauge::new());
    let actor = rt.actor_with_env(sleepy, gauge.clone());
    rt.parallel_set(4, &actor);
    rt.bind_resource("crunch", &actor);

    for _ in 0..2000u32 {
        rt.send(Message::new(0u8), &actor);
    }
    rt.wait_all();

    let peak = gauge.peak.load(Ordering::Acquire);
    assert!(peak <= 4, "observed {peak} concurrent invocations, cap is 4");
    assert!(peak >= 1);
    assert_eq!(gauge.current.load(Ordering::Acquire), 0);
}

/// Distinct environment allocations that share one gauge, so the same
/// function registers as several actors.
struct SharedGauge(Arc<Gauge>);

fn busy(scope: &mut Scope<'_>) {
    if let Some(shared) = scope.env::<SharedGauge>() {
        shared.0.enter();
        std::hint::black_box(0u64);
        shared.0.exit();
    }
}

#[test]
fn resource_caps_across_actors() {
    let rt = Runtime::new();
    rt.resource("pair", 2);

    let gauge = Arc::new(Gauge::new());
    let actors: Vec<ActorRef> = (0..4)
        .map(|_| {
            let actor = rt.actor_with_env(busy, Arc::new(SharedGauge(gauge.clone())));
            rt.bind_resource("pair", &actor);
            actor
        })
        .collect();
    assert!(!actors[0].same(&actors[1]));

    for i in 0..1000u32 {
        for actor in &actors {
            rt.send(Message::new(i), actor);
        }
    }
    rt.wait_all();

    let peak = gauge.peak.load(Ordering::Acquire);
    assert!(peak <= 2, "observed {peak} concurrent invocations across the resource, cap is 2");
}

struct ForwardEnv {
    to: ActorRef,
    source_addr: AtomicUsize,
}

struct SinkRecord {
    addr: AtomicUsize,
    value: AtomicUsize,
    deliveries: AtomicUsize,
}

fn forwarder(scope: &mut Scope<'_>) {
    let addr = scope
        .message()
        .map(|msg| std::ptr::from_mut(msg) as usize)
        .unwrap_or(0);
    let target = scope.env::<ForwardEnv>().map(|env| {
        env.source_addr.store(addr, Ordering::Release);
        env.to.clone()
    });
    if let Some(target) = target {
        scope.forward(&target);
    }
}

fn receiver(scope: &mut Scope<'_>) {
    let seen = scope.message().map(|msg| {
        (
            std::ptr::from_mut(msg) as usize,
            msg.downcast_ref::<u32>().copied().unwrap_or(0),
        )
    });
    if let (Some((addr, value)), Some(record)) = (seen, scope.env::<SinkRecord>()) {
        record.addr.store(addr, Ordering::Release);
        record.value.store(value as usize, Ordering::Release);
        record.deliveries.fetch_add(1, Ordering::AcqRel);
    }
}

#[test]
fn forwarding_moves_the_same_message() {
    let rt = Runtime::new();

    let record = Arc::new(SinkRecord {
        addr: AtomicUsize::new(0),
        value: AtomicUsize::new(0),
        deliveries: AtomicUsize::new(0),
    });
    let sink = rt.actor_with_env(receiver, record.clone());
    let forward_env = Arc::new(ForwardEnv {
        to: sink,
        source_addr: AtomicUsize::new(0),
    });
    let front = rt.actor_with_env(forwarder, forward_env.clone());

    rt.send(Message::new(42u32), &front);
    rt.wait_all();

    assert_eq!(record.deliveries.load(Ordering::Acquire), 1);
    assert_eq!(record.value.load(Ordering::Acquire), 42);
    // the sink saw the very allocation the forwarder had
    let source = forward_env.source_addr.load(Ordering::Acquire);
    assert_ne!(source, 0);
    assert_eq!(source, record.addr.load(Ordering::Acquire));
}

fn journal(scope: &mut Scope<'_>) {
    let entry = scope.message().and_then(|msg| {
        msg.downcast_ref::<u32>()
            .map(|n| n.to_string())
            .or_else(|| msg.downcast_ref::<String>().cloned())
    });
    if let (Some(entry), Some(log)) = (entry, scope.env::<Mutex<Vec<String>>>()) {
        log.lock().unwrap().push(entry);
    }
}

#[test]
fn end_of_life_runs_last_and_once() {
    let rt = Runtime::new();
    let entries = Arc::new(Mutex::new(Vec::<String>::new()));
    let actor = rt.actor_with_env(journal, entries.clone());

    rt.set_end_of_life(Message::new(String::from("bye")), &actor);
    for i in 0..100u32 {
        rt.send(Message::new(i), &actor);
    }
    rt.wait_all();

    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 101);
    assert_eq!(entries.last().map(String::as_str), Some("bye"));
    assert_eq!(entries.iter().filter(|e| *e == "bye").count(), 1);
    // ordinary traffic kept its order ahead of the farewell
    for (i, entry) in entries[..100].iter().enumerate() {
        assert_eq!(entry, &i.to_string());
    }
}

fn capture_errors(scope: &mut Scope<'_>) {
    let text = scope
        .message()
        .and_then(|msg| msg.downcast_ref::<LogText>())
        .map(|text| text.to_string());
    if let (Some(text), Some(errors)) = (text, scope.env::<Mutex<Vec<String>>>()) {
        errors.lock().unwrap().push(text);
    }
}

fn first(_scope: &mut Scope<'_>) {}
fn second(_scope: &mut Scope<'_>) {}

#[test]
fn name_collision_reports_and_keeps_first() {
    let rt = Runtime::new();
    let errors = Arc::new(Mutex::new(Vec::<String>::new()));
    // shadow the default "error" sink before anything can latch it
    let sink = rt.actor_with_env(capture_errors, errors.clone());
    rt.set_name(&sink, "error");

    let a = rt.actor(first);
    let b = rt.actor(second);
    rt.set_name(&a, "alpha");
    rt.set_name(&b, "alpha");
    rt.wait_all();

    assert_eq!(a.name().as_deref(), Some("alpha"));
    assert_eq!(b.name(), None);
    // still reachable through its key
    assert!(rt.actor(second).same(&b));

    let errors = errors.lock().unwrap();
    assert!(
        errors.iter().any(|e| e.contains("'alpha' already exists")),
        "unexpected error traffic: {errors:?}"
    );
}

fn take_after_forward(scope: &mut Scope<'_>) {
    let target = scope.env::<ForwardEnv>().map(|env| env.to.clone());
    let flag = scope.env::<ForwardEnv>().is_some();
    assert!(flag);
    if let Some(target) = target {
        scope.forward(&target);
        // the message is gone; this must fail loudly, not alias
        if scope.take().is_none() {
            if let Some(env) = scope.env::<ForwardEnv>() {
                env.source_addr.store(1, Ordering::Release);
            }
        }
    }
}

#[test]
fn copy_after_forward_is_an_error() {
    let rt = Runtime::new();
    let record = Arc::new(SinkRecord {
        addr: AtomicUsize::new(0),
        value: AtomicUsize::new(0),
        deliveries: AtomicUsize::new(0),
    });
    let sink = rt.actor_with_env(receiver, record.clone());
    let env = Arc::new(ForwardEnv {
        to: sink,
        source_addr: AtomicUsize::new(0),
    });
    let actor = rt.actor_with_env(take_after_forward, env.clone());

    rt.send(Message::new(7u32), &actor);
    rt.wait_all();

    assert_eq!(env.source_addr.load(Ordering::Acquire), 1);
    assert_eq!(record.deliveries.load(Ordering::Acquire), 1);
}

#[test]
fn parallel_set_is_idempotent() {
    let rt = Runtime::new();
    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));
    let actor = rt.actor_with_env(record_u32, seen.clone());

    rt.parallel_set(3, &actor);
    rt.parallel_set(3, &actor);
    rt.parallel_set(1, &actor);

    for i in 0..200u32 {
        rt.send(Message::new(i), &actor);
    }
    rt.wait_all();

    // back at cap 1, delivery order is send order
    let seen = seen.lock().unwrap();
    assert!(seen.iter().copied().eq(0..200));
}

#[test]
fn runtime_is_reusable_after_wait_all() {
    let rt = Runtime::new();
    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));

    let actor = rt.actor_with_env(record_u32, seen.clone());
    rt.send(Message::new(1u32), &actor);
    rt.wait_all();
    assert_eq!(seen.lock().unwrap().len(), 1);

    // the registry was cleared; resolving again builds a fresh actor
    let actor = rt.actor_with_env(record_u32, seen.clone());
    rt.send(Message::new(2u32), &actor);
    rt.wait_all();

    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

struct Flagged;

impl hive::Receive for Flagged {
    fn allowed_types(&self) -> Vec<hive::TypeTag> {
        vec![hive::TypeTag::of::<u32>()]
    }

    fn receive(&mut self, scope: &mut Scope<'_>) {
        if let Some(value) = scope.message().and_then(|msg| msg.downcast_mut::<u32>()) {
            *value += 1;
        }
    }
}

static PANICKED: AtomicBool = AtomicBool::new(false);

fn panicky(_scope: &mut Scope<'_>) {
    PANICKED.store(true, Ordering::Release);
    panic!("boom");
}

#[test]
fn panicking_callable_does_not_stall_the_pool() {
    let rt = Runtime::new();
    let seen = Arc::new(Mutex::new(Vec::<u32>::new()));

    let bad = rt.actor(panicky);
    let good = rt.actor_with_env(record_u32, seen.clone());

    rt.send(Message::new(0u8), &bad);
    rt.send(Message::new(9u32), &good);
    rt.wait_all();

    assert!(PANICKED.load(Ordering::Acquire));
    assert_eq!(*seen.lock().unwrap(), vec![9]);
}

static SAW_WORKER_ID: AtomicBool = AtomicBool::new(false);

fn check_worker_id(_scope: &mut Scope<'_>) {
    if hive::current_worker().is_some() {
        SAW_WORKER_ID.store(true, Ordering::Release);
    }
}

#[test]
fn worker_ids_are_visible_inside_handlers() {
    assert_eq!(hive::current_worker(), None);

    let rt = Runtime::new();
    let actor = rt.actor(check_worker_id);
    rt.send(Message::new(0u8), &actor);
    // let a pool thread (not the teardown path) deliver it
    std::thread::sleep(Duration::from_millis(200));
    rt.wait_all();

    assert!(SAW_WORKER_ID.load(Ordering::Acquire));
    assert_eq!(hive::current_worker(), None);
}

#[test]
fn object_actor_whitelist_filters() {
    let rt = Runtime::new();
    let actor = rt.spawn_object(Flagged);
    assert!(actor.name().is_some());

    rt.send(Message::new(1u32), &actor);
    // unlisted type; rejected before the object sees it
    rt.send(Message::new(String::from("nope")), &actor);
    rt.wait_all();
}
