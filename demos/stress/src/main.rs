// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Scheduler stress harness.
//!
//! A fixed set of worker actors and a batch of messages that random-walk
//! across them: every hop marks the visited worker, and after enough hops
//! the message reports to the finish actor, which verifies the walk and
//! launches it again. Messages circulate until the deadline, then the run
//! reports how many laps each message managed.

use anyhow::{Result, ensure};
use clap::Parser;
use hive::{ActorRef, Config, Message, Runtime, Scope};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(about = "Message storm over a mesh of actors")]
struct Args {
    /// Number of worker actors.
    #[arg(long, default_value_t = 100)]
    actors: usize,
    /// Hops every message makes before reporting in.
    #[arg(long, default_value_t = 50)]
    steps: usize,
    /// Messages circulating at once.
    #[arg(long, default_value_t = 20)]
    messages: usize,
    /// How long to keep the storm going.
    #[arg(long, default_value_t = 3)]
    seconds: u64,
    /// Cap on concurrently working threads.
    #[arg(long, default_value_t = 8)]
    threads: usize,
    /// Print scheduler counters at the end.
    #[arg(long)]
    stats: bool,
}

#[derive(Clone)]
struct Walk {
    /// Worker this message is currently addressed to.
    worker: usize,
    rand: u64,
    steps: usize,
    /// Hops to make before reporting to the finish actor.
    target: usize,
    laps: u64,
    visited: Vec<bool>,
    map: Arc<Vec<ActorRef>>,
}

impl Walk {
    fn next_unvisited(&mut self) -> usize {
        // a few random probes, then a linear sweep
        for _ in 0..5 {
            self.rand ^= self.rand << 13;
            self.rand ^= self.rand >> 7;
            self.rand ^= self.rand << 17;
            #[expect(clippy::cast_possible_truncation, reason = "index fits")]
            let candidate = (self.rand % self.visited.len() as u64) as usize;
            if !self.visited[candidate] {
                return candidate;
            }
        }
        self.visited
            .iter()
            .position(|visited| !visited)
            .unwrap_or(0)
    }
}

struct Counters {
    hops: AtomicU64,
    finished: AtomicUsize,
    laps_min: AtomicU64,
    laps_max: AtomicU64,
}

struct WorkerEnv {
    index: usize,
    finish: ActorRef,
    counters: Arc<Counters>,
}

fn worker(scope: &mut Scope<'_>) {
    let Some((index, finish)) = scope
        .env::<WorkerEnv>()
        .map(|env| (env.index, env.finish.clone()))
    else {
        return;
    };
    if let Some(counters) = scope.env::<WorkerEnv>().map(|env| &env.counters) {
        counters.hops.fetch_add(1, Ordering::Relaxed);
    }

    enum Route {
        Finish,
        Next(ActorRef),
        Broken(&'static str),
    }

    let route = {
        let Some(walk) = scope.message().and_then(|msg| msg.downcast_mut::<Walk>()) else {
            return;
        };
        if walk.worker != index {
            Route::Broken("walk addressed to the wrong worker")
        } else if walk.visited[index] {
            Route::Broken("walk revisited a worker")
        } else {
            walk.visited[index] = true;
            walk.steps += 1;
            if walk.steps >= walk.target {
                Route::Finish
            } else {
                let next = walk.next_unvisited();
                walk.worker = next;
                Route::Next(walk.map[next].clone())
            }
        }
    };

    match route {
        Route::Finish => scope.forward(&finish),
        Route::Next(next) => scope.forward(&next),
        Route::Broken(what) => hive::error!(scope.runtime(), "{what}"),
    }
}

struct FinishEnv {
    counters: Arc<Counters>,
    deadline: Instant,
}

fn finish(scope: &mut Scope<'_>) {
    let Some((counters, deadline)) = scope
        .env::<FinishEnv>()
        .map(|env| (Arc::clone(&env.counters), env.deadline))
    else {
        return;
    };

    let relaunch = {
        let Some(walk) = scope.message().and_then(|msg| msg.downcast_mut::<Walk>()) else {
            return;
        };
        walk.laps += 1;
        if Instant::now() >= deadline {
            counters.laps_min.fetch_min(walk.laps, Ordering::AcqRel);
            counters.laps_max.fetch_max(walk.laps, Ordering::AcqRel);
            counters.finished.fetch_add(1, Ordering::AcqRel);
            None
        } else {
            walk.visited.fill(false);
            walk.steps = 0;
            let next = walk.next_unvisited();
            walk.worker = next;
            Some(walk.map[next].clone())
        }
    };

    if let Some(next) = relaunch {
        scope.forward(&next);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    ensure!(args.actors >= 2, "need at least two workers");
    ensure!(args.messages >= 1, "need at least one message");

    let rt = Runtime::with_config(Config {
        stats: args.stats,
        ..Config::default()
    });
    rt.thread_max(args.threads);

    let counters = Arc::new(Counters {
        hops: AtomicU64::new(0),
        finished: AtomicUsize::new(0),
        laps_min: AtomicU64::new(u64::MAX),
        laps_max: AtomicU64::new(0),
    });
    let deadline = Instant::now() + Duration::from_secs(args.seconds);

    let finish_actor = rt.actor_with_env(
        finish,
        Arc::new(FinishEnv {
            counters: Arc::clone(&counters),
            deadline,
        }),
    );

    let map: Arc<Vec<ActorRef>> = Arc::new(
        (0..args.actors)
            .map(|index| {
                rt.actor_with_env(
                    worker,
                    Arc::new(WorkerEnv {
                        index,
                        finish: finish_actor.clone(),
                        counters: Arc::clone(&counters),
                    }),
                )
            })
            .collect(),
    );

    let started = Instant::now();
    for seed in 0..args.messages {
        let start = seed % args.actors;
        let walk = Walk {
            worker: start,
            rand: seed as u64 + 0x9e37_79b9_7f4a_7c15,
            steps: 0,
            // a walk cannot visit more distinct workers than exist
            target: args.steps.min(args.actors),
            laps: 0,
            visited: vec![false; args.actors],
            map: Arc::clone(&map),
        };
        rt.send(Message::new(walk), &map[start]);
    }

    // all messages park at the finish once the deadline passes
    let grace = Duration::from_secs(args.seconds * 2 + 10);
    while counters.finished.load(Ordering::Acquire) < args.messages && started.elapsed() < grace {
        std::thread::sleep(Duration::from_millis(50));
    }
    rt.wait_all();

    let finished = counters.finished.load(Ordering::Acquire);
    ensure!(
        finished == args.messages,
        "only {finished} of {} messages came home",
        args.messages
    );
    println!(
        "Test OK. worked: {} hops (laps min {} max {})",
        counters.hops.load(Ordering::Acquire),
        counters.laps_min.load(Ordering::Acquire),
        counters.laps_max.load(Ordering::Acquire),
    );
    Ok(())
}
