// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Parallel uniqueness filter over text lines.
//!
//! The main thread reads lines and feeds them to a hashing stage running in
//! several threads; a sequencer restores input order behind the parallel
//! stage, and a stateful sink keeps the first occurrence of every hash.
//! Lines whose 64-bit hash collides with an earlier different line are
//! treated as duplicates, which this demo accepts.

use anyhow::{Context, Result};
use clap::Parser;
use hive::{ActorRef, Config, Message, Receive, Runtime, Scope, Sequenced, TypeTag, sequencer};
use std::collections::HashSet;
use std::fs::File;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(about = "Print each unique line of the input once, in input order")]
struct Args {
    /// Input file; stdin when omitted.
    file: Option<PathBuf>,
    /// Parallel hashing invocations.
    #[arg(long, default_value_t = 4)]
    jobs: usize,
    /// Print scheduler counters at the end.
    #[arg(long)]
    stats: bool,
}

#[derive(Clone)]
struct Line {
    idx: u64,
    text: String,
    hash: u64,
}

impl Sequenced for Line {
    fn index(&self) -> u64 {
        self.idx
    }
}

/// The parallel stage: hash the line, pass it on. Thread-safe, so it runs
/// with a raised cap.
fn hash_line(scope: &mut Scope<'_>) {
    if let Some(line) = scope.message().and_then(|msg| msg.downcast_mut::<Line>()) {
        let mut hasher = DefaultHasher::new();
        line.text.hash(&mut hasher);
        line.hash = hasher.finish();
    }
    if let Some(next) = scope.env::<ActorRef>().cloned() {
        scope.forward(&next);
    }
}

/// Marker payload asking the sink for its summary at teardown.
#[derive(Clone)]
struct Summarize;

struct Unique {
    seen: HashSet<u64>,
    total: u64,
    kept: u64,
}

impl Unique {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            total: 0,
            kept: 0,
        }
    }
}

impl Receive for Unique {
    fn allowed_types(&self) -> Vec<TypeTag> {
        vec![TypeTag::of::<Line>(), TypeTag::of::<Summarize>()]
    }

    fn receive(&mut self, scope: &mut Scope<'_>) {
        if let Some(line) = scope.message().and_then(|msg| msg.downcast_ref::<Line>()) {
            self.total += 1;
            if self.seen.insert(line.hash) {
                self.kept += 1;
                println!("{}", line.text);
            }
            return;
        }
        if scope
            .message()
            .is_some_and(|msg| msg.downcast_ref::<Summarize>().is_some())
        {
            eprintln!("{} unique of {} lines", self.kept, self.total);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let rt = Runtime::with_config(Config {
        stats: args.stats,
        ..Config::default()
    });

    let unique = rt.spawn_object_named(Unique::new(), "unique");
    rt.set_end_of_life(Message::new(Summarize), &unique);
    let reorder = sequencer::<Line>(&rt, "reorder", &unique);
    let hasher = rt.actor_with_env(hash_line, Arc::new(reorder));
    rt.parallel_set(args.jobs, &hasher);

    let reader: Box<dyn BufRead> = match &args.file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    for (idx, line) in reader.lines().enumerate() {
        let text = line.context("reading input")?;
        rt.send(
            Message::new(Line {
                idx: idx as u64,
                text,
                hash: 0,
            }),
            &hasher,
        );
    }
    rt.wait_all();
    Ok(())
}
