// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A lightweight in-process actor runtime for parallelising code that is not
//! itself thread-safe.
//!
//! Work is split into actors: a callable plus whatever private state it
//! needs. Actors talk by handing each other mutable messages; the runtime
//! multiplexes an elastic pool of OS threads across whichever actors have
//! messages waiting. An actor is never invoked on two threads at once unless
//! its parallelism cap is raised explicitly, so actor code needs no locking
//! of its own.
//!
//! ```
//! use hive::{Message, Runtime, Scope};
//!
//! fn actor(scope: &mut Scope<'_>) {
//!     if let Some(value) = scope.message().and_then(|msg| msg.downcast_ref::<i32>()) {
//!         assert_eq!(*value, 100_500);
//!     }
//! }
//!
//! let rt = Runtime::new();
//! let handle = rt.actor(actor);
//! rt.send(Message::new(100_500i32), &handle);
//! rt.wait_all();
//! ```
//!
//! # Messages
//!
//! Messages are mutable and owned by exactly one party at a time, so:
//!
//! - a message cannot be sent twice;
//! - a sent message cannot be read or written, it may already be in
//!   delivery or freed.
//!
//! A callable may mutate the message it received and pass it on with
//! [`Scope::forward`], or keep it past the delivery with [`Scope::take`].
//! Anything still owned by the runtime when the callable returns is freed.
//! Per (sender, receiver) pair, messages arrive in send order.
//!
//! # Parallelism and resources
//!
//! [`Runtime::parallel_set`] lets a thread-safe actor run in up to `N`
//! threads at once. Independently, a named resource created with
//! [`Runtime::resource`] caps the combined concurrency of every actor bound
//! to it, e.g. to keep CPU-heavy actors from crowding out the rest. Unbound
//! actors share the default resource, whose capacity
//! [`Runtime::thread_max`] adjusts.
//!
//! # Logging
//!
//! [`log!`] and [`error!`] format into a bounded buffer and deliver through
//! the reserved "log" and "error" actors, which any actor can shadow before
//! first use. Internal runtime diagnostics go through [`tracing`] instead.

mod actor;
mod loom;
mod message;
mod order;
mod pool;
mod queue;
mod registry;
mod resource;
mod runtime;
mod scope;
mod sinks;
mod stats;
mod worker;

pub use actor::{ActorFn, ActorRef, Env, Receive};
pub use message::{Message, TypeTag};
pub use order::{Sequenced, Sequencer, sequencer};
pub use runtime::{Config, Runtime};
pub use scope::Scope;
pub use sinks::{LOG_BUFFER, LogText};
pub use worker::current_worker;
