// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The built-in "log" and "error" actors.
//!
//! Both names are reserved. A caller may bind its own actor to either name
//! *before* the first log or error line is produced; after that the default
//! is latched and a rebind fails like any other name collision.

use crate::actor::ActorFn;
use crate::message::Message;
use crate::runtime::Runtime;
use crate::scope::Scope;
use arrayvec::ArrayString;
use core::fmt::{self, Write as _};

/// Capacity of the bounded formatting buffer behind [`log!`](crate::log)
/// and [`error!`](crate::error). Longer lines are truncated.
pub const LOG_BUFFER: usize = 1024;

/// Payload of "log" and "error" messages. Custom sinks downcast to this.
pub type LogText = ArrayString<LOG_BUFFER>;

/// Default "log" sink: one line per message to stdout.
fn log_write(scope: &mut Scope<'_>) {
    if let Some(text) = scope.message().and_then(|msg| msg.downcast_ref::<LogText>()) {
        println!("{text}");
    }
}

/// Default "error" sink: stamps the text through the "log" actor.
fn error_write(scope: &mut Scope<'_>) {
    let text = scope
        .message()
        .and_then(|msg| msg.downcast_ref::<LogText>())
        .copied();
    if let Some(text) = text {
        scope.runtime().clone().log_args(format_args!("{text}"));
    }
}

impl Runtime {
    /// Formats a line, stamps it with the runtime's age and sends it to the
    /// "log" actor. Prefer the [`log!`](crate::log) macro.
    pub fn log_args(&self, args: fmt::Arguments<'_>) {
        let mut text = LogText::new();
        self.stamp(&mut text);
        let _ = text.write_fmt(args);
        self.dispatch(text, "log", log_write);
    }

    /// Formats an error line and sends it to the "error" actor. Prefer the
    /// [`error!`](crate::error) macro.
    pub fn error_args(&self, args: fmt::Arguments<'_>) {
        let mut text = LogText::new();
        let _ = text.write_str("!!! ERROR: ");
        let _ = text.write_fmt(args);
        self.dispatch(text, "error", error_write);
    }

    /// Seconds-and-millis since the runtime started.
    fn stamp(&self, text: &mut LogText) {
        let ms = self.inner.started.elapsed().as_millis();
        let _ = write!(text, "{:5}.{:03} ", ms / 1000, ms % 1000);
    }

    fn dispatch(&self, text: LogText, name: &str, default: ActorFn) {
        if self.inner.cfg.debug_log_immediate {
            // synchronous bypass: nothing queued can be lost on a crash
            println!("{text}");
            return;
        }
        let sink = match self.lookup(name) {
            Some(sink) => sink,
            None => {
                // first use latches the default under the reserved name; a
                // racing registration wins and is looked up instead
                let sink = self.actor(default);
                if self.inner.registry.set_name(&sink, name).is_err() {
                    self.lookup(name).unwrap_or(sink)
                } else {
                    sink
                }
            }
        };
        self.send(Message::new(text), &sink);
    }
}

/// Formats a line and sends it to the "log" actor.
///
/// The line is rendered into a bounded buffer of [`LOG_BUFFER`] bytes and
/// carries a timestamp relative to runtime start.
#[macro_export]
macro_rules! log {
    ($rt:expr, $($arg:tt)*) => {
        $rt.log_args(::core::format_args!($($arg)*))
    };
}

/// Formats a line, prefixes it with `!!! ERROR: ` and sends it to the
/// "error" actor.
#[macro_export]
macro_rules! error {
    ($rt:expr, $($arg:tt)*) => {
        $rt.error_args(::core::format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_lines_truncate() {
        let rt = Runtime::new();
        let long = "x".repeat(4 * LOG_BUFFER);
        // must neither panic nor allocate past the buffer
        rt.log_args(format_args!("{long}"));
        rt.error_args(format_args!("{long}"));
        rt.wait_all();
    }

    #[test]
    fn default_sinks_latch_on_first_use() {
        let rt = Runtime::new();
        assert!(rt.lookup("log").is_none());
        crate::log!(rt, "hello");
        assert!(rt.lookup("log").is_some());
        rt.wait_all();
    }
}
