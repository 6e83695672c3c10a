//! Observing what an execution context runs.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::exec::FunctionId;

/// Receives debugging events for one root invocation.
///
/// A sink is installed with
/// [`ExecutionContext::set_tracer`](crate::exec::ExecutionContext::set_tracer)
/// and is closed exactly once, when the context is closed or dropped.
pub trait TraceSink {
    /// A command at `depth` is about to be resolved.
    fn on_command(&mut self, depth: usize, command: &str);
    /// A command at `depth` returned `result`.
    fn on_return(&mut self, depth: usize, command: &str, result: i32);
    /// A function with `size` lines is being called from `depth`.
    fn on_call(&mut self, depth: usize, function: &FunctionId, size: usize);
    /// An error was presented to a source.
    fn on_error(&mut self, message: &str);
    /// The owning context has finished.
    fn close(&mut self) {}
}

/// An event recorded by [`TraceLog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// See [`TraceSink::on_command`].
    Command {
        /// The frame depth.
        depth: usize,
        /// The command input.
        command: String,
    },
    /// See [`TraceSink::on_return`].
    Return {
        /// The frame depth.
        depth: usize,
        /// The command input.
        command: String,
        /// The value returned.
        result: i32,
    },
    /// See [`TraceSink::on_call`].
    Call {
        /// The caller's frame depth.
        depth: usize,
        /// The function being called.
        function: String,
        /// The number of lines in the function.
        size: usize,
    },
    /// See [`TraceSink::on_error`].
    Error(String),
}

/// A [`TraceSink`] that records every event.
///
/// Clones share the same log, so a clone can be kept to inspect events after
/// the original has been moved into a context.
#[derive(Debug, Clone, Default)]
pub struct TraceLog(Arc<Mutex<TraceLogData>>);

#[derive(Debug, Default)]
struct TraceLogData {
    events: Vec<TraceEvent>,
    closed: usize,
}

impl TraceLog {
    /// Returns a new, empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.0.lock().events.clone()
    }

    /// Returns how many times this log has been closed.
    #[must_use]
    pub fn times_closed(&self) -> usize {
        self.0.lock().closed
    }

    fn push(&self, event: TraceEvent) {
        self.0.lock().events.push(event);
    }
}

impl TraceSink for TraceLog {
    fn on_command(&mut self, depth: usize, command: &str) {
        self.push(TraceEvent::Command {
            depth,
            command: command.to_string(),
        });
    }

    fn on_return(&mut self, depth: usize, command: &str, result: i32) {
        self.push(TraceEvent::Return {
            depth,
            command: command.to_string(),
            result,
        });
    }

    fn on_call(&mut self, depth: usize, function: &FunctionId, size: usize) {
        self.push(TraceEvent::Call {
            depth,
            function: function.to_string(),
            size,
        });
    }

    fn on_error(&mut self, message: &str) {
        self.push(TraceEvent::Error(message.to_string()));
    }

    fn close(&mut self) {
        self.0.lock().closed += 1;
    }
}
