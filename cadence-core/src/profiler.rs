//! Named timing scopes around chain resolution and command execution.

use std::time::Instant;

/// Receives nested, named scopes.
///
/// Every [`push`](Self::push) is matched by exactly one [`pop`](Self::pop).
/// Scope names are only built when [`is_active`](Self::is_active) returns
/// true.
pub trait Profiler {
    /// Returns true if this profiler records scopes.
    fn is_active(&self) -> bool;
    /// Enters a scope named `name`.
    fn push(&mut self, name: String);
    /// Leaves the most recently entered scope.
    fn pop(&mut self);
}

/// A profiler that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfiler;

impl Profiler for NoopProfiler {
    fn is_active(&self) -> bool {
        false
    }

    fn push(&mut self, _name: String) {}

    fn pop(&mut self) {}
}

/// A profiler that logs the duration of each scope at the trace level.
#[derive(Debug, Default)]
pub struct LoggingProfiler {
    scopes: Vec<(String, Instant)>,
}

impl LoggingProfiler {
    /// Returns a new profiler with no open scopes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of scopes currently open.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Profiler for LoggingProfiler {
    fn is_active(&self) -> bool {
        true
    }

    fn push(&mut self, name: String) {
        self.scopes.push((name, Instant::now()));
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn pop(&mut self) {
        if let Some((name, started)) = self.scopes.pop() {
            let elapsed = started.elapsed();
            trace!(scope = %name, depth = self.scopes.len(), ?elapsed, "profiled");
        }
    }
}
