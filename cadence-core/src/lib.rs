//! A cooperative scheduler that executes resolved command chains.
//!
//! Cadence consumes [`ContextChain`](chain::ContextChain)s produced by a
//! command grammar and runs them inside an
//! [`ExecutionContext`](exec::ExecutionContext). Forks, function calls and
//! nested invocations never grow the native call stack: every unit of work is
//! a [`QueueEntry`](exec::QueueEntry) that the context pops, executes and
//! accounts for against its quota.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`ExecutionContext`](exec::ExecutionContext) | Owns the queue, quota and fork limit, and drives the run loop. |
//! | [`Frame`](exec::Frame) | A depth-scoped result callback and rollback scope. |
//! | [`ContextChain`](chain::ContextChain) | The stages of one parsed command. |
//! | [`ExecutionSource`](source::ExecutionSource) | The subject a command runs against. |
//! | [`TraceSink`](trace::TraceSink) | Observes commands, calls and returns. |

#[cfg(feature = "tracing")]
#[macro_use]
extern crate tracing;
#[cfg(not(feature = "tracing"))]
#[macro_use]
mod mock_tracing;

pub mod builtins;
pub mod chain;
pub mod error;
pub mod exec;
pub mod profiler;
pub mod source;
pub mod trace;


pub use error::{CommandError, ErrorKind};
