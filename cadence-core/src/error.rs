//! Errors raised while resolving or executing a command chain.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Summarizes an error's kind.
pub trait ErrorKind {
    /// Returns the summary of the error being raised.
    fn kind(&self) -> &'static str;
}

/// A recoverable failure of a single command source.
///
/// Command errors never escape
/// [`run_command_queue`](crate::exec::ExecutionContext::run_command_queue).
/// They are reported through
/// [`ExecutionSource::handle_error`](crate::source::ExecutionSource::handle_error),
/// and whether sibling sources keep running depends on whether the chain is
/// forked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CommandError {
    /// A redirect modifier or command rejected its source.
    Failed(String),
    /// A single fork step produced at least `limit` sources.
    ForkLimitReached {
        /// The configured fork limit.
        limit: usize,
    },
    /// A custom executor was invoked through the builtin execution path.
    Unsupported,
}

impl CommandError {
    /// Returns a [`CommandError::Failed`] with `message`.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl ErrorKind for CommandError {
    fn kind(&self) -> &'static str {
        match self {
            CommandError::Failed(_) => "failed",
            CommandError::ForkLimitReached { .. } => "fork_limit",
            CommandError::Unsupported => "unsupported",
        }
    }
}

impl Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Failed(message) => f.write_str(message),
            CommandError::ForkLimitReached { limit } => {
                write!(f, "maximum number of contexts ({limit}) reached")
            }
            CommandError::Unsupported => f.write_str("operation is not supported"),
        }
    }
}

impl std::error::Error for CommandError {}
