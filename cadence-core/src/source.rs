//! Execution sources and the result callbacks they carry.

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::error::CommandError;
use crate::trace::TraceSink;

/// Receives the outcome of a command or a frame.
///
/// A callback is cheap to clone and may be empty. Chaining two callbacks with
/// [`ResultCallback::chain`] produces a callback that notifies both, in
/// order.
#[derive(Clone, Default)]
pub struct ResultCallback(Option<Arc<dyn Fn(bool, i32) + Send + Sync>>);

impl ResultCallback {
    /// A callback that ignores every result.
    pub const EMPTY: Self = Self(None);

    /// Returns a callback that invokes `callback` with `(success, value)`.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(bool, i32) + Send + Sync + 'static,
    {
        Self(Some(Arc::new(callback)))
    }

    /// Returns a callback that invokes `first` and then `second`.
    #[must_use]
    pub fn chain(first: &Self, second: &Self) -> Self {
        match (&first.0, &second.0) {
            (None, None) => Self::EMPTY,
            (Some(_), None) => first.clone(),
            (None, Some(_)) => second.clone(),
            (Some(a), Some(b)) => {
                let (a, b) = (a.clone(), b.clone());
                Self::new(move |success, value| {
                    a(success, value);
                    b(success, value);
                })
            }
        }
    }

    /// Returns true if this callback ignores every result.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Reports `(success, value)`.
    pub fn on_result(&self, success: bool, value: i32) {
        if let Some(callback) = &self.0 {
            callback(success, value);
        }
    }

    /// Reports a successful result of `value`.
    pub fn on_success(&self, value: i32) {
        self.on_result(true, value);
    }

    /// Reports a failure.
    pub fn on_failure(&self) {
        self.on_result(false, 0);
    }
}

impl Debug for ResultCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResultCallback")
            .field(&if self.is_empty() { "empty" } else { "set" })
            .finish()
    }
}

/// The subject a command chain is resolved and executed against.
///
/// Forking multiplies sources: each redirect modifier maps one source to zero
/// or more new sources. Sources are cloned freely, so implementors should
/// keep them cheap to clone.
pub trait ExecutionSource: Clone + 'static {
    /// Returns the callback notified when a command run by this source
    /// completes.
    fn callback(&self) -> ResultCallback;

    /// Returns a copy of this source that reports to `callback` instead.
    #[must_use]
    fn with_callback(&self, callback: ResultCallback) -> Self;

    /// Presents `error` raised while running a command for this source.
    ///
    /// `forked` is true when the failing chain is forked, in which case
    /// sibling sources keep running and implementors may want to present the
    /// error less prominently.
    fn handle_error(&self, error: &CommandError, forked: bool, tracer: Option<&mut dyn TraceSink>);
}
