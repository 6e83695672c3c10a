use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use kempt::Map;

use super::{
    ContinuationTask, ExecutionContext, Frame, FrameControl, FrameId, QueueEntry, Unbound,
    UnboundAction, UnboundEntryAction,
};
use crate::chain::ContextChain;
use crate::source::{ExecutionSource, ResultCallback};

/// The name of a function.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FunctionId(Arc<str>);

impl FunctionId {
    /// Returns the name as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FunctionId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for FunctionId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

/// A function body, ready to be bound to a source and called.
pub struct InstantiatedFunction<S> {
    id: FunctionId,
    entries: Arc<[UnboundAction<S>]>,
}

impl<S> InstantiatedFunction<S>
where
    S: ExecutionSource,
{
    /// Returns a function named `id` that runs `entries` in order.
    pub fn new(id: impl Into<FunctionId>, entries: Vec<UnboundAction<S>>) -> Self {
        Self {
            id: id.into(),
            entries: entries.into(),
        }
    }

    /// Returns a function whose lines are the given command chains.
    pub fn from_chains(
        id: impl Into<FunctionId>,
        chains: impl IntoIterator<Item = ContextChain<S>>,
    ) -> Self {
        Self::new(
            id,
            chains
                .into_iter()
                .map(|chain| Arc::new(Unbound::new(chain)) as UnboundAction<S>)
                .collect(),
        )
    }

    /// Returns the name of this function.
    #[must_use]
    pub const fn id(&self) -> &FunctionId {
        &self.id
    }

    /// Returns the lines of this function.
    #[must_use]
    pub fn entries(&self) -> &Arc<[UnboundAction<S>]> {
        &self.entries
    }
}

impl<S> Clone for InstantiatedFunction<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            entries: self.entries.clone(),
        }
    }
}

impl<S> Debug for InstantiatedFunction<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstantiatedFunction")
            .field("id", &self.id)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Calls a function by queueing its body in a new frame.
///
/// The call charges one unit of quota regardless of the body's length. The
/// body's lines each become an entry bound to the calling source, at one
/// depth deeper than the caller.
pub struct CallFunction<S> {
    function: InstantiatedFunction<S>,
    callback: ResultCallback,
    return_parent_frame: bool,
}

impl<S> CallFunction<S>
where
    S: ExecutionSource,
{
    /// Returns an action that calls `function`.
    ///
    /// `callback` receives the value returned from the new frame. When
    /// `return_parent_frame` is true, rolling back the new frame also rolls
    /// back the caller's frame, so a return inside the function returns from
    /// the caller too.
    #[must_use]
    pub const fn new(
        function: InstantiatedFunction<S>,
        callback: ResultCallback,
        return_parent_frame: bool,
    ) -> Self {
        Self {
            function,
            callback,
            return_parent_frame,
        }
    }
}

impl<S> UnboundEntryAction<S> for CallFunction<S>
where
    S: ExecutionSource,
{
    fn execute(&self, sender: S, context: &mut ExecutionContext<S>, frame: FrameId) {
        context.increment_cost();
        let body = self.function.entries();
        let depth = context.frame_depth(frame);
        if let Some(tracer) = context.tracer() {
            tracer.on_call(depth, self.function.id(), body.len());
        }
        trace!(function = %self.function.id(), depth, lines = body.len(), "call");

        if body.is_empty() {
            return;
        }

        let new_depth = depth + 1;
        let control = if self.return_parent_frame {
            context
                .frame(frame)
                .map_or(FrameControl::DiscardFrom(depth), Frame::control)
        } else {
            ExecutionContext::<S>::frame_control_for_depth(new_depth)
        };
        let new_frame = context.push_frame(Frame::new(new_depth, self.callback.clone(), control));
        ContinuationTask::schedule(
            context,
            new_frame,
            body.clone(),
            move |frame, line: UnboundAction<S>| QueueEntry::bind(frame, line, sender.clone()),
        );
    }
}

/// Functions registered by name.
pub struct FunctionLibrary<S> {
    functions: Map<FunctionId, InstantiatedFunction<S>>,
}

impl<S> FunctionLibrary<S>
where
    S: ExecutionSource,
{
    /// Returns an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self {
            functions: Map::new(),
        }
    }

    /// Registers `function`, returning the function it replaced.
    pub fn register(
        &mut self,
        function: InstantiatedFunction<S>,
    ) -> Option<InstantiatedFunction<S>> {
        self.functions
            .insert(function.id().clone(), function)
            .map(|field| field.value)
    }

    /// Returns the function named `id`.
    #[must_use]
    pub fn get(&self, id: &FunctionId) -> Option<&InstantiatedFunction<S>> {
        self.functions.get(id)
    }

    /// Returns the number of registered functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns true if no functions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Returns an iterator over the registered functions, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &InstantiatedFunction<S>> {
        self.functions.iter().map(|field| &field.value)
    }
}

impl<S> Default for FunctionLibrary<S>
where
    S: ExecutionSource,
{
    fn default() -> Self {
        Self::new()
    }
}
