//! The command execution scheduler.
//!
//! An [`ExecutionContext`] runs one root invocation, a command or a function,
//! and everything it spawns. Work is expressed as [`QueueEntry`]s rather than
//! native recursion:
//!
//! - [`BuildContexts`] resolves the stages of a
//!   [`ContextChain`](crate::chain::ContextChain), forking sources as
//!   modifiers require.
//! - [`ExecuteCommand`] runs a terminal command for one source.
//! - [`CallFunction`] inlines a function body as a new, deeper [`Frame`].
//! - [`ContinuationTask`] fans a list of arguments out one queue pop at a
//!   time.
//!
//! Entries produced while one entry executes run as a batch, in the order
//! they were queued, before anything that was already pending.

use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

mod build;
mod command;
mod continuation;
mod custom;
mod frame;
mod function;
mod modifiers;

pub use self::build::{BuildContexts, Continuation, Fallthrough, TopLevel, Unbound};
pub use self::command::ExecuteCommand;
pub use self::continuation::ContinuationTask;
pub use self::custom::{
    CustomCommandExecutor, CustomModifierExecutor, Guarded, GuardedCommandExecutor,
};
pub use self::frame::{Frame, FrameControl, FrameId};
use self::frame::FrameArena;
pub use self::function::{CallFunction, FunctionId, FunctionLibrary, InstantiatedFunction};
pub use self::modifiers::ChainModifiers;
use crate::chain::ContextChain;
use crate::profiler::{NoopProfiler, Profiler};
use crate::source::{ExecutionSource, ResultCallback};
use crate::trace::TraceSink;

/// Limits applied to one [`ExecutionContext`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// The number of billable units the context may charge before the run
    /// loop stops.
    pub command_limit: usize,
    /// A single fork step fails once it produces this many sources.
    pub fork_limit: usize,
    /// The number of queued entries beyond which the context overflows.
    pub max_queue_depth: usize,
}

impl ExecutionConfig {
    /// The default for [`command_limit`](Self::command_limit).
    pub const DEFAULT_COMMAND_LIMIT: usize = 65_536;
    /// The default for [`fork_limit`](Self::fork_limit).
    pub const DEFAULT_FORK_LIMIT: usize = 65_536;
    /// The default for [`max_queue_depth`](Self::max_queue_depth).
    pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 10_000_000;

    /// Returns the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            command_limit: Self::DEFAULT_COMMAND_LIMIT,
            fork_limit: Self::DEFAULT_FORK_LIMIT,
            max_queue_depth: Self::DEFAULT_MAX_QUEUE_DEPTH,
        }
    }

    /// Sets the command limit and returns self.
    #[must_use]
    pub const fn with_command_limit(mut self, limit: usize) -> Self {
        self.command_limit = limit;
        self
    }

    /// Sets the fork limit and returns self.
    #[must_use]
    pub const fn with_fork_limit(mut self, limit: usize) -> Self {
        self.fork_limit = limit;
        self
    }

    /// Sets the queue ceiling and returns self.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Quota(isize);

impl Quota {
    fn new(limit: usize) -> Self {
        Self(isize::try_from(limit).unwrap_or(isize::MAX))
    }

    fn charge(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    const fn is_exhausted(self) -> bool {
        self.0 <= 0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum QueueState {
    Running,
    Overflowed,
}

/// Why [`ExecutionContext::run_command_queue`] returned.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The queue was drained.
    Completed,
    /// The command quota ran out. Pending work was left in the queue.
    QuotaExhausted,
    /// The queue exceeded its ceiling and was cleared.
    Overflowed,
}

/// Work that is ready to run.
pub trait EntryAction<S>: 'static {
    /// Runs this action as part of `frame`.
    fn execute(self: Box<Self>, context: &mut ExecutionContext<S>, frame: FrameId);
}

impl<S, F> EntryAction<S> for F
where
    F: FnOnce(&mut ExecutionContext<S>, FrameId) + 'static,
{
    fn execute(self: Box<Self>, context: &mut ExecutionContext<S>, frame: FrameId) {
        self(context, frame);
    }
}

/// Reusable work that needs a source to run against, such as one line of a
/// function body.
pub trait UnboundEntryAction<S>: 'static {
    /// Runs this action for `source` as part of `frame`.
    fn execute(&self, source: S, context: &mut ExecutionContext<S>, frame: FrameId);
}

impl<S, F> UnboundEntryAction<S> for F
where
    F: Fn(S, &mut ExecutionContext<S>, FrameId) + 'static,
{
    fn execute(&self, source: S, context: &mut ExecutionContext<S>, frame: FrameId) {
        self(source, context, frame);
    }
}

/// A shared [`UnboundEntryAction`].
pub type UnboundAction<S> = Arc<dyn UnboundEntryAction<S>>;

/// The work a [`QueueEntry`] runs.
pub enum Action<S> {
    /// Work that needs no source, or already owns the one it needs.
    Bound(Box<dyn EntryAction<S>>),
    /// Reusable work paired with the source it will run against.
    Unbound {
        /// The work to run.
        action: UnboundAction<S>,
        /// The source to run it against.
        source: S,
    },
}

/// A unit of scheduled work and the frame it belongs to.
pub struct QueueEntry<S> {
    frame: FrameId,
    action: Action<S>,
}

impl<S> QueueEntry<S>
where
    S: ExecutionSource,
{
    /// Returns an entry that runs `action` in `frame`.
    pub fn new(frame: FrameId, action: impl EntryAction<S>) -> Self {
        Self {
            frame,
            action: Action::Bound(Box::new(action)),
        }
    }

    /// Returns an entry that runs `action` for `source` in `frame`.
    pub fn bind(frame: FrameId, action: UnboundAction<S>, source: S) -> Self {
        Self {
            frame,
            action: Action::Unbound { action, source },
        }
    }

    /// Returns the frame this entry belongs to.
    #[must_use]
    pub const fn frame(&self) -> FrameId {
        self.frame
    }

    /// Returns this entry's work.
    #[must_use]
    pub const fn action(&self) -> &Action<S> {
        &self.action
    }

    fn execute(self, context: &mut ExecutionContext<S>) {
        match self.action {
            Action::Bound(action) => action.execute(context, self.frame),
            Action::Unbound { action, source } => action.execute(source, context, self.frame),
        }
    }
}

impl<S> Debug for QueueEntry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("frame", &self.frame)
            .field(
                "action",
                &match self.action {
                    Action::Bound(_) => "bound",
                    Action::Unbound { .. } => "unbound",
                },
            )
            .finish()
    }
}

struct Queued<S> {
    depth: usize,
    entry: QueueEntry<S>,
}

/// The scheduler for one root invocation.
///
/// An execution context owns the queue of pending work and the budget it may
/// spend. Seed it with
/// [`queue_initial_command_execution`](Self::queue_initial_command_execution)
/// or [`queue_initial_function_call`](Self::queue_initial_function_call),
/// then drain it with [`run_command_queue`](Self::run_command_queue).
///
/// The installed [`TraceSink`], if any, is closed when the context is
/// dropped.
pub struct ExecutionContext<S> {
    config: ExecutionConfig,
    quota: Quota,
    state: QueueState,
    pending: VecDeque<Queued<S>>,
    staging: Vec<Queued<S>>,
    current_depth: usize,
    frames: FrameArena,
    tracer: Option<Box<dyn TraceSink>>,
    profiler: Box<dyn Profiler>,
}

impl<S> ExecutionContext<S>
where
    S: ExecutionSource,
{
    /// Returns a new context limited by `config`.
    #[must_use]
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            quota: Quota::new(config.command_limit),
            state: QueueState::Running,
            pending: VecDeque::new(),
            staging: Vec::new(),
            current_depth: 0,
            frames: FrameArena::default(),
            tracer: None,
            profiler: Box::new(NoopProfiler),
        }
    }

    /// Replaces the profiler and returns self.
    #[must_use]
    pub fn with_profiler(mut self, profiler: impl Profiler + 'static) -> Self {
        self.profiler = Box::new(profiler);
        self
    }

    /// Returns the configuration this context was created with.
    #[must_use]
    pub const fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Returns the maximum number of sources a single fork step may produce.
    #[must_use]
    pub const fn fork_limit(&self) -> usize {
        self.config.fork_limit
    }

    /// Returns the remaining command quota.
    ///
    /// This is the command limit minus the number of
    /// [`increment_cost`](Self::increment_cost) calls, and may be negative.
    #[must_use]
    pub const fn command_quota(&self) -> isize {
        self.quota.0
    }

    /// Returns true if the queue has overflowed.
    #[must_use]
    pub fn is_overflowed(&self) -> bool {
        self.state == QueueState::Overflowed
    }

    /// Returns the depth of the entry currently executing.
    #[must_use]
    pub const fn current_depth(&self) -> usize {
        self.current_depth
    }

    /// Returns the number of entries waiting to run, including entries queued
    /// by the entry currently executing.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.pending.len() + self.staging.len()
    }

    /// Returns the number of live frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns the frame for `id`, if it is still referenced.
    #[must_use]
    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id)
    }

    /// Returns the depth of `id`, or the current depth if it was released.
    #[must_use]
    pub fn frame_depth(&self, id: FrameId) -> usize {
        self.frames.get(id).map_or(self.current_depth, Frame::depth)
    }

    /// Returns the return callback of `id`.
    #[must_use]
    pub fn frame_callback(&self, id: FrameId) -> ResultCallback {
        self.frames
            .get(id)
            .map_or(ResultCallback::EMPTY, |frame| frame.return_callback().clone())
    }

    /// Registers `frame` with this context.
    ///
    /// The frame is released once no queued entry references it, or at the
    /// end of the current step if nothing was queued for it.
    pub fn push_frame(&mut self, frame: Frame) -> FrameId {
        self.frames.insert(frame)
    }

    /// Returns a rollback scope that discards work at `depth` or deeper.
    #[must_use]
    pub const fn frame_control_for_depth(depth: usize) -> FrameControl {
        FrameControl::DiscardFrom(depth)
    }

    /// Queues `chain` to run for `source` as a new top-level command.
    ///
    /// `callback` receives the value returned to the new frame.
    pub fn queue_initial_command_execution(
        &mut self,
        chain: ContextChain<S>,
        source: S,
        callback: ResultCallback,
    ) {
        let frame = self.create_top_frame(callback);
        self.queue_next(QueueEntry::new(frame, TopLevel::new(chain, source)));
    }

    /// Queues a call to `function` for `source` as a new top-level call.
    ///
    /// `callback` receives the value returned to the new top frame, as well as
    /// the value the function itself returns.
    pub fn queue_initial_function_call(
        &mut self,
        function: &InstantiatedFunction<S>,
        source: S,
        callback: ResultCallback,
    ) {
        let call = CallFunction::new(
            function.clone(),
            ResultCallback::chain(&source.callback(), &callback),
            false,
        );
        let frame = self.create_top_frame(callback);
        self.queue_next(QueueEntry::bind(frame, Arc::new(call), source));
    }

    fn create_top_frame(&mut self, callback: ResultCallback) -> FrameId {
        let frame = if self.current_depth == 0 {
            Frame::new(0, callback, FrameControl::ClearAll)
        } else {
            let depth = self.current_depth + 1;
            Frame::new(depth, callback, Self::frame_control_for_depth(depth))
        };
        self.push_frame(frame)
    }

    /// Queues `entry` to run after the current entry completes.
    ///
    /// Entries queued during one step run in the order they were queued, ahead
    /// of all previously pending work. Once the queue has overflowed, new
    /// entries are dropped.
    pub fn queue_next(&mut self, entry: QueueEntry<S>) {
        if self.staging.len() + self.pending.len() > self.config.max_queue_depth {
            self.overflow();
        }

        if self.state == QueueState::Overflowed {
            return;
        }

        let Some(depth) = self.frames.retain(entry.frame) else {
            warn!(frame = ?entry.frame, "dropping entry queued for a released frame");
            return;
        };
        self.staging.push(Queued { depth, entry });
    }

    fn overflow(&mut self) {
        self.state = QueueState::Overflowed;
        for queued in self.staging.drain(..).chain(self.pending.drain(..)) {
            self.frames.release(queued.entry.frame);
        }
    }

    /// Discards pending entries from the front of the queue while their frame
    /// is at `depth` or deeper.
    ///
    /// Pruning stops at the first shallower entry. Work queued by a frame
    /// always sits ahead of its parent's remaining work, so this removes the
    /// frame's descendants without scanning the rest of the queue.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn discard_at_depth_or_higher(&mut self, depth: usize) {
        let mut discarded = 0_usize;
        while let Some(queued) = self.pending.pop_front() {
            if queued.depth < depth {
                self.pending.push_front(queued);
                break;
            }
            self.frames.release(queued.entry.frame);
            discarded += 1;
        }
        trace!(depth, discarded, "discarded");
    }

    /// Rolls back `frame`, discarding pending work in its scope.
    pub fn discard(&mut self, frame: FrameId) {
        let control = self
            .frames
            .get(frame)
            .map_or(FrameControl::DiscardFrom(self.current_depth), Frame::control);
        self.apply_control(control);
    }

    fn apply_control(&mut self, control: FrameControl) {
        match control {
            FrameControl::ClearAll => {
                for queued in self.pending.drain(..) {
                    self.frames.release(queued.entry.frame);
                }
            }
            FrameControl::DiscardFrom(depth) => self.discard_at_depth_or_higher(depth),
        }
    }

    /// Charges one billable unit against the command quota.
    pub fn increment_cost(&mut self) {
        self.quota.charge();
    }

    /// Returns the installed trace sink.
    pub fn tracer(&mut self) -> Option<&mut dyn TraceSink> {
        match &mut self.tracer {
            Some(tracer) => Some(tracer.as_mut()),
            None => None,
        }
    }

    /// Installs `tracer`, returning the previously installed sink.
    ///
    /// The returned sink is not closed.
    pub fn set_tracer(
        &mut self,
        tracer: Option<Box<dyn TraceSink>>,
    ) -> Option<Box<dyn TraceSink>> {
        std::mem::replace(&mut self.tracer, tracer)
    }

    pub(crate) fn push_profiler_scope(&mut self, name: impl FnOnce() -> String) {
        if self.profiler.is_active() {
            self.profiler.push(name());
        }
    }

    pub(crate) fn pop_profiler_scope(&mut self) {
        if self.profiler.is_active() {
            self.profiler.pop();
        }
    }

    /// Runs queued work until the queue is empty, the quota is exhausted, or
    /// the queue overflows.
    pub fn run_command_queue(&mut self) -> RunOutcome {
        self.push_new_commands();
        let outcome = loop {
            if self.quota.is_exhausted() {
                info!(
                    limit = self.config.command_limit,
                    "command execution stopped due to limit"
                );
                break RunOutcome::QuotaExhausted;
            }

            let Some(Queued { depth, entry }) = self.pending.pop_front() else {
                break RunOutcome::Completed;
            };
            self.current_depth = depth;
            let frame = entry.frame;
            entry.execute(self);
            self.frames.release(frame);
            self.frames.sweep();

            if self.state == QueueState::Overflowed {
                error!(
                    max = self.config.max_queue_depth,
                    "command execution stopped due to command queue overflow"
                );
                break RunOutcome::Overflowed;
            }

            self.push_new_commands();
        };
        self.current_depth = 0;
        outcome
    }

    fn push_new_commands(&mut self) {
        for queued in self.staging.drain(..).rev() {
            self.pending.push_front(queued);
        }
    }

    /// Finishes this context, closing its trace sink.
    pub fn close(self) {
        drop(self);
    }
}

impl<S> Drop for ExecutionContext<S> {
    fn drop(&mut self) {
        if let Some(mut tracer) = self.tracer.take() {
            tracer.close();
        }
    }
}

impl<S> Debug for ExecutionContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("config", &self.config)
            .field("quota", &self.quota.0)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("staging", &self.staging.len())
            .field("current_depth", &self.current_depth)
            .finish_non_exhaustive()
    }
}

/// The view of an [`ExecutionContext`] given to custom executors.
///
/// Work queued through a control belongs to the frame the control was created
/// for.
pub struct ExecutionControl<'a, S> {
    context: &'a mut ExecutionContext<S>,
    frame: FrameId,
}

impl<'a, S> ExecutionControl<'a, S>
where
    S: ExecutionSource,
{
    /// Returns a control that queues work into `frame`.
    pub fn new(context: &'a mut ExecutionContext<S>, frame: FrameId) -> Self {
        Self { context, frame }
    }

    /// Queues `action` to run in the current frame.
    pub fn queue_next(&mut self, action: impl EntryAction<S>) {
        self.context.queue_next(QueueEntry::new(self.frame, action));
    }

    /// Queues `action` to run for `source` in the current frame.
    pub fn queue_bound(&mut self, action: UnboundAction<S>, source: S) {
        self.context.queue_next(QueueEntry::bind(self.frame, action, source));
    }

    /// Returns the installed trace sink.
    pub fn tracer(&mut self) -> Option<&mut dyn TraceSink> {
        self.context.tracer()
    }

    /// Returns the id of the current frame.
    #[must_use]
    pub const fn current_frame(&self) -> FrameId {
        self.frame
    }

    /// Returns the depth of the current frame.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.context.frame_depth(self.frame)
    }

    /// Returns the current frame's return callback.
    #[must_use]
    pub fn frame_callback(&self) -> ResultCallback {
        self.context.frame_callback(self.frame)
    }

    /// Returns `value` from the current frame.
    pub fn return_success(&self, value: i32) {
        self.frame_callback().on_success(value);
    }

    /// Returns a failure from the current frame.
    pub fn return_failure(&self) {
        self.frame_callback().on_failure();
    }

    /// Rolls back the current frame.
    pub fn discard_frame(&mut self) {
        self.context.discard(self.frame);
    }

    /// Charges one billable unit against the command quota.
    pub fn increment_cost(&mut self) {
        self.context.increment_cost();
    }

    /// Returns the maximum number of sources a single fork step may produce.
    #[must_use]
    pub fn fork_limit(&self) -> usize {
        self.context.fork_limit()
    }
}
