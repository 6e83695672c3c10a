use std::sync::Arc;

use super::{
    ChainModifiers, ContinuationTask, EntryAction, ExecuteCommand, ExecutionContext,
    ExecutionControl, FrameId, QueueEntry, UnboundAction, UnboundEntryAction,
};
use crate::chain::{ContextChain, Executable, Redirect, Stage};
use crate::error::CommandError;
use crate::source::{ExecutionSource, ResultCallback};

/// Resolves the stages of a [`ContextChain`] and schedules its execution.
///
/// Redirect stages are applied one after another to the current list of
/// sources. A forking modifier may multiply the sources, bounded by the
/// context's fork limit. Once the terminal stage is reached, one
/// [`ExecuteCommand`] is scheduled per remaining source.
pub struct BuildContexts<S> {
    chain: ContextChain<S>,
}

impl<S> BuildContexts<S>
where
    S: ExecutionSource,
{
    /// Returns a resolver for `chain`, starting at its current stage.
    #[must_use]
    pub const fn new(chain: ContextChain<S>) -> Self {
        Self { chain }
    }

    /// Returns the chain being resolved.
    #[must_use]
    pub const fn chain(&self) -> &ContextChain<S> {
        &self.chain
    }

    fn trace_command_start(&self, context: &mut ExecutionContext<S>, frame: FrameId) {
        let depth = context.frame_depth(frame);
        if let Some(tracer) = context.tracer() {
            tracer.on_command(depth, self.chain.input());
        }
    }

    /// Resolves the chain for `sources` and schedules the terminal command.
    ///
    /// `original_source` receives errors that concern the whole fork step
    /// rather than one source.
    pub fn execute(
        &self,
        original_source: &S,
        sources: Vec<S>,
        context: &mut ExecutionContext<S>,
        frame: FrameId,
        modifiers: ChainModifiers,
    ) {
        let (chain, mut sources, modifiers) = if self.chain.is_terminal() {
            (self.chain.clone(), sources, modifiers)
        } else {
            context.push_profiler_scope(|| format!("prepare {}", self.chain.input()));
            let prepared = self.prepare(original_source, sources, context, frame, modifiers);
            context.pop_profiler_scope();
            match prepared {
                Some(prepared) => prepared,
                None => return,
            }
        };

        if sources.is_empty() {
            if modifiers.is_return() {
                context.queue_next(QueueEntry::new(frame, Fallthrough));
            }
            return;
        }

        let custom = match chain.stage() {
            Stage::Execute(Executable::Custom(executor)) => Some(executor.clone()),
            Stage::Execute(Executable::Command(_)) => None,
            Stage::Modify { .. } => return,
        };

        if let Some(executor) = custom {
            for source in &sources {
                executor.run(
                    source,
                    &chain,
                    modifiers,
                    &mut ExecutionControl::new(context, frame),
                );
            }
            return;
        }

        if modifiers.is_return() {
            // Only the first source's result is returned to the frame.
            let first = &sources[0];
            let rebound = first.with_callback(ResultCallback::chain(
                &first.callback(),
                &context.frame_callback(frame),
            ));
            sources[0] = rebound;
        }

        let action: UnboundAction<S> = Arc::new(ExecuteCommand::new(chain, modifiers));
        ContinuationTask::schedule(context, frame, sources, move |frame, source: S| {
            QueueEntry::bind(frame, action.clone(), source)
        });
    }

    /// Walks the redirect stages. Returns `None` if resolution was aborted or
    /// handed to a custom modifier.
    fn prepare(
        &self,
        original_source: &S,
        mut sources: Vec<S>,
        context: &mut ExecutionContext<S>,
        frame: FrameId,
        mut modifiers: ChainModifiers,
    ) -> Option<(ContextChain<S>, Vec<S>, ChainModifiers)> {
        let fork_limit = context.fork_limit();
        let mut stage = self.chain.clone();
        while !stage.is_terminal() {
            if stage.is_forked() {
                modifiers = modifiers.set_forked();
            }

            match stage.stage() {
                Stage::Modify {
                    redirect: Redirect::Custom(custom),
                    ..
                } => {
                    let custom = custom.clone();
                    custom.apply(
                        original_source,
                        sources,
                        &stage,
                        modifiers,
                        &mut ExecutionControl::new(context, frame),
                    );
                    return None;
                }
                Stage::Modify {
                    redirect: Redirect::Modifier(_),
                    ..
                } => {
                    context.increment_cost();
                    let forked = modifiers.is_forked();
                    let mut next_sources = Vec::new();
                    for source in &sources {
                        match stage.run_modifier(source) {
                            Ok(new_sources) => {
                                if next_sources.len() + new_sources.len() >= fork_limit {
                                    trace!(limit = fork_limit, "fork limit reached");
                                    original_source.handle_error(
                                        &CommandError::ForkLimitReached { limit: fork_limit },
                                        forked,
                                        context.tracer(),
                                    );
                                    return None;
                                }
                                next_sources.extend(new_sources);
                            }
                            Err(err) => {
                                source.handle_error(&err, forked, context.tracer());
                                if !forked {
                                    return None;
                                }
                            }
                        }
                    }
                    sources = next_sources;
                }
                Stage::Modify {
                    redirect: Redirect::Passthrough,
                    ..
                }
                | Stage::Execute(_) => {}
            }

            stage = stage.next_stage()?;
        }

        Some((stage, sources, modifiers))
    }
}

/// The first command submitted to a context.
pub struct TopLevel<S> {
    build: BuildContexts<S>,
    source: S,
}

impl<S> TopLevel<S>
where
    S: ExecutionSource,
{
    /// Returns an action that resolves `chain` for `source`.
    #[must_use]
    pub const fn new(chain: ContextChain<S>, source: S) -> Self {
        Self {
            build: BuildContexts::new(chain),
            source,
        }
    }
}

impl<S> EntryAction<S> for TopLevel<S>
where
    S: ExecutionSource,
{
    fn execute(self: Box<Self>, context: &mut ExecutionContext<S>, frame: FrameId) {
        self.build.trace_command_start(context, frame);
        self.build.execute(
            &self.source,
            vec![self.source.clone()],
            context,
            frame,
            ChainModifiers::DEFAULT,
        );
    }
}

/// Resumes resolving a chain part way through.
///
/// Custom modifiers queue a continuation to hand control back to the builtin
/// resolution once they have produced their sources.
pub struct Continuation<S> {
    build: BuildContexts<S>,
    modifiers: ChainModifiers,
    original_source: S,
    sources: Vec<S>,
}

impl<S> Continuation<S>
where
    S: ExecutionSource,
{
    /// Returns an action that resolves `chain` for `sources`.
    #[must_use]
    pub const fn new(
        chain: ContextChain<S>,
        original_source: S,
        sources: Vec<S>,
        modifiers: ChainModifiers,
    ) -> Self {
        Self {
            build: BuildContexts::new(chain),
            modifiers,
            original_source,
            sources,
        }
    }
}

impl<S> EntryAction<S> for Continuation<S>
where
    S: ExecutionSource,
{
    fn execute(self: Box<Self>, context: &mut ExecutionContext<S>, frame: FrameId) {
        let Self {
            build,
            modifiers,
            original_source,
            sources,
        } = *self;
        build.execute(&original_source, sources, context, frame, modifiers);
    }
}

/// One line of a function body.
pub struct Unbound<S> {
    build: BuildContexts<S>,
}

impl<S> Unbound<S>
where
    S: ExecutionSource,
{
    /// Returns an action that resolves `chain` for whichever source it is
    /// bound to.
    #[must_use]
    pub const fn new(chain: ContextChain<S>) -> Self {
        Self {
            build: BuildContexts::new(chain),
        }
    }
}

impl<S> UnboundEntryAction<S> for Unbound<S>
where
    S: ExecutionSource,
{
    fn execute(&self, source: S, context: &mut ExecutionContext<S>, frame: FrameId) {
        self.build.trace_command_start(context, frame);
        self.build.execute(
            &source,
            vec![source.clone()],
            context,
            frame,
            ChainModifiers::DEFAULT,
        );
    }
}

/// Returns a failure to its frame and rolls the frame back.
///
/// Queued when a returning chain ends up with no sources, so the enclosing
/// frame still receives a result.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fallthrough;

impl<S> EntryAction<S> for Fallthrough
where
    S: ExecutionSource,
{
    fn execute(self: Box<Self>, context: &mut ExecutionContext<S>, frame: FrameId) {
        context.frame_callback(frame).on_failure();
        context.discard(frame);
    }
}
