use super::{ChainModifiers, ExecutionControl};
use crate::chain::ContextChain;
use crate::error::CommandError;
use crate::source::ExecutionSource;

/// A terminal command that takes over scheduling for its source.
///
/// Unlike a plain [`Command`](crate::chain::Command), a custom executor is not
/// charged automatically and does not report a result on its own. It receives
/// an [`ExecutionControl`] scoped to the current frame and is free to queue
/// further work, return from the frame, or roll it back.
pub trait CustomCommandExecutor<S>: 'static {
    /// Runs the command for `source`.
    fn run(
        &self,
        source: &S,
        chain: &ContextChain<S>,
        modifiers: ChainModifiers,
        control: &mut ExecutionControl<'_, S>,
    );
}

impl<S, F> CustomCommandExecutor<S> for F
where
    F: Fn(&S, &ContextChain<S>, ChainModifiers, &mut ExecutionControl<'_, S>) + 'static,
{
    fn run(
        &self,
        source: &S,
        chain: &ContextChain<S>,
        modifiers: ChainModifiers,
        control: &mut ExecutionControl<'_, S>,
    ) {
        self(source, chain, modifiers, control);
    }
}

/// A redirect stage that takes over resolution of the rest of its chain.
///
/// `chain` is positioned at the custom stage itself. The modifier is expected
/// to queue a [`Continuation`](super::Continuation) for
/// [`chain.next_stage()`](ContextChain::next_stage) once it has produced its
/// sources. If it queues nothing, resolution ends here.
pub trait CustomModifierExecutor<S>: 'static {
    /// Applies the modifier to `sources`.
    fn apply(
        &self,
        original_source: &S,
        sources: Vec<S>,
        chain: &ContextChain<S>,
        modifiers: ChainModifiers,
        control: &mut ExecutionControl<'_, S>,
    );
}

impl<S, F> CustomModifierExecutor<S> for F
where
    F: Fn(&S, Vec<S>, &ContextChain<S>, ChainModifiers, &mut ExecutionControl<'_, S>) + 'static,
{
    fn apply(
        &self,
        original_source: &S,
        sources: Vec<S>,
        chain: &ContextChain<S>,
        modifiers: ChainModifiers,
        control: &mut ExecutionControl<'_, S>,
    ) {
        self(original_source, sources, chain, modifiers, control);
    }
}

/// A custom command that can fail.
///
/// Wrap an implementation in [`Guarded`] to use it as a
/// [`CustomCommandExecutor`].
pub trait GuardedCommandExecutor<S>: 'static {
    /// Runs the command for `source`.
    ///
    /// # Errors
    ///
    /// Errors are reported to `source` and its callback receives a failure.
    fn run_guarded(
        &self,
        source: &S,
        chain: &ContextChain<S>,
        modifiers: ChainModifiers,
        control: &mut ExecutionControl<'_, S>,
    ) -> Result<(), CommandError>;
}

/// Adapts a [`GuardedCommandExecutor`] into a [`CustomCommandExecutor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Guarded<E>(pub E);

impl<S, E> CustomCommandExecutor<S> for Guarded<E>
where
    S: ExecutionSource,
    E: GuardedCommandExecutor<S>,
{
    fn run(
        &self,
        source: &S,
        chain: &ContextChain<S>,
        modifiers: ChainModifiers,
        control: &mut ExecutionControl<'_, S>,
    ) {
        if let Err(err) = self.0.run_guarded(source, chain, modifiers, control) {
            source.handle_error(&err, modifiers.is_forked(), control.tracer());
            source.callback().on_failure();
        }
    }
}
