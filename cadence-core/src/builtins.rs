//! Custom executors for returning from frames and calling functions.

use std::sync::Arc;

use crate::chain::ContextChain;
use crate::exec::{
    CallFunction, ChainModifiers, Continuation, CustomCommandExecutor, CustomModifierExecutor,
    ExecutionControl, Fallthrough, InstantiatedFunction,
};
use crate::source::{ExecutionSource, ResultCallback};

/// Returns a fixed value from the current frame.
///
/// The value is reported to the source's callback and the frame's callback,
/// then the frame is rolled back so nothing else in it runs.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ReturnValue(pub i32);

impl<S> CustomCommandExecutor<S> for ReturnValue
where
    S: ExecutionSource,
{
    fn run(
        &self,
        source: &S,
        _chain: &ContextChain<S>,
        _modifiers: ChainModifiers,
        control: &mut ExecutionControl<'_, S>,
    ) {
        source.callback().on_success(self.0);
        control.return_success(self.0);
        control.discard_frame();
    }
}

/// Returns a failure from the current frame.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ReturnFailure;

impl<S> CustomCommandExecutor<S> for ReturnFailure
where
    S: ExecutionSource,
{
    fn run(
        &self,
        source: &S,
        _chain: &ContextChain<S>,
        _modifiers: ChainModifiers,
        control: &mut ExecutionControl<'_, S>,
    ) {
        source.callback().on_failure();
        control.return_failure();
        control.discard_frame();
    }
}

/// Runs the rest of the chain and returns its result from the current frame.
///
/// Work already pending in the frame is rolled back. If no sources remain and
/// an enclosing chain is itself returning, the frame returns a failure.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ReturnRun;

impl<S> CustomModifierExecutor<S> for ReturnRun
where
    S: ExecutionSource,
{
    fn apply(
        &self,
        original_source: &S,
        sources: Vec<S>,
        chain: &ContextChain<S>,
        modifiers: ChainModifiers,
        control: &mut ExecutionControl<'_, S>,
    ) {
        if sources.is_empty() {
            if modifiers.is_return() {
                control.queue_next(Fallthrough);
            }
            return;
        }

        control.discard_frame();
        let Some(next) = chain.next_stage() else {
            return;
        };
        control.queue_next(Continuation::new(
            next,
            original_source.clone(),
            sources,
            modifiers.set_return(),
        ));
    }
}

/// Calls a function for each source the command runs for.
///
/// When the chain returns its value, the function returns into the calling
/// frame: the caller's callback receives the function's result, and a return
/// inside the function also returns from the caller.
pub struct CallFunctionCommand<S> {
    function: InstantiatedFunction<S>,
}

impl<S> CallFunctionCommand<S>
where
    S: ExecutionSource,
{
    /// Returns a command that calls `function`.
    #[must_use]
    pub const fn new(function: InstantiatedFunction<S>) -> Self {
        Self { function }
    }

    /// Returns the function this command calls.
    #[must_use]
    pub const fn function(&self) -> &InstantiatedFunction<S> {
        &self.function
    }
}

impl<S> CustomCommandExecutor<S> for CallFunctionCommand<S>
where
    S: ExecutionSource,
{
    fn run(
        &self,
        source: &S,
        _chain: &ContextChain<S>,
        modifiers: ChainModifiers,
        control: &mut ExecutionControl<'_, S>,
    ) {
        let (callback, return_parent_frame) = if modifiers.is_return() {
            (
                ResultCallback::chain(&source.callback(), &control.frame_callback()),
                true,
            )
        } else {
            (source.callback(), false)
        };
        control.queue_bound(
            Arc::new(CallFunction::new(
                self.function.clone(),
                callback,
                return_parent_frame,
            )),
            source.clone(),
        );
    }
}
