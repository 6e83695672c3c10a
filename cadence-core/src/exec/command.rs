use super::{ChainModifiers, ExecutionContext, FrameId, UnboundEntryAction};
use crate::chain::ContextChain;
use crate::source::ExecutionSource;

/// Runs the terminal stage of a chain for one source.
///
/// Each execution charges one unit of quota. The result is reported to the
/// source's callback and, when tracing, to the trace sink. Failures are
/// presented through the source's error handler.
pub struct ExecuteCommand<S> {
    chain: ContextChain<S>,
    modifiers: ChainModifiers,
}

impl<S> ExecuteCommand<S>
where
    S: ExecutionSource,
{
    /// Returns an action that runs `chain`'s terminal stage.
    #[must_use]
    pub const fn new(chain: ContextChain<S>, modifiers: ChainModifiers) -> Self {
        Self { chain, modifiers }
    }
}

impl<S> UnboundEntryAction<S> for ExecuteCommand<S>
where
    S: ExecutionSource,
{
    fn execute(&self, sender: S, context: &mut ExecutionContext<S>, frame: FrameId) {
        context.push_profiler_scope(|| format!("execute {}", self.chain.input()));
        context.increment_cost();
        match self.chain.run_executable(&sender) {
            Ok(result) => {
                let depth = context.frame_depth(frame);
                if let Some(tracer) = context.tracer() {
                    tracer.on_return(depth, self.chain.input(), result);
                }
            }
            Err(err) => {
                sender.handle_error(&err, self.modifiers.is_forked(), context.tracer());
            }
        }
        context.pop_profiler_scope();
    }
}
