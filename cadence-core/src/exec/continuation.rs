use std::marker::PhantomData;
use std::sync::Arc;

use super::{EntryAction, ExecutionContext, FrameId, QueueEntry};
use crate::source::ExecutionSource;

/// Queues one entry per argument, one scheduler step at a time.
///
/// Each time the task runs it queues the entry for its next argument and, if
/// arguments remain, queues itself again behind that entry. A fan-out over a
/// million sources therefore costs one pending task rather than a million
/// pending entries, and every expansion step is subject to the quota and
/// queue ceiling like any other work.
pub struct ContinuationTask<S, P, F> {
    provider: F,
    arguments: Arc<[P]>,
    index: usize,
    _source: PhantomData<fn() -> S>,
}

impl<S, P, F> ContinuationTask<S, P, F>
where
    S: ExecutionSource,
    P: Clone + 'static,
    F: Fn(FrameId, P) -> QueueEntry<S> + 'static,
{
    /// Schedules `provider(frame, argument)` for each of `arguments`, in
    /// order.
    ///
    /// One or two arguments are queued directly.
    pub fn schedule(
        context: &mut ExecutionContext<S>,
        frame: FrameId,
        arguments: impl Into<Arc<[P]>>,
        provider: F,
    ) {
        let arguments = arguments.into();
        match arguments.len() {
            0 => {}
            1 => context.queue_next(provider(frame, arguments[0].clone())),
            2 => {
                context.queue_next(provider(frame, arguments[0].clone()));
                context.queue_next(provider(frame, arguments[1].clone()));
            }
            _ => context.queue_next(QueueEntry::new(
                frame,
                Self {
                    provider,
                    arguments,
                    index: 0,
                    _source: PhantomData,
                },
            )),
        }
    }
}

impl<S, P, F> EntryAction<S> for ContinuationTask<S, P, F>
where
    S: ExecutionSource,
    P: Clone + 'static,
    F: Fn(FrameId, P) -> QueueEntry<S> + 'static,
{
    fn execute(mut self: Box<Self>, context: &mut ExecutionContext<S>, frame: FrameId) {
        let argument = self.arguments[self.index].clone();
        context.queue_next((self.provider)(frame, argument));
        self.index += 1;
        if self.index < self.arguments.len() {
            context.queue_next(QueueEntry {
                frame,
                action: super::Action::Bound(self),
            });
        }
    }
}
