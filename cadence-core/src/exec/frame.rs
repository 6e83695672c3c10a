use alot::{LotId, Lots};

use crate::source::ResultCallback;

/// A handle to a [`Frame`] owned by an
/// [`ExecutionContext`](super::ExecutionContext).
///
/// Frame ids are not compatible between different contexts.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct FrameId(LotId);

/// Which queued work a frame discards when it is rolled back.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FrameControl {
    /// Discard every pending entry. Used by the outermost top-level frame.
    ClearAll,
    /// Discard pending entries at this depth or deeper.
    DiscardFrom(usize),
}

/// A depth-scoped result callback and rollback scope.
///
/// Every entry queued for one nesting level shares the same frame: the
/// top-level invocation, each function call, and each forked continuation.
#[derive(Debug, Clone)]
pub struct Frame {
    depth: usize,
    return_callback: ResultCallback,
    control: FrameControl,
}

impl Frame {
    /// Returns a new frame.
    #[must_use]
    pub const fn new(depth: usize, return_callback: ResultCallback, control: FrameControl) -> Self {
        Self {
            depth,
            return_callback,
            control,
        }
    }

    /// Returns the nesting depth of this frame.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the callback this frame's result is returned to.
    #[must_use]
    pub const fn return_callback(&self) -> &ResultCallback {
        &self.return_callback
    }

    /// Returns this frame's rollback scope.
    #[must_use]
    pub const fn control(&self) -> FrameControl {
        self.control
    }

    /// Returns `value` from this frame.
    pub fn return_success(&self, value: i32) {
        self.return_callback.on_success(value);
    }

    /// Returns a failure from this frame.
    pub fn return_failure(&self) {
        self.return_callback.on_failure();
    }
}

struct FrameSlot {
    frame: Frame,
    references: usize,
}

/// Frames referenced by queued entries.
///
/// Each queued entry holds one reference to its frame. A frame is removed as
/// soon as its last reference is released. Frames that never receive a
/// reference are removed by [`sweep`](Self::sweep).
#[derive(Default)]
pub(crate) struct FrameArena {
    slots: Lots<FrameSlot>,
    fresh: Vec<FrameId>,
}

impl FrameArena {
    pub fn insert(&mut self, frame: Frame) -> FrameId {
        let id = FrameId(self.slots.push(FrameSlot {
            frame,
            references: 0,
        }));
        self.fresh.push(id);
        id
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.slots.get(id.0).map(|slot| &slot.frame)
    }

    /// Adds a reference to `id`, returning the frame's depth.
    pub fn retain(&mut self, id: FrameId) -> Option<usize> {
        let slot = self.slots.get_mut(id.0)?;
        slot.references += 1;
        Some(slot.frame.depth)
    }

    pub fn release(&mut self, id: FrameId) {
        let Some(slot) = self.slots.get_mut(id.0) else {
            return;
        };
        slot.references = slot.references.saturating_sub(1);
        if slot.references == 0 {
            self.slots.remove(id.0);
        }
    }

    pub fn sweep(&mut self) {
        for id in self.fresh.drain(..) {
            if self
                .slots
                .get(id.0)
                .is_some_and(|slot| slot.references == 0)
            {
                self.slots.remove(id.0);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
