#![forbid(unsafe_code)]

//! Next-frame continuations owned by a behavior.

use crate::dom::{Dom, FrameId};
use crate::error::DomError;

/// Pending animation-frame tasks, keyed by the frame that will run them.
///
/// A task is removed when its frame arrives ([`FrameQueue::take`]) or when
/// the owner cancels everything ([`FrameQueue::cancel_all`]). A frame that
/// arrives for an unknown id yields nothing.
#[derive(Debug, Clone)]
pub struct FrameQueue<T> {
    pending: Vec<(FrameId, T)>,
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<T> FrameQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<D: Dom>(&mut self, dom: &D, task: T) -> Result<FrameId, DomError> {
        let frame = dom.request_frame()?;
        self.pending.push((frame, task));
        Ok(frame)
    }

    /// Removes and returns the task bound to `frame`.
    pub fn take(&mut self, frame: FrameId) -> Option<T> {
        let index = self.pending.iter().position(|(id, _)| *id == frame)?;
        Some(self.pending.remove(index).1)
    }

    /// Whether any pending task satisfies `predicate`.
    pub fn any(&self, predicate: impl Fn(&T) -> bool) -> bool {
        self.pending.iter().any(|(_, task)| predicate(task))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Cancels every pending frame and returns the dropped tasks.
    pub fn cancel_all<D: Dom>(&mut self, dom: &D) -> Vec<T> {
        self.pending
            .drain(..)
            .map(|(frame, task)| {
                dom.cancel_frame(frame);
                task
            })
            .collect()
    }
}
