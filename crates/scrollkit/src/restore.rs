#![forbid(unsafe_code)]

//! Ordered list of reversible DOM mutations.
//!
//! Every forward mutation goes through a [`RestoreStack`] method that records
//! its inverse *before* applying it. [`RestoreStack::unwind`] later replays the
//! inverses in registration order and keeps going past individual failures,
//! so a teardown always does as much cleanup as the document allows.

use tracing::{trace, warn};

use crate::dom::{Dom, EventKind, ListenTarget, ListenerId, ListenerOptions, ObserverId};
use crate::error::DomError;

/// The inverse of one applied mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reversal<N> {
    /// Put an inline style back to its previous value (empty = unset).
    Style {
        node: N,
        property: &'static str,
        previous: String,
    },
    Listener(ListenerId),
    Observer(ObserverId),
    /// Scroll the window back to where it was.
    WindowScroll { x: f64, y: f64 },
}

/// Ordered reversible actions owned by one behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreStack<N> {
    actions: Vec<Reversal<N>>,
}

impl<N> Default for RestoreStack<N> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
        }
    }
}

impl<N: Clone> RestoreStack<N> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Recorded reversals, in registration order.
    #[must_use]
    pub fn actions(&self) -> &[Reversal<N>] {
        &self.actions
    }

    /// Sets an inline style, recording the previous inline value first.
    ///
    /// The reversal stays recorded even if the write fails: restoring a value
    /// that was never overwritten is harmless.
    pub fn set_style<D>(
        &mut self,
        dom: &D,
        node: &N,
        property: &'static str,
        value: &str,
    ) -> Result<(), DomError>
    where
        D: Dom<Node = N>,
    {
        let previous = dom.style_property(node, property);
        self.actions.push(Reversal::Style {
            node: node.clone(),
            property,
            previous,
        });
        dom.set_style_property(node, property, value)
    }

    pub fn add_listener<D>(
        &mut self,
        dom: &D,
        target: &ListenTarget<N>,
        kind: EventKind,
        options: ListenerOptions,
    ) -> Result<ListenerId, DomError>
    where
        D: Dom<Node = N>,
    {
        let id = dom.add_listener(target, kind, options)?;
        self.actions.push(Reversal::Listener(id));
        Ok(id)
    }

    pub fn observe_subtree<D>(&mut self, dom: &D, node: &N) -> Result<ObserverId, DomError>
    where
        D: Dom<Node = N>,
    {
        let id = dom.observe_subtree(node)?;
        self.actions.push(Reversal::Observer(id));
        Ok(id)
    }

    /// Records that the window must be scrolled back to `(x, y)` on unwind.
    pub fn restore_window_scroll(&mut self, x: f64, y: f64) {
        self.actions.push(Reversal::WindowScroll { x, y });
    }

    /// Runs every reversal in registration order and empties the stack.
    ///
    /// Returns the number of reversals that failed; failures are logged and
    /// never stop the remaining reversals.
    pub fn unwind<D>(&mut self, dom: &D) -> usize
    where
        D: Dom<Node = N>,
    {
        let mut failures = 0usize;
        let total = self.actions.len();
        for action in self.actions.drain(..) {
            let result = match &action {
                Reversal::Style {
                    node,
                    property,
                    previous,
                } => dom.set_style_property(node, property, previous),
                Reversal::Listener(id) => dom.remove_listener(*id),
                Reversal::Observer(id) => dom.disconnect_observer(*id),
                Reversal::WindowScroll { x, y } => {
                    dom.window_scroll_to(*x, *y);
                    Ok(())
                }
            };
            if let Err(error) = result {
                failures += 1;
                warn!(
                    target: "scrollkit::restore",
                    %error,
                    "reversal failed; continuing teardown"
                );
            }
        }
        trace!(target: "scrollkit::restore", total, failures, "unwound restore stack");
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_dom::MemoryDom;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tracing_test::traced_test;

    #[test]
    fn style_reversal_restores_previous_inline_value() {
        let dom = MemoryDom::new();
        dom.seed_style(MemoryDom::ROOT, "overflow", "scroll");
        let before = dom.inline_styles(MemoryDom::ROOT);

        let mut stack = RestoreStack::new();
        stack
            .set_style(&dom, &MemoryDom::ROOT, "overflow", "hidden")
            .expect("style write");
        stack
            .set_style(&dom, &MemoryDom::ROOT, "padding-right", "15px")
            .expect("style write");
        assert_eq!(dom.style_property(&MemoryDom::ROOT, "overflow"), "hidden");

        assert_eq!(stack.unwind(&dom), 0);
        assert_eq!(dom.inline_styles(MemoryDom::ROOT), before);
        assert!(stack.is_empty());
    }

    #[test]
    fn reversal_is_recorded_before_the_write() {
        let dom = MemoryDom::new();
        dom.fail_style_writes(MemoryDom::BODY, "margin-top");
        let mut stack = RestoreStack::new();
        let result = stack.set_style(&dom, &MemoryDom::BODY, "margin-top", "-10px");
        assert!(result.is_err());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn listeners_and_observers_are_released() {
        let dom = MemoryDom::new();
        let mut stack = RestoreStack::new();
        stack
            .add_listener(
                &dom,
                &ListenTarget::Window,
                EventKind::Scroll,
                ListenerOptions::PASSIVE,
            )
            .expect("listener");
        stack
            .observe_subtree(&dom, &MemoryDom::BODY)
            .expect("observer");
        assert_eq!(dom.listener_count(), 1);
        assert_eq!(dom.observer_count(), 1);

        stack.unwind(&dom);
        assert_eq!(dom.listener_count(), 0);
        assert_eq!(dom.observer_count(), 0);
    }

    #[traced_test]
    #[test]
    fn failed_reversal_does_not_stop_the_rest() {
        let dom = MemoryDom::new();
        let mut stack = RestoreStack::new();
        stack
            .set_style(&dom, &MemoryDom::BODY, "margin-top", "-40px")
            .expect("style write");
        stack
            .add_listener(
                &dom,
                &ListenTarget::Document,
                EventKind::TouchMove,
                ListenerOptions::INTERCEPT,
            )
            .expect("listener");
        stack
            .set_style(&dom, &MemoryDom::ROOT, "overflow", "hidden")
            .expect("style write");

        // The body went away between lock and unlock.
        dom.fail_style_writes(MemoryDom::BODY, "margin-top");

        assert_eq!(stack.unwind(&dom), 1);
        assert_eq!(dom.listener_count(), 0);
        assert_eq!(dom.inline_styles(MemoryDom::ROOT), BTreeMap::new());
        assert!(logs_contain("reversal failed"));
    }

    #[test]
    fn window_scroll_reversal_runs_in_order() {
        let dom = MemoryDom::new();
        let mut stack = RestoreStack::new();
        stack
            .set_style(&dom, &MemoryDom::ROOT, "overflow", "hidden")
            .expect("style write");
        stack.restore_window_scroll(0.0, 320.0);
        stack.unwind(&dom);
        assert_eq!(dom.window_scroll(), (0.0, 320.0));
        assert_eq!(dom.window_scroll_calls(), vec![(0.0, 320.0)]);
    }
}
