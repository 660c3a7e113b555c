#![forbid(unsafe_code)]

//! Keeps a chat-like pane scrolled to its bottom while the user stays there.
//!
//! On attach the pane is scrolled to the bottom and considered pinned. From
//! then on:
//! - user scrolls re-evaluate the pinned predicate and report transitions,
//! - content mutations re-scroll to the bottom when pinned and the content
//!   grew,
//! - window resizes re-scroll on the next frame when pinned.
//!
//! The pinner's own `scrollTop` writes come back as scroll events at the
//! bottom edge, which evaluate to "pinned" and therefore change nothing.

use tracing::{debug, trace, warn};

use crate::config::{PinStateCallback, ScrollPinnerConfig, ScrollPinnerUpdate, sanitize_threshold};
use crate::dom::{
    Behavior, DefaultAction, Dom, DomEvent, EventKind, FrameId, ListenTarget, ListenerOptions,
};
use crate::error::DomError;
use crate::frames::FrameQueue;
use crate::geometry::is_within_bottom_threshold;
use crate::restore::RestoreStack;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinnerFrame {
    RescrollAfterResize,
}

/// Bottom-pinning behavior for one scrollable element.
pub struct ScrollPinner<D: Dom> {
    node: D::Node,
    config: ScrollPinnerConfig,
    on_pin_state_change: Option<PinStateCallback>,
    pinned: bool,
    last_content_height: f64,
    alive: bool,
    frames: FrameQueue<PinnerFrame>,
    registrations: RestoreStack<D::Node>,
}

impl<D: Dom> ScrollPinner<D> {
    /// Subscribes to `node` and scrolls it to the bottom.
    ///
    /// On failure everything registered so far is released again.
    pub fn attach(
        dom: &D,
        node: D::Node,
        config: ScrollPinnerConfig,
        on_pin_state_change: Option<PinStateCallback>,
    ) -> Result<Self, DomError> {
        let mut registrations = RestoreStack::new();
        if let Err(error) = Self::subscribe(dom, &node, &mut registrations) {
            registrations.unwind(dom);
            return Err(error);
        }

        let mut pinner = Self {
            node,
            config: ScrollPinnerConfig::new(config.threshold_px),
            on_pin_state_change,
            pinned: true,
            last_content_height: 0.0,
            alive: true,
            frames: FrameQueue::new(),
            registrations,
        };
        pinner.scroll_to_bottom(dom);
        debug!(
            target: "scrollkit::pinner",
            threshold_px = pinner.config.threshold_px,
            content_height = pinner.last_content_height,
            "attached scroll pinner"
        );
        Ok(pinner)
    }

    fn subscribe(
        dom: &D,
        node: &D::Node,
        registrations: &mut RestoreStack<D::Node>,
    ) -> Result<(), DomError> {
        registrations.add_listener(
            dom,
            &ListenTarget::Element(node.clone()),
            EventKind::Scroll,
            ListenerOptions::PASSIVE,
        )?;
        registrations.observe_subtree(dom, node)?;
        registrations.add_listener(
            dom,
            &ListenTarget::Window,
            EventKind::Resize,
            ListenerOptions::PASSIVE,
        )?;
        Ok(())
    }

    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    #[must_use]
    pub fn config(&self) -> ScrollPinnerConfig {
        self.config
    }

    #[must_use]
    pub fn node(&self) -> &D::Node {
        &self.node
    }

    /// Merges a partial update; the pinned state is left as it is.
    pub fn update(&mut self, update: ScrollPinnerUpdate) {
        if let Some(threshold_px) = update.threshold_px {
            self.config.threshold_px = sanitize_threshold(threshold_px);
        }
        if let Some(callback) = update.on_pin_state_change {
            self.on_pin_state_change = Some(callback);
        }
        trace!(
            target: "scrollkit::pinner",
            threshold_px = self.config.threshold_px,
            "updated scroll pinner"
        );
    }

    fn scroll_to_bottom(&mut self, dom: &D) {
        let metrics = dom.scroll_metrics(&self.node);
        dom.set_scroll_top(&self.node, metrics.scroll_height);
        self.last_content_height = metrics.scroll_height;
    }

    fn on_scroll(&mut self, dom: &D) {
        let metrics = dom.scroll_metrics(&self.node);
        let pinned = is_within_bottom_threshold(&metrics, self.config.threshold_px);
        if pinned == self.pinned {
            return;
        }
        self.pinned = pinned;
        trace!(
            target: "scrollkit::pinner",
            pinned,
            scroll_top = metrics.scroll_top,
            "pin state changed"
        );
        if let Some(callback) = self.on_pin_state_change.as_mut() {
            callback(pinned);
        }
    }

    fn on_content_mutation(&mut self, dom: &D) {
        let content_height = dom.scroll_metrics(&self.node).scroll_height;
        if self.pinned && content_height > self.last_content_height {
            trace!(
                target: "scrollkit::pinner",
                from = self.last_content_height,
                to = content_height,
                "content grew while pinned"
            );
            self.scroll_to_bottom(dom);
        } else {
            self.last_content_height = content_height;
        }
    }

    fn on_resize(&mut self, dom: &D) {
        if !self.pinned || !self.frames.is_empty() {
            return;
        }
        if let Err(error) = self.frames.schedule(dom, PinnerFrame::RescrollAfterResize) {
            warn!(target: "scrollkit::pinner", %error, "could not defer re-scroll");
        }
    }
}

impl<D: Dom> Behavior<D> for ScrollPinner<D> {
    fn handle_event(&mut self, dom: &D, event: &DomEvent<D::Node>) -> DefaultAction {
        if !self.alive {
            return DefaultAction::Allow;
        }
        match event {
            DomEvent::Scroll {
                source: ListenTarget::Element(node),
            } if *node == self.node => self.on_scroll(dom),
            DomEvent::Mutation => self.on_content_mutation(dom),
            DomEvent::Resize {
                source: ListenTarget::Window,
            } => self.on_resize(dom),
            _ => {}
        }
        DefaultAction::Allow
    }

    fn handle_frame(&mut self, dom: &D, frame: FrameId) {
        let Some(task) = self.frames.take(frame) else {
            return;
        };
        if !self.alive {
            return;
        }
        match task {
            PinnerFrame::RescrollAfterResize => {
                if self.pinned {
                    self.scroll_to_bottom(dom);
                }
            }
        }
    }

    fn destroy(&mut self, dom: &D) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.frames.cancel_all(dom);
        let failures = self.registrations.unwind(dom);
        debug!(target: "scrollkit::pinner", failures, "destroyed scroll pinner");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SUBPIXEL_SLACK_PX;
    use crate::memory_dom::{MemoryDom, NodeId};
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<bool>>>, PinStateCallback) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        (calls, Box::new(move |pinned| sink.borrow_mut().push(pinned)))
    }

    fn setup(
        scroll_height: f64,
        client_height: f64,
    ) -> (MemoryDom, NodeId, ScrollPinner<MemoryDom>, Rc<RefCell<Vec<bool>>>) {
        let dom = MemoryDom::new();
        let pane = dom.create_scroller(MemoryDom::BODY, scroll_height, client_height);
        let (calls, callback) = recorder();
        let pinner = ScrollPinner::attach(&dom, pane, ScrollPinnerConfig::default(), Some(callback))
            .expect("attach");
        (dom, pane, pinner, calls)
    }

    #[test]
    fn attach_scrolls_to_bottom_and_starts_pinned() {
        let (dom, pane, pinner, calls) = setup(1000.0, 400.0);
        assert_eq!(dom.scroll_top(pane), 600.0);
        assert!(pinner.is_pinned());
        assert!(calls.borrow().is_empty());
        assert_eq!(dom.listener_count(), 2);
        assert_eq!(dom.observer_count(), 1);
    }

    #[test]
    fn near_bottom_scroll_stays_pinned_without_callback() {
        let (dom, pane, mut pinner, calls) = setup(1000.0, 400.0);
        dom.user_scroll(&mut pinner, pane, 590.0);
        assert!(pinner.is_pinned());
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn scrolling_away_unpins_once() {
        let (dom, pane, mut pinner, calls) = setup(1000.0, 400.0);
        dom.user_scroll(&mut pinner, pane, 400.0);
        assert!(!pinner.is_pinned());
        dom.user_scroll(&mut pinner, pane, 300.0);
        dom.user_scroll(&mut pinner, pane, 350.0);
        assert_eq!(*calls.borrow(), vec![false]);

        dom.user_scroll(&mut pinner, pane, 600.0);
        assert!(pinner.is_pinned());
        assert_eq!(*calls.borrow(), vec![false, true]);
    }

    #[test]
    fn growth_while_pinned_follows_the_bottom() {
        let (dom, pane, mut pinner, _) = setup(1000.0, 400.0);
        dom.set_scroll_height(pane, 1300.0);
        dom.dispatch(&mut pinner, DomEvent::Mutation);
        assert_eq!(dom.scroll_top(pane), 900.0);
        assert!(dom.scroll_metrics(&pane).is_at_bottom());
    }

    #[test]
    fn growth_while_unpinned_keeps_offset() {
        let (dom, pane, mut pinner, _) = setup(1000.0, 400.0);
        dom.user_scroll(&mut pinner, pane, 100.0);
        dom.set_scroll_height(pane, 1300.0);
        dom.dispatch(&mut pinner, DomEvent::Mutation);
        assert_eq!(dom.scroll_top(pane), 100.0);
    }

    #[test]
    fn resize_rescroll_waits_for_next_frame() {
        let (dom, pane, mut pinner, _) = setup(1000.0, 400.0);
        dom.set_scroll_geometry(pane, 1000.0, 300.0);
        dom.dispatch(
            &mut pinner,
            DomEvent::Resize {
                source: ListenTarget::Window,
            },
        );
        dom.dispatch(
            &mut pinner,
            DomEvent::Resize {
                source: ListenTarget::Window,
            },
        );
        assert_eq!(dom.scroll_top(pane), 600.0);
        assert_eq!(dom.pending_frames().len(), 1);

        assert_eq!(dom.run_frames(&mut pinner), 1);
        assert_eq!(dom.scroll_top(pane), 700.0);
    }

    #[test]
    fn resize_while_unpinned_requests_nothing() {
        let (dom, pane, mut pinner, _) = setup(1000.0, 400.0);
        dom.user_scroll(&mut pinner, pane, 0.0);
        dom.dispatch(
            &mut pinner,
            DomEvent::Resize {
                source: ListenTarget::Window,
            },
        );
        assert!(dom.pending_frames().is_empty());
    }

    #[test]
    fn update_merges_partially() {
        let (dom, pane, mut pinner, calls) = setup(1000.0, 400.0);
        pinner.update(ScrollPinnerUpdate::threshold(250.0));
        assert_eq!(pinner.config().threshold_px, 250.0);
        assert!(pinner.is_pinned());

        // 200px from the bottom is still pinned under the wider threshold.
        dom.user_scroll(&mut pinner, pane, 400.0);
        assert!(pinner.is_pinned());
        assert!(calls.borrow().is_empty());

        let (second, callback) = recorder();
        pinner.update(ScrollPinnerUpdate {
            threshold_px: None,
            on_pin_state_change: Some(callback),
        });
        assert_eq!(pinner.config().threshold_px, 250.0);
        dom.user_scroll(&mut pinner, pane, 0.0);
        assert!(calls.borrow().is_empty());
        assert_eq!(*second.borrow(), vec![false]);
    }

    #[test]
    fn missing_callback_is_a_no_op() {
        let dom = MemoryDom::new();
        let pane = dom.create_scroller(MemoryDom::BODY, 1000.0, 400.0);
        let mut pinner =
            ScrollPinner::attach(&dom, pane, ScrollPinnerConfig::default(), None).expect("attach");
        dom.user_scroll(&mut pinner, pane, 0.0);
        assert!(!pinner.is_pinned());
    }

    #[test]
    fn destroy_releases_everything() {
        let (dom, pane, mut pinner, calls) = setup(1000.0, 400.0);
        dom.dispatch(
            &mut pinner,
            DomEvent::Resize {
                source: ListenTarget::Window,
            },
        );
        pinner.destroy(&dom);
        assert_eq!(dom.listener_count(), 0);
        assert_eq!(dom.observer_count(), 0);
        assert!(dom.pending_frames().is_empty());

        dom.user_scroll(&mut pinner, pane, 0.0);
        assert!(calls.borrow().is_empty());
        // Second destroy is tolerated.
        pinner.destroy(&dom);
    }

    #[test]
    fn late_frame_after_destroy_is_ignored() {
        let (dom, pane, mut pinner, _) = setup(1000.0, 400.0);
        dom.set_scroll_geometry(pane, 1000.0, 300.0);
        dom.dispatch(
            &mut pinner,
            DomEvent::Resize {
                source: ListenTarget::Window,
            },
        );
        let frame = dom.pending_frames()[0];
        pinner.destroy(&dom);
        pinner.handle_frame(&dom, frame);
        assert_eq!(dom.scroll_top(pane), 600.0);
    }

    proptest! {
        #[test]
        fn pinned_tracks_predicate_and_reports_each_transition(
            offsets in prop::collection::vec(0.0f64..=600.0, 1..60),
            threshold in 0.0f64..100.0,
        ) {
            let dom = MemoryDom::new();
            let pane = dom.create_scroller(MemoryDom::BODY, 1000.0, 400.0);
            let (calls, callback) = recorder();
            let mut pinner = ScrollPinner::attach(
                &dom,
                pane,
                ScrollPinnerConfig::new(threshold),
                Some(callback),
            ).expect("attach");

            let mut expected_transitions = Vec::new();
            let mut previous = true;
            for offset in offsets {
                dom.user_scroll(&mut pinner, pane, offset);
                let distance = 1000.0 - 400.0 - dom.scroll_top(pane);
                let predicate = distance <= threshold || distance < SUBPIXEL_SLACK_PX;
                prop_assert_eq!(pinner.is_pinned(), predicate);
                if predicate != previous {
                    expected_transitions.push(predicate);
                    previous = predicate;
                }
            }
            prop_assert_eq!(&*calls.borrow(), &expected_transitions);
        }
    }
}
