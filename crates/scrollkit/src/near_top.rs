#![forbid(unsafe_code)]

//! Fires a callback when the user scrolls up close to the top of a pane.
//!
//! Used to lazy-load older content. The watcher is a two-state machine:
//!
//! | state        | offset            | motion | next         | effect   |
//! |--------------|-------------------|--------|--------------|----------|
//! | `NotNearTop` | `<= 200`          | up     | `NearTop`    | callback |
//! | `NotNearTop` | otherwise         | any    | `NotNearTop` |          |
//! | `NearTop`    | `> 200`           | any    | `NotNearTop` |          |
//! | `NearTop`    | `<= 200`          | any    | `NearTop`    |          |
//!
//! The watcher starts in `NotNearTop` whatever the initial offset is; only
//! scroll events move it.

use tracing::{debug, trace};

use crate::config::NEAR_TOP_THRESHOLD_PX;
use crate::dom::{
    Behavior, DefaultAction, Dom, DomEvent, EventKind, FrameId, ListenTarget, ListenerOptions,
};
use crate::error::DomError;
use crate::restore::RestoreStack;

/// Near-top callback.
pub type NearTopCallback = Box<dyn FnMut()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proximity {
    NearTop,
    NotNearTop,
}

/// Pure proximity state machine, independent of any DOM.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityTracker {
    state: Proximity,
    last_offset: f64,
    threshold_px: f64,
}

impl ProximityTracker {
    /// Starts in [`Proximity::NotNearTop`]; `initial_offset` is only the
    /// reference for the first motion direction.
    #[must_use]
    pub fn new(initial_offset: f64) -> Self {
        Self {
            state: Proximity::NotNearTop,
            last_offset: initial_offset,
            threshold_px: NEAR_TOP_THRESHOLD_PX,
        }
    }

    #[must_use]
    pub fn state(&self) -> Proximity {
        self.state
    }

    /// Feeds a new offset; returns `true` when the callback must fire.
    pub fn observe(&mut self, offset: f64) -> bool {
        let moving_up = offset < self.last_offset;
        self.last_offset = offset;
        let within = offset <= self.threshold_px;
        match self.state {
            Proximity::NotNearTop if within && moving_up => {
                self.state = Proximity::NearTop;
                true
            }
            Proximity::NearTop if !within => {
                self.state = Proximity::NotNearTop;
                false
            }
            _ => false,
        }
    }
}

/// Near-top watcher attached to one scrollable element.
pub struct NearTopWatcher<D: Dom> {
    node: D::Node,
    tracker: ProximityTracker,
    callback: NearTopCallback,
    alive: bool,
    registrations: RestoreStack<D::Node>,
}

impl<D: Dom> NearTopWatcher<D> {
    pub fn attach(dom: &D, node: D::Node, callback: NearTopCallback) -> Result<Self, DomError> {
        let mut registrations = RestoreStack::new();
        registrations.add_listener(
            dom,
            &ListenTarget::Element(node.clone()),
            EventKind::Scroll,
            ListenerOptions::PASSIVE,
        )?;
        let initial_offset = dom.scroll_metrics(&node).scroll_top;
        debug!(target: "scrollkit::near_top", initial_offset, "attached near-top watcher");
        Ok(Self {
            node,
            tracker: ProximityTracker::new(initial_offset),
            callback,
            alive: true,
            registrations,
        })
    }

    #[must_use]
    pub fn proximity(&self) -> Proximity {
        self.tracker.state()
    }

    /// Swaps the callback; the state machine keeps its position.
    pub fn update(&mut self, callback: NearTopCallback) {
        self.callback = callback;
    }
}

impl<D: Dom> Behavior<D> for NearTopWatcher<D> {
    fn handle_event(&mut self, dom: &D, event: &DomEvent<D::Node>) -> DefaultAction {
        if !self.alive {
            return DefaultAction::Allow;
        }
        if let DomEvent::Scroll {
            source: ListenTarget::Element(node),
        } = event
        {
            if *node == self.node {
                let offset = dom.scroll_metrics(&self.node).scroll_top;
                if self.tracker.observe(offset) {
                    trace!(target: "scrollkit::near_top", offset, "reached near-top band");
                    (self.callback)();
                }
            }
        }
        DefaultAction::Allow
    }

    fn handle_frame(&mut self, _dom: &D, _frame: FrameId) {}

    fn destroy(&mut self, dom: &D) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.registrations.unwind(dom);
        debug!(target: "scrollkit::near_top", "destroyed near-top watcher");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_dom::{MemoryDom, NodeId};
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn setup() -> (MemoryDom, NodeId, NearTopWatcher<MemoryDom>, Rc<Cell<u32>>) {
        let dom = MemoryDom::new();
        let pane = dom.create_scroller(MemoryDom::BODY, 5000.0, 600.0);
        let fired = Rc::new(Cell::new(0));
        let sink = Rc::clone(&fired);
        let watcher = NearTopWatcher::attach(
            &dom,
            pane,
            Box::new(move || sink.set(sink.get() + 1)),
        )
        .expect("attach");
        (dom, pane, watcher, fired)
    }

    fn scroll_through(
        dom: &MemoryDom,
        watcher: &mut NearTopWatcher<MemoryDom>,
        pane: NodeId,
        offsets: &[f64],
    ) {
        for &offset in offsets {
            dom.user_scroll(watcher, pane, offset);
        }
    }

    #[test]
    fn upward_crossing_fires_once_per_approach() {
        let (dom, pane, mut watcher, fired) = setup();
        scroll_through(&dom, &mut watcher, pane, &[500.0, 150.0]);
        assert_eq!(fired.get(), 1);
        assert_eq!(watcher.proximity(), Proximity::NearTop);

        scroll_through(&dom, &mut watcher, pane, &[100.0, 150.0]);
        assert_eq!(fired.get(), 1);

        scroll_through(&dom, &mut watcher, pane, &[250.0, 150.0]);
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn downward_motion_into_band_does_not_fire() {
        let (dom, pane, mut watcher, fired) = setup();
        scroll_through(&dom, &mut watcher, pane, &[0.0, 50.0, 120.0]);
        assert_eq!(fired.get(), 0);
        assert_eq!(watcher.proximity(), Proximity::NotNearTop);
        // First upward move inside the band fires.
        dom.user_scroll(&mut watcher, pane, 80.0);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn starts_not_near_top_even_at_offset_zero() {
        let (dom, pane, mut watcher, fired) = setup();
        assert_eq!(dom.scroll_top(pane), 0.0);
        assert_eq!(watcher.proximity(), Proximity::NotNearTop);
        // A scroll event at the same offset is not upward motion.
        dom.user_scroll(&mut watcher, pane, 0.0);
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn initial_offset_sets_motion_reference() {
        let dom = MemoryDom::new();
        let pane = dom.create_scroller(MemoryDom::BODY, 5000.0, 600.0);
        dom.set_scroll_top(&pane, 900.0);
        let fired = Rc::new(Cell::new(0));
        let sink = Rc::clone(&fired);
        let mut watcher =
            NearTopWatcher::attach(&dom, pane, Box::new(move || sink.set(sink.get() + 1)))
                .expect("attach");
        dom.user_scroll(&mut watcher, pane, 100.0);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn leaving_the_band_rearms_regardless_of_direction() {
        let mut tracker = ProximityTracker::new(1000.0);
        assert!(tracker.observe(200.0));
        assert!(!tracker.observe(201.0));
        assert_eq!(tracker.state(), Proximity::NotNearTop);
        assert!(tracker.observe(199.0));
    }

    #[test]
    fn update_swaps_callback_without_reset() {
        let (dom, pane, mut watcher, fired) = setup();
        scroll_through(&dom, &mut watcher, pane, &[500.0, 150.0]);
        let second = Rc::new(Cell::new(0));
        let sink = Rc::clone(&second);
        watcher.update(Box::new(move || sink.set(sink.get() + 1)));
        assert_eq!(watcher.proximity(), Proximity::NearTop);

        scroll_through(&dom, &mut watcher, pane, &[100.0]);
        assert_eq!(second.get(), 0);
        scroll_through(&dom, &mut watcher, pane, &[400.0, 20.0]);
        assert_eq!(fired.get(), 1);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn destroy_removes_listener() {
        let (dom, pane, mut watcher, fired) = setup();
        watcher.destroy(&dom);
        assert_eq!(dom.listener_count(), 0);
        scroll_through(&dom, &mut watcher, pane, &[500.0, 150.0]);
        assert_eq!(fired.get(), 0);
    }

    proptest! {
        #[test]
        fn fires_once_per_upward_entry(offsets in prop::collection::vec(0.0f64..1000.0, 1..80)) {
            let mut tracker = ProximityTracker::new(1000.0);
            let mut fires = 0u32;
            let mut entries = 0u32;
            let mut near = false;
            let mut last = 1000.0;
            for offset in offsets {
                if tracker.observe(offset) {
                    fires += 1;
                }
                if !near && offset <= 200.0 && offset < last {
                    near = true;
                    entries += 1;
                } else if near && offset > 200.0 {
                    near = false;
                }
                last = offset;
                prop_assert_eq!(tracker.state() == Proximity::NearTop, near);
            }
            prop_assert_eq!(fires, entries);
        }
    }
}
