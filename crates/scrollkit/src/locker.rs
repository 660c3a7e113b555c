#![forbid(unsafe_code)]

//! Page scroll locking.
//!
//! Two strategies, picked from the platform on every (re)lock:
//!
//! - **Standard**: pad the root by the scrollbar width so nothing shifts, then
//!   set `overflow: hidden` on it.
//! - **Mobile Safari**: `overflow: hidden` alone does not stop touch scrolling
//!   there, so on top of the standard patches the locker
//!   1. freezes the visual position: body gets `margin-top: -scrollY` and the
//!      window is scrolled to the origin,
//!   2. remembers the scroll container under each touch,
//!   3. cancels touch moves that would scroll the page or overscroll that
//!      container,
//!   4. focuses tapped inputs itself while they are shifted far off screen,
//!      so WebKit has nothing to scroll into view,
//!   5. applies the same shift to keyboard-driven focus changes and then
//!      scrolls the input's own container once the keyboard is up,
//!   6. snaps the window back to the origin on any residual scroll.
//!
//! Independently of the strategy, the live visual-viewport height is written
//! to [`VIEWPORT_HEIGHT_PROPERTY`] on the locked node.
//!
//! Every patch is recorded in a [`RestoreStack`] before it is applied, so
//! [`ScrollLocker::update`] and [`Behavior::destroy`] always undo exactly
//! what was done.

use tracing::{debug, trace, warn};

use crate::config::{FOCUS_SHIFT_TRANSFORM, VIEWPORT_HEIGHT_PROPERTY};
use crate::dom::{
    Behavior, DefaultAction, Dom, DomEvent, EventKind, FrameId, ListenTarget, ListenerOptions,
};
use crate::error::DomError;
use crate::frames::FrameQueue;
use crate::geometry::{drag_overscrolls, nearest_scrollable_ancestor, reveal_delta};
use crate::platform::is_mobile_safari;
use crate::restore::RestoreStack;

const OBSERVE_CAPTURE: ListenerOptions = ListenerOptions {
    capture: true,
    passive: true,
};

/// How the page is currently locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrategy {
    Standard,
    MobileSafari,
}

impl LockStrategy {
    /// Picks the strategy for the platform `dom` reports.
    pub fn detect<D: Dom>(dom: &D) -> Self {
        if is_mobile_safari(&dom.platform()) {
            Self::MobileSafari
        } else {
            Self::Standard
        }
    }
}

/// Scroll container resolved for the current touch gesture.
#[derive(Debug, Clone)]
struct TouchTracking<N> {
    scrollable: N,
    last_y: f64,
}

#[derive(Debug, Clone)]
enum LockerFrame<N> {
    /// Put a shifted input back, then bring it into view.
    RestoreTransform { input: N, previous: String },
}

/// Page scroll lock bound to one element, usually the document element.
pub struct ScrollLocker<D: Dom> {
    node: D::Node,
    strategy: LockStrategy,
    binding: RestoreStack<D::Node>,
    patches: RestoreStack<D::Node>,
    touch: Option<TouchTracking<D::Node>>,
    focusing: Option<D::Node>,
    pending_reveal: Option<D::Node>,
    frames: FrameQueue<LockerFrame<D::Node>>,
    alive: bool,
}

fn px(value: f64) -> String {
    format!("{value}px")
}

impl<D: Dom> ScrollLocker<D> {
    /// Binds the viewport height and locks the page.
    ///
    /// On failure every patch applied so far is reverted.
    pub fn attach(dom: &D, node: D::Node) -> Result<Self, DomError> {
        let mut locker = Self {
            node,
            strategy: LockStrategy::Standard,
            binding: RestoreStack::new(),
            patches: RestoreStack::new(),
            touch: None,
            focusing: None,
            pending_reveal: None,
            frames: FrameQueue::new(),
            alive: true,
        };
        let result = locker.bind_viewport_height(dom).and_then(|()| locker.lock(dom));
        if let Err(error) = result {
            locker.destroy(dom);
            return Err(error);
        }
        Ok(locker)
    }

    #[must_use]
    pub fn strategy(&self) -> LockStrategy {
        self.strategy
    }

    #[must_use]
    pub fn node(&self) -> &D::Node {
        &self.node
    }

    /// Undoes the active strategy, then selects and applies one again.
    pub fn update(&mut self, dom: &D) -> Result<(), DomError> {
        if !self.alive {
            return Ok(());
        }
        self.unlock(dom);
        if let Err(error) = self.lock(dom) {
            self.unlock(dom);
            return Err(error);
        }
        Ok(())
    }

    fn bind_viewport_height(&mut self, dom: &D) -> Result<(), DomError> {
        let height = dom.viewport().visual_height;
        self.binding
            .set_style(dom, &self.node, VIEWPORT_HEIGHT_PROPERTY, &px(height))?;
        self.binding.add_listener(
            dom,
            &ListenTarget::VisualViewport,
            EventKind::Resize,
            ListenerOptions::PASSIVE,
        )?;
        Ok(())
    }

    fn refresh_viewport_height(&self, dom: &D) {
        let height = dom.viewport().visual_height;
        if let Err(error) = dom.set_style_property(&self.node, VIEWPORT_HEIGHT_PROPERTY, &px(height))
        {
            warn!(target: "scrollkit::locker", %error, "could not refresh viewport height");
        }
    }

    fn lock(&mut self, dom: &D) -> Result<(), DomError> {
        self.strategy = LockStrategy::detect(dom);
        debug!(target: "scrollkit::locker", strategy = ?self.strategy, "locking page scroll");
        self.apply_standard(dom)?;
        if self.strategy == LockStrategy::MobileSafari {
            self.apply_mobile_safari(dom)?;
        }
        Ok(())
    }

    fn apply_standard(&mut self, dom: &D) -> Result<(), DomError> {
        let scrollbar = dom.viewport().scrollbar_width();
        if scrollbar > 0.0 {
            self.patches
                .set_style(dom, &self.node, "padding-right", &px(scrollbar))?;
        }
        self.patches.set_style(dom, &self.node, "overflow", "hidden")
    }

    fn apply_mobile_safari(&mut self, dom: &D) -> Result<(), DomError> {
        let (x, y) = dom.window_scroll();
        if y > 0.0 {
            self.patches
                .set_style(dom, &dom.body(), "margin-top", &px(-y))?;
        }
        self.patches.restore_window_scroll(x, y);
        dom.window_scroll_to(0.0, 0.0);

        let interceptors = [
            (ListenTarget::Document, EventKind::TouchStart, OBSERVE_CAPTURE),
            (
                ListenTarget::Document,
                EventKind::TouchMove,
                ListenerOptions::INTERCEPT,
            ),
            (
                ListenTarget::Document,
                EventKind::TouchEnd,
                ListenerOptions::INTERCEPT,
            ),
            (ListenTarget::Document, EventKind::Focus, OBSERVE_CAPTURE),
            (ListenTarget::Window, EventKind::Scroll, ListenerOptions::PASSIVE),
        ];
        for (target, kind, options) in &interceptors {
            self.patches.add_listener(dom, target, *kind, *options)?;
        }
        trace!(target: "scrollkit::locker", x, y, "froze page offset");
        Ok(())
    }

    fn unlock(&mut self, dom: &D) {
        for task in self.frames.cancel_all(dom) {
            let LockerFrame::RestoreTransform { input, previous } = task;
            Self::restore_transform(dom, &input, &previous);
        }
        self.touch = None;
        self.focusing = None;
        self.pending_reveal = None;
        let failures = self.patches.unwind(dom);
        debug!(
            target: "scrollkit::locker",
            strategy = ?self.strategy,
            failures,
            "unlocked page scroll"
        );
    }

    fn restore_transform(dom: &D, input: &D::Node, previous: &str) {
        if let Err(error) = dom.set_style_property(input, "transform", previous) {
            warn!(target: "scrollkit::locker", %error, "could not restore input transform");
        }
    }

    fn on_touch_start(&mut self, dom: &D, target: &D::Node, client_y: f64) {
        self.touch = Some(TouchTracking {
            scrollable: nearest_scrollable_ancestor(dom, target),
            last_y: client_y,
        });
    }

    fn on_touch_move(&mut self, dom: &D, target: &D::Node, client_y: f64) -> DefaultAction {
        let tracking = self.touch.get_or_insert_with(|| TouchTracking {
            scrollable: nearest_scrollable_ancestor(dom, target),
            last_y: client_y,
        });
        let delta_y = client_y - tracking.last_y;
        tracking.last_y = client_y;

        if tracking.scrollable == dom.document_element() {
            return DefaultAction::Prevent;
        }
        let metrics = dom.scroll_metrics(&tracking.scrollable);
        if drag_overscrolls(&metrics, delta_y) {
            trace!(
                target: "scrollkit::locker",
                delta_y,
                scroll_top = metrics.scroll_top,
                "blocked overscroll"
            );
            DefaultAction::Prevent
        } else {
            DefaultAction::Allow
        }
    }

    fn on_touch_end(&mut self, dom: &D, target: &D::Node) -> DefaultAction {
        if !dom.is_text_input(target) || dom.active_element().as_ref() == Some(target) {
            return DefaultAction::Allow;
        }
        self.focus_in_place(dom, target);
        DefaultAction::Prevent
    }

    fn on_focus(&mut self, dom: &D, target: &D::Node) {
        if !dom.is_text_input(target) || self.focusing.as_ref() == Some(target) {
            return;
        }
        let already_shifted = self.frames.any(|task| match task {
            LockerFrame::RestoreTransform { input, .. } => input == target,
        });
        if !already_shifted {
            self.focus_in_place(dom, target);
        }
    }

    /// Focuses `input` while it is shifted off screen and schedules the
    /// transform restore for the next frame.
    fn focus_in_place(&mut self, dom: &D, input: &D::Node) {
        let previous = dom.style_property(input, "transform");
        if let Err(error) = dom.set_style_property(input, "transform", FOCUS_SHIFT_TRANSFORM) {
            warn!(target: "scrollkit::locker", %error, "could not shift input");
        }

        self.focusing = Some(input.clone());
        let focused = dom.focus(input);
        self.focusing = None;
        if let Err(error) = focused {
            warn!(target: "scrollkit::locker", %error, "could not focus input");
        }

        let task = LockerFrame::RestoreTransform {
            input: input.clone(),
            previous: previous.clone(),
        };
        if let Err(error) = self.frames.schedule(dom, task) {
            warn!(target: "scrollkit::locker", %error, "no frame for transform restore");
            Self::restore_transform(dom, input, &previous);
        }
    }

    /// Scrolls the input's own scroll container, never the page, so the
    /// input sits inside the visual viewport.
    fn reveal(&self, dom: &D, input: &D::Node) {
        let root = dom.document_element();
        let container = dom
            .parent_element(input)
            .map_or_else(|| root.clone(), |parent| nearest_scrollable_ancestor(dom, &parent));
        if container == root {
            return;
        }
        let delta = reveal_delta(
            dom.bounding_rect(input),
            dom.bounding_rect(&container),
            dom.viewport().visual_height,
        );
        if delta != 0.0 {
            let scroll_top = dom.scroll_metrics(&container).scroll_top;
            dom.set_scroll_top(&container, scroll_top + delta);
            trace!(target: "scrollkit::locker", delta, "revealed focused input");
        }
    }
}

impl<D: Dom> Behavior<D> for ScrollLocker<D> {
    fn handle_event(&mut self, dom: &D, event: &DomEvent<D::Node>) -> DefaultAction {
        if !self.alive {
            return DefaultAction::Allow;
        }
        if let DomEvent::Resize {
            source: ListenTarget::VisualViewport,
        } = event
        {
            self.refresh_viewport_height(dom);
            if let Some(input) = self.pending_reveal.take() {
                self.reveal(dom, &input);
            }
            return DefaultAction::Allow;
        }
        if self.strategy != LockStrategy::MobileSafari {
            return DefaultAction::Allow;
        }
        match event {
            DomEvent::TouchStart { target, client_y } => {
                self.on_touch_start(dom, target, *client_y);
                DefaultAction::Allow
            }
            DomEvent::TouchMove { target, client_y } => self.on_touch_move(dom, target, *client_y),
            DomEvent::TouchEnd { target } => self.on_touch_end(dom, target),
            DomEvent::Focus { target } => {
                self.on_focus(dom, target);
                DefaultAction::Allow
            }
            DomEvent::Scroll {
                source: ListenTarget::Window,
            } => {
                if dom.window_scroll() != (0.0, 0.0) {
                    dom.window_scroll_to(0.0, 0.0);
                }
                DefaultAction::Allow
            }
            _ => DefaultAction::Allow,
        }
    }

    fn handle_frame(&mut self, dom: &D, frame: FrameId) {
        let Some(task) = self.frames.take(frame) else {
            return;
        };
        if !self.alive {
            return;
        }
        match task {
            LockerFrame::RestoreTransform { input, previous } => {
                Self::restore_transform(dom, &input, &previous);
                if dom.viewport().is_keyboard_inset() {
                    self.reveal(dom, &input);
                } else {
                    self.pending_reveal = Some(input);
                }
            }
        }
    }

    fn destroy(&mut self, dom: &D) {
        if !self.alive {
            return;
        }
        self.unlock(dom);
        self.alive = false;
        self.binding.unwind(dom);
        debug!(target: "scrollkit::locker", "destroyed scroll locker");
    }
}
