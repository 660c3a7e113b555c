#![forbid(unsafe_code)]

//! The environment capability every behavior is written against.
//!
//! Behaviors never touch `window`, `document` or the visual viewport
//! directly. They receive a [`Dom`] and talk to it through this trait, which
//! keeps them deterministic and lets tests substitute
//! [`MemoryDom`](crate::memory_dom::MemoryDom).
//!
//! The flow is host-driven:
//! 1. A behavior registers listeners, observers and frame requests through
//!    the [`Dom`].
//! 2. The host delivers each matching occurrence back as a [`DomEvent`] via
//!    [`Behavior::handle_event`], honoring the returned [`DefaultAction`].
//! 3. Animation frames come back through [`Behavior::handle_frame`].
//! 4. [`Behavior::destroy`] releases everything the behavior registered.

use core::fmt;

use crate::error::DomError;

/// Handle for one registered event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u32);

/// Handle for one subtree mutation observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u32);

/// Handle for one requested animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

/// DOM event types the behaviors subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Scroll,
    Resize,
    TouchStart,
    TouchMove,
    TouchEnd,
    Focus,
}

impl EventKind {
    /// DOM event type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scroll => "scroll",
            Self::Resize => "resize",
            Self::TouchStart => "touchstart",
            Self::TouchMove => "touchmove",
            Self::TouchEnd => "touchend",
            Self::Focus => "focus",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a listener is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenTarget<N> {
    Element(N),
    Window,
    VisualViewport,
    Document,
}

/// `addEventListener` options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerOptions {
    pub capture: bool,
    pub passive: bool,
}

impl ListenerOptions {
    /// Bubbling listener that never calls `preventDefault`.
    pub const PASSIVE: Self = Self {
        capture: false,
        passive: true,
    };
    /// Capturing listener that may call `preventDefault`.
    pub const INTERCEPT: Self = Self {
        capture: true,
        passive: false,
    };
}

/// Slack for the bottom edge. Browsers report `scrollHeight` and
/// `clientHeight` as integers while `scrollTop` can be fractional on HiDPI
/// screens, so a pane scrolled fully down may still be up to 1px short.
pub const SUBPIXEL_SLACK_PX: f64 = 1.0;

/// Scroll geometry of one element.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    /// Distance left to scroll before the bottom edge is reached.
    #[must_use]
    pub fn distance_from_bottom(&self) -> f64 {
        self.scroll_height - self.client_height - self.scroll_top
    }

    /// Largest legal `scrollTop`.
    #[must_use]
    pub fn max_scroll_top(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }

    #[must_use]
    pub fn is_at_top(&self) -> bool {
        self.scroll_top <= 0.0
    }

    /// Bottom edge reached, within [`SUBPIXEL_SLACK_PX`].
    #[must_use]
    pub fn is_at_bottom(&self) -> bool {
        self.distance_from_bottom() < SUBPIXEL_SLACK_PX
    }
}

/// Vertical extent of a bounding client rect.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub top: f64,
    pub bottom: f64,
}

/// Computed `overflow`, `overflow-x` and `overflow-y` values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Overflow {
    pub overflow: String,
    pub overflow_x: String,
    pub overflow_y: String,
}

/// Window and viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    /// `window.innerWidth`, scrollbar included.
    pub inner_width: f64,
    /// `window.innerHeight`.
    pub inner_height: f64,
    /// `document.documentElement.clientWidth`, scrollbar excluded.
    pub root_client_width: f64,
    /// `visualViewport.height`; shrinks while an on-screen keyboard is up.
    pub visual_height: f64,
}

impl Viewport {
    /// Width of the classic vertical scrollbar, zero for overlay scrollbars.
    #[must_use]
    pub fn scrollbar_width(&self) -> f64 {
        (self.inner_width - self.root_client_width).max(0.0)
    }

    /// Whether the visual viewport is smaller than the layout viewport.
    #[must_use]
    pub fn is_keyboard_inset(&self) -> bool {
        self.visual_height < self.inner_height
    }
}

/// `navigator.platform` and `navigator.maxTouchPoints`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlatformInfo {
    pub platform: String,
    pub max_touch_points: u32,
}

/// One occurrence delivered by the host to a behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum DomEvent<N> {
    Scroll { source: ListenTarget<N> },
    Resize { source: ListenTarget<N> },
    /// At least one record from a subtree mutation observer.
    Mutation,
    TouchStart { target: N, client_y: f64 },
    TouchMove { target: N, client_y: f64 },
    TouchEnd { target: N },
    Focus { target: N },
}

/// Whether the host must call `preventDefault()` on the delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultAction {
    #[default]
    Allow,
    Prevent,
}

impl DefaultAction {
    #[must_use]
    pub const fn is_prevented(self) -> bool {
        matches!(self, Self::Prevent)
    }
}

/// Access to the document, window and visual viewport.
///
/// Methods take `&self`: the DOM is shared, interior-mutable state and a
/// behavior may hold no exclusive claim on it.
pub trait Dom {
    /// Element reference. Cheap to clone; equality is identity.
    type Node: Clone + PartialEq + fmt::Debug;

    /// `document.documentElement`.
    fn document_element(&self) -> Self::Node;
    /// `document.body`.
    fn body(&self) -> Self::Node;
    /// `node.parentElement`.
    fn parent_element(&self, node: &Self::Node) -> Option<Self::Node>;
    /// `document.activeElement`.
    fn active_element(&self) -> Option<Self::Node>;
    /// Whether the node is a text-entry control that raises the keyboard.
    fn is_text_input(&self, node: &Self::Node) -> bool;

    fn scroll_metrics(&self, node: &Self::Node) -> ScrollMetrics;
    /// Sets `scrollTop`; the DOM clamps it to the legal range.
    fn set_scroll_top(&self, node: &Self::Node, value: f64);
    fn bounding_rect(&self, node: &Self::Node) -> Rect;
    fn computed_overflow(&self, node: &Self::Node) -> Overflow;

    /// Inline style value, empty when unset.
    fn style_property(&self, node: &Self::Node, property: &str) -> String;
    /// Sets an inline style value; an empty value removes the property.
    fn set_style_property(
        &self,
        node: &Self::Node,
        property: &str,
        value: &str,
    ) -> Result<(), DomError>;
    fn focus(&self, node: &Self::Node) -> Result<(), DomError>;

    fn viewport(&self) -> Viewport;
    /// `(window.scrollX, window.scrollY)`.
    fn window_scroll(&self) -> (f64, f64);
    fn window_scroll_to(&self, x: f64, y: f64);
    fn platform(&self) -> PlatformInfo;

    fn add_listener(
        &self,
        target: &ListenTarget<Self::Node>,
        kind: EventKind,
        options: ListenerOptions,
    ) -> Result<ListenerId, DomError>;
    fn remove_listener(&self, id: ListenerId) -> Result<(), DomError>;

    /// Observes child list, character data and attributes of the subtree.
    fn observe_subtree(&self, node: &Self::Node) -> Result<ObserverId, DomError>;
    fn disconnect_observer(&self, id: ObserverId) -> Result<(), DomError>;

    /// Requests one callback before the next paint.
    fn request_frame(&self) -> Result<FrameId, DomError>;
    fn cancel_frame(&self, id: FrameId);
}

/// An attached behavior driven by its host.
pub trait Behavior<D: Dom> {
    /// Reacts to one event; the return value tells the host whether to
    /// call `preventDefault()`.
    fn handle_event(&mut self, dom: &D, event: &DomEvent<D::Node>) -> DefaultAction;

    /// Runs a frame previously requested through [`Dom::request_frame`].
    fn handle_frame(&mut self, dom: &D, frame: FrameId);

    /// Releases every listener, observer and pending frame, and restores
    /// whatever the behavior changed. Never fails.
    fn destroy(&mut self, dom: &D);
}
