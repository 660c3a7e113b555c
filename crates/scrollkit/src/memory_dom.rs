#![forbid(unsafe_code)]

//! Deterministic in-memory [`Dom`] for tests and headless hosts.
//!
//! Nodes live in an arena addressed by [`NodeId`]. Geometry is whatever the
//! caller configured: there is no layout engine. `scrollTop` is clamped the
//! way browsers clamp it, listeners/observers/frames are tracked so teardown
//! can be checked, and [`MemoryDom::dispatch`] only delivers an event when a
//! matching listener is registered.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::dom::{
    Behavior, DefaultAction, Dom, DomEvent, EventKind, FrameId, ListenTarget, ListenerId,
    ListenerOptions, ObserverId, Overflow, PlatformInfo, Rect, ScrollMetrics, Viewport,
};
use crate::error::DomError;

/// Arena index of a [`MemoryDom`] element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Default)]
struct NodeData {
    parent: Option<NodeId>,
    text_input: bool,
    scroll_top: f64,
    scroll_height: f64,
    client_height: f64,
    rect: Rect,
    overflow: Overflow,
    styles: BTreeMap<String, String>,
}

impl NodeData {
    fn clamp_scroll(&mut self) {
        let max = (self.scroll_height - self.client_height).max(0.0);
        self.scroll_top = self.scroll_top.clamp(0.0, max);
    }
}

/// One registered listener as seen by tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRecord {
    pub id: ListenerId,
    pub target: ListenTarget<NodeId>,
    pub kind: EventKind,
    pub options: ListenerOptions,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<NodeData>,
    active: Option<NodeId>,
    focus_calls: Vec<NodeId>,
    viewport: Viewport,
    window_scroll: (f64, f64),
    window_scroll_calls: Vec<(f64, f64)>,
    platform: PlatformInfo,
    listeners: BTreeMap<ListenerId, ListenerRecord>,
    observers: BTreeMap<ObserverId, NodeId>,
    frames: BTreeSet<FrameId>,
    failing_styles: HashSet<(NodeId, String)>,
    next_id: u32,
}

impl State {
    fn next_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.node(node).parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }
}

/// In-memory document with a root element and a body.
#[derive(Debug)]
pub struct MemoryDom {
    state: RefCell<State>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    pub const ROOT: NodeId = NodeId(0);
    pub const BODY: NodeId = NodeId(1);

    /// A desktop-like document: 1024x768 window, no scrollbar, not scrolled.
    #[must_use]
    pub fn new() -> Self {
        let root = NodeData {
            client_height: 768.0,
            scroll_height: 768.0,
            rect: Rect {
                top: 0.0,
                bottom: 768.0,
            },
            ..NodeData::default()
        };
        let body = NodeData {
            parent: Some(Self::ROOT),
            ..NodeData::default()
        };
        let state = State {
            nodes: vec![root, body],
            viewport: Viewport {
                inner_width: 1024.0,
                inner_height: 768.0,
                root_client_width: 1024.0,
                visual_height: 768.0,
            },
            platform: PlatformInfo {
                platform: "Linux x86_64".to_owned(),
                max_touch_points: 0,
            },
            ..State::default()
        };
        Self {
            state: RefCell::new(state),
        }
    }

    /// Appends a plain element under `parent`.
    pub fn create_element(&self, parent: NodeId) -> NodeId {
        let mut state = self.state.borrow_mut();
        state.nodes.push(NodeData {
            parent: Some(parent),
            ..NodeData::default()
        });
        NodeId(state.nodes.len() - 1)
    }

    /// Appends an `<input>` under `parent`.
    pub fn create_input(&self, parent: NodeId) -> NodeId {
        let id = self.create_element(parent);
        self.state.borrow_mut().node_mut(id).text_input = true;
        id
    }

    /// Appends a scroll container (`overflow-y: auto`) with the given geometry.
    pub fn create_scroller(&self, parent: NodeId, scroll_height: f64, client_height: f64) -> NodeId {
        let id = self.create_element(parent);
        self.set_overflow_y(id, "auto");
        self.set_scroll_geometry(id, scroll_height, client_height);
        id
    }

    /// Sets content and box height, re-clamping `scrollTop`.
    pub fn set_scroll_geometry(&self, node: NodeId, scroll_height: f64, client_height: f64) {
        let mut state = self.state.borrow_mut();
        let data = state.node_mut(node);
        data.scroll_height = scroll_height;
        data.client_height = client_height;
        data.clamp_scroll();
    }

    /// Changes content height only, as content insertion would.
    pub fn set_scroll_height(&self, node: NodeId, scroll_height: f64) {
        let mut state = self.state.borrow_mut();
        let data = state.node_mut(node);
        data.scroll_height = scroll_height;
        data.clamp_scroll();
    }

    pub fn scroll_top(&self, node: NodeId) -> f64 {
        self.state.borrow().node(node).scroll_top
    }

    pub fn set_overflow_y(&self, node: NodeId, value: &str) {
        self.state.borrow_mut().node_mut(node).overflow.overflow_y = value.to_owned();
    }

    pub fn set_overflow(&self, node: NodeId, overflow: Overflow) {
        self.state.borrow_mut().node_mut(node).overflow = overflow;
    }

    pub fn set_rect(&self, node: NodeId, top: f64, bottom: f64) {
        self.state.borrow_mut().node_mut(node).rect = Rect { top, bottom };
    }

    /// Seeds an inline style as if the page had authored it.
    pub fn seed_style(&self, node: NodeId, property: &str, value: &str) {
        self.state
            .borrow_mut()
            .node_mut(node)
            .styles
            .insert(property.to_owned(), value.to_owned());
    }

    /// Snapshot of a node's inline styles.
    pub fn inline_styles(&self, node: NodeId) -> BTreeMap<String, String> {
        self.state.borrow().node(node).styles.clone()
    }

    /// Makes every write of `property` on `node` fail.
    pub fn fail_style_writes(&self, node: NodeId, property: &str) {
        self.state
            .borrow_mut()
            .failing_styles
            .insert((node, property.to_owned()));
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.state.borrow_mut().viewport = viewport;
    }

    pub fn set_visual_height(&self, height: f64) {
        self.state.borrow_mut().viewport.visual_height = height;
    }

    pub fn set_platform(&self, platform: &str, max_touch_points: u32) {
        self.state.borrow_mut().platform = PlatformInfo {
            platform: platform.to_owned(),
            max_touch_points,
        };
    }

    /// Moves the window without notifying anyone, as the user would.
    pub fn set_window_scroll(&self, x: f64, y: f64) {
        self.state.borrow_mut().window_scroll = (x, y);
    }

    /// Every `window.scrollTo` issued so far.
    pub fn window_scroll_calls(&self) -> Vec<(f64, f64)> {
        self.state.borrow().window_scroll_calls.clone()
    }

    /// Every element `focus()` was called on, in order.
    pub fn focus_calls(&self) -> Vec<NodeId> {
        self.state.borrow().focus_calls.clone()
    }

    /// Moves focus without going through [`Dom::focus`].
    pub fn set_active_element(&self, node: Option<NodeId>) {
        self.state.borrow_mut().active = node;
    }

    pub fn listeners(&self) -> Vec<ListenerRecord> {
        self.state.borrow().listeners.values().cloned().collect()
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn observer_count(&self) -> usize {
        self.state.borrow().observers.len()
    }

    pub fn pending_frames(&self) -> Vec<FrameId> {
        self.state.borrow().frames.iter().copied().collect()
    }

    /// Whether a listener of `kind` would see an event aimed at `event`.
    fn is_subscribed(&self, event: &DomEvent<NodeId>) -> bool {
        let state = self.state.borrow();
        let (kind, source, target) = match event {
            DomEvent::Mutation => return !state.observers.is_empty(),
            DomEvent::Scroll { source } => (EventKind::Scroll, Some(source), None),
            DomEvent::Resize { source } => (EventKind::Resize, Some(source), None),
            DomEvent::TouchStart { target, .. } => (EventKind::TouchStart, None, Some(*target)),
            DomEvent::TouchMove { target, .. } => (EventKind::TouchMove, None, Some(*target)),
            DomEvent::TouchEnd { target } => (EventKind::TouchEnd, None, Some(*target)),
            DomEvent::Focus { target } => (EventKind::Focus, None, Some(*target)),
        };
        state.listeners.values().any(|record| {
            if record.kind != kind {
                return false;
            }
            match (source, target) {
                (Some(source), _) => &record.target == source,
                (None, Some(target)) => match &record.target {
                    ListenTarget::Document | ListenTarget::Window => true,
                    ListenTarget::Element(el) => state.is_ancestor_or_self(*el, target),
                    ListenTarget::VisualViewport => false,
                },
                (None, None) => false,
            }
        })
    }

    /// Delivers `event` to `behavior` if it is listening for it.
    pub fn dispatch<B: Behavior<Self>>(
        &self,
        behavior: &mut B,
        event: DomEvent<NodeId>,
    ) -> DefaultAction {
        if self.is_subscribed(&event) {
            behavior.handle_event(self, &event)
        } else {
            DefaultAction::Allow
        }
    }

    /// Scrolls `node` like a user would and delivers the scroll event.
    pub fn user_scroll<B: Behavior<Self>>(&self, behavior: &mut B, node: NodeId, scroll_top: f64) {
        self.set_scroll_top(&node, scroll_top);
        self.dispatch(
            behavior,
            DomEvent::Scroll {
                source: ListenTarget::Element(node),
            },
        );
    }

    /// Runs every frame pending right now; frames requested meanwhile wait.
    pub fn run_frames<B: Behavior<Self>>(&self, behavior: &mut B) -> usize {
        let frames = std::mem::take(&mut self.state.borrow_mut().frames);
        for frame in &frames {
            behavior.handle_frame(self, *frame);
        }
        frames.len()
    }
}

impl Dom for MemoryDom {
    type Node = NodeId;

    fn document_element(&self) -> NodeId {
        Self::ROOT
    }

    fn body(&self) -> NodeId {
        Self::BODY
    }

    fn parent_element(&self, node: &NodeId) -> Option<NodeId> {
        self.state.borrow().node(*node).parent
    }

    fn active_element(&self) -> Option<NodeId> {
        self.state.borrow().active
    }

    fn is_text_input(&self, node: &NodeId) -> bool {
        self.state.borrow().node(*node).text_input
    }

    fn scroll_metrics(&self, node: &NodeId) -> ScrollMetrics {
        let state = self.state.borrow();
        let data = state.node(*node);
        ScrollMetrics {
            scroll_top: data.scroll_top,
            scroll_height: data.scroll_height,
            client_height: data.client_height,
        }
    }

    fn set_scroll_top(&self, node: &NodeId, value: f64) {
        let mut state = self.state.borrow_mut();
        let data = state.node_mut(*node);
        data.scroll_top = value;
        data.clamp_scroll();
    }

    fn bounding_rect(&self, node: &NodeId) -> Rect {
        self.state.borrow().node(*node).rect
    }

    fn computed_overflow(&self, node: &NodeId) -> Overflow {
        self.state.borrow().node(*node).overflow.clone()
    }

    fn style_property(&self, node: &NodeId, property: &str) -> String {
        self.state
            .borrow()
            .node(*node)
            .styles
            .get(property)
            .cloned()
            .unwrap_or_default()
    }

    fn set_style_property(&self, node: &NodeId, property: &str, value: &str) -> Result<(), DomError> {
        let mut state = self.state.borrow_mut();
        if state.failing_styles.contains(&(*node, property.to_owned())) {
            return Err(DomError::Style {
                property: property.to_owned(),
                reason: "write rejected".to_owned(),
            });
        }
        let styles = &mut state.node_mut(*node).styles;
        if value.is_empty() {
            styles.remove(property);
        } else {
            styles.insert(property.to_owned(), value.to_owned());
        }
        Ok(())
    }

    fn focus(&self, node: &NodeId) -> Result<(), DomError> {
        let mut state = self.state.borrow_mut();
        state.active = Some(*node);
        state.focus_calls.push(*node);
        Ok(())
    }

    fn viewport(&self) -> Viewport {
        self.state.borrow().viewport
    }

    fn window_scroll(&self) -> (f64, f64) {
        self.state.borrow().window_scroll
    }

    fn window_scroll_to(&self, x: f64, y: f64) {
        let mut state = self.state.borrow_mut();
        state.window_scroll = (x, y);
        state.window_scroll_calls.push((x, y));
    }

    fn platform(&self) -> PlatformInfo {
        self.state.borrow().platform.clone()
    }

    fn add_listener(
        &self,
        target: &ListenTarget<NodeId>,
        kind: EventKind,
        options: ListenerOptions,
    ) -> Result<ListenerId, DomError> {
        let mut state = self.state.borrow_mut();
        let id = ListenerId(state.next_id());
        state.listeners.insert(
            id,
            ListenerRecord {
                id,
                target: target.clone(),
                kind,
                options,
            },
        );
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) -> Result<(), DomError> {
        match self.state.borrow_mut().listeners.remove(&id) {
            Some(_) => Ok(()),
            None => Err(DomError::Listener {
                event: "unknown",
                reason: format!("listener {} is not registered", id.0),
            }),
        }
    }

    fn observe_subtree(&self, node: &NodeId) -> Result<ObserverId, DomError> {
        let mut state = self.state.borrow_mut();
        let id = ObserverId(state.next_id());
        state.observers.insert(id, *node);
        Ok(id)
    }

    fn disconnect_observer(&self, id: ObserverId) -> Result<(), DomError> {
        match self.state.borrow_mut().observers.remove(&id) {
            Some(_) => Ok(()),
            None => Err(DomError::Observer(format!("observer {} is not connected", id.0))),
        }
    }

    fn request_frame(&self) -> Result<FrameId, DomError> {
        let mut state = self.state.borrow_mut();
        let id = FrameId(state.next_id());
        state.frames.insert(id);
        Ok(id)
    }

    fn cancel_frame(&self, id: FrameId) {
        self.state.borrow_mut().frames.remove(&id);
    }
}
