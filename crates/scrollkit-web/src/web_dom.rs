#![forbid(unsafe_code)]

//! [`Dom`] over web-sys.
//!
//! Listeners, mutation observers and animation frames registered here call
//! back into the owning attachment through a [`Signals`] sink. The sink is
//! held weakly: once the attachment is gone, late callbacks do nothing.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Weak;

use js_sys::{Array, Reflect};
use scrollkit::dom::{
    DefaultAction, Dom, DomEvent, EventKind, FrameId, ListenTarget, ListenerId, ListenerOptions,
    ObserverId, Overflow, PlatformInfo, Rect, ScrollMetrics, Viewport,
};
use scrollkit::error::DomError;
use tracing::{trace, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    AddEventListenerOptions, Document, Element, Event, EventTarget, HtmlElement, MutationObserver,
    MutationObserverInit, TouchEvent, Window,
};

/// Receiver for everything the browser hands back.
pub(crate) trait Signals {
    /// Delivers one event. A returned error is a caller callback failure
    /// that must be rethrown once all Rust borrows are released.
    fn on_event(&self, event: DomEvent<Element>) -> (DefaultAction, Option<JsValue>);
    /// Runs one animation frame; the error has the same meaning as above.
    fn on_frame(&self, frame: FrameId) -> Option<JsValue>;
}

pub(crate) fn js_reason(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

/// Window, document and the two elements every behavior may touch.
pub(crate) struct Globals {
    window: Window,
    document: Document,
    root: Element,
    body: Element,
}

impl Globals {
    pub(crate) fn capture() -> Result<Self, DomError> {
        let window = web_sys::window().ok_or(DomError::MissingGlobal("window"))?;
        let document = window
            .document()
            .ok_or(DomError::MissingGlobal("document"))?;
        let root = document
            .document_element()
            .ok_or(DomError::MissingGlobal("document.documentElement"))?;
        let body = document
            .body()
            .ok_or(DomError::MissingGlobal("document.body"))?
            .into();
        Ok(Self {
            window,
            document,
            root,
            body,
        })
    }
}

struct Registration {
    target: EventTarget,
    kind: EventKind,
    capture: bool,
    closure: Closure<dyn FnMut(Event)>,
}

struct Observation {
    observer: MutationObserver,
    _closure: Closure<dyn FnMut(Array, MutationObserver)>,
}

pub(crate) struct WebDom {
    globals: Globals,
    signals: Weak<dyn Signals>,
    listeners: RefCell<HashMap<ListenerId, Registration>>,
    observers: RefCell<HashMap<ObserverId, Observation>>,
    frames: RefCell<HashMap<FrameId, i32>>,
    next_id: Cell<u32>,
}

fn as_html(node: &Element) -> Option<&HtmlElement> {
    node.dyn_ref::<HtmlElement>()
}

/// `scrollTop` is a double in the DOM; reading it through `Reflect` keeps
/// the sub-pixel part that HiDPI scrolling produces.
fn fractional_scroll_top(node: &Element) -> f64 {
    Reflect::get(node, &JsValue::from_str("scrollTop"))
        .ok()
        .and_then(|value| value.as_f64())
        .unwrap_or(0.0)
}

fn event_target_element(event: &Event) -> Option<Element> {
    event.target()?.dyn_into::<Element>().ok()
}

fn touch_client_y(event: &Event) -> Option<f64> {
    let touch = event.dyn_ref::<TouchEvent>()?.touches().get(0)?;
    Some(f64::from(touch.client_y()))
}

fn to_dom_event(kind: EventKind, source: &ListenTarget<Element>, event: &Event) -> Option<DomEvent<Element>> {
    Some(match kind {
        EventKind::Scroll => DomEvent::Scroll {
            source: source.clone(),
        },
        EventKind::Resize => DomEvent::Resize {
            source: source.clone(),
        },
        EventKind::TouchStart => DomEvent::TouchStart {
            target: event_target_element(event)?,
            client_y: touch_client_y(event)?,
        },
        EventKind::TouchMove => DomEvent::TouchMove {
            target: event_target_element(event)?,
            client_y: touch_client_y(event)?,
        },
        EventKind::TouchEnd => DomEvent::TouchEnd {
            target: event_target_element(event)?,
        },
        EventKind::Focus => DomEvent::Focus {
            target: event_target_element(event)?,
        },
    })
}

impl WebDom {
    pub(crate) fn new(globals: Globals, signals: Weak<dyn Signals>) -> Self {
        Self {
            globals,
            signals,
            listeners: RefCell::new(HashMap::new()),
            observers: RefCell::new(HashMap::new()),
            frames: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    fn next_id(&self) -> u32 {
        let id = self.next_id.get().wrapping_add(1);
        self.next_id.set(id);
        id
    }

    /// Forgets a frame the browser just ran.
    pub(crate) fn frame_fired(&self, frame: FrameId) {
        self.frames.borrow_mut().remove(&frame);
    }

    fn event_target(&self, target: &ListenTarget<Element>) -> EventTarget {
        match target {
            ListenTarget::Element(element) => element.clone().into(),
            ListenTarget::Window => self.globals.window.clone().into(),
            // Browsers without a visual viewport resize it with the window.
            ListenTarget::VisualViewport => match self.globals.window.visual_viewport() {
                Some(viewport) => viewport.into(),
                None => self.globals.window.clone().into(),
            },
            ListenTarget::Document => self.globals.document.clone().into(),
        }
    }

    fn detach(id: ListenerId, registration: &Registration) -> Result<(), DomError> {
        registration
            .target
            .remove_event_listener_with_callback_and_bool(
                registration.kind.as_str(),
                registration.closure.as_ref().unchecked_ref(),
                registration.capture,
            )
            .map_err(|err| DomError::Listener {
                event: registration.kind.as_str(),
                reason: format!("listener {}: {}", id.0, js_reason(&err)),
            })
    }
}

impl Dom for WebDom {
    type Node = Element;

    fn document_element(&self) -> Element {
        self.globals.root.clone()
    }

    fn body(&self) -> Element {
        self.globals.body.clone()
    }

    fn parent_element(&self, node: &Element) -> Option<Element> {
        node.parent_element()
    }

    fn active_element(&self) -> Option<Element> {
        self.globals.document.active_element()
    }

    fn is_text_input(&self, node: &Element) -> bool {
        match node.tag_name().as_str() {
            "INPUT" | "TEXTAREA" | "SELECT" => true,
            _ => as_html(node).is_some_and(HtmlElement::is_content_editable),
        }
    }

    fn scroll_metrics(&self, node: &Element) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top: fractional_scroll_top(node),
            scroll_height: f64::from(node.scroll_height()),
            client_height: f64::from(node.client_height()),
        }
    }

    fn set_scroll_top(&self, node: &Element, value: f64) {
        if Reflect::set(node, &JsValue::from_str("scrollTop"), &JsValue::from_f64(value)).is_err() {
            warn!(target: "scrollkit_web", value, "could not write scrollTop");
        }
    }

    fn bounding_rect(&self, node: &Element) -> Rect {
        let rect = node.get_bounding_client_rect();
        Rect {
            top: rect.top(),
            bottom: rect.bottom(),
        }
    }

    fn computed_overflow(&self, node: &Element) -> Overflow {
        let Ok(Some(style)) = self.globals.window.get_computed_style(node) else {
            return Overflow::default();
        };
        let read = |property: &str| style.get_property_value(property).unwrap_or_default();
        Overflow {
            overflow: read("overflow"),
            overflow_x: read("overflow-x"),
            overflow_y: read("overflow-y"),
        }
    }

    fn style_property(&self, node: &Element, property: &str) -> String {
        as_html(node)
            .and_then(|html| html.style().get_property_value(property).ok())
            .unwrap_or_default()
    }

    fn set_style_property(&self, node: &Element, property: &str, value: &str) -> Result<(), DomError> {
        let html = as_html(node).ok_or_else(|| DomError::Style {
            property: property.to_owned(),
            reason: format!("<{}> has no inline style", node.tag_name()),
        })?;
        let style = html.style();
        let result = if value.is_empty() {
            style.remove_property(property).map(|_| ())
        } else {
            style.set_property(property, value)
        };
        result.map_err(|err| DomError::Style {
            property: property.to_owned(),
            reason: js_reason(&err),
        })
    }

    fn focus(&self, node: &Element) -> Result<(), DomError> {
        let html = as_html(node).ok_or_else(|| DomError::Focus(format!("<{}> is not focusable", node.tag_name())))?;
        html.focus().map_err(|err| DomError::Focus(js_reason(&err)))
    }

    fn viewport(&self) -> Viewport {
        let window = &self.globals.window;
        let inner_width = window.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
        let inner_height = window.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
        Viewport {
            inner_width,
            inner_height,
            root_client_width: f64::from(self.globals.root.client_width()),
            visual_height: window
                .visual_viewport()
                .map_or(inner_height, |viewport| viewport.height()),
        }
    }

    fn window_scroll(&self) -> (f64, f64) {
        let window = &self.globals.window;
        (
            window.scroll_x().unwrap_or(0.0),
            window.scroll_y().unwrap_or(0.0),
        )
    }

    fn window_scroll_to(&self, x: f64, y: f64) {
        self.globals.window.scroll_to_with_x_and_y(x, y);
    }

    fn platform(&self) -> PlatformInfo {
        let navigator = self.globals.window.navigator();
        PlatformInfo {
            platform: navigator.platform().unwrap_or_default(),
            max_touch_points: u32::try_from(navigator.max_touch_points()).unwrap_or(0),
        }
    }

    fn add_listener(
        &self,
        target: &ListenTarget<Element>,
        kind: EventKind,
        options: ListenerOptions,
    ) -> Result<ListenerId, DomError> {
        let id = ListenerId(self.next_id());
        let signals = self.signals.clone();
        let source = target.clone();
        let closure = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let Some(dom_event) = to_dom_event(kind, &source, &event) else {
                return;
            };
            let (action, error) = match signals.upgrade() {
                Some(sink) => sink.on_event(dom_event),
                None => return,
            };
            if action.is_prevented() && event.cancelable() {
                event.prevent_default();
            }
            drop(event);
            if let Some(error) = error {
                wasm_bindgen::throw_val(error);
            }
        });

        let event_target = self.event_target(target);
        let js_options = AddEventListenerOptions::new();
        js_options.set_capture(options.capture);
        js_options.set_passive(options.passive);
        event_target
            .add_event_listener_with_callback_and_add_event_listener_options(
                kind.as_str(),
                closure.as_ref().unchecked_ref(),
                &js_options,
            )
            .map_err(|err| DomError::Listener {
                event: kind.as_str(),
                reason: js_reason(&err),
            })?;

        self.listeners.borrow_mut().insert(
            id,
            Registration {
                target: event_target,
                kind,
                capture: options.capture,
                closure,
            },
        );
        trace!(target: "scrollkit_web", id = id.0, event = kind.as_str(), "added listener");
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) -> Result<(), DomError> {
        let registration = self
            .listeners
            .borrow_mut()
            .remove(&id)
            .ok_or_else(|| DomError::Listener {
                event: "unknown",
                reason: format!("listener {} is not registered", id.0),
            })?;
        Self::detach(id, &registration)
    }

    fn observe_subtree(&self, node: &Element) -> Result<ObserverId, DomError> {
        let id = ObserverId(self.next_id());
        let signals = self.signals.clone();
        let closure = Closure::<dyn FnMut(Array, MutationObserver)>::new(
            move |_records: Array, _observer: MutationObserver| {
                let error = match signals.upgrade() {
                    Some(sink) => sink.on_event(DomEvent::Mutation).1,
                    None => return,
                };
                if let Some(error) = error {
                    wasm_bindgen::throw_val(error);
                }
            },
        );
        let observer = MutationObserver::new(closure.as_ref().unchecked_ref())
            .map_err(|err| DomError::Observer(js_reason(&err)))?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        init.set_character_data(true);
        init.set_attributes(true);
        observer
            .observe_with_options(node, &init)
            .map_err(|err| DomError::Observer(js_reason(&err)))?;
        self.observers.borrow_mut().insert(
            id,
            Observation {
                observer,
                _closure: closure,
            },
        );
        Ok(id)
    }

    fn disconnect_observer(&self, id: ObserverId) -> Result<(), DomError> {
        let observation = self
            .observers
            .borrow_mut()
            .remove(&id)
            .ok_or_else(|| DomError::Observer(format!("observer {} is not connected", id.0)))?;
        observation.observer.disconnect();
        Ok(())
    }

    fn request_frame(&self) -> Result<FrameId, DomError> {
        let frame = FrameId(self.next_id());
        let signals = self.signals.clone();
        let callback = Closure::once_into_js(move || {
            let error = match signals.upgrade() {
                Some(sink) => sink.on_frame(frame),
                None => return,
            };
            if let Some(error) = error {
                wasm_bindgen::throw_val(error);
            }
        });
        let handle = self
            .globals
            .window
            .request_animation_frame(callback.unchecked_ref())
            .map_err(|err| DomError::Listener {
                event: "requestAnimationFrame",
                reason: js_reason(&err),
            })?;
        self.frames.borrow_mut().insert(frame, handle);
        Ok(frame)
    }

    fn cancel_frame(&self, id: FrameId) {
        if let Some(handle) = self.frames.borrow_mut().remove(&id) {
            if let Err(err) = self.globals.window.cancel_animation_frame(handle) {
                warn!(target: "scrollkit_web", reason = %js_reason(&err), "cancelAnimationFrame failed");
            }
        }
    }
}

impl Drop for WebDom {
    fn drop(&mut self) {
        // A live JS listener pointing at a dropped closure throws on every
        // event, so nothing may outlive the DOM handle.
        for (id, registration) in self.listeners.get_mut().drain() {
            let _ = Self::detach(id, &registration);
        }
        for (_, observation) in self.observers.get_mut().drain() {
            observation.observer.disconnect();
        }
        for (_, handle) in self.frames.get_mut().drain() {
            let _ = self.globals.window.cancel_animation_frame(handle);
        }
    }
}
