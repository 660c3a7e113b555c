#![forbid(unsafe_code)]

//! `wasm-bindgen` exports: `attachScrollPinner`, `attachScrollLock` and
//! `attachNearTopWatcher`, each returning an update/destroy handle.
//!
//! Only compiled on `wasm32` targets.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use js_sys::{Array, Function, Reflect};
use scrollkit::config::PinStateCallback;
use scrollkit::dom::{Behavior, DefaultAction, DomEvent, FrameId};
use scrollkit::error::DomError;
use scrollkit::near_top::NearTopCallback;
use scrollkit::{
    LockStrategy, NearTopWatcher, ScrollLocker, ScrollPinner, ScrollPinnerOptions,
    ScrollPinnerUpdate,
};
use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::Element;

use crate::host::{HostedBehavior, PinnedMirror};
use crate::web_dom::{Globals, Signals, WebDom};

fn console_error(msg: &str) {
    let global = js_sys::global();
    let Ok(console) = Reflect::get(&global, &"console".into()) else {
        return;
    };
    let Ok(error) = Reflect::get(&console, &"error".into()) else {
        return;
    };
    let Ok(error_fn) = error.dyn_into::<Function>() else {
        return;
    };
    let _ = error_fn.call1(&console, &JsValue::from_str(msg));
}

fn install_panic_hook() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = if let Some(loc) = info.location() {
                format!(
                    "panic at {}:{}:{}: {info}",
                    loc.file(),
                    loc.line(),
                    loc.column()
                )
            } else {
                format!("panic: {info}")
            };
            console_error(&msg);
        }));
    });
}

fn dom_error_to_js(error: &DomError) -> JsValue {
    js_sys::Error::new(&error.to_string()).into()
}

fn get_js(obj: &JsValue, key: &str) -> Option<JsValue> {
    if !obj.is_object() {
        return None;
    }
    Reflect::get(obj, &JsValue::from_str(key))
        .ok()
        .filter(|value| !value.is_undefined() && !value.is_null())
}

fn type_error(message: &str) -> JsValue {
    js_sys::TypeError::new(message).into()
}

/// First error thrown by caller code during one delivery.
type ErrorSlot = Rc<RefCell<Option<JsValue>>>;

fn record_error(slot: &ErrorSlot, error: JsValue) {
    let mut slot = slot.borrow_mut();
    if slot.is_none() {
        *slot = Some(error);
    }
}

/// One attached behavior together with the DOM handle its listeners live on.
struct Attachment<B: Behavior<WebDom>> {
    dom: WebDom,
    hosted: HostedBehavior<WebDom, B>,
    errors: ErrorSlot,
}

impl<B: Behavior<WebDom> + 'static> Attachment<B> {
    /// Captures the globals and wires the listener sink back to the new
    /// attachment; `attach` then builds the behavior against its DOM.
    fn create(
        attach: impl FnOnce(&WebDom, &ErrorSlot) -> Result<B, DomError>,
    ) -> Result<Rc<Self>, JsValue> {
        install_panic_hook();
        let globals = Globals::capture().map_err(|err| dom_error_to_js(&err))?;
        let attachment = Rc::new_cyclic(|weak: &Weak<Self>| {
            let signals: Weak<dyn Signals> = weak.clone();
            Self {
                dom: WebDom::new(globals, signals),
                hosted: HostedBehavior::new(),
                errors: Rc::new(RefCell::new(None)),
            }
        });
        let behavior =
            attach(&attachment.dom, &attachment.errors).map_err(|err| dom_error_to_js(&err))?;
        attachment.hosted.install(behavior);
        attachment.take_error()?;
        Ok(attachment)
    }

    fn take_error(&self) -> Result<(), JsValue> {
        match self.errors.borrow_mut().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn with_mut<R>(&self, f: impl FnOnce(&WebDom, &mut B) -> R) -> Option<R> {
        self.hosted.with_mut(|behavior| f(&self.dom, behavior))
    }

    /// Like `with_mut`, but a call made from inside a caller callback is
    /// applied once the current delivery returns instead of being lost.
    fn apply(&self, f: impl FnOnce(&WebDom, &mut B) + 'static) {
        self.hosted.apply(&self.dom, f);
    }

    fn destroy(&self) {
        if self.hosted.destroy(&self.dom) {
            debug!(target: "scrollkit_web", "destroyed attachment");
        }
    }
}

impl<B: Behavior<WebDom>> Signals for Attachment<B> {
    fn on_event(&self, event: DomEvent<Element>) -> (DefaultAction, Option<JsValue>) {
        let action = self.hosted.deliver(&self.dom, &event);
        (action, self.errors.borrow_mut().take())
    }

    fn on_frame(&self, frame: FrameId) -> Option<JsValue> {
        self.dom.frame_fired(frame);
        self.hosted.deliver_frame(&self.dom, frame);
        self.errors.borrow_mut().take()
    }
}

impl<B: Behavior<WebDom>> Drop for Attachment<B> {
    fn drop(&mut self) {
        // `WebDom`'s own drop removes whatever the behavior left behind.
        self.hosted.destroy(&self.dom);
    }
}

fn pin_callback(function: Function, errors: &ErrorSlot) -> PinStateCallback {
    let errors = Rc::clone(errors);
    Box::new(move |pinned| {
        if let Err(error) = function.call1(&JsValue::NULL, &JsValue::from_bool(pinned)) {
            record_error(&errors, error);
        }
    })
}

fn near_top_callback(function: Function, errors: &ErrorSlot) -> NearTopCallback {
    let errors = Rc::clone(errors);
    Box::new(move || {
        if let Err(error) = function.call0(&JsValue::NULL) {
            record_error(&errors, error);
        }
    })
}

struct PinnerOptions {
    values: ScrollPinnerOptions,
    on_pin_state_change: Option<Function>,
}

/// Plain values go through JSON; the callback is read separately since
/// `JSON.stringify` drops functions.
fn read_pinner_options(options: &JsValue) -> Result<PinnerOptions, JsValue> {
    if !options.is_object() {
        return Ok(PinnerOptions {
            values: ScrollPinnerOptions::default(),
            on_pin_state_change: None,
        });
    }
    let json: String = js_sys::JSON::stringify(options)?.into();
    let values = ScrollPinnerOptions::from_json_str(&json)
        .map_err(|err| type_error(&format!("invalid scroll pinner options: {err}")))?;
    let on_pin_state_change = match get_js(options, "onPinStateChange") {
        Some(value) => Some(
            value
                .dyn_into::<Function>()
                .map_err(|_| type_error("onPinStateChange must be a function"))?,
        ),
        None => None,
    };
    Ok(PinnerOptions {
        values,
        on_pin_state_change,
    })
}

/// Accepts `fn`, `[fn]` or `{ callback: fn }`.
fn read_near_top_callback(value: &JsValue) -> Result<Function, JsValue> {
    let candidate = if Array::is_array(value) {
        Array::from(value).get(0)
    } else if value.is_function() {
        value.clone()
    } else {
        get_js(value, "callback").unwrap_or(JsValue::UNDEFINED)
    };
    candidate
        .dyn_into::<Function>()
        .map_err(|_| type_error("near-top watcher needs a callback function"))
}

type PinnerAttachment = Attachment<ScrollPinner<WebDom>>;
type LockerAttachment = Attachment<ScrollLocker<WebDom>>;
type NearTopAttachment = Attachment<NearTopWatcher<WebDom>>;

/// Keeps `node` scrolled to the bottom while the user stays near it.
///
/// `options`: `{ threshold?: number, onPinStateChange?: (isPinned) => void }`.
#[wasm_bindgen(js_name = attachScrollPinner)]
pub fn attach_scroll_pinner(node: Element, options: JsValue) -> Result<ScrollPinnerHandle, JsValue> {
    let options = read_pinner_options(&options)?;
    let config = options.values.config();
    let pinned = PinnedMirror::new();
    let attachment = Attachment::create(|dom, errors| {
        let callback = options
            .on_pin_state_change
            .map(|function| pin_callback(function, errors));
        ScrollPinner::attach(dom, node, config, Some(pinned.track(callback)))
    })?;
    Ok(ScrollPinnerHandle {
        attachment: Some(attachment),
        pinned,
    })
}

/// Locks page scrolling; on iOS the mobile-Safari workarounds are installed.
#[wasm_bindgen(js_name = attachScrollLock)]
pub fn attach_scroll_lock(node: Element) -> Result<ScrollLockHandle, JsValue> {
    let attachment = Attachment::create(|dom, _| ScrollLocker::attach(dom, node))?;
    Ok(ScrollLockHandle {
        attachment: Some(attachment),
    })
}

/// Calls `callback` each time the user scrolls up to within 200px of the top.
///
/// `callback` may be a function or a one-element array holding it.
#[wasm_bindgen(js_name = attachNearTopWatcher)]
pub fn attach_near_top_watcher(
    node: Element,
    callback: JsValue,
) -> Result<NearTopWatcherHandle, JsValue> {
    let function = read_near_top_callback(&callback)?;
    let attachment = Attachment::create(|dom, errors| {
        NearTopWatcher::attach(dom, node, near_top_callback(function, errors))
    })?;
    Ok(NearTopWatcherHandle {
        attachment: Some(attachment),
    })
}

#[wasm_bindgen]
pub struct ScrollPinnerHandle {
    attachment: Option<Rc<PinnerAttachment>>,
    pinned: PinnedMirror,
}

#[wasm_bindgen]
impl ScrollPinnerHandle {
    /// Merges `{ threshold?, onPinStateChange? }`; absent keys keep their value.
    pub fn update(&self, options: JsValue) -> Result<(), JsValue> {
        let Some(attachment) = self.attachment.as_ref() else {
            return Ok(());
        };
        let options = read_pinner_options(&options)?;
        let update = ScrollPinnerUpdate {
            threshold_px: options.values.threshold,
            on_pin_state_change: options.on_pin_state_change.map(|function| {
                self.pinned
                    .track(Some(pin_callback(function, &attachment.errors)))
            }),
        };
        attachment.apply(move |_, pinner| pinner.update(update));
        Ok(())
    }

    /// Readable from inside `onPinStateChange`; `false` once destroyed.
    #[wasm_bindgen(getter, js_name = isPinned)]
    pub fn is_pinned(&self) -> bool {
        self.attachment.is_some() && self.pinned.get()
    }

    pub fn destroy(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            attachment.destroy();
        }
    }
}

#[wasm_bindgen]
pub struct ScrollLockHandle {
    attachment: Option<Rc<LockerAttachment>>,
}

#[wasm_bindgen]
impl ScrollLockHandle {
    /// Re-applies the lock against the node's current geometry.
    pub fn update(&self) -> Result<(), JsValue> {
        let Some(attachment) = self.attachment.as_ref() else {
            return Ok(());
        };
        match attachment.with_mut(|dom, locker| locker.update(dom)) {
            Some(result) => result.map_err(|err| dom_error_to_js(&err)),
            None => {
                attachment.apply(|dom, locker| {
                    if let Err(error) = locker.update(dom) {
                        warn!(target: "scrollkit_web", %error, "deferred scroll lock update failed");
                    }
                });
                Ok(())
            }
        }
    }

    /// `"standard"` or `"mobile-safari"`; `undefined` once destroyed.
    #[wasm_bindgen(getter)]
    pub fn strategy(&self) -> Option<String> {
        let strategy = self
            .attachment
            .as_ref()?
            .with_mut(|_, locker| locker.strategy())?;
        Some(
            match strategy {
                LockStrategy::Standard => "standard",
                LockStrategy::MobileSafari => "mobile-safari",
            }
            .to_owned(),
        )
    }

    pub fn destroy(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            attachment.destroy();
        }
    }
}

#[wasm_bindgen]
pub struct NearTopWatcherHandle {
    attachment: Option<Rc<NearTopAttachment>>,
}

#[wasm_bindgen]
impl NearTopWatcherHandle {
    /// Swaps the callback; accepts `{ callback }`, a function, or `[fn]`.
    pub fn update(&self, options: JsValue) -> Result<(), JsValue> {
        let Some(attachment) = self.attachment.as_ref() else {
            return Ok(());
        };
        let function = read_near_top_callback(&options)?;
        let callback = near_top_callback(function, &attachment.errors);
        attachment.apply(move |_, watcher| watcher.update(callback));
        Ok(())
    }

    pub fn destroy(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            attachment.destroy();
        }
    }
}
