#![forbid(unsafe_code)]

//! Platform-independent delivery of host signals into one behavior.
//!
//! Browsers can re-enter a behavior: `element.focus()` fires `focus`
//! synchronously, and a listener can run while the behavior is already
//! handling another event. [`HostedBehavior`] owns the behavior behind a
//! `RefCell` and drops re-entrant deliveries instead of panicking on a
//! double borrow. It also turns every signal after destroy into a no-op.
//!
//! Caller code runs inside a delivery (pin-state and near-top callbacks), and
//! it may call back into its handle. Those calls are queued with
//! [`HostedBehavior::apply`] and run as soon as the delivery returns; a
//! destroy requested from inside a callback is carried out at the same point.
//!
//! No JS/WASM types here, so the logic is tested natively.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use scrollkit::config::PinStateCallback;
use scrollkit::dom::{Behavior, DefaultAction, Dom, DomEvent, FrameId};
use tracing::trace;

type Deferred<D, B> = Box<dyn FnOnce(&D, &mut B)>;

/// A behavior plus the guard rails the host needs around it.
pub struct HostedBehavior<D, B> {
    behavior: RefCell<Option<B>>,
    deferred: RefCell<VecDeque<Deferred<D, B>>>,
    destroy_requested: Cell<bool>,
}

impl<D, B> Default for HostedBehavior<D, B> {
    fn default() -> Self {
        Self {
            behavior: RefCell::new(None),
            deferred: RefCell::new(VecDeque::new()),
            destroy_requested: Cell::new(false),
        }
    }
}

impl<D: Dom, B: Behavior<D>> HostedBehavior<D, B> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the attached behavior; signals before this are ignored.
    pub fn install(&self, behavior: B) {
        *self.behavior.borrow_mut() = Some(behavior);
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.behavior
            .try_borrow()
            .map(|slot| slot.is_some())
            .unwrap_or(true)
    }

    pub fn deliver(&self, dom: &D, event: &DomEvent<D::Node>) -> DefaultAction {
        let action = {
            let Ok(mut slot) = self.behavior.try_borrow_mut() else {
                trace!(target: "scrollkit_web::host", ?event, "dropped re-entrant event");
                return DefaultAction::Allow;
            };
            match slot.as_mut() {
                Some(behavior) => behavior.handle_event(dom, event),
                None => DefaultAction::Allow,
            }
        };
        self.settle(dom);
        action
    }

    pub fn deliver_frame(&self, dom: &D, frame: FrameId) {
        {
            let Ok(mut slot) = self.behavior.try_borrow_mut() else {
                trace!(target: "scrollkit_web::host", frame = frame.0, "dropped re-entrant frame");
                return;
            };
            if let Some(behavior) = slot.as_mut() {
                behavior.handle_frame(dom, frame);
            }
        }
        self.settle(dom);
    }

    /// Runs `f` on the behavior unless it is destroyed or busy.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut B) -> R) -> Option<R> {
        let mut slot = self.behavior.try_borrow_mut().ok()?;
        slot.as_mut().map(f)
    }

    /// Runs `f` on the behavior now, or right after the delivery in progress
    /// if the behavior is busy. Dropped once the behavior is destroyed.
    pub fn apply(&self, dom: &D, f: impl FnOnce(&D, &mut B) + 'static) {
        match self.behavior.try_borrow_mut() {
            Ok(mut slot) => {
                if let Some(behavior) = slot.as_mut() {
                    f(dom, behavior);
                }
            }
            Err(_) => {
                trace!(target: "scrollkit_web::host", "deferred call until delivery returns");
                self.deferred.borrow_mut().push_back(Box::new(f));
            }
        }
    }

    /// Destroys and drops the behavior. Returns `false` if there was none.
    ///
    /// While a delivery is in progress the destroy is postponed until it
    /// returns.
    pub fn destroy(&self, dom: &D) -> bool {
        let taken = match self.behavior.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                self.destroy_requested.set(true);
                return true;
            }
        };
        self.deferred.borrow_mut().clear();
        match taken {
            Some(mut behavior) => {
                behavior.destroy(dom);
                true
            }
            None => false,
        }
    }

    fn settle(&self, dom: &D) {
        loop {
            let next = self.deferred.borrow_mut().pop_front();
            let Some(f) = next else {
                break;
            };
            let Ok(mut slot) = self.behavior.try_borrow_mut() else {
                self.deferred.borrow_mut().push_front(f);
                break;
            };
            if let Some(behavior) = slot.as_mut() {
                f(dom, behavior);
            }
        }
        if self.destroy_requested.replace(false) {
            self.destroy(dom);
        }
    }
}

/// Pinned state readable while the pinner itself is busy, e.g. from inside
/// its own pin-state callback.
#[derive(Debug, Clone)]
pub struct PinnedMirror(Rc<Cell<bool>>);

impl PinnedMirror {
    /// A fresh pinner starts pinned.
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    #[must_use]
    pub fn get(&self) -> bool {
        self.0.get()
    }

    /// Wraps `callback` so the mirror holds the new state before it runs.
    #[must_use]
    pub fn track(&self, mut callback: Option<PinStateCallback>) -> PinStateCallback {
        let flag = Rc::clone(&self.0);
        Box::new(move |pinned| {
            flag.set(pinned);
            if let Some(callback) = callback.as_mut() {
                callback(pinned);
            }
        })
    }
}

impl Default for PinnedMirror {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{HostedBehavior, PinnedMirror};
    use scrollkit::config::PinStateCallback;
    use scrollkit::dom::{Dom, DomEvent, ListenTarget};
    use scrollkit::memory_dom::{MemoryDom, NodeId};
    use scrollkit::{NearTopWatcher, ScrollPinner, ScrollPinnerConfig, ScrollPinnerUpdate};
    use std::cell::{Cell, RefCell};
    use std::rc::{Rc, Weak};

    type HostedPinner = HostedBehavior<MemoryDom, ScrollPinner<MemoryDom>>;

    fn scroll_of(pane: NodeId) -> DomEvent<NodeId> {
        DomEvent::Scroll {
            source: ListenTarget::Element(pane),
        }
    }

    /// Pinner whose callback gets a weak handle back to its own host.
    fn hosted_pinner(
        dom: &Rc<MemoryDom>,
        pane: NodeId,
        mirror: &PinnedMirror,
        on_change: impl Fn(&HostedPinner, &MemoryDom, bool) + 'static,
    ) -> Rc<HostedPinner> {
        Rc::new_cyclic(|host: &Weak<HostedPinner>| {
            let host = host.clone();
            let callback_dom = Rc::clone(dom);
            let inner: PinStateCallback = Box::new(move |pinned| {
                if let Some(host) = host.upgrade() {
                    on_change(&host, &callback_dom, pinned);
                }
            });
            let pinner = ScrollPinner::attach(
                &**dom,
                pane,
                ScrollPinnerConfig::default(),
                Some(mirror.track(Some(inner))),
            )
            .expect("attach");
            let hosted = HostedBehavior::new();
            hosted.install(pinner);
            hosted
        })
    }

    #[test]
    fn signals_before_install_are_ignored() {
        let dom = MemoryDom::new();
        let hosted: HostedBehavior<MemoryDom, ScrollPinner<MemoryDom>> = HostedBehavior::new();
        assert!(!hosted.is_installed());
        assert!(!hosted.deliver(&dom, &DomEvent::Mutation).is_prevented());
        assert!(!hosted.destroy(&dom));
    }

    #[test]
    fn deliver_reaches_the_behavior() {
        let dom = MemoryDom::new();
        let pane = dom.create_scroller(MemoryDom::BODY, 900.0, 300.0);
        let fired = Rc::new(Cell::new(0));
        let sink = Rc::clone(&fired);
        let watcher = NearTopWatcher::attach(&dom, pane, Box::new(move || sink.set(sink.get() + 1)))
            .expect("attach");
        let hosted = HostedBehavior::new();
        hosted.install(watcher);

        let scroll = DomEvent::Scroll {
            source: ListenTarget::Element(pane),
        };
        dom.set_scroll_top(&pane, 500.0);
        hosted.deliver(&dom, &scroll);
        dom.set_scroll_top(&pane, 100.0);
        hosted.deliver(&dom, &scroll);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn reentrant_delivery_is_dropped() {
        let dom = MemoryDom::new();
        let pane = dom.create_scroller(MemoryDom::BODY, 900.0, 300.0);
        let pinner =
            ScrollPinner::attach(&dom, pane, ScrollPinnerConfig::default(), None).expect("attach");
        let hosted = HostedBehavior::new();
        hosted.install(pinner);

        let inner = hosted.with_mut(|_pinner| {
            hosted.with_mut(|_| ()).is_none() && !hosted.deliver(&dom, &DomEvent::Mutation).is_prevented()
        });
        assert_eq!(inner, Some(true));
    }

    #[test]
    fn destroy_runs_once_and_silences_later_signals() {
        let dom = MemoryDom::new();
        let pane = dom.create_scroller(MemoryDom::BODY, 900.0, 300.0);
        let pinner =
            ScrollPinner::attach(&dom, pane, ScrollPinnerConfig::default(), None).expect("attach");
        let hosted = HostedBehavior::new();
        hosted.install(pinner);

        assert!(hosted.destroy(&dom));
        assert_eq!(dom.listener_count(), 0);
        assert!(!hosted.destroy(&dom));
        assert!(hosted.with_mut(|p| p.is_pinned()).is_none());
    }

    #[test]
    fn update_from_inside_callback_applies_after_delivery() {
        let dom = Rc::new(MemoryDom::new());
        let pane = dom.create_scroller(MemoryDom::BODY, 1000.0, 400.0);
        let mirror = PinnedMirror::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let read = mirror.clone();
        let hosted = hosted_pinner(&dom, pane, &mirror, move |host, dom, pinned| {
            log.borrow_mut().push((pinned, read.get()));
            host.apply(dom, |_, pinner| {
                pinner.update(ScrollPinnerUpdate::threshold(500.0));
            });
        });

        dom.set_scroll_top(&pane, 0.0);
        hosted.deliver(&dom, &scroll_of(pane));

        assert_eq!(*seen.borrow(), vec![(false, false)]);
        assert_eq!(hosted.with_mut(|p| p.config().threshold_px), Some(500.0));
        assert!(!mirror.get());
    }

    #[test]
    fn destroy_from_inside_callback_runs_after_delivery() {
        let dom = Rc::new(MemoryDom::new());
        let pane = dom.create_scroller(MemoryDom::BODY, 1000.0, 400.0);
        let hosted = hosted_pinner(&dom, pane, &PinnedMirror::new(), |host, dom, _| {
            assert!(host.destroy(dom));
        });
        assert!(dom.listener_count() > 0);

        dom.set_scroll_top(&pane, 0.0);
        hosted.deliver(&dom, &scroll_of(pane));

        assert!(!hosted.is_installed());
        assert_eq!(dom.listener_count(), 0);
        assert_eq!(dom.observer_count(), 0);
    }

    #[test]
    fn apply_runs_immediately_when_idle() {
        let dom = Rc::new(MemoryDom::new());
        let pane = dom.create_scroller(MemoryDom::BODY, 1000.0, 400.0);
        let hosted = hosted_pinner(&dom, pane, &PinnedMirror::new(), |_, _, _| {});

        hosted.apply(&dom, |_, pinner| pinner.update(ScrollPinnerUpdate::threshold(64.0)));
        assert_eq!(hosted.with_mut(|p| p.config().threshold_px), Some(64.0));

        assert!(hosted.destroy(&dom));
        hosted.apply(&dom, |_, _| panic!("ran after destroy"));
    }

    #[test]
    fn mirror_follows_transitions_without_a_caller_callback() {
        let dom = MemoryDom::new();
        let pane = dom.create_scroller(MemoryDom::BODY, 1000.0, 400.0);
        let mirror = PinnedMirror::new();
        let pinner = ScrollPinner::attach(
            &dom,
            pane,
            ScrollPinnerConfig::default(),
            Some(mirror.track(None)),
        )
        .expect("attach");
        let hosted = HostedBehavior::new();
        hosted.install(pinner);
        assert!(mirror.get());

        dom.set_scroll_top(&pane, 100.0);
        hosted.deliver(&dom, &scroll_of(pane));
        assert!(!mirror.get());

        dom.set_scroll_top(&pane, 600.0);
        hosted.deliver(&dom, &scroll_of(pane));
        assert!(mirror.get());
    }
}
