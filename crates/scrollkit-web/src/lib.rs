#![forbid(unsafe_code)]

//! Browser bindings for `scrollkit`.
//!
//! On `wasm32` this crate exports `attachScrollPinner`, `attachScrollLock`
//! and `attachNearTopWatcher` to JavaScript. Each attaches one behavior to
//! a DOM element through a web-sys backed [`scrollkit::Dom`] and returns a
//! handle with `update` and `destroy`.
//!
//! A callback error thrown by caller code is rethrown from the DOM listener
//! that triggered it, after the behavior has finished handling the event.

pub mod host;

#[cfg(target_arch = "wasm32")]
mod web_dom;

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::{NearTopWatcherHandle, ScrollLockHandle, ScrollPinnerHandle};

pub use host::{HostedBehavior, PinnedMirror};
