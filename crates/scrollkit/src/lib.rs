#![forbid(unsafe_code)]

//! `scrollkit` provides host-driven scroll behaviors for DOM panes.
//!
//! - [`pinner::ScrollPinner`] keeps a chat-like pane at its bottom while the
//!   user stays there.
//! - [`locker::ScrollLocker`] locks page scrolling, including the extra work
//!   mobile Safari needs.
//! - [`near_top::NearTopWatcher`] reports each upward approach to the top of
//!   a pane, for lazy-loading older content.
//!
//! Design goals:
//! - **Injected environment**: behaviors only see a [`dom::Dom`]; nothing
//!   reaches for `window` or `document`.
//! - **Host-driven**: the embedding layer delivers events and animation
//!   frames; behaviors never block and spawn nothing.
//! - **Complete teardown**: every mutation is recorded as a reversal before
//!   it happens, and destroy undoes all of them.
//!
//! The `scrollkit-web` crate wires these behaviors to real DOM elements.
//! [`memory_dom::MemoryDom`] is a deterministic stand-in for tests.

pub mod config;
pub mod dom;
pub mod error;
pub mod frames;
pub mod geometry;
pub mod locker;
pub mod memory_dom;
pub mod near_top;
pub mod pinner;
pub mod platform;
pub mod restore;

pub use config::{ScrollPinnerConfig, ScrollPinnerOptions, ScrollPinnerUpdate};
pub use dom::{Behavior, DefaultAction, Dom, DomEvent};
pub use error::DomError;
pub use locker::{LockStrategy, ScrollLocker};
pub use near_top::NearTopWatcher;
pub use pinner::ScrollPinner;
