#![forbid(unsafe_code)]

//! Configuration and fixed constants for the behaviors.

use core::fmt;

use serde::Deserialize;

/// Default distance from the bottom, in px, still counted as "at bottom".
pub const DEFAULT_PIN_THRESHOLD_PX: f64 = 20.0;

/// Distance from the top, in px, that counts as "near top".
pub const NEAR_TOP_THRESHOLD_PX: f64 = 200.0;

/// Custom property carrying the live visual-viewport height (`"<n>px"`).
///
/// Stylesheets outside this crate read it; renaming it is a breaking change.
pub const VIEWPORT_HEIGHT_PROPERTY: &str = "--visual-viewport-height";

/// Transform that parks a focused input far above the viewport for one frame,
/// so WebKit finds nothing to scroll into view.
pub const FOCUS_SHIFT_TRANSFORM: &str = "translateY(-99999px)";

/// Live scroll-pinner configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPinnerConfig {
    /// Distance from the bottom, in px, still counted as pinned.
    pub threshold_px: f64,
}

impl Default for ScrollPinnerConfig {
    fn default() -> Self {
        Self {
            threshold_px: DEFAULT_PIN_THRESHOLD_PX,
        }
    }
}

impl ScrollPinnerConfig {
    /// Builds a config, sanitizing the threshold (see [`sanitize_threshold`]).
    #[must_use]
    pub fn new(threshold_px: f64) -> Self {
        Self {
            threshold_px: sanitize_threshold(threshold_px),
        }
    }
}

/// Pinner options as a host passes them in, e.g. `{"threshold": 12}`.
///
/// Absent keys stay `None`, so the same value serves attach (defaults fill
/// the gaps) and update (gaps keep the current setting). Unknown keys are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct ScrollPinnerOptions {
    pub threshold: Option<f64>,
}

impl ScrollPinnerOptions {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Config for a fresh attach.
    #[must_use]
    pub fn config(&self) -> ScrollPinnerConfig {
        ScrollPinnerConfig::new(self.threshold.unwrap_or(DEFAULT_PIN_THRESHOLD_PX))
    }
}

/// Negative thresholds become zero; non-finite ones fall back to the default.
#[must_use]
pub fn sanitize_threshold(threshold_px: f64) -> f64 {
    if threshold_px.is_finite() {
        threshold_px.max(0.0)
    } else {
        DEFAULT_PIN_THRESHOLD_PX
    }
}

/// Pin-state change callback, called with the new pinned flag.
pub type PinStateCallback = Box<dyn FnMut(bool)>;

/// Partial update for a running pinner. `None` keeps the current value.
#[derive(Default)]
pub struct ScrollPinnerUpdate {
    pub threshold_px: Option<f64>,
    pub on_pin_state_change: Option<PinStateCallback>,
}

impl ScrollPinnerUpdate {
    #[must_use]
    pub fn threshold(threshold_px: f64) -> Self {
        Self {
            threshold_px: Some(threshold_px),
            on_pin_state_change: None,
        }
    }

    #[must_use]
    pub fn callback(callback: impl FnMut(bool) + 'static) -> Self {
        Self {
            threshold_px: None,
            on_pin_state_change: Some(Box::new(callback)),
        }
    }
}

impl fmt::Debug for ScrollPinnerUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrollPinnerUpdate")
            .field("threshold_px", &self.threshold_px)
            .field("on_pin_state_change", &self.on_pin_state_change.is_some())
            .finish()
    }
}
