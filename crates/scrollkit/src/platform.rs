#![forbid(unsafe_code)]

//! Browser family detection for the scroll-lock strategy.

use crate::dom::PlatformInfo;

const IOS_PLATFORMS: [&str; 3] = ["iPhone", "iPad", "iPod"];

/// Whether the page runs on a touch WebKit build where `overflow: hidden` on
/// the root does not stop scrolling.
///
/// iPadOS 13+ reports a desktop `MacIntel` platform; real Macs have no touch
/// points, which tells the two apart.
#[must_use]
pub fn is_mobile_safari(info: &PlatformInfo) -> bool {
    let platform = info.platform.as_str();
    if IOS_PLATFORMS.iter().any(|p| platform.starts_with(p)) {
        return true;
    }
    platform == "MacIntel" && info.max_touch_points > 1
}
