#![forbid(unsafe_code)]

//! Pure scroll geometry shared by the behaviors.
//!
//! Nothing here holds state: every helper is a function of the tree, the
//! computed styles and the numbers passed in.

use crate::dom::{Dom, Overflow, Rect, ScrollMetrics};

/// Whether a pane counts as scrolled to the bottom.
///
/// A pane at its bottom edge always qualifies, even with a zero threshold and
/// a sub-pixel `scrollTop`.
#[must_use]
pub fn is_within_bottom_threshold(metrics: &ScrollMetrics, threshold_px: f64) -> bool {
    metrics.distance_from_bottom() <= threshold_px || metrics.is_at_bottom()
}

/// Whether one computed overflow value lets the box scroll.
#[must_use]
pub fn overflow_value_scrolls(value: &str) -> bool {
    value
        .split_whitespace()
        .any(|part| part == "auto" || part == "scroll")
}

#[must_use]
pub fn is_scroll_container(overflow: &Overflow) -> bool {
    [&overflow.overflow, &overflow.overflow_x, &overflow.overflow_y]
        .into_iter()
        .any(|value| overflow_value_scrolls(value))
}

/// Nearest element, starting at `node` itself, whose computed overflow lets
/// it scroll. Falls back to the document element.
pub fn nearest_scrollable_ancestor<D: Dom>(dom: &D, node: &D::Node) -> D::Node {
    let root = dom.document_element();
    let mut current = Some(node.clone());
    while let Some(candidate) = current {
        if candidate == root {
            break;
        }
        if is_scroll_container(&dom.computed_overflow(&candidate)) {
            return candidate;
        }
        current = dom.parent_element(&candidate);
    }
    root
}

/// Whether a touch drag of `delta_y` (current minus previous client Y) would
/// pull a scroller past one of its edges.
///
/// A finger moving down (`delta_y > 0`) reveals content above, so it
/// overscrolls at the top; a finger moving up overscrolls at the bottom.
#[must_use]
pub fn drag_overscrolls(metrics: &ScrollMetrics, delta_y: f64) -> bool {
    (delta_y > 0.0 && metrics.is_at_top()) || (delta_y < 0.0 && metrics.is_at_bottom())
}

/// `scrollTop` change that brings `target` fully into the visible part of
/// `container`. Positive scrolls down, zero means already visible.
///
/// `visible_bottom` caps the container's bottom edge, e.g. at the visual
/// viewport height while a keyboard covers the lower part of the screen.
#[must_use]
pub fn reveal_delta(target: Rect, container: Rect, visible_bottom: f64) -> f64 {
    let bottom = container.bottom.min(visible_bottom);
    if target.bottom > bottom {
        // Never push the top edge out while fixing the bottom.
        (target.bottom - bottom).min((target.top - container.top).max(0.0))
    } else if target.top < container.top {
        target.top - container.top
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Dom;
    use crate::memory_dom::MemoryDom;

    fn metrics(scroll_top: f64, scroll_height: f64, client_height: f64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top,
            scroll_height,
            client_height,
        }
    }

    #[test]
    fn bottom_threshold_is_inclusive() {
        assert!(is_within_bottom_threshold(&metrics(580.0, 1000.0, 400.0), 20.0));
        assert!(is_within_bottom_threshold(&metrics(590.0, 1000.0, 400.0), 20.0));
        assert!(!is_within_bottom_threshold(&metrics(579.0, 1000.0, 400.0), 20.0));
    }

    #[test]
    fn zero_threshold_tolerates_subpixel_scroll_top() {
        assert!(is_within_bottom_threshold(&metrics(599.5, 1000.0, 400.0), 0.0));
        assert!(is_within_bottom_threshold(&metrics(600.0, 1000.0, 400.0), 0.0));
        assert!(!is_within_bottom_threshold(&metrics(598.5, 1000.0, 400.0), 0.0));
    }

    #[test]
    fn overflow_values() {
        assert!(overflow_value_scrolls("auto"));
        assert!(overflow_value_scrolls("hidden scroll"));
        assert!(!overflow_value_scrolls("hidden"));
        assert!(!overflow_value_scrolls("visible"));
        assert!(!overflow_value_scrolls("overlay-auto"));
    }

    #[test]
    fn scroll_container_checks_every_axis() {
        let x_only = Overflow {
            overflow_x: "scroll".into(),
            ..Overflow::default()
        };
        assert!(is_scroll_container(&x_only));
        assert!(!is_scroll_container(&Overflow::default()));
    }

    #[test]
    fn nearest_scrollable_ancestor_walks_up() {
        let dom = MemoryDom::new();
        let pane = dom.create_scroller(MemoryDom::BODY, 2000.0, 500.0);
        let row = dom.create_element(pane);
        let input = dom.create_input(row);
        assert_eq!(nearest_scrollable_ancestor(&dom, &input), pane);
        assert_eq!(nearest_scrollable_ancestor(&dom, &pane), pane);
    }

    #[test]
    fn nearest_scrollable_ancestor_falls_back_to_root() {
        let dom = MemoryDom::new();
        let plain = dom.create_element(MemoryDom::BODY);
        assert_eq!(nearest_scrollable_ancestor(&dom, &plain), dom.document_element());
        assert_eq!(
            nearest_scrollable_ancestor(&dom, &MemoryDom::ROOT),
            MemoryDom::ROOT
        );
    }

    #[test]
    fn drag_direction_against_edges() {
        let top = metrics(0.0, 1000.0, 400.0);
        let middle = metrics(300.0, 1000.0, 400.0);
        let bottom = metrics(600.0, 1000.0, 400.0);
        assert!(drag_overscrolls(&top, 12.0));
        assert!(!drag_overscrolls(&top, -12.0));
        assert!(!drag_overscrolls(&middle, 12.0));
        assert!(!drag_overscrolls(&middle, -12.0));
        assert!(drag_overscrolls(&bottom, -12.0));
        assert!(!drag_overscrolls(&bottom, 12.0));
        assert!(!drag_overscrolls(&top, 0.0));
    }

    #[test]
    fn reveal_delta_scrolls_hidden_target_into_view() {
        let container = Rect {
            top: 100.0,
            bottom: 700.0,
        };
        let below_keyboard = Rect {
            top: 500.0,
            bottom: 540.0,
        };
        assert_eq!(reveal_delta(below_keyboard, container, 400.0), 140.0);
        assert_eq!(reveal_delta(below_keyboard, container, 900.0), 0.0);

        let above = Rect {
            top: 60.0,
            bottom: 100.0,
        };
        assert_eq!(reveal_delta(above, container, 900.0), -40.0);
    }

    #[test]
    fn reveal_delta_keeps_top_edge_visible() {
        let container = Rect {
            top: 0.0,
            bottom: 800.0,
        };
        let tall = Rect {
            top: 100.0,
            bottom: 600.0,
        };
        assert_eq!(reveal_delta(tall, container, 300.0), 100.0);
    }
}
