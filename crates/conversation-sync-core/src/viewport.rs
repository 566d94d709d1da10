//! Stick-to-bottom scroll decisions.
//!
//! The renderer reports [`ScrollMetrics`]; the tracker answers with a
//! [`ScrollAction`]. "Near bottom" must be measured before the list mutates,
//! since content height changes with the mutation.

/// Distance (points) from the bottom that still counts as "at the bottom".
pub const DEFAULT_NEAR_BOTTOM_THRESHOLD: f64 = 60.0;

/// Gap kept between the last message and the input bar.
pub const INPUT_BAR_SPACING: f64 = 12.0;

/// Scroll geometry reported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
    pub content_height: f64,
    pub visible_height: f64,
    pub bottom_inset: f64,
    pub offset_y: f64,
}

impl ScrollMetrics {
    /// Offset at which the last message sits right above the inset.
    pub fn bottom_offset(&self) -> f64 {
        self.content_height + self.bottom_inset - self.visible_height
    }

    /// Empty content always counts as near the bottom.
    pub fn is_near_bottom(&self, threshold: f64) -> bool {
        if self.content_height <= 0.0 {
            return true;
        }
        self.offset_y >= self.bottom_offset() - threshold
    }
}

/// Bottom inset for an input bar of the given height.
pub fn bottom_inset_for_input_bar(bar_height: f64) -> f64 {
    bar_height + INPUT_BAR_SPACING
}

/// What the renderer should do with the scroll position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAction {
    Keep,
    ToBottom { animated: bool },
    /// Absolute offset to restore after content was inserted above.
    Offset(f64),
}

/// Tracks whether the initial scroll happened and whether the user is
/// dragging.
#[derive(Debug, Clone)]
pub struct ViewportTracker {
    threshold: f64,
    did_initial_scroll: bool,
    user_dragging: bool,
    decelerating: bool,
}

impl Default for ViewportTracker {
    fn default() -> Self {
        Self::new(DEFAULT_NEAR_BOTTOM_THRESHOLD)
    }
}

impl ViewportTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            did_initial_scroll: false,
            user_dragging: false,
            decelerating: false,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Capture this before applying a tail window.
    pub fn is_near_bottom(&self, metrics: &ScrollMetrics) -> bool {
        metrics.is_near_bottom(self.threshold)
    }

    pub fn did_initial_scroll(&self) -> bool {
        self.did_initial_scroll
    }

    /// After a tail window was merged.
    ///
    /// Scrolls when the viewer was at the bottom beforehand, or when the
    /// first non-empty window arrives. Never moves while the user is touching
    /// the list.
    pub fn after_tail_applied(&mut self, was_near_bottom: bool, message_count: usize) -> ScrollAction {
        if message_count == 0 || self.is_user_interacting() {
            return ScrollAction::Keep;
        }
        if was_near_bottom || !self.did_initial_scroll {
            self.did_initial_scroll = true;
            return ScrollAction::ToBottom { animated: false };
        }
        ScrollAction::Keep
    }

    /// After the first layout pass. Only the first non-empty layout scrolls.
    pub fn after_layout(&mut self, message_count: usize) -> ScrollAction {
        if self.did_initial_scroll || message_count == 0 {
            return ScrollAction::Keep;
        }
        self.did_initial_scroll = true;
        ScrollAction::ToBottom { animated: false }
    }

    /// After the viewer's own send succeeded.
    pub fn after_send(&mut self) -> ScrollAction {
        self.did_initial_scroll = true;
        ScrollAction::ToBottom { animated: true }
    }

    /// After the keyboard or input bar changed the visible height.
    pub fn after_resize(&self, was_near_bottom: bool, message_count: usize) -> ScrollAction {
        if was_near_bottom && message_count > 0 {
            ScrollAction::ToBottom { animated: true }
        } else {
            ScrollAction::Keep
        }
    }

    /// After an older page was prepended: keep the same messages on screen
    /// by shifting the offset by the content height that was added above.
    pub fn after_page_prepended(&self, before: &ScrollMetrics, content_height_after: f64) -> ScrollAction {
        let delta = content_height_after - before.content_height;
        if delta <= 0.0 {
            return ScrollAction::Keep;
        }
        ScrollAction::Offset(before.offset_y + delta)
    }

    pub fn begin_drag(&mut self) {
        self.user_dragging = true;
        self.decelerating = false;
    }

    pub fn end_drag(&mut self, will_decelerate: bool) {
        self.user_dragging = false;
        self.decelerating = will_decelerate;
    }

    pub fn end_deceleration(&mut self) {
        self.decelerating = false;
    }

    pub fn is_user_interacting(&self) -> bool {
        self.user_dragging || self.decelerating
    }
}
