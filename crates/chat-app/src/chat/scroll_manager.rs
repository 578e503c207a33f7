/// Rounding tolerance when comparing the viewport bottom against content height.
pub const SCROLL_DELTA_EPSILON: f32 = 1.0;

/// A scrollable container measured in any consistent unit (pixels, lines).
pub trait ScrollViewport {
    fn scroll_top(&self) -> f32;
    fn client_height(&self) -> f32;
    fn scroll_height(&self) -> f32;
    fn set_scroll_top(&mut self, scroll_top: f32);

    /// Largest reachable `scroll_top`.
    fn max_scroll_top(&self) -> f32 {
        (self.scroll_height() - self.client_height()).max(0.0)
    }

    /// Slack allowed between the viewport bottom and the content end. Units
    /// that cannot be fractional should return 0.
    fn bottom_tolerance(&self) -> f32 {
        SCROLL_DELTA_EPSILON
    }

    fn is_at_bottom(&self) -> bool {
        self.scroll_top() + self.client_height() >= self.scroll_height() - self.bottom_tolerance()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollMode {
    /// Follows new content.
    Pinned,
    /// Stays where the user left it.
    Free,
}

/// Keeps a transcript view pinned to its tail unless the user scrolled away.
#[derive(Debug)]
pub struct ScrollManager {
    pinned_to_bottom: bool,
    pending_scroll_to_bottom: bool,
}

impl ScrollManager {
    pub fn new() -> Self {
        Self {
            pinned_to_bottom: true,
            pending_scroll_to_bottom: false,
        }
    }

    pub fn is_pinned_to_bottom(&self) -> bool {
        self.pinned_to_bottom
    }

    pub fn mode(&self) -> ScrollMode {
        if self.pinned_to_bottom {
            ScrollMode::Pinned
        } else {
            ScrollMode::Free
        }
    }

    /// Forces the next content change to land at the bottom and re-pins.
    pub fn request_scroll_to_bottom(&mut self) {
        self.pending_scroll_to_bottom = true;
        self.pinned_to_bottom = true;
    }

    /// Starts a fresh conversation view.
    pub fn reset(&mut self) {
        self.request_scroll_to_bottom();
    }

    /// Call on every scroll gesture of the container.
    pub fn on_scroll(&mut self, viewport: &impl ScrollViewport) {
        let pinned = viewport.is_at_bottom();
        if pinned != self.pinned_to_bottom {
            tracing::trace!(pinned, "transcript scroll mode changed");
        }
        self.pinned_to_bottom = pinned;
    }

    /// Call after every transcript mutation has been laid out.
    ///
    /// Returns true when the viewport was moved to its maximum offset; a free
    /// viewport is never touched.
    pub fn on_content_changed(&mut self, viewport: &mut impl ScrollViewport) -> bool {
        let should_scroll = self.pinned_to_bottom || self.pending_scroll_to_bottom;
        self.pending_scroll_to_bottom = false;

        if should_scroll {
            let target = viewport.max_scroll_top();
            viewport.set_scroll_top(target);
        }

        should_scroll
    }
}

impl Default for ScrollManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeViewport {
        scroll_top: f32,
        client_height: f32,
        scroll_height: f32,
    }

    impl ScrollViewport for FakeViewport {
        fn scroll_top(&self) -> f32 {
            self.scroll_top
        }

        fn client_height(&self) -> f32 {
            self.client_height
        }

        fn scroll_height(&self) -> f32 {
            self.scroll_height
        }

        fn set_scroll_top(&mut self, scroll_top: f32) {
            self.scroll_top = scroll_top.clamp(0.0, self.max_scroll_top());
        }
    }

    fn viewport(scroll_top: f32, scroll_height: f32) -> FakeViewport {
        FakeViewport {
            scroll_top,
            client_height: 100.0,
            scroll_height,
        }
    }

    #[test]
    fn pinned_view_follows_growing_content() {
        let mut manager = ScrollManager::new();
        let mut view = viewport(0.0, 100.0);

        view.scroll_height = 340.0;
        assert!(manager.on_content_changed(&mut view));

        assert_eq!(view.scroll_top, 240.0);
        assert_eq!(view.scroll_top, view.max_scroll_top());
    }

    #[test]
    fn user_scroll_up_frees_the_view() {
        let mut manager = ScrollManager::new();
        let mut view = viewport(240.0, 340.0);

        view.scroll_top = 120.0;
        manager.on_scroll(&view);
        assert_eq!(manager.mode(), ScrollMode::Free);

        view.scroll_height = 500.0;
        assert!(!manager.on_content_changed(&mut view));
        assert_eq!(view.scroll_top, 120.0);
    }

    #[test]
    fn scrolling_back_to_bottom_re_pins_within_tolerance() {
        let mut manager = ScrollManager::new();
        let mut view = viewport(10.0, 400.0);
        manager.on_scroll(&view);
        assert!(!manager.is_pinned_to_bottom());

        view.scroll_top = 299.5;
        manager.on_scroll(&view);
        assert!(manager.is_pinned_to_bottom());

        view.scroll_height = 420.0;
        manager.on_content_changed(&mut view);
        assert_eq!(view.scroll_top, 320.0);
    }

    #[test]
    fn zero_tolerance_viewport_is_free_one_unit_above_bottom() {
        struct Exact(FakeViewport);

        impl ScrollViewport for Exact {
            fn scroll_top(&self) -> f32 {
                self.0.scroll_top
            }

            fn client_height(&self) -> f32 {
                self.0.client_height
            }

            fn scroll_height(&self) -> f32 {
                self.0.scroll_height
            }

            fn set_scroll_top(&mut self, scroll_top: f32) {
                self.0.set_scroll_top(scroll_top);
            }

            fn bottom_tolerance(&self) -> f32 {
                0.0
            }
        }

        let mut manager = ScrollManager::new();
        let mut view = Exact(viewport(299.0, 400.0));

        manager.on_scroll(&view);
        assert_eq!(manager.mode(), ScrollMode::Free);

        view.0.scroll_height = 430.0;
        assert!(!manager.on_content_changed(&mut view));
        assert_eq!(view.0.scroll_top, 299.0);

        view.0.scroll_top = 330.0;
        manager.on_scroll(&view);
        assert_eq!(manager.mode(), ScrollMode::Pinned);
    }

    #[test]
    fn short_content_counts_as_bottom() {
        let mut manager = ScrollManager::new();
        let mut view = viewport(0.0, 40.0);

        manager.on_scroll(&view);
        assert!(manager.is_pinned_to_bottom());
        manager.on_content_changed(&mut view);
        assert_eq!(view.scroll_top, 0.0);
    }

    #[test]
    fn reset_forces_next_change_to_bottom() {
        let mut manager = ScrollManager::new();
        let mut view = viewport(0.0, 400.0);
        manager.on_scroll(&view);
        assert!(!manager.is_pinned_to_bottom());

        manager.reset();
        assert!(manager.on_content_changed(&mut view));
        assert_eq!(view.scroll_top, 300.0);
    }
}
