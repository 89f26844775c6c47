//! Scroll Anchor
//!
//! Decides whether the viewport should follow new content. The viewport
//! metrics only change when the UI reports them, so at the time a store
//! change is observed they still describe the layout before that change
//! was rendered.

use serde::{Deserialize, Serialize};

use crate::store::{ObserverContext, StoreChange, StoreObserver};

/// Scroll geometry of the message list, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportMetrics {
    pub scroll_height: f64,
    pub scroll_top: f64,
    pub client_height: f64,
}

impl ViewportMetrics {
    pub fn new(scroll_height: f64, scroll_top: f64, client_height: f64) -> Self {
        Self {
            scroll_height,
            scroll_top,
            client_height,
        }
    }

    /// Metrics for a list scrolled all the way down.
    pub fn bottom(scroll_height: f64, client_height: f64) -> Self {
        Self::new(scroll_height, (scroll_height - client_height).max(0.0), client_height)
    }

    pub fn is_at_bottom(&self, threshold: f64) -> bool {
        self.scroll_height - self.scroll_top <= self.client_height + threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCommand {
    ToBottom,
}

#[derive(Debug, Clone)]
pub struct ScrollAnchor {
    threshold: f64,
    viewport: Option<ViewportMetrics>,
    input_focused: bool,
    has_loaded: bool,
}

impl ScrollAnchor {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            viewport: None,
            input_focused: false,
            has_loaded: false,
        }
    }

    pub fn update_viewport(&mut self, metrics: ViewportMetrics) {
        self.viewport = Some(metrics);
    }

    pub fn viewport(&self) -> Option<ViewportMetrics> {
        self.viewport
    }

    /// An unmeasured viewport is never at the bottom.
    pub fn is_at_bottom(&self) -> bool {
        self.viewport
            .map(|v| v.is_at_bottom(self.threshold))
            .unwrap_or(false)
    }

    pub fn set_input_focus(&mut self, focused: bool) -> Option<ScrollCommand> {
        let gained = focused && !self.input_focused;
        self.input_focused = focused;
        gained.then_some(ScrollCommand::ToBottom)
    }

    /// Keeps the typing indicator in view while the composer is focused.
    pub fn on_presence_change(&self) -> Option<ScrollCommand> {
        self.input_focused.then_some(ScrollCommand::ToBottom)
    }

    pub fn reset(&mut self) {
        self.viewport = None;
        self.input_focused = false;
        self.has_loaded = false;
    }
}

impl StoreObserver for ScrollAnchor {
    type Output = ScrollCommand;

    fn on_store_change(
        &mut self,
        change: &StoreChange,
        ctx: &ObserverContext<'_>,
    ) -> Option<ScrollCommand> {
        match change {
            // The first batch lands at the bottom; a reload keeps a scrolled-up reader
            StoreChange::Loaded { .. } if !self.has_loaded => {
                self.has_loaded = true;
                Some(ScrollCommand::ToBottom)
            }
            StoreChange::AppendedLocal { .. } => Some(ScrollCommand::ToBottom),
            StoreChange::Loaded { .. } | StoreChange::AppendedIncoming { .. } => {
                ctx.at_bottom.then_some(ScrollCommand::ToBottom)
            }
            StoreChange::SeenPatched { .. } => None,
        }
    }
}
