//! The browser surface the harvester drives.
//!
//! Everything the harvesting engine needs from a live page goes through the
//! [`FeedPage`] trait: focusing the feed container, its scroll metrics,
//! incremental scrolling, serialized snapshots, affordance clicks and the
//! sentinel marker.
//!
//! - [`ChromePage`]: headless Chrome via chromiumoxide
//! - [`BrowserConfig`]: launch and navigation options

mod chrome;
mod config;
mod scripts;
#[cfg(test)]
pub(crate) mod simulated;

pub use chrome::ChromePage;
pub use config::BrowserConfig;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::app::Result;

/// Attribute the page stamps on elements with their rendered height.
pub const HEIGHT_ATTR: &str = "data-gleaner-height";

/// Attribute set on controls already clicked during this run.
pub const CLICKED_ATTR: &str = "data-gleaner-clicked";

/// Id of the sentinel marker element.
pub const SENTINEL_ID: &str = "gleaner-sentinel";

/// Scroll geometry of the feed container.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

impl FeedMetrics {
    /// Pixels between the bottom of the viewport and the end of loaded content.
    pub fn distance_to_edge(&self) -> f64 {
        (self.scroll_height - (self.scroll_top + self.viewport_height)).max(0.0)
    }
}

/// Clickable control located by selector and visible label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordance {
    pub selectors: Vec<String>,
    /// Case-insensitive prefixes of the control's visible text.
    pub labels: Vec<String>,
}

impl Affordance {
    pub fn see_more() -> Self {
        Self {
            selectors: vec![
                "div[role=\"button\"]".into(),
                "span[role=\"button\"]".into(),
                "a".into(),
            ],
            labels: vec!["See more".into(), "Show more".into(), "Read more".into()],
        }
    }

    pub fn more_replies() -> Self {
        Self {
            selectors: vec![
                "div[role=\"button\"]".into(),
                "span[role=\"button\"]".into(),
                "a".into(),
            ],
            labels: vec![
                "View more comments".into(),
                "View previous comments".into(),
                "View more replies".into(),
                "more replies".into(),
            ],
        }
    }
}

/// Page operations the harvesting engine depends on.
#[async_trait]
pub trait FeedPage: Send + Sync {
    async fn current_url(&self) -> Result<String>;

    /// Restrict measuring, scrolling and clicks to the first element matching
    /// one of `containers`. Without a match the document scroller is used.
    async fn focus(&self, containers: &[String]) -> Result<()>;

    async fn metrics(&self) -> Result<FeedMetrics>;

    async fn scroll_by(&self, px: f64) -> Result<()>;

    /// Serialized document, with [`HEIGHT_ATTR`] stamped on block elements.
    async fn snapshot(&self) -> Result<String>;

    /// Click every control matching the affordance inside the focused
    /// container; returns how many were clicked.
    async fn click_matching(&self, affordance: &Affordance) -> Result<usize>;

    /// Move the sentinel marker to `offset` pixels from the top of the content.
    async fn place_sentinel(&self, offset: f64) -> Result<()>;

    /// Remove the sentinel and every marker attribute. Safe to call repeatedly.
    async fn detach(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_edge() {
        let metrics = FeedMetrics {
            scroll_top: 200.0,
            scroll_height: 1000.0,
            viewport_height: 600.0,
        };
        assert_eq!(metrics.distance_to_edge(), 200.0);

        let past_end = FeedMetrics {
            scroll_top: 900.0,
            ..metrics
        };
        assert_eq!(past_end.distance_to_edge(), 0.0);
    }

    #[test]
    fn test_default_affordances_have_labels() {
        assert!(!Affordance::see_more().labels.is_empty());
        assert!(!Affordance::more_replies().selectors.is_empty());
    }
}
