use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pacing and batching for the feed harvester
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Pixels per scroll step (default: 300)
    pub scroll_step_px: f64,

    /// Scroll steps per loading phase (default: 3)
    pub scroll_steps_per_load: u32,

    /// Pause between scroll steps in milliseconds (default: 150)
    pub scroll_step_pause_ms: u64,

    /// Settle delay before the first cycle has been measured (default: 1500)
    pub initial_settle_ms: u64,

    /// Lower clamp for the adaptive settle delay (default: 500)
    pub min_settle_ms: u64,

    /// Upper clamp for the adaptive settle delay (default: 5000)
    pub max_settle_ms: u64,

    /// Consecutive stalled cycles before a diagnostic is raised (default: 3)
    pub stall_threshold: u32,

    /// Backoff added per consecutive stall in milliseconds (default: 2000)
    pub stall_backoff_ms: u64,

    /// Upper bound for the stall backoff (default: 15000)
    pub max_stall_backoff_ms: u64,

    /// Backup loading trigger interval in milliseconds (default: 3000)
    pub tick_interval_ms: u64,

    /// Distance from the sentinel that counts as "near the edge" (default: 1200)
    pub proximity_margin_px: f64,

    /// Candidates extracted immediately after a scan (default: 3)
    pub first_batch_size: usize,

    /// Candidates per follow-up micro-batch (default: 5)
    pub batch_size: usize,

    /// Pause between micro-batches in milliseconds (default: 50)
    pub batch_pause_ms: u64,

    /// "See more" expansion rounds per scan (default: 3)
    pub expand_attempts: u32,

    /// Wait after each expansion round in milliseconds (default: 500)
    pub expand_settle_ms: u64,

    /// "More comments" rounds per scan when replies are collected (default: 2)
    pub reply_load_attempts: u32,

    /// Progress event cadence in milliseconds (default: 1000)
    pub progress_interval_ms: u64,

    /// Partial-result checkpoint cadence in milliseconds (default: 10000)
    pub checkpoint_interval_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            scroll_step_px: 300.0,
            scroll_steps_per_load: 3,
            scroll_step_pause_ms: 150,
            initial_settle_ms: 1500,
            min_settle_ms: 500,
            max_settle_ms: 5000,
            stall_threshold: 3,
            stall_backoff_ms: 2000,
            max_stall_backoff_ms: 15000,
            tick_interval_ms: 3000,
            proximity_margin_px: 1200.0,
            first_batch_size: 3,
            batch_size: 5,
            batch_pause_ms: 50,
            expand_attempts: 3,
            expand_settle_ms: 500,
            reply_load_attempts: 2,
            progress_interval_ms: 1000,
            checkpoint_interval_ms: 10000,
        }
    }
}

impl HarvestConfig {
    pub fn scroll_step_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_step_pause_ms)
    }

    pub fn expand_settle(&self) -> Duration {
        Duration::from_millis(self.expand_settle_ms)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms.max(1))
    }

    /// Create a config that scrolls harder and waits less
    pub fn fast() -> Self {
        Self {
            scroll_step_px: 600.0,
            initial_settle_ms: 800,
            min_settle_ms: 300,
            max_settle_ms: 2500,
            tick_interval_ms: 1500,
            ..Default::default()
        }
    }
}
