use std::time::Duration;

use crate::harvester::HarvestConfig;

/// Settle delay that follows the measured duration of the previous cycle.
#[derive(Debug, Clone)]
pub struct AdaptiveDelay {
    current: Duration,
    min: Duration,
    max: Duration,
}

impl AdaptiveDelay {
    pub fn new(initial: Duration, min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            current: initial.clamp(min, max),
            min,
            max,
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_settle_ms),
            Duration::from_millis(config.min_settle_ms),
            Duration::from_millis(config.max_settle_ms),
        )
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn record(&mut self, measured: Duration) {
        self.current = measured.clamp(self.min, self.max);
    }
}

/// Counts consecutive load cycles that produced neither growth nor items.
#[derive(Debug, Clone)]
pub struct StallTracker {
    consecutive: u32,
    threshold: u32,
    step: Duration,
    max: Duration,
}

impl StallTracker {
    pub fn new(threshold: u32, step: Duration, max: Duration) -> Self {
        Self {
            consecutive: 0,
            threshold: threshold.max(1),
            step,
            max,
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            config.stall_threshold,
            Duration::from_millis(config.stall_backoff_ms),
            Duration::from_millis(config.max_stall_backoff_ms),
        )
    }

    /// Record a stalled cycle; returns the backoff to wait before retrying.
    pub fn record_stall(&mut self) -> Duration {
        self.consecutive = self.consecutive.saturating_add(1);
        self.step.saturating_mul(self.consecutive).min(self.max)
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn should_report(&self) -> bool {
        self.consecutive >= self.threshold
    }
}
