use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Collecting,
    Paused,
    Stopped,
    Complete,
}

impl Phase {
    /// Collecting or Paused: a run exists and has not terminated.
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Collecting | Phase::Paused)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionState {
    pub phase: Phase,
    pub target_count: usize,
    pub current_count: usize,
    pub last_activity: DateTime<Utc>,
    /// Consecutive stalled load cycles reported by the harvester.
    pub stalled_cycles: u32,
}

impl CollectionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            target_count: 0,
            current_count: 0,
            last_activity: Utc::now(),
            stalled_cycles: 0,
        }
    }

    pub fn run_snapshot(&self) -> RunStateSnapshot {
        RunStateSnapshot {
            is_collecting: self.phase.is_active(),
            is_paused: self.phase == Phase::Paused,
            target_count: self.target_count,
            current_count: self.current_count,
            last_updated: self.last_activity,
        }
    }
}

impl Default for CollectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Lightweight run state persisted for external readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStateSnapshot {
    pub is_collecting: bool,
    pub is_paused: bool,
    pub target_count: usize,
    pub current_count: usize,
    pub last_updated: DateTime<Utc>,
}
