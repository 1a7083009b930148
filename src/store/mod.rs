pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{HarvestReport, RunStateSnapshot};

pub use sqlite::SqliteStore;

/// Summary row for a finished or stopped run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: i64,
    pub group_url: String,
    pub group_name: String,
    pub item_count: usize,
    pub is_complete: bool,
    pub collected_at: DateTime<Utc>,
}

/// Persistence for harvest results. Loads never fail on malformed data;
/// they report it and return `None`.
pub trait ResultStore: Send + Sync {
    // Result operations
    fn save_result(&self, report: &HarvestReport) -> Result<()>;
    fn load_result(&self) -> Result<Option<HarvestReport>>;

    // Partial result operations
    fn save_partial(&self, report: &HarvestReport) -> Result<()>;
    fn load_partial(&self) -> Result<Option<HarvestReport>>;
    fn clear_partial(&self) -> Result<()>;

    // Run state operations
    fn save_run_state(&self, state: &RunStateSnapshot) -> Result<()>;
    fn load_run_state(&self) -> Result<Option<RunStateSnapshot>>;

    // History
    fn record_run(&self, report: &HarvestReport) -> Result<i64>;
    fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>>;
}
