use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::app::{GleanerError, Result};
use crate::domain::{HarvestReport, RunStateSnapshot};
use crate::store::{ResultStore, RunRecord};

const RESULT_KIND: &str = "result";
const PARTIAL_KIND: &str = "partial";
const RUN_STATE_KIND: &str = "run_state";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.lock()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|_| GleanerError::Database(rusqlite::Error::InvalidQuery))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            GleanerError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn put<T: Serialize>(&self, kind: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO snapshots (kind, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(kind) DO UPDATE SET payload = excluded.payload,
                                             updated_at = excluded.updated_at",
            params![kind, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, kind: &str) -> Result<Option<T>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM snapshots WHERE kind = ?1",
                params![kind],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring malformed {} snapshot: {}", kind, e);
                Ok(None)
            }
        }
    }
}

impl ResultStore for SqliteStore {
    fn save_result(&self, report: &HarvestReport) -> Result<()> {
        self.put(RESULT_KIND, report)
    }

    fn load_result(&self) -> Result<Option<HarvestReport>> {
        self.get(RESULT_KIND)
    }

    fn save_partial(&self, report: &HarvestReport) -> Result<()> {
        if report.partial_data {
            return self.put(PARTIAL_KIND, report);
        }
        let mut marked = report.clone();
        marked.partial_data = true;
        marked.is_complete = false;
        self.put(PARTIAL_KIND, &marked)
    }

    fn load_partial(&self) -> Result<Option<HarvestReport>> {
        self.get(PARTIAL_KIND)
    }

    fn clear_partial(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM snapshots WHERE kind = ?1", params![PARTIAL_KIND])?;
        Ok(())
    }

    fn save_run_state(&self, state: &RunStateSnapshot) -> Result<()> {
        self.put(RUN_STATE_KIND, state)
    }

    fn load_run_state(&self) -> Result<Option<RunStateSnapshot>> {
        self.get(RUN_STATE_KIND)
    }

    fn record_run(&self, report: &HarvestReport) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs (group_url, group_name, item_count, is_complete, collected_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                report.group_info.url,
                report.group_info.name,
                report.items.len() as i64,
                report.is_complete,
                report.collected_at.to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, group_url, group_name, item_count, is_complete, collected_at
             FROM runs ORDER BY collected_at DESC, id DESC LIMIT ?1",
        )?;

        let runs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    group_url: row.get(1)?,
                    group_name: row.get(2)?,
                    item_count: row.get::<_, i64>(3)?.max(0) as usize,
                    is_complete: row.get(4)?,
                    collected_at: row
                        .get::<_, String>(5)
                        .ok()
                        .and_then(|s| Self::parse_datetime(&s))
                        .unwrap_or_else(Utc::now),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Author, GroupInfo, Item};

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            low_confidence: false,
            author: Author::unknown(),
            text: format!("text for {}", id),
            timestamp: "2024-01-01T00:00:00Z".into(),
            images: Vec::new(),
            reactions: 0,
            comments: Vec::new(),
            extraction_success: true,
        }
    }

    fn group() -> GroupInfo {
        GroupInfo::unknown("https://www.facebook.com/groups/424242")
    }

    #[test]
    fn test_save_and_load_result() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.load_result().unwrap().is_none());

        let report = HarvestReport::complete(group(), vec![item("1"), item("2")]);
        store.save_result(&report).unwrap();

        let loaded = store.load_result().unwrap().unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_result_is_overwritten() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .save_result(&HarvestReport::complete(group(), vec![item("1")]))
            .unwrap();
        store
            .save_result(&HarvestReport::complete(group(), vec![item("2"), item("3")]))
            .unwrap();

        let loaded = store.load_result().unwrap().unwrap();
        assert_eq!(loaded.total_collected, 2);
    }

    #[test]
    fn test_partial_is_always_marked() {
        let store = SqliteStore::in_memory().unwrap();
        let report = HarvestReport::complete(group(), vec![item("1")]);
        store.save_partial(&report).unwrap();

        let loaded = store.load_partial().unwrap().unwrap();
        assert!(loaded.partial_data);
        assert!(!loaded.is_complete);

        store.clear_partial().unwrap();
        assert!(store.load_partial().unwrap().is_none());
    }

    #[test]
    fn test_malformed_payload_reads_as_missing() {
        let store = SqliteStore::in_memory().unwrap();
        {
            let conn = store.lock().unwrap();
            conn.execute(
                "INSERT INTO snapshots (kind, payload, updated_at) VALUES (?1, ?2, ?3)",
                params![RESULT_KIND, "{not json", Utc::now().to_rfc3339()],
            )
            .unwrap();
        }
        assert!(store.load_result().unwrap().is_none());
    }

    #[test]
    fn test_run_state_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        let state = RunStateSnapshot {
            is_collecting: true,
            is_paused: false,
            target_count: 50,
            current_count: 12,
            last_updated: Utc::now(),
        };
        store.save_run_state(&state).unwrap();
        let loaded = store.load_run_state().unwrap().unwrap();
        assert_eq!(loaded.target_count, 50);
        assert_eq!(loaded.current_count, 12);
        assert!(loaded.is_collecting);
    }

    #[test]
    fn test_recent_runs_newest_first() {
        let store = SqliteStore::in_memory().unwrap();
        let mut older = HarvestReport::partial(group(), vec![item("1")]);
        older.collected_at = Utc::now() - chrono::Duration::hours(1);
        let newer = HarvestReport::complete(group(), vec![item("1"), item("2")]);

        store.record_run(&older).unwrap();
        store.record_run(&newer).unwrap();

        let runs = store.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].is_complete);
        assert_eq!(runs[0].item_count, 2);
        assert!(!runs[1].is_complete);

        assert_eq!(store.recent_runs(1).unwrap().len(), 1);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gleaner.db");
        {
            let store = SqliteStore::new(&path).unwrap();
            store
                .save_result(&HarvestReport::complete(group(), vec![item("9")]))
                .unwrap();
        }
        let reopened = SqliteStore::new(&path).unwrap();
        let loaded = reopened.load_result().unwrap().unwrap();
        assert_eq!(loaded.items[0].id, "9");
    }
}
