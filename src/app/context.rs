use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{GleanerError, Result};
use crate::config::Config;
use crate::controller::CollectionController;
use crate::export::Exporter;
use crate::page::FeedPage;
use crate::store::sqlite::SqliteStore;

pub struct AppContext {
    pub store: Arc<SqliteStore>,
    pub config: Config,
}

impl AppContext {
    pub fn new(db_path: Option<PathBuf>, config: Config) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        Ok(Self { store, config })
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Ok(Self { store, config })
    }

    /// Controller for a collection on `page`, sharing this context's store.
    pub fn controller(&self, page: Arc<dyn FeedPage>) -> CollectionController {
        CollectionController::new(page, self.store.clone(), self.config.clone())
    }

    /// Exporter writing to `out`, or to the configured directory.
    pub fn exporter(&self, out: Option<PathBuf>) -> Exporter {
        match out {
            Some(dir) => Exporter::new(dir, self.config.export.max_items_per_file),
            None => Exporter::from_config(&self.config.export),
        }
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| GleanerError::Config("Could not find data directory".into()))?;
        let gleaner_dir = data_dir.join("gleaner");
        std::fs::create_dir_all(&gleaner_dir)?;
        Ok(gleaner_dir.join("gleaner.db"))
    }
}
