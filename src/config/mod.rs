//! Configuration management for Gleaner.
//!
//! Configuration is read from `~/.config/gleaner/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use crate::classifier::ClassifierConfig;
use crate::export::ExportConfig;
use crate::extract::ExtractConfig;
use crate::harvester::HarvestConfig;
use crate::page::BrowserConfig;
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub harvest: HarvestConfig,
    pub classifier: ClassifierConfig,
    pub extract: ExtractConfig,
    pub export: ExportConfig,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/gleaner/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("gleaner").join("config.toml"))
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# Gleaner Configuration
#
# Every key is optional; anything left out keeps its built-in default.
# Layout profiles for the classifier can be added under [[classifier.profiles]].

[browser]
# Run Chrome without a visible window
headless = true

# Launch and navigation timeout in seconds
timeout_secs = 30

# Wait after navigation before the first scan (milliseconds)
wait_after_load_ms = 2000

[harvest]
# Scrolling per loading phase
scroll_step_px = 300.0
scroll_steps_per_load = 3
scroll_step_pause_ms = 150

# Settle delay after loading; follows the last cycle's duration within these bounds
initial_settle_ms = 1500
min_settle_ms = 500
max_settle_ms = 5000

# Consecutive empty cycles before a stall is reported, and the backoff per stall
stall_threshold = 3
stall_backoff_ms = 2000
max_stall_backoff_ms = 15000

# Backup loading trigger and sentinel proximity margin
tick_interval_ms = 3000
proximity_margin_px = 1200.0

# Extraction micro-batches
first_batch_size = 3
batch_size = 5
batch_pause_ms = 50

# "See more" and "more comments" expansion
expand_attempts = 3
expand_settle_ms = 500
reply_load_attempts = 2

# Progress events and partial-result checkpoints (milliseconds)
progress_interval_ms = 1000
checkpoint_interval_ms = 10000

[classifier]
# Candidates rendered shorter than this are skipped
min_height_px = 50.0

[extract]
# Ignore text fragments shorter than this
min_text_len = 3

# Fragments more similar than this to a longer one are dropped
similarity_threshold = 0.85

# Collect comments under each post
include_replies = true

# Also read post text from embedded JSON payloads
mine_script_payloads = false

[export]
# Where exported JSON files go (defaults to the data directory)
# output_dir = "/path/to/exports"

# Split exports larger than this many posts
max_items_per_file = 2000
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
