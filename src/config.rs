//! Configuration for a hashed index build.
//!
//! The configuration is persisted as `config.json` beside the canonical
//! segment so an index is always reopened with the table size it was built
//! with.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HashdexError, Result};
use crate::storage::{Storage, StorageConfig, read_exact_at};

/// Default number of dictionary slots per segment.
pub const DEFAULT_TABLE_SIZE: u64 = 611_953;

/// Default number of insertions buffered before a flush.
pub const DEFAULT_FLUSH_THRESHOLD: u64 = 2_500_000;

/// Default back-pressure bound on queued segments.
pub const DEFAULT_MAX_PENDING_SEGMENTS: usize = 8;

/// Name of the persisted configuration file.
pub const CONFIG_FILE: &str = "config.json";

/// Configuration of an indexing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Number of slots in every dictionary table.
    ///
    /// Fixed for the whole run and shared by every segment. It must exceed
    /// the number of distinct tokens in the corpus, and should exceed it
    /// comfortably to keep probe chains short.
    pub table_size: u64,

    /// Number of `insert` calls buffered in memory before the buffer is
    /// flushed into a new segment.
    pub flush_threshold: u64,

    /// Upper bound on merge tasks running at once.
    ///
    /// Every running merge holds six file handles open.
    pub max_concurrent_merges: usize,

    /// Number of queued segments above which `insert` blocks until a merge
    /// completes, when no merge slot is free.
    pub max_pending_segments: usize,

    /// Storage I/O settings.
    pub storage: StorageConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            table_size: DEFAULT_TABLE_SIZE,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            max_concurrent_merges: num_cpus::get().max(1),
            max_pending_segments: DEFAULT_MAX_PENDING_SEGMENTS,
            storage: StorageConfig::default(),
        }
    }
}

impl IndexConfig {
    /// Check every field, reporting the first invalid one.
    pub fn validate(&self) -> Result<()> {
        if self.table_size < 2 {
            return Err(HashdexError::invalid_config(format!(
                "table_size must be at least 2, got {}",
                self.table_size
            )));
        }
        // Slot offsets are table_size * 20 and must fit in a file offset.
        if self.table_size > u64::MAX / 20 {
            return Err(HashdexError::invalid_config(format!(
                "table_size {} is too large",
                self.table_size
            )));
        }
        if self.flush_threshold == 0 {
            return Err(HashdexError::invalid_config(
                "flush_threshold must be at least 1",
            ));
        }
        if self.max_concurrent_merges == 0 {
            return Err(HashdexError::invalid_config(
                "max_concurrent_merges must be at least 1",
            ));
        }
        if self.max_pending_segments < 2 {
            return Err(HashdexError::invalid_config(format!(
                "max_pending_segments must be at least 2, got {}",
                self.max_pending_segments
            )));
        }
        if self.storage.buffer_size == 0 {
            return Err(HashdexError::invalid_config(
                "storage.buffer_size must be at least 1",
            ));
        }
        Ok(())
    }

    /// Parse and validate a configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: IndexConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save the configuration to a file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Persist the configuration as [`CONFIG_FILE`] in `storage`.
    pub fn save(&self, storage: &dyn Storage) -> Result<()> {
        let json = self.to_json()?;
        let mut file = storage.create_file(CONFIG_FILE)?;
        file.write_at(0, json.as_bytes())?;
        file.sync_all()
    }

    /// Load the configuration persisted in `storage`.
    pub fn load(storage: &dyn Storage) -> Result<Self> {
        let mut file = storage.open_file(CONFIG_FILE)?;
        let mut bytes = vec![0u8; file.len()? as usize];
        read_exact_at(file.as_mut(), 0, &mut bytes)?;
        let json = String::from_utf8(bytes)
            .map_err(|e| HashdexError::invalid_config(format!("{CONFIG_FILE} is not UTF-8: {e}")))?;
        Self::from_json(&json)
    }
}
