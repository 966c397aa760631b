//! Storage abstraction layer for hashdex.
//!
//! Segments are pairs of random-access files (a fixed-record dictionary and
//! an append-only data file). This module hides where those files live behind
//! the [`Storage`] trait so the same index code runs on disk or in memory.
//!
//! # Storage Types
//!
//! ## FileStorage
//! - Disk-based persistent storage rooted at one directory
//! - Configurable syncing of intermediate segments; canonical files and
//!   renames are always synced
//!
//! ## MemoryStorage
//! - In-memory storage for testing and temporary indexes
//! - Fast but non-persistent
//!
//! # Example
//!
//! ```
//! use hashdex::storage::{Storage, StorageConfig};
//! use hashdex::storage::memory::MemoryStorage;
//!
//! # fn main() -> hashdex::error::Result<()> {
//! let storage = MemoryStorage::new(StorageConfig::default());
//!
//! let mut file = storage.create_file("segment_000000.data")?;
//! file.write_at(0, b"postings")?;
//!
//! let mut buf = [0u8; 8];
//! assert_eq!(file.read_at(0, &mut buf)?, 8);
//! assert_eq!(&buf, b"postings");
//! # Ok(())
//! # }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HashdexError, Result};

pub mod file;
#[cfg(test)]
pub(crate) mod instrumented;
pub mod memory;

/// A trait for storage backends that hold named random-access files.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Create a file for reading and writing, truncating any existing file.
    fn create_file(&self, name: &str) -> Result<Box<dyn StorageFile>>;

    /// Open an existing file for reading and writing.
    fn open_file(&self, name: &str) -> Result<Box<dyn StorageFile>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Rename a file, replacing `new_name` if it exists.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// List all files in the storage, sorted by name.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;
}

/// A random-access file handle.
///
/// Reads and writes are positioned; a handle keeps no cursor that callers
/// have to seek. Reading past the end of the file returns fewer bytes than
/// requested rather than failing.
pub trait StorageFile: Send + Sync + fmt::Debug {
    /// Read into `buf` starting at byte `pos`, returning the number of bytes read.
    ///
    /// Returns less than `buf.len()` only when the end of the file is reached.
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `buf` starting at byte `pos`, extending the file if needed.
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()>;

    /// Current length of the file in bytes.
    fn len(&self) -> Result<u64>;

    /// Whether the file is empty.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncate or extend (with zeros) the file to `len` bytes.
    fn set_len(&mut self, len: u64) -> Result<()>;

    /// Flush buffered writes, syncing to stable storage if the backend is
    /// configured with `sync_writes`.
    fn sync(&mut self) -> Result<()>;

    /// Flush buffered writes and sync them to stable storage unconditionally.
    fn sync_all(&mut self) -> Result<()>;
}

/// Configuration for storage backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Buffer size hint for I/O operations.
    pub buffer_size: usize,

    /// Whether intermediate segments are fsynced when they are completed.
    /// The canonical index is always synced.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            buffer_size: 65536, // 64KB
            sync_writes: false,
        }
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// I/O error.
    IoError(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for HashdexError {
    fn from(err: StorageError) -> Self {
        HashdexError::storage(err.to_string())
    }
}

/// Read exactly `buf.len()` bytes at `pos`, failing on a short read.
pub fn read_exact_at(file: &mut dyn StorageFile, pos: u64, buf: &mut [u8]) -> Result<()> {
    let read = file.read_at(pos, buf)?;
    if read != buf.len() {
        return Err(HashdexError::storage(format!(
            "Short read at offset {pos}: wanted {} bytes, got {read}",
            buf.len()
        )));
    }
    Ok(())
}
