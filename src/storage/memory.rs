//! In-memory storage implementation for testing and temporary indexes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::{Storage, StorageConfig, StorageError, StorageFile};

type SharedBytes = Arc<Mutex<Vec<u8>>>;

/// An in-memory storage implementation.
///
/// Every handle opened on the same name shares the same byte buffer, so a
/// segment written through one handle is visible through another, as with
/// files on disk.
#[derive(Debug)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<String, SharedBytes>>>,
    config: StorageConfig,
}

impl MemoryStorage {
    /// Create a new memory storage.
    pub fn new(config: StorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Get the number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Get the total size of all files.
    pub fn total_size(&self) -> u64 {
        let files = self.files.lock();
        files.values().map(|data| data.lock().len() as u64).sum()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(StorageConfig::default())
    }
}

impl Storage for MemoryStorage {
    fn create_file(&self, name: &str) -> Result<Box<dyn StorageFile>> {
        let data = Arc::new(Mutex::new(Vec::with_capacity(self.config.buffer_size.min(4096))));
        self.files.lock().insert(name.to_string(), Arc::clone(&data));
        Ok(Box::new(MemoryFile { data }))
    }

    fn open_file(&self, name: &str) -> Result<Box<dyn StorageFile>> {
        let files = self.files.lock();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;
        Ok(Box::new(MemoryFile {
            data: Arc::clone(data),
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.lock().remove(name);
        Ok(())
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut files = self.files.lock();
        let data = files
            .remove(old_name)
            .ok_or_else(|| StorageError::FileNotFound(old_name.to_string()))?;
        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let files = self.files.lock();
        let mut file_names: Vec<String> = files.keys().cloned().collect();
        file_names.sort();
        Ok(file_names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let files = self.files.lock();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;
        Ok(data.lock().len() as u64)
    }
}

/// A handle on a file in a [`MemoryStorage`].
#[derive(Debug)]
pub struct MemoryFile {
    data: SharedBytes,
}

impl StorageFile for MemoryFile {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let data = self.data.lock();
        let len = data.len() as u64;
        if pos >= len {
            return Ok(0);
        }
        let start = pos as usize;
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        let mut data = self.data.lock();
        let start = pos as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.data.lock().resize(len as usize, 0);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn sync_all(&mut self) -> Result<()> {
        Ok(())
    }
}
