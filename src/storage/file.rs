//! File-based storage implementation.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{HashdexError, Result};
use crate::storage::{Storage, StorageConfig, StorageError, StorageFile};

/// A file-based storage implementation rooted at one directory.
#[derive(Debug)]
pub struct FileStorage {
    /// The root directory for storage.
    directory: PathBuf,
    /// Storage configuration.
    config: StorageConfig,
}

impl FileStorage {
    /// Create a new file storage in the given directory.
    pub fn new<P: AsRef<Path>>(directory: P, config: StorageConfig) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();

        if !directory.exists() {
            std::fs::create_dir_all(&directory)
                .map_err(|e| HashdexError::storage(format!("Failed to create directory: {e}")))?;
        }

        if !directory.is_dir() {
            return Err(HashdexError::storage(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        Ok(FileStorage { directory, config })
    }

    /// The root directory of this storage.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Get the full path for a file name.
    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    /// Sync the directory itself so that renames survive a crash.
    fn sync_directory(&self) -> Result<()> {
        #[cfg(unix)]
        File::open(&self.directory)
            .and_then(|directory| directory.sync_all())
            .map_err(|e| {
                StorageError::IoError(format!(
                    "Failed to sync directory {}: {e}",
                    self.directory.display()
                ))
            })?;
        Ok(())
    }

    fn map_open_error(name: &str, e: std::io::Error) -> HashdexError {
        if e.kind() == ErrorKind::NotFound {
            StorageError::FileNotFound(name.to_string()).into()
        } else {
            StorageError::IoError(e.to_string()).into()
        }
    }
}

impl Storage for FileStorage {
    fn create_file(&self, name: &str) -> Result<Box<dyn StorageFile>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.file_path(name))
            .map_err(|e| StorageError::IoError(e.to_string()))?;

        Ok(Box::new(FileHandle::new(name, file, &self.config)))
    }

    fn open_file(&self, name: &str) -> Result<Box<dyn StorageFile>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.file_path(name))
            .map_err(|e| Self::map_open_error(name, e))?;

        Ok(Box::new(FileHandle::new(name, file, &self.config)))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.file_path(name).is_file()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.file_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::IoError(format!("Failed to delete file {name}: {e}")).into()),
        }
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        std::fs::rename(self.file_path(old_name), self.file_path(new_name)).map_err(|e| {
            StorageError::IoError(format!("Failed to rename {old_name} to {new_name}: {e}"))
        })?;
        self.sync_directory()
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        for entry in
            std::fs::read_dir(&self.directory).map_err(|e| StorageError::IoError(e.to_string()))?
        {
            let entry = entry.map_err(|e| StorageError::IoError(e.to_string()))?;
            let path = entry.path();

            if path.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                files.push(name.to_string());
            }
        }

        files.sort();
        Ok(files)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let metadata = self
            .file_path(name)
            .metadata()
            .map_err(|e| Self::map_open_error(name, e))?;
        Ok(metadata.len())
    }
}

/// A random-access handle on a file in a [`FileStorage`].
///
/// Consecutive writes that extend each other are collected in a write-behind
/// buffer of `buffer_size` bytes; any read, resize or non-contiguous write
/// flushes it first.
#[derive(Debug)]
pub struct FileHandle {
    name: String,
    file: File,
    /// Pending bytes destined for `pending_start..`.
    pending: Vec<u8>,
    pending_start: u64,
    buffer_size: usize,
    sync_writes: bool,
}

impl FileHandle {
    fn new(name: &str, file: File, config: &StorageConfig) -> Self {
        FileHandle {
            name: name.to_string(),
            file,
            pending: Vec::new(),
            pending_start: 0,
            buffer_size: config.buffer_size.max(1),
            sync_writes: config.sync_writes,
        }
    }

    fn pending_end(&self) -> u64 {
        self.pending_start + self.pending.len() as u64
    }

    fn write_direct(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        let start = self.pending_start;
        let result = self.write_direct(start, &pending);
        self.pending = pending;
        self.pending.clear();
        result
    }
}

impl StorageFile for FileHandle {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        self.flush_pending()?;
        self.file.seek(SeekFrom::Start(pos))?;

        let mut total = 0;
        while total < buf.len() {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        if !self.pending.is_empty() && pos == self.pending_end() {
            self.pending.extend_from_slice(buf);
        } else {
            self.flush_pending()?;
            if buf.len() >= self.buffer_size {
                return self.write_direct(pos, buf);
            }
            self.pending_start = pos;
            self.pending.extend_from_slice(buf);
        }

        if self.pending.len() >= self.buffer_size {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        let on_disk = self.file.metadata()?.len();
        if self.pending.is_empty() {
            Ok(on_disk)
        } else {
            Ok(on_disk.max(self.pending_end()))
        }
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.flush_pending()?;
        self.file.set_len(len)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if self.sync_writes {
            return self.sync_all();
        }
        self.flush_pending()
    }

    fn sync_all(&mut self) -> Result<()> {
        self.flush_pending()?;
        self.file
            .sync_all()
            .map_err(|e| HashdexError::storage(format!("Failed to sync {}: {e}", self.name)))
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if let Err(e) = self.flush_pending() {
            log::warn!("Failed to flush pending writes to {}: {e}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage(buffer_size: usize) -> (TempDir, FileStorage) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            buffer_size,
            ..StorageConfig::default()
        };
        let storage = FileStorage::new(temp_dir.path(), config).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_create_and_read_file() {
        let (_temp_dir, storage) = create_test_storage(64);

        let mut file = storage.create_file("test.bin").unwrap();
        file.write_at(0, b"Hello, ").unwrap();
        file.write_at(7, b"World!").unwrap();
        assert_eq!(file.len().unwrap(), 13);

        let mut buffer = [0u8; 13];
        assert_eq!(file.read_at(0, &mut buffer).unwrap(), 13);
        assert_eq!(&buffer, b"Hello, World!");
    }

    #[test]
    fn test_read_past_end_is_short() {
        let (_temp_dir, storage) = create_test_storage(64);

        let mut file = storage.create_file("short.bin").unwrap();
        file.write_at(0, b"abc").unwrap();

        let mut buffer = [0u8; 8];
        assert_eq!(file.read_at(1, &mut buffer).unwrap(), 2);
        assert_eq!(&buffer[..2], b"bc");
        assert_eq!(file.read_at(100, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_overwrite_in_place() {
        let (_temp_dir, storage) = create_test_storage(4);

        let mut file = storage.create_file("slots.bin").unwrap();
        file.set_len(12).unwrap();
        file.write_at(4, b"wxyz").unwrap();
        file.write_at(0, b"ab").unwrap();
        file.sync().unwrap();

        let mut buffer = [0u8; 12];
        file.read_at(0, &mut buffer).unwrap();
        assert_eq!(&buffer, b"ab\0\0wxyz\0\0\0\0");
    }

    #[test]
    fn test_sync_all_ignores_sync_writes() {
        let (_temp_dir, storage) = create_test_storage(1024);
        assert!(!storage.config.sync_writes);

        let mut file = storage.create_file("durable.bin").unwrap();
        file.write_at(0, b"postings").unwrap();
        file.sync_all().unwrap();

        // The write-behind buffer is empty, so the bytes are on disk.
        assert_eq!(storage.file_size("durable.bin").unwrap(), 8);
    }

    #[test]
    fn test_rename_replaces_target() {
        let (_temp_dir, storage) = create_test_storage(64);

        storage.create_file("dictionary").unwrap().write_at(0, b"old").unwrap();
        let mut file = storage.create_file("segment_000001.dict").unwrap();
        file.write_at(0, b"new!").unwrap();
        file.sync_all().unwrap();
        drop(file);

        storage.rename_file("segment_000001.dict", "dictionary").unwrap();
        assert_eq!(storage.list_files().unwrap(), vec!["dictionary"]);
        assert_eq!(storage.file_size("dictionary").unwrap(), 4);
    }

    #[test]
    fn test_pending_writes_survive_drop() {
        let (_temp_dir, storage) = create_test_storage(1024);

        {
            let mut file = storage.create_file("dropped.bin").unwrap();
            file.write_at(0, b"buffered").unwrap();
        }

        let mut file = storage.open_file("dropped.bin").unwrap();
        let mut buffer = [0u8; 8];
        assert_eq!(file.read_at(0, &mut buffer).unwrap(), 8);
        assert_eq!(&buffer, b"buffered");
    }

    #[test]
    fn test_file_operations() {
        let (_temp_dir, storage) = create_test_storage(64);

        assert!(!storage.file_exists("test.txt"));
        assert!(storage.open_file("test.txt").is_err());

        let mut file = storage.create_file("test.txt").unwrap();
        file.write_at(0, b"Test content").unwrap();
        file.sync().unwrap();
        drop(file);

        assert!(storage.file_exists("test.txt"));
        assert_eq!(storage.file_size("test.txt").unwrap(), 12);
        assert_eq!(storage.list_files().unwrap(), vec!["test.txt"]);

        storage.rename_file("test.txt", "renamed.txt").unwrap();
        assert!(!storage.file_exists("test.txt"));
        assert!(storage.file_exists("renamed.txt"));

        storage.delete_file("renamed.txt").unwrap();
        assert!(!storage.file_exists("renamed.txt"));
        // Deleting twice is fine.
        storage.delete_file("renamed.txt").unwrap();
    }

    #[test]
    fn test_file_not_found() {
        let (_temp_dir, storage) = create_test_storage(64);

        let err = storage.open_file("nonexistent").unwrap_err();
        assert!(err.to_string().contains("File not found"));
        assert!(storage.file_size("nonexistent").is_err());
    }
}
