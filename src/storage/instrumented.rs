//! A [`MemoryStorage`] wrapper for tests that counts durable syncs and can
//! make reads panic.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::Result;
use crate::storage::memory::MemoryStorage;
use crate::storage::{Storage, StorageFile};

#[derive(Debug, Default)]
struct Counters {
    durable_syncs: AtomicUsize,
    synced_files: parking_lot::Mutex<Vec<String>>,
    panic_on_read: AtomicBool,
}

#[derive(Debug, Default)]
pub struct InstrumentedStorage {
    inner: MemoryStorage,
    counters: Arc<Counters>,
}

impl InstrumentedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `sync_all` calls on any file.
    pub fn durable_syncs(&self) -> usize {
        self.counters.durable_syncs.load(Ordering::SeqCst)
    }

    /// Names of the files that were synced with `sync_all`, in call order.
    pub fn synced_files(&self) -> Vec<String> {
        self.counters.synced_files.lock().clone()
    }

    /// Make every subsequent read on any handle panic.
    pub fn panic_on_read(&self) {
        self.counters.panic_on_read.store(true, Ordering::SeqCst);
    }

    fn wrap(&self, name: &str, inner: Box<dyn StorageFile>) -> Box<dyn StorageFile> {
        Box::new(InstrumentedFile {
            name: name.to_string(),
            inner,
            counters: Arc::clone(&self.counters),
        })
    }
}

impl Storage for InstrumentedStorage {
    fn create_file(&self, name: &str) -> Result<Box<dyn StorageFile>> {
        let file = self.inner.create_file(name)?;
        Ok(self.wrap(name, file))
    }

    fn open_file(&self, name: &str) -> Result<Box<dyn StorageFile>> {
        let file = self.inner.open_file(name)?;
        Ok(self.wrap(name, file))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(name)
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.inner.rename_file(old_name, new_name)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.inner.list_files()
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.inner.file_size(name)
    }
}

#[derive(Debug)]
struct InstrumentedFile {
    name: String,
    inner: Box<dyn StorageFile>,
    counters: Arc<Counters>,
}

impl StorageFile for InstrumentedFile {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        if self.counters.panic_on_read.load(Ordering::SeqCst) {
            panic!("injected read failure");
        }
        self.inner.read_at(pos, buf)
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        self.inner.write_at(pos, buf)
    }

    fn len(&self) -> Result<u64> {
        self.inner.len()
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.inner.set_len(len)
    }

    fn sync(&mut self) -> Result<()> {
        self.inner.sync()
    }

    fn sync_all(&mut self) -> Result<()> {
        self.counters.durable_syncs.fetch_add(1, Ordering::SeqCst);
        self.counters.synced_files.lock().push(self.name.clone());
        self.inner.sync_all()
    }
}
