//! The hashed index.
//!
//! [`HashedIndex`] ties the pieces together. During a build, `insert` feeds
//! the build buffer, full buffers are flushed into segments, and segments are
//! merged in the background. `cleanup` flushes the rest, waits for the last
//! merge and adopts the surviving segment as the canonical `dictionary` and
//! `data` files. Only a finalized index answers lookups.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use hashdex::config::IndexConfig;
//! use hashdex::index::HashedIndex;
//! use hashdex::storage::memory::MemoryStorage;
//!
//! # fn main() -> hashdex::error::Result<()> {
//! let config = IndexConfig {
//!     table_size: 1009,
//!     flush_threshold: 2,
//!     ..IndexConfig::default()
//! };
//! let mut index = HashedIndex::create(Arc::new(MemoryStorage::default()), config)?;
//!
//! index.insert("cat", 0, 0)?;
//! index.insert("dog", 0, 1)?;
//! index.insert("cat", 1, 0)?;
//! index.cleanup()?;
//!
//! let cat = index.get_postings("cat")?.expect("indexed");
//! assert_eq!(cat.doc_ids(), vec![0, 1]);
//! assert!(index.get_postings("nonexistent")?.is_none());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BuildBuffer;
use crate::config::IndexConfig;
use crate::docinfo::DocInfo;
use crate::error::{HashdexError, Result};
use crate::merge::{MergeScheduler, SchedulerStats};
use crate::postings::PostingsList;
use crate::segment::{self, Segment};
use crate::storage::file::FileStorage;
use crate::storage::{Storage, StorageConfig};

/// Counters of an index build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub tokens_inserted: u64,
    pub segments_flushed: u64,
    pub scheduler: SchedulerStats,
}

#[derive(Debug)]
enum IndexState {
    Building {
        buffer: BuildBuffer,
        scheduler: MergeScheduler,
    },
    Finalized {
        canonical: Mutex<Segment>,
    },
    Failed,
}

/// A disk-resident inverted index keyed by token fingerprints.
#[derive(Debug)]
pub struct HashedIndex {
    storage: Arc<dyn Storage>,
    config: IndexConfig,
    state: IndexState,
    doc_info: DocInfo,
    tokens_inserted: u64,
    segments_flushed: u64,
    scheduler_stats: SchedulerStats,
}

impl HashedIndex {
    /// Start building a new index in `storage`.
    ///
    /// Files left behind by an earlier build in the same storage are removed.
    pub fn create(storage: Arc<dyn Storage>, config: IndexConfig) -> Result<Self> {
        config.validate()?;

        let mut stale = 0;
        for name in storage.list_files()? {
            if segment::is_segment_file(&name) {
                storage.delete_file(&name)?;
                stale += 1;
            }
        }
        if stale > 0 {
            log::info!("Removed {stale} intermediate files of an earlier build");
        }
        storage.delete_file(segment::CANONICAL_DICTIONARY)?;
        storage.delete_file(segment::CANONICAL_DATA)?;
        DocInfo::clear(storage.as_ref())?;
        config.save(storage.as_ref())?;

        log::info!(
            "Creating index: {} slots, flush every {} insertions, up to {} concurrent merges",
            config.table_size,
            config.flush_threshold,
            config.max_concurrent_merges
        );

        Ok(HashedIndex {
            state: IndexState::Building {
                buffer: BuildBuffer::new(config.flush_threshold),
                scheduler: MergeScheduler::new(Arc::clone(&storage), &config),
            },
            doc_info: DocInfo::new(Arc::clone(&storage)),
            storage,
            config,
            tokens_inserted: 0,
            segments_flushed: 0,
            scheduler_stats: SchedulerStats::default(),
        })
    }

    /// Start building a new index in a directory, creating it if needed.
    pub fn create_in_dir<P: AsRef<Path>>(directory: P, config: IndexConfig) -> Result<Self> {
        let storage = FileStorage::new(directory, config.storage.clone())?;
        Self::create(Arc::new(storage), config)
    }

    /// Open a finalized index.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let config = IndexConfig::load(storage.as_ref())?;
        if !storage.file_exists(segment::CANONICAL_DICTIONARY)
            || !storage.file_exists(segment::CANONICAL_DATA)
        {
            return Err(HashdexError::index(
                "no finalized index found; the build did not complete",
            ));
        }

        let canonical = Segment::open_canonical(Arc::clone(&storage), config.table_size)?;
        let doc_info = DocInfo::load(Arc::clone(&storage))?;
        log::info!(
            "Opened index: {} slots, {} bytes of postings, {} documents",
            config.table_size,
            canonical.data_len(),
            doc_info.len()
        );

        Ok(HashedIndex {
            storage,
            config,
            state: IndexState::Finalized {
                canonical: Mutex::new(canonical),
            },
            doc_info,
            tokens_inserted: 0,
            segments_flushed: 0,
            scheduler_stats: SchedulerStats::default(),
        })
    }

    /// Open a finalized index stored in a directory.
    ///
    /// The directory must exist; it is never created.
    pub fn open_dir<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(HashdexError::index(format!(
                "no index directory at {}",
                directory.display()
            )));
        }
        let probe = FileStorage::new(directory, StorageConfig::default())?;
        let config = IndexConfig::load(&probe)?;
        Self::open(Arc::new(FileStorage::new(directory, config.storage)?))
    }

    /// Record an occurrence of `token` at `offset` in document `doc_id`.
    ///
    /// Offsets for a document are expected in non-decreasing order. The
    /// occurrence becomes visible to lookups only after [`cleanup`](Self::cleanup).
    pub fn insert<T: AsRef<[u8]>>(&mut self, token: T, doc_id: u32, offset: u32) -> Result<()> {
        let flush_due = match &mut self.state {
            IndexState::Building { buffer, .. } => buffer.insert(token.as_ref(), doc_id, offset),
            state => return Err(unavailable(state, "insert")),
        };
        self.tokens_inserted += 1;

        if flush_due {
            let result = self.flush_buffer();
            return self.fail_on_error(result);
        }
        Ok(())
    }

    /// Record a document's path and length, written to `docInfo` at the next flush.
    pub fn register_document(&mut self, doc_id: u32, path: &str, token_count: u32) -> Result<()> {
        match &self.state {
            IndexState::Building { .. } => self.doc_info.register(doc_id, path, token_count),
            state => Err(unavailable(state, "register documents")),
        }
    }

    /// Flush the remaining buffer, merge everything into the canonical
    /// segment and make it durable.
    ///
    /// Blocks until all merges are done. Calling it again is a no-op.
    pub fn cleanup(&mut self) -> Result<()> {
        match &self.state {
            IndexState::Building { .. } => {}
            IndexState::Finalized { .. } => return Ok(()),
            state => return Err(unavailable(state, "clean up")),
        }
        let result = self.finalize();
        self.fail_on_error(result)
    }

    /// The postings of `token`, or `None` if it was never inserted.
    ///
    /// Only available once the index is finalized.
    pub fn get_postings<T: AsRef<[u8]>>(&self, token: T) -> Result<Option<PostingsList>> {
        match &self.state {
            IndexState::Finalized { canonical } => canonical.lock().get(token.as_ref()),
            state => Err(unavailable(state, "look up postings")),
        }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, IndexState::Finalized { .. })
    }

    pub fn stats(&self) -> IndexStats {
        let scheduler = match &self.state {
            IndexState::Building { scheduler, .. } => scheduler.stats().clone(),
            _ => self.scheduler_stats.clone(),
        };
        IndexStats {
            tokens_inserted: self.tokens_inserted,
            segments_flushed: self.segments_flushed,
            scheduler,
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Path of a document, once the index is finalized.
    pub fn doc_path(&self, doc_id: u32) -> Option<&str> {
        self.doc_info.path(doc_id)
    }

    /// Token count of a document, once the index is finalized.
    pub fn doc_length(&self, doc_id: u32) -> Option<u32> {
        self.doc_info.token_count(doc_id)
    }

    /// Number of documents in `docInfo`, once the index is finalized.
    pub fn num_docs(&self) -> usize {
        self.doc_info.len()
    }

    fn flush_buffer(&mut self) -> Result<()> {
        let IndexState::Building { buffer, scheduler } = &mut self.state else {
            return Err(HashdexError::invariant("flush outside of a build"));
        };

        let mut segment = scheduler.create_segment()?;
        buffer.flush_into(&mut segment)?;
        segment.sync()?;
        self.doc_info.flush()?;
        scheduler.submit(segment)?;

        self.segments_flushed += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.flush_buffer()?;

        let IndexState::Building { scheduler, .. } = &mut self.state else {
            return Err(HashdexError::invariant("finalize outside of a build"));
        };
        let segment = scheduler.drain()?;
        self.scheduler_stats = scheduler.stats().clone();

        self.doc_info.finalize()?;
        let canonical = segment.into_canonical()?;
        log::info!(
            "Index finalized: {} insertions, {} segments flushed, {} merges, {} bytes of postings",
            self.tokens_inserted,
            self.segments_flushed,
            self.scheduler_stats.merges_completed,
            canonical.data_len()
        );

        self.state = IndexState::Finalized {
            canonical: Mutex::new(canonical),
        };
        Ok(())
    }

    fn fail_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            log::warn!("Index build aborted: {e}");
            self.state = IndexState::Failed;
        }
        result
    }
}

fn unavailable(state: &IndexState, operation: &str) -> HashdexError {
    match state {
        IndexState::Building { .. } => HashdexError::invalid_operation(format!(
            "cannot {operation} before the index is finalized"
        )),
        IndexState::Finalized { .. } => HashdexError::invalid_operation(format!(
            "cannot {operation} after the index is finalized"
        )),
        IndexState::Failed => {
            HashdexError::invalid_operation(format!("cannot {operation}: the index build failed"))
        }
    }
}
