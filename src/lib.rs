//! # Hashdex
//!
//! A disk-resident inverted index for corpora whose postings do not fit in
//! memory.
//!
//! ## Features
//!
//! - Open-addressed on-disk hash tables with fixed 20-byte slots
//! - Tokens replaced by a slot hash and a checksum, never stored
//! - In-memory build buffer flushed into segments at a configurable threshold
//! - Background pairwise merging of segments, bounded in concurrency
//! - Pluggable storage backends (directory or memory)

pub mod buffer;
pub mod config;
pub mod docinfo;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod merge;
pub mod postings;
pub mod segment;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::config::IndexConfig;
    pub use crate::error::{HashdexError, Result};
    pub use crate::index::{HashedIndex, IndexStats};
    pub use crate::postings::{PostingsEntry, PostingsList};
    pub use crate::storage::file::FileStorage;
    pub use crate::storage::memory::MemoryStorage;
    pub use crate::storage::{Storage, StorageConfig};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
