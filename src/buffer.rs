//! In-memory build buffer.
//!
//! The buffer accumulates `(token, docID, offset)` occurrences until a
//! configured number of insertions has been seen, then writes every token's
//! postings list into a fresh [`Segment`] in one pass.

use ahash::AHashMap;

use crate::error::Result;
use crate::postings::{PostingsList, codec};
use crate::segment::Segment;

/// Summary of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Distinct tokens written.
    pub tokens: u64,
    /// Occurrences covered by the flushed postings.
    pub insertions: u64,
    /// Bytes appended to the data file.
    pub bytes_written: u64,
    /// Tokens that could not use their home slot.
    pub collisions: u64,
    /// Longest probe distance of any token.
    pub max_probe: u64,
}

/// Accumulates postings for tokens not yet on disk.
#[derive(Debug)]
pub struct BuildBuffer {
    postings: AHashMap<Vec<u8>, PostingsList>,
    insertions: u64,
    flush_threshold: u64,
}

impl BuildBuffer {
    pub fn new(flush_threshold: u64) -> Self {
        BuildBuffer {
            postings: AHashMap::new(),
            insertions: 0,
            flush_threshold: flush_threshold.max(1),
        }
    }

    /// Record one occurrence. Returns `true` once the buffer should be flushed.
    pub fn insert(&mut self, token: &[u8], doc_id: u32, offset: u32) -> bool {
        match self.postings.get_mut(token) {
            Some(list) => list.add(doc_id, offset),
            None => {
                let mut list = PostingsList::new();
                list.add(doc_id, offset);
                self.postings.insert(token.to_vec(), list);
            }
        }
        self.insertions += 1;
        self.should_flush()
    }

    pub fn should_flush(&self) -> bool {
        self.insertions >= self.flush_threshold
    }

    /// Buffered postings of `token`.
    pub fn postings(&self, token: &[u8]) -> Option<&PostingsList> {
        self.postings.get(token)
    }

    /// Number of distinct tokens buffered.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Insertions since the last flush.
    pub fn insertions(&self) -> u64 {
        self.insertions
    }

    /// Write every buffered token into `segment` and empty the buffer.
    ///
    /// The segment is expected to be freshly created. On error the buffer is
    /// left empty and the segment must be discarded.
    pub fn flush_into(&mut self, segment: &mut Segment) -> Result<FlushStats> {
        let mut stats = FlushStats {
            insertions: self.insertions,
            ..FlushStats::default()
        };
        log::debug!(
            "Flushing {} tokens ({} insertions) into {}",
            self.postings.len(),
            self.insertions,
            segment.name()
        );

        self.insertions = 0;
        for (token, list) in self.postings.drain() {
            let bytes = codec::encode(&list)?;
            let probe = segment.put(&token, &bytes)?;

            stats.tokens += 1;
            stats.bytes_written += bytes.len() as u64;
            if probe > 0 {
                stats.collisions += 1;
            }
            stats.max_probe = stats.max_probe.max(probe);
        }

        log::info!(
            "Flushed {}: {} tokens, {} bytes, {} collisions (longest probe {})",
            segment.name(),
            stats.tokens,
            stats.bytes_written,
            stats.collisions,
            stats.max_probe
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{Storage, StorageConfig};

    fn segment(table_size: u64) -> Segment {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(StorageConfig::default()));
        Segment::create(storage, "segment_000000", table_size).unwrap()
    }

    #[test]
    fn test_insert_groups_by_token_and_document() {
        let mut buffer = BuildBuffer::new(100);
        buffer.insert(b"cat", 0, 0);
        buffer.insert(b"cat", 0, 5);
        buffer.insert(b"cat", 1, 2);
        buffer.insert(b"dog", 0, 1);

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.insertions(), 4);
        let cat = buffer.postings(b"cat").unwrap();
        assert_eq!(cat.doc_ids(), vec![0, 1]);
        assert_eq!(cat.get(0).unwrap().offsets, vec![0, 5]);
    }

    #[test]
    fn test_repeated_offset_is_recorded_once() {
        let mut buffer = BuildBuffer::new(100);
        buffer.insert(b"the", 3, 9);
        buffer.insert(b"the", 3, 9);

        assert_eq!(buffer.postings(b"the").unwrap().get(3).unwrap().offsets, vec![9]);
    }

    #[test]
    fn test_threshold_signals_flush() {
        let mut buffer = BuildBuffer::new(2);
        assert!(!buffer.insert(b"cat", 0, 0));
        assert!(buffer.insert(b"dog", 0, 1));
        assert!(buffer.should_flush());
    }

    #[test]
    fn test_flush_writes_every_token_and_clears() {
        let mut buffer = BuildBuffer::new(2);
        buffer.insert(b"cat", 0, 0);
        buffer.insert(b"dog", 0, 1);

        let mut segment = segment(101);
        let stats = buffer.flush_into(&mut segment).unwrap();

        assert_eq!(stats.tokens, 2);
        assert_eq!(stats.insertions, 2);
        assert_eq!(stats.bytes_written, segment.data_len());
        assert!(buffer.is_empty());
        assert_eq!(buffer.insertions(), 0);
        assert!(!buffer.should_flush());

        assert_eq!(segment.get(b"cat").unwrap().unwrap().doc_ids(), vec![0]);
        assert_eq!(
            segment.get(b"dog").unwrap().unwrap().get(0).unwrap().offsets,
            vec![1]
        );
    }

    #[test]
    fn test_flush_counts_collisions() {
        let mut buffer = BuildBuffer::new(100);
        // 80, 97 and 114 share slot 12 of 17.
        for (doc, token) in [b"P", b"a", b"r"].iter().enumerate() {
            buffer.insert(*token, doc as u32, 0);
        }

        let mut segment = segment(17);
        let stats = buffer.flush_into(&mut segment).unwrap();
        assert_eq!(stats.collisions, 2);
        assert_eq!(stats.max_probe, 2);
    }

    #[test]
    fn test_flush_into_full_table_fails() {
        let mut buffer = BuildBuffer::new(100);
        buffer.insert(b"a", 0, 0);
        buffer.insert(b"b", 0, 1);
        buffer.insert(b"c", 0, 2);

        let mut segment = segment(2);
        let err = buffer.flush_into(&mut segment).unwrap_err();
        assert!(err.is_capacity_exceeded());
    }
}
