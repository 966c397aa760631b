//! Pairwise segment merging.
//!
//! A merge walks the two input tables slot by slot and writes, for every
//! token of either input, one entry into the output table at the slot where
//! the token's probe chain can reach it.
//!
//! At scan index `i`:
//!
//! - both inputs free: a deferred entry, if any, is written at `i`;
//! - one input occupied: the token is looked up on the other input's probe
//!   chain from `i + 1` with [`Segment::take`]; the postings are merged if
//!   found and copied verbatim otherwise, and written at `i`;
//! - both occupied with equal checksums: the two lists are merged and
//!   written at `i`;
//! - both occupied with different checksums: the primary's token is resolved
//!   as above and written at `i`; the secondary's token is resolved against
//!   the primary and queued, to be written at the next index where both
//!   inputs are free.
//!
//! The scan starts just after a slot that is free in both inputs, so no probe
//! chain of either input straddles the start, and visits every slot once.
//! Entries still queued afterwards go into the next free output slots after
//! the start. Consumed entries are tombstoned, never zeroed, so chains through
//! them stay walkable.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{HashdexError, Result};
use crate::postings::codec;
use crate::segment::{DictionaryEntry, Segment};

/// Counters reported by a finished merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeStats {
    /// Tokens present in both inputs.
    pub merged: u64,
    /// Tokens present in one input only.
    pub copied: u64,
    /// Entries that went through the deferred queue.
    pub deferred: u64,
    /// Entries read from the primary input.
    pub primary_entries: u64,
    /// Entries read from the secondary input.
    pub secondary_entries: u64,
    /// Bytes appended to the output data file.
    pub bytes_written: u64,
    pub elapsed: Duration,
}

impl MergeStats {
    /// Entries written to the output.
    pub fn output_entries(&self) -> u64 {
        self.merged + self.copied
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Primary,
    Secondary,
}

/// Merges two segments into a third.
#[derive(Debug)]
pub struct SegmentMerger {
    primary: Segment,
    secondary: Segment,
    output: Segment,
    deferred: VecDeque<DictionaryEntry>,
    stats: MergeStats,
}

impl SegmentMerger {
    /// Prepare a merge of `primary` and `secondary` into the empty `output`.
    pub fn new(primary: Segment, secondary: Segment, output: Segment) -> Result<Self> {
        let table_size = output.table_size();
        if primary.table_size() != table_size || secondary.table_size() != table_size {
            return Err(HashdexError::invalid_argument(format!(
                "cannot merge tables of {} and {} slots into {} slots",
                primary.table_size(),
                secondary.table_size(),
                table_size
            )));
        }
        Ok(SegmentMerger {
            primary,
            secondary,
            output,
            deferred: VecDeque::new(),
            stats: MergeStats::default(),
        })
    }

    /// Run the merge.
    ///
    /// On success the input segments are deleted and the synced output is
    /// returned with its counters. On failure the output is incomplete and
    /// must not be used.
    pub fn run(mut self) -> Result<(Segment, MergeStats)> {
        let started = Instant::now();
        log::info!(
            "Merging {} and {} into {}",
            self.primary.name(),
            self.secondary.name(),
            self.output.name()
        );

        let start = self.scan_start()?;
        self.scan(start)?;
        self.drain_deferred(start)?;

        self.stats.bytes_written = self.output.data_len();
        self.stats.elapsed = started.elapsed();
        self.output.sync()?;

        let SegmentMerger {
            primary,
            secondary,
            output,
            stats,
            ..
        } = self;
        primary.delete()?;
        secondary.delete()?;

        log::info!(
            "Merged into {}: {} merged, {} copied, {} deferred, {} bytes in {:?}",
            output.name(),
            stats.merged,
            stats.copied,
            stats.deferred,
            stats.bytes_written,
            stats.elapsed
        );
        Ok((output, stats))
    }

    /// A slot free in both inputs.
    fn scan_start(&mut self) -> Result<u64> {
        for slot in 0..self.output.table_size() {
            if !self.primary.read_slot(slot)?.is_occupied()
                && !self.secondary.read_slot(slot)?.is_occupied()
            {
                return Ok(slot);
            }
        }
        Err(HashdexError::capacity_exceeded(
            self.output.table_size(),
            format!(
                "{} and {} have no common free slot",
                self.primary.name(),
                self.secondary.name()
            ),
        ))
    }

    fn scan(&mut self, start: u64) -> Result<()> {
        let table_size = self.output.table_size();
        for step in 1..=table_size {
            let slot = (start + step) % table_size;
            let a = self.primary.read_slot(slot)?;
            let b = self.secondary.read_slot(slot)?;

            match (a.is_occupied(), b.is_occupied()) {
                (false, false) => {
                    if let Some(entry) = self.deferred.pop_front() {
                        log::trace!("slot {slot}: deferred entry {}", entry.checksum);
                        self.output.write_slot(slot, &entry)?;
                    }
                }
                (true, false) => {
                    log::trace!("slot {slot}: primary {}", a.checksum);
                    let entry = self.resolve(Side::Primary, &a, slot)?;
                    self.output.write_slot(slot, &entry)?;
                }
                (false, true) => {
                    log::trace!("slot {slot}: secondary {}", b.checksum);
                    let entry = self.resolve(Side::Secondary, &b, slot)?;
                    self.output.write_slot(slot, &entry)?;
                }
                (true, true) if a.checksum == b.checksum => {
                    log::trace!("slot {slot}: both {}", a.checksum);
                    self.stats.primary_entries += 1;
                    self.stats.secondary_entries += 1;
                    let entry = self.write_merged(&a, &b)?;
                    self.output.write_slot(slot, &entry)?;
                }
                (true, true) => {
                    log::trace!("slot {slot}: collision {} / {}", a.checksum, b.checksum);
                    let entry = self.resolve(Side::Primary, &a, slot)?;
                    self.output.write_slot(slot, &entry)?;
                    let entry = self.resolve(Side::Secondary, &b, slot)?;
                    self.deferred.push_back(entry);
                    self.stats.deferred += 1;
                }
            }
        }
        Ok(())
    }

    fn drain_deferred(&mut self, start: u64) -> Result<()> {
        if self.deferred.is_empty() {
            return Ok(());
        }
        log::debug!(
            "Draining {} deferred entries into {}",
            self.deferred.len(),
            self.output.name()
        );

        let table_size = self.output.table_size();
        let mut next = (start + 1) % table_size;
        while let Some(entry) = self.deferred.pop_front() {
            let slot = self.output.find_free_slot(next)?;
            self.output.write_slot(slot, &entry)?;
            next = (slot + 1) % table_size;
        }
        Ok(())
    }

    /// Write the output entry for `entry`, found at `slot` on `side`,
    /// merging in its counterpart from the other input if there is one.
    fn resolve(&mut self, side: Side, entry: &DictionaryEntry, slot: u64) -> Result<DictionaryEntry> {
        let counterpart = match side {
            Side::Primary => {
                self.stats.primary_entries += 1;
                self.secondary.take(slot + 1, entry.checksum)?
            }
            Side::Secondary => {
                self.stats.secondary_entries += 1;
                self.primary.take(slot + 1, entry.checksum)?
            }
        };

        match (side, counterpart) {
            (Side::Primary, Some(other)) => {
                self.stats.secondary_entries += 1;
                self.write_merged(entry, &other)
            }
            (Side::Secondary, Some(other)) => {
                self.stats.primary_entries += 1;
                self.write_merged(&other, entry)
            }
            (Side::Primary, None) => {
                let bytes = self.primary.read_data(entry)?;
                self.write_copied(entry.checksum, &bytes)
            }
            (Side::Secondary, None) => {
                let bytes = self.secondary.read_data(entry)?;
                self.write_copied(entry.checksum, &bytes)
            }
        }
    }

    fn write_merged(&mut self, a: &DictionaryEntry, b: &DictionaryEntry) -> Result<DictionaryEntry> {
        let from_primary = self.primary.read_postings(a)?;
        let from_secondary = self.secondary.read_postings(b)?;
        let bytes = codec::encode(&from_primary.merge(&from_secondary))?;

        let (data_pointer, data_size) = self.output.append_data(&bytes)?;
        self.stats.merged += 1;
        Ok(DictionaryEntry::new(data_pointer, a.checksum, data_size))
    }

    fn write_copied(&mut self, checksum: i64, bytes: &[u8]) -> Result<DictionaryEntry> {
        let (data_pointer, data_size) = self.output.append_data(bytes)?;
        self.stats.copied += 1;
        Ok(DictionaryEntry::new(data_pointer, checksum, data_size))
    }
}

/// Merge `primary` and `secondary` into `output`, deleting the inputs.
pub fn merge_segments(
    primary: Segment,
    secondary: Segment,
    output: Segment,
) -> Result<(Segment, MergeStats)> {
    SegmentMerger::new(primary, secondary, output)?.run()
}
