//! On-disk hash tables.
//!
//! A [`Segment`] is a pair of files forming one complete partial index:
//!
//! - the *dictionary*, an open-addressed table of `table_size` fixed
//!   [`DictionaryEntry`] slots, and
//! - the *data* file, an append-only concatenation of encoded postings lists
//!   addressed by `(data_pointer, data_size)`.
//!
//! Tokens are not stored. A token's entry lives on the linear probe chain
//! starting at `fingerprint::hash(token)` and is recognized by
//! `fingerprint::checksum(token)`. Probing wraps at the end of the table and
//! gives up after `table_size` probes.
//!
//! A segment owns its file handles and is moved by value between the build
//! buffer, the merge scheduler and merge tasks; nothing else touches its
//! files while it exists.

pub mod entry;

use std::fmt;
use std::sync::Arc;

use crate::error::{HashdexError, Result};
use crate::fingerprint;
use crate::postings::{PostingsList, codec};
use crate::storage::{Storage, StorageFile, read_exact_at};

pub use entry::{DictionaryEntry, ENTRY_SIZE, TOMBSTONE};

/// File name of the canonical dictionary.
pub const CANONICAL_DICTIONARY: &str = "dictionary";

/// File name of the canonical data file.
pub const CANONICAL_DATA: &str = "data";

/// Extension of intermediate dictionary files.
pub const DICTIONARY_EXTENSION: &str = "dict";

/// Extension of intermediate data files.
pub const DATA_EXTENSION: &str = "data";

/// Base name of the intermediate segment with the given id.
pub fn segment_name(id: u64) -> String {
    format!("segment_{id:06}")
}

/// Whether `file_name` belongs to an intermediate segment.
pub fn is_segment_file(file_name: &str) -> bool {
    file_name.strip_prefix("segment_").is_some_and(|rest| {
        rest.ends_with(&format!(".{DICTIONARY_EXTENSION}"))
            || rest.ends_with(&format!(".{DATA_EXTENSION}"))
    })
}

/// A dictionary table and its data file.
pub struct Segment {
    storage: Arc<dyn Storage>,
    name: String,
    dictionary_name: String,
    data_name: String,
    dictionary: Box<dyn StorageFile>,
    data: Box<dyn StorageFile>,
    table_size: u64,
    /// Next append position in the data file.
    write_cursor: u64,
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("table_size", &self.table_size)
            .field("write_cursor", &self.write_cursor)
            .finish()
    }
}

impl Segment {
    /// Create the empty intermediate segment `name`, replacing any files of
    /// the same name.
    pub fn create(storage: Arc<dyn Storage>, name: &str, table_size: u64) -> Result<Self> {
        let dictionary_name = format!("{name}.{DICTIONARY_EXTENSION}");
        let data_name = format!("{name}.{DATA_EXTENSION}");

        let mut dictionary = storage.create_file(&dictionary_name)?;
        dictionary.set_len(table_size * ENTRY_SIZE as u64)?;
        let data = storage.create_file(&data_name)?;

        Ok(Segment {
            storage,
            name: name.to_string(),
            dictionary_name,
            data_name,
            dictionary,
            data,
            table_size,
            write_cursor: 0,
        })
    }

    /// Open an existing segment from its two files.
    pub fn open(
        storage: Arc<dyn Storage>,
        dictionary_name: &str,
        data_name: &str,
        table_size: u64,
    ) -> Result<Self> {
        let dictionary = storage.open_file(dictionary_name)?;
        let data = storage.open_file(data_name)?;
        let write_cursor = data.len()?;

        Ok(Segment {
            storage,
            name: dictionary_name.to_string(),
            dictionary_name: dictionary_name.to_string(),
            data_name: data_name.to_string(),
            dictionary,
            data,
            table_size,
            write_cursor,
        })
    }

    /// Open the canonical segment.
    pub fn open_canonical(storage: Arc<dyn Storage>, table_size: u64) -> Result<Self> {
        Self::open(storage, CANONICAL_DICTIONARY, CANONICAL_DATA, table_size)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_size(&self) -> u64 {
        self.table_size
    }

    /// Bytes of postings data written so far.
    pub fn data_len(&self) -> u64 {
        self.write_cursor
    }

    /// Store the encoded postings of `token`.
    ///
    /// The bytes are appended to the data file and the entry is written to
    /// the first free slot of the token's probe chain. Returns the number of
    /// occupied slots skipped before a free one was found.
    pub fn put(&mut self, token: &[u8], bytes: &[u8]) -> Result<u64> {
        let home = fingerprint::hash(token, self.table_size);
        let slot = self.find_free_slot(home)?;
        let (data_pointer, data_size) = self.append_data(bytes)?;
        let entry = DictionaryEntry::new(data_pointer, fingerprint::checksum(token), data_size);
        self.write_slot(slot, &entry)?;
        Ok((slot + self.table_size - home) % self.table_size)
    }

    /// Look up the postings of `token`.
    pub fn get(&mut self, token: &[u8]) -> Result<Option<PostingsList>> {
        let home = fingerprint::hash(token, self.table_size);
        let checksum = fingerprint::checksum(token);
        match self.probe(home, checksum)? {
            Some((_, entry)) => Ok(Some(self.read_postings(&entry)?)),
            None => Ok(None),
        }
    }

    /// Find the entry with `checksum` on the probe chain passing through
    /// `start` and consume it.
    ///
    /// The slot is marked with a tombstone so chains through it stay intact.
    /// The entry's data remains readable until the segment is deleted.
    pub fn take(&mut self, start: u64, checksum: i64) -> Result<Option<DictionaryEntry>> {
        match self.probe(start % self.table_size, checksum)? {
            Some((slot, entry)) => {
                let consumed = DictionaryEntry::new(entry.data_pointer, entry.checksum, TOMBSTONE);
                self.write_slot(slot, &consumed)?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn probe(&mut self, start: u64, checksum: i64) -> Result<Option<(u64, DictionaryEntry)>> {
        for distance in 0..self.table_size {
            let slot = (start + distance) % self.table_size;
            let entry = self.read_slot(slot)?;
            if entry.is_empty() {
                return Ok(None);
            }
            if entry.is_occupied() && entry.checksum == checksum {
                return Ok(Some((slot, entry)));
            }
        }
        Ok(None)
    }

    /// The first slot at or after `start`, cyclically, that holds no live entry.
    pub fn find_free_slot(&mut self, start: u64) -> Result<u64> {
        for distance in 0..self.table_size {
            let slot = (start + distance) % self.table_size;
            if !self.read_slot(slot)?.is_occupied() {
                return Ok(slot);
            }
        }
        Err(HashdexError::capacity_exceeded(
            self.table_size,
            format!("no free slot in {}", self.name),
        ))
    }

    /// Read slot `slot`. Slots beyond the end of the file read as empty.
    pub fn read_slot(&mut self, slot: u64) -> Result<DictionaryEntry> {
        let mut buf = [0u8; ENTRY_SIZE];
        self.dictionary.read_at(slot * ENTRY_SIZE as u64, &mut buf)?;
        Ok(DictionaryEntry::from_bytes(&buf))
    }

    /// Overwrite slot `slot`.
    pub fn write_slot(&mut self, slot: u64, entry: &DictionaryEntry) -> Result<()> {
        if slot >= self.table_size {
            return Err(HashdexError::invalid_argument(format!(
                "slot {slot} outside table of {} slots",
                self.table_size
            )));
        }
        self.dictionary
            .write_at(slot * ENTRY_SIZE as u64, &entry.to_bytes())
    }

    /// Append a postings blob to the data file, returning its pointer and size.
    pub fn append_data(&mut self, bytes: &[u8]) -> Result<(i64, i32)> {
        let data_size = i32::try_from(bytes.len())
            .ok()
            .filter(|&size| size > 0)
            .ok_or_else(|| {
                HashdexError::invalid_argument(format!(
                    "postings blob of {} bytes cannot be stored",
                    bytes.len()
                ))
            })?;
        let data_pointer = i64::try_from(self.write_cursor)
            .map_err(|_| HashdexError::storage(format!("data file {} too large", self.data_name)))?;

        self.data.write_at(self.write_cursor, bytes)?;
        self.write_cursor += bytes.len() as u64;
        Ok((data_pointer, data_size))
    }

    /// Read the raw postings blob of `entry`.
    pub fn read_data(&mut self, entry: &DictionaryEntry) -> Result<Vec<u8>> {
        if entry.data_pointer < 0 || entry.data_size <= 0 {
            return Err(HashdexError::index(format!(
                "corrupt dictionary entry in {}: pointer {} size {}",
                self.name, entry.data_pointer, entry.data_size
            )));
        }
        let mut bytes = vec![0u8; entry.data_size as usize];
        read_exact_at(self.data.as_mut(), entry.data_pointer as u64, &mut bytes)?;
        Ok(bytes)
    }

    /// Read and decode the postings of `entry`.
    pub fn read_postings(&mut self, entry: &DictionaryEntry) -> Result<PostingsList> {
        let bytes = self.read_data(entry)?;
        codec::decode(&bytes)
    }

    /// Flush both files and, if configured, sync them.
    pub fn sync(&mut self) -> Result<()> {
        self.dictionary.sync()?;
        self.data.sync()
    }

    /// Flush both files and sync them to stable storage.
    pub fn sync_all(&mut self) -> Result<()> {
        self.dictionary.sync_all()?;
        self.data.sync_all()
    }

    /// Close the segment and delete its files.
    pub fn delete(self) -> Result<()> {
        let Segment {
            storage,
            dictionary_name,
            data_name,
            dictionary,
            data,
            ..
        } = self;
        drop(dictionary);
        drop(data);
        storage.delete_file(&dictionary_name)?;
        storage.delete_file(&data_name)
    }

    /// Adopt this segment as the canonical index, renaming its files.
    ///
    /// Both files reach stable storage before they are renamed.
    pub fn into_canonical(mut self) -> Result<Segment> {
        self.sync_all()?;
        let Segment {
            storage,
            dictionary_name,
            data_name,
            dictionary,
            data,
            table_size,
            ..
        } = self;
        drop(dictionary);
        drop(data);

        storage.rename_file(&dictionary_name, CANONICAL_DICTIONARY)?;
        storage.rename_file(&data_name, CANONICAL_DATA)?;
        Segment::open_canonical(storage, table_size)
    }
}
