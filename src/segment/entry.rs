//! Fixed-size dictionary records.

use byteorder::{ByteOrder, LittleEndian};

/// Size of one dictionary slot on disk, in bytes.
pub const ENTRY_SIZE: usize = 20;

/// `data_size` of a slot that was consumed by a merge.
pub const TOMBSTONE: i32 = -1;

/// One slot of a dictionary table.
///
/// On disk: `data_pointer` (i64), `checksum` (i64), `data_size` (i32), little
/// endian. A zero `data_size` marks a free slot; [`TOMBSTONE`] marks a slot
/// whose entry was moved out during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DictionaryEntry {
    /// Byte offset of the postings blob in the data file.
    pub data_pointer: i64,
    /// Checksum of the token.
    pub checksum: i64,
    /// Length of the postings blob.
    pub data_size: i32,
}

impl DictionaryEntry {
    pub fn new(data_pointer: i64, checksum: i64, data_size: i32) -> Self {
        DictionaryEntry {
            data_pointer,
            checksum,
            data_size,
        }
    }

    /// A slot that never held an entry.
    pub fn is_empty(&self) -> bool {
        self.data_size == 0
    }

    pub fn is_tombstone(&self) -> bool {
        self.data_size == TOMBSTONE
    }

    /// Whether the slot holds a live entry.
    pub fn is_occupied(&self) -> bool {
        self.data_size > 0
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        LittleEndian::write_i64(&mut buf[0..8], self.data_pointer);
        LittleEndian::write_i64(&mut buf[8..16], self.checksum);
        LittleEndian::write_i32(&mut buf[16..20], self.data_size);
        buf
    }

    pub fn from_bytes(buf: &[u8; ENTRY_SIZE]) -> Self {
        DictionaryEntry {
            data_pointer: LittleEndian::read_i64(&buf[0..8]),
            checksum: LittleEndian::read_i64(&buf[8..16]),
            data_size: LittleEndian::read_i32(&buf[16..20]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let entry = DictionaryEntry::new(0x0102, -5, 7);
        let bytes = entry.to_bytes();

        assert_eq!(&bytes[0..2], &[0x02, 0x01]);
        assert_eq!(&bytes[8..16], &(-5i64).to_le_bytes());
        assert_eq!(&bytes[16..20], &[7, 0, 0, 0]);
        assert_eq!(DictionaryEntry::from_bytes(&bytes), entry);
    }

    #[test]
    fn test_slot_states() {
        let zeroed = DictionaryEntry::from_bytes(&[0u8; ENTRY_SIZE]);
        assert!(zeroed.is_empty());
        assert!(!zeroed.is_occupied());

        let dead = DictionaryEntry::new(10, 3, TOMBSTONE);
        assert!(dead.is_tombstone());
        assert!(!dead.is_empty());
        assert!(!dead.is_occupied());

        assert!(DictionaryEntry::new(0, 0, 1).is_occupied());
    }
}
