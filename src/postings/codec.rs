//! Binary encoding of postings lists.
//!
//! Layout (all integers LEB128 varints unless noted):
//!
//! ```text
//! entry_count
//! repeated entry_count times:
//!     doc_id - previous doc_id      (first entry: doc_id)
//!     score                         (f64, little endian)
//!     offset_count
//!     offset - previous offset      (first offset: offset)
//! ```
//!
//! Deltas of zero are only legal for the first docID of a list and the first
//! offset of an entry, so a decoded list always has strictly increasing
//! docIDs and offsets.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{HashdexError, Result};
use crate::postings::{PostingsEntry, PostingsList};
use crate::util::varint;

/// Encode a postings list.
pub fn encode(list: &PostingsList) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(1 + list.len() * 12);
    write_len(&mut bytes, list.len())?;

    let mut prev_doc_id = 0u32;
    for entry in list.iter() {
        varint::write_u32(&mut bytes, entry.doc_id - prev_doc_id)?;
        prev_doc_id = entry.doc_id;

        bytes.write_f64::<LittleEndian>(entry.score)?;

        write_len(&mut bytes, entry.offsets.len())?;
        let mut prev_offset = 0u32;
        for &offset in &entry.offsets {
            varint::write_u32(&mut bytes, offset - prev_offset)?;
            prev_offset = offset;
        }
    }

    Ok(bytes)
}

/// Decode a postings list, rejecting malformed input.
pub fn decode(bytes: &[u8]) -> Result<PostingsList> {
    let mut reader = SliceReader { bytes, pos: 0 };

    let count = reader.read_varint()?;
    // Every entry needs at least 10 bytes, so a corrupt count cannot make
    // us allocate more than the input justifies.
    let mut entries = Vec::with_capacity((count as usize).min(bytes.len() / 10));

    let mut prev_doc_id: Option<u32> = None;
    for _ in 0..count {
        let delta = reader.read_varint()?;
        let doc_id = advance(prev_doc_id, delta, "docID")?;
        prev_doc_id = Some(doc_id);

        let score = reader.read_f64()?;

        let offset_count = reader.read_varint()?;
        let mut offsets = Vec::with_capacity((offset_count as usize).min(reader.remaining()));
        let mut prev_offset: Option<u32> = None;
        for _ in 0..offset_count {
            let delta = reader.read_varint()?;
            let offset = advance(prev_offset, delta, "offset")?;
            prev_offset = Some(offset);
            offsets.push(offset);
        }

        entries.push(PostingsEntry {
            doc_id,
            score,
            offsets,
        });
    }

    if reader.remaining() != 0 {
        return Err(HashdexError::codec(format!(
            "{} trailing bytes after postings list",
            reader.remaining()
        )));
    }

    Ok(PostingsList::from_sorted_entries(entries))
}

fn write_len(bytes: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| HashdexError::codec(format!("length {len} does not fit in u32")))?;
    varint::write_u32(bytes, len)?;
    Ok(())
}

fn advance(prev: Option<u32>, delta: u32, what: &str) -> Result<u32> {
    match prev {
        None => Ok(delta),
        Some(_) if delta == 0 => Err(HashdexError::codec(format!(
            "{what} sequence is not strictly increasing"
        ))),
        Some(prev) => prev
            .checked_add(delta)
            .ok_or_else(|| HashdexError::codec(format!("{what} overflows u32"))),
    }
}

struct SliceReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl SliceReader<'_> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_varint(&mut self) -> Result<u32> {
        let (value, used) = varint::decode_u32(&self.bytes[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    fn read_f64(&mut self) -> Result<f64> {
        if self.remaining() < 8 {
            return Err(HashdexError::codec("truncated score"));
        }
        let value = LittleEndian::read_f64(&self.bytes[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PostingsList {
        PostingsList::from_entries(vec![
            PostingsEntry::with_offsets(0, vec![0, 7, 300]),
            PostingsEntry {
                doc_id: 129,
                score: 1.5,
                offsets: vec![2],
            },
            PostingsEntry::with_offsets(u32::MAX, vec![u32::MAX]),
        ])
    }

    #[test]
    fn test_roundtrip() {
        let list = sample();
        let bytes = encode(&list).unwrap();
        assert_eq!(decode(&bytes).unwrap(), list);
    }

    #[test]
    fn test_empty_list_encodes_count_byte() {
        let bytes = encode(&PostingsList::new()).unwrap();
        assert_eq!(bytes, vec![0]);
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_layout() {
        let mut list = PostingsList::new();
        list.add(3, 4);
        list.add(3, 6);

        let bytes = encode(&list).unwrap();
        let mut expected = vec![1, 3];
        expected.extend_from_slice(&0.0f64.to_le_bytes());
        expected.extend_from_slice(&[2, 4, 2]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_rejects_truncation() {
        let bytes = encode(&sample()).unwrap();
        for cut in 0..bytes.len() {
            assert!(decode(&bytes[..cut]).is_err(), "prefix of {cut} bytes decoded");
        }
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.push(0);
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_rejects_non_increasing_doc_ids() {
        // Two entries, second with docID delta 0.
        let mut bytes = vec![2, 5];
        bytes.extend_from_slice(&0.0f64.to_le_bytes());
        bytes.extend_from_slice(&[1, 0]);
        bytes.push(0);
        bytes.extend_from_slice(&0.0f64.to_le_bytes());
        bytes.extend_from_slice(&[1, 0]);

        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("docID"));
    }

    #[test]
    fn test_rejects_offset_overflow() {
        let mut bytes = vec![1, 0];
        bytes.extend_from_slice(&0.0f64.to_le_bytes());
        bytes.push(2);
        bytes.extend_from_slice(&varint::encode_u32(u32::MAX));
        bytes.push(1);

        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }
}
