//! Postings lists.
//!
//! A postings list records, for one token, every document the token occurs
//! in and the token offsets inside each document. Entries are kept sorted by
//! docID and offsets inside an entry are kept sorted and unique, so two lists
//! can be merged with a single two-pointer walk.

pub mod codec;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// The occurrences of a token in one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingsEntry {
    /// Document ID.
    pub doc_id: u32,
    /// Relevance score. Not computed at build time; stored for rankers.
    pub score: f64,
    /// Token offsets in the document, strictly increasing.
    pub offsets: Vec<u32>,
}

impl PostingsEntry {
    /// Create an entry with a single offset.
    pub fn new(doc_id: u32, offset: u32) -> Self {
        PostingsEntry {
            doc_id,
            score: 0.0,
            offsets: vec![offset],
        }
    }

    /// Create an entry from offsets in any order, sorting and deduplicating them.
    pub fn with_offsets(doc_id: u32, mut offsets: Vec<u32>) -> Self {
        offsets.sort_unstable();
        offsets.dedup();
        PostingsEntry {
            doc_id,
            score: 0.0,
            offsets,
        }
    }

    /// Number of occurrences in the document.
    pub fn frequency(&self) -> usize {
        self.offsets.len()
    }

    /// Add an offset, keeping the offsets sorted and unique.
    pub fn add_offset(&mut self, offset: u32) {
        match self.offsets.last() {
            Some(&last) if offset > last => self.offsets.push(offset),
            Some(&last) if offset == last => {}
            None => self.offsets.push(offset),
            Some(_) => {
                if let Err(pos) = self.offsets.binary_search(&offset) {
                    self.offsets.insert(pos, offset);
                }
            }
        }
    }

    fn absorb(&mut self, other: &PostingsEntry) {
        self.offsets.extend_from_slice(&other.offsets);
        self.offsets.sort_unstable();
        self.offsets.dedup();
    }
}

/// The postings of one token, sorted by docID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingsList {
    entries: Vec<PostingsEntry>,
}

impl PostingsList {
    /// Create a new empty postings list.
    pub fn new() -> Self {
        PostingsList::default()
    }

    /// Build a list from entries in any order.
    ///
    /// Entries sharing a docID are combined and every entry's offsets are
    /// sorted and deduplicated.
    pub fn from_entries(entries: Vec<PostingsEntry>) -> Self {
        let mut list = PostingsList::new();
        for entry in entries {
            let score = entry.score;
            let entry = PostingsEntry {
                score,
                ..PostingsEntry::with_offsets(entry.doc_id, entry.offsets)
            };
            match list
                .entries
                .binary_search_by_key(&entry.doc_id, |e| e.doc_id)
            {
                Ok(pos) => list.entries[pos].absorb(&entry),
                Err(pos) => list.entries.insert(pos, entry),
            }
        }
        list
    }

    /// Wrap entries that are already sorted and duplicate-free.
    pub(crate) fn from_sorted_entries(entries: Vec<PostingsEntry>) -> Self {
        PostingsList { entries }
    }

    /// Record an occurrence of the token at `offset` in document `doc_id`.
    ///
    /// Occurrences normally arrive in document order with non-decreasing
    /// offsets, which makes this an append. Out-of-order calls are inserted
    /// in place.
    pub fn add(&mut self, doc_id: u32, offset: u32) {
        match self.entries.last_mut() {
            Some(last) if last.doc_id == doc_id => last.add_offset(offset),
            Some(last) if last.doc_id > doc_id => {
                match self.entries.binary_search_by_key(&doc_id, |e| e.doc_id) {
                    Ok(pos) => self.entries[pos].add_offset(offset),
                    Err(pos) => self.entries.insert(pos, PostingsEntry::new(doc_id, offset)),
                }
            }
            _ => self.entries.push(PostingsEntry::new(doc_id, offset)),
        }
    }

    /// Merge two lists into a new one.
    ///
    /// Entries for the same document are combined by taking the sorted union
    /// of their offsets; the score of `self`'s entry is kept. The operation is
    /// commutative and associative on docIDs and offsets.
    pub fn merge(&self, other: &PostingsList) -> PostingsList {
        let mut merged = Vec::with_capacity(self.entries.len() + other.entries.len());
        let mut left = self.entries.iter().peekable();
        let mut right = other.entries.iter().peekable();

        loop {
            let next = match (left.peek(), right.peek()) {
                (Some(a), Some(b)) => match a.doc_id.cmp(&b.doc_id) {
                    Ordering::Less => left.next().cloned(),
                    Ordering::Greater => right.next().cloned(),
                    Ordering::Equal => {
                        let mut entry = (*a).clone();
                        entry.absorb(b);
                        left.next();
                        right.next();
                        Some(entry)
                    }
                },
                (Some(_), None) => left.next().cloned(),
                (None, Some(_)) => right.next().cloned(),
                (None, None) => None,
            };
            match next {
                Some(entry) => merged.push(entry),
                None => break,
            }
        }

        PostingsList { entries: merged }
    }

    /// Number of documents in the list.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an iterator over the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, PostingsEntry> {
        self.entries.iter()
    }

    /// The entries, sorted by docID.
    pub fn entries(&self) -> &[PostingsEntry] {
        &self.entries
    }

    /// The entry for `doc_id`, if the token occurs in that document.
    pub fn get(&self, doc_id: u32) -> Option<&PostingsEntry> {
        self.entries
            .binary_search_by_key(&doc_id, |e| e.doc_id)
            .ok()
            .map(|pos| &self.entries[pos])
    }

    /// The docIDs in the list, in increasing order.
    pub fn doc_ids(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.doc_id).collect()
    }

    /// Total number of occurrences across all documents.
    pub fn total_frequency(&self) -> usize {
        self.entries.iter().map(PostingsEntry::frequency).sum()
    }
}

impl<'a> IntoIterator for &'a PostingsList {
    type Item = &'a PostingsEntry;
    type IntoIter = std::slice::Iter<'a, PostingsEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[(u32, &[u32])]) -> PostingsList {
        PostingsList::from_entries(
            entries
                .iter()
                .map(|(doc, offsets)| PostingsEntry::with_offsets(*doc, offsets.to_vec()))
                .collect(),
        )
    }

    fn shape(list: &PostingsList) -> Vec<(u32, Vec<u32>)> {
        list.iter().map(|e| (e.doc_id, e.offsets.clone())).collect()
    }

    #[test]
    fn test_add_appends_in_order() {
        let mut postings = PostingsList::new();
        postings.add(0, 0);
        postings.add(0, 4);
        postings.add(0, 4);
        postings.add(2, 1);

        assert_eq!(shape(&postings), vec![(0, vec![0, 4]), (2, vec![1])]);
        assert_eq!(postings.total_frequency(), 3);
    }

    #[test]
    fn test_add_out_of_order_keeps_invariants() {
        let mut postings = PostingsList::new();
        postings.add(5, 9);
        postings.add(5, 3);
        postings.add(1, 7);
        postings.add(5, 3);
        postings.add(1, 2);

        assert_eq!(shape(&postings), vec![(1, vec![2, 7]), (5, vec![3, 9])]);
    }

    #[test]
    fn test_merge_combines_shared_documents() {
        let x = list(&[(5, &[10, 20])]);
        let y = list(&[(5, &[30]), (7, &[1])]);

        let merged = x.merge(&y);
        assert_eq!(shape(&merged), vec![(5, vec![10, 20, 30]), (7, vec![1])]);
    }

    #[test]
    fn test_merge_sorts_interleaved_offsets() {
        let x = list(&[(1, &[5, 9]), (3, &[0])]);
        let y = list(&[(1, &[2, 5, 11]), (2, &[4])]);

        let merged = x.merge(&y);
        assert_eq!(
            shape(&merged),
            vec![(1, vec![2, 5, 9, 11]), (2, vec![4]), (3, vec![0])]
        );
    }

    #[test]
    fn test_merge_is_commutative_and_associative() {
        let a = list(&[(0, &[1, 3]), (4, &[2])]);
        let b = list(&[(0, &[2]), (6, &[0, 8])]);
        let c = list(&[(4, &[1]), (6, &[5]), (9, &[9])]);

        assert_eq!(shape(&a.merge(&b)), shape(&b.merge(&a)));
        assert_eq!(shape(&a.merge(&b).merge(&c)), shape(&b.merge(&c).merge(&a)));
    }

    #[test]
    fn test_merge_with_empty() {
        let a = list(&[(3, &[1])]);
        assert_eq!(a.merge(&PostingsList::new()), a);
        assert_eq!(PostingsList::new().merge(&a), a);
    }

    #[test]
    fn test_lookup_helpers() {
        let postings = list(&[(2, &[1]), (8, &[4, 6])]);

        assert_eq!(postings.len(), 2);
        assert_eq!(postings.doc_ids(), vec![2, 8]);
        assert_eq!(postings.get(8).map(PostingsEntry::frequency), Some(2));
        assert!(postings.get(3).is_none());
        assert_eq!((&postings).into_iter().count(), 2);
    }
}
