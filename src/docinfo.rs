//! Per-document metadata sidecar.
//!
//! Documents registered during indexing are appended to the `docInfo` file
//! on every flush, one `docID;path;tokenCount` line each. When the index is
//! finalized the file is read back and rewritten once, sorted by docID, with
//! the last line for a docID taking precedence.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{HashdexError, Result};
use crate::storage::{Storage, read_exact_at};

/// Name of the docInfo file.
pub const DOCINFO_FILE: &str = "docInfo";

/// Name under which the sorted docInfo file is written before it replaces
/// [`DOCINFO_FILE`].
pub const DOCINFO_TEMP_FILE: &str = "docInfo.tmp";

/// Metadata of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub doc_id: u32,
    pub path: String,
    pub token_count: u32,
}

impl DocumentInfo {
    /// Render as a `docID;path;tokenCount` line, without the newline.
    pub fn to_line(&self) -> String {
        format!("{};{};{}", self.doc_id, self.path, self.token_count)
    }

    /// Parse a `docID;path;tokenCount` line. The path may itself contain `;`.
    pub fn parse_line(line: &str) -> Result<Self> {
        let malformed = || HashdexError::codec(format!("malformed docInfo line: {line:?}"));

        let (doc_id, rest) = line.split_once(';').ok_or_else(malformed)?;
        let (path, token_count) = rest.rsplit_once(';').ok_or_else(malformed)?;

        Ok(DocumentInfo {
            doc_id: doc_id.parse().map_err(|_| malformed())?,
            path: path.to_string(),
            token_count: token_count.parse().map_err(|_| malformed())?,
        })
    }
}

/// The docInfo sidecar of an index.
#[derive(Debug)]
pub struct DocInfo {
    storage: Arc<dyn Storage>,
    /// Registered since the last flush.
    pending: Vec<DocumentInfo>,
    /// Loaded from the finalized file.
    documents: BTreeMap<u32, DocumentInfo>,
}

impl DocInfo {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        DocInfo {
            storage,
            pending: Vec::new(),
            documents: BTreeMap::new(),
        }
    }

    /// Load a finalized docInfo file. A missing file yields no documents.
    pub fn load(storage: Arc<dyn Storage>) -> Result<Self> {
        let mut doc_info = DocInfo::new(storage);
        doc_info.documents = doc_info.read_all()?;
        Ok(doc_info)
    }

    /// Delete any docInfo file left by an earlier run.
    pub fn clear(storage: &dyn Storage) -> Result<()> {
        storage.delete_file(DOCINFO_TEMP_FILE)?;
        storage.delete_file(DOCINFO_FILE)
    }

    /// Record a document, to be written at the next flush.
    pub fn register(&mut self, doc_id: u32, path: &str, token_count: u32) -> Result<()> {
        if path.contains('\n') || path.contains('\r') {
            return Err(HashdexError::invalid_argument(format!(
                "document path {path:?} contains a line break"
            )));
        }
        self.pending.push(DocumentInfo {
            doc_id,
            path: path.to_string(),
            token_count,
        });
        Ok(())
    }

    /// Documents registered since the last flush.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append pending documents to the file.
    pub fn flush(&mut self) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let mut text = String::new();
        for info in &self.pending {
            text.push_str(&info.to_line());
            text.push('\n');
        }

        let mut file = if self.storage.file_exists(DOCINFO_FILE) {
            self.storage.open_file(DOCINFO_FILE)?
        } else {
            self.storage.create_file(DOCINFO_FILE)?
        };
        let end = file.len()?;
        file.write_at(end, text.as_bytes())?;
        file.sync()?;

        let written = self.pending.len();
        self.pending.clear();
        log::debug!("Appended {written} documents to {DOCINFO_FILE}");
        Ok(written)
    }

    /// Flush, then rewrite the file sorted by docID with duplicates resolved.
    ///
    /// The sorted copy is synced under a temporary name and renamed over the
    /// appended file, so one of the two is complete at any time.
    pub fn finalize(&mut self) -> Result<()> {
        self.flush()?;
        let documents = self.read_all()?;

        let mut text = String::new();
        for info in documents.values() {
            text.push_str(&info.to_line());
            text.push('\n');
        }
        let mut file = self.storage.create_file(DOCINFO_TEMP_FILE)?;
        file.write_at(0, text.as_bytes())?;
        file.sync_all()?;
        drop(file);
        self.storage.rename_file(DOCINFO_TEMP_FILE, DOCINFO_FILE)?;

        log::info!("Wrote {} documents to {DOCINFO_FILE}", documents.len());
        self.documents = documents;
        Ok(())
    }

    fn read_all(&self) -> Result<BTreeMap<u32, DocumentInfo>> {
        let mut documents = BTreeMap::new();
        if !self.storage.file_exists(DOCINFO_FILE) {
            return Ok(documents);
        }

        let mut file = self.storage.open_file(DOCINFO_FILE)?;
        let mut bytes = vec![0u8; file.len()? as usize];
        read_exact_at(file.as_mut(), 0, &mut bytes)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| HashdexError::codec(format!("{DOCINFO_FILE} is not UTF-8: {e}")))?;

        for line in text.lines().filter(|line| !line.is_empty()) {
            let info = DocumentInfo::parse_line(line)?;
            documents.insert(info.doc_id, info);
        }
        Ok(documents)
    }

    pub fn path(&self, doc_id: u32) -> Option<&str> {
        self.documents.get(&doc_id).map(|info| info.path.as_str())
    }

    pub fn token_count(&self, doc_id: u32) -> Option<u32> {
        self.documents.get(&doc_id).map(|info| info.token_count)
    }

    /// Number of documents in the finalized file.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
