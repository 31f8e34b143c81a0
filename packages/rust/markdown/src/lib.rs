//! Milestone document loading.
//!
//! Each milestone is a Markdown file whose YAML front matter carries the node
//! metadata (`id`, `year`, `parents`, plus arbitrary descriptive fields). This
//! crate lists the documents with their modification timestamps and extracts
//! the metadata; it knows nothing about merging or graphs.

mod frontmatter;

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use citegraph_shared::{CitegraphError, Result};

/// Extension of milestone documents.
const DOCUMENT_EXTENSION: &str = "md";

/// A document file discovered in the documents directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFile {
    /// File name relative to the documents directory (the cache key).
    pub filename: String,
    /// Full path on disk.
    pub path: PathBuf,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: f64,
}

/// A parsed document. The Markdown body is not needed for the graph.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Front-matter fields (empty when the document has none).
    pub metadata: Map<String, Value>,
}

/// List `*.md` files in `dir`, sorted by file name.
///
/// Failure to read the directory itself is an error; unreadable entries are
/// skipped with a debug log.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn list_documents(dir: &Path) -> Result<Vec<DocumentFile>> {
    let entries = std::fs::read_dir(dir).map_err(|e| CitegraphError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "unreadable directory entry, skipping");
                continue;
            }
        };
        let path = entry.path();

        if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
            continue;
        }

        let meta = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot stat document, skipping");
                continue;
            }
        };

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
            debug!(path = %path.display(), "non UTF-8 file name, skipping");
            continue;
        };

        files.push(DocumentFile {
            filename,
            path,
            mtime,
        });
    }

    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    debug!(count = files.len(), "listed documents");
    Ok(files)
}

/// Read a document and extract its front matter.
pub fn load_document(path: &Path) -> Result<SourceDocument> {
    let content = std::fs::read_to_string(path).map_err(|e| CitegraphError::io(path, e))?;
    parse_document(&content)
}

/// Parse document text. A document without front matter has empty metadata.
pub fn parse_document(content: &str) -> Result<SourceDocument> {
    let metadata = frontmatter::extract_frontmatter(content)?.unwrap_or_default();
    Ok(SourceDocument { metadata })
}
