//! Bibliography index: BibTeX entry key → DOI.
//!
//! Milestone ids double as BibTeX citation keys. The index built here tells
//! the citation stage which nodes can be looked up, and under which DOI.

mod parser;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use citegraph_shared::{CitegraphError, Result};

pub use parser::{BibEntry, parse_entries};

/// Mapping from entry key to normalized DOI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoiIndex {
    dois: BTreeMap<String, String>,
}

impl DoiIndex {
    /// DOI for an entry key, if the entry exists and has one.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.dois.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.dois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dois.is_empty()
    }
}

impl FromIterator<(String, String)> for DoiIndex {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            dois: iter.into_iter().collect(),
        }
    }
}

/// Strip surrounding whitespace and every backslash from a raw DOI value.
pub fn normalize_doi(raw: &str) -> String {
    raw.trim().replace('\\', "")
}

/// Build the DOI index from BibTeX source text.
///
/// Entries without a `doi`/`DOI` field, or whose DOI normalizes to an empty
/// string, are left out. A repeated key keeps the last entry's DOI.
pub fn parse_bibliography(content: &str) -> DoiIndex {
    parse_entries(content)
        .into_iter()
        .filter_map(|entry| {
            let Some(raw) = entry.field("doi") else {
                debug!(key = %entry.key, entry_type = %entry.entry_type, "entry has no DOI");
                return None;
            };
            let doi = normalize_doi(raw);
            (!doi.is_empty()).then(|| (entry.key, doi))
        })
        .collect()
}

/// Load the DOI index from a BibTeX file. A missing file yields an empty index.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_bibliography(path: &Path) -> Result<DoiIndex> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("bibliography file not found, no citations will be looked up");
            return Ok(DoiIndex::default());
        }
        Err(e) => return Err(CitegraphError::io(path, e)),
    };

    let index = parse_bibliography(&content);
    info!(entries_with_doi = index.len(), "bibliography loaded");
    Ok(index)
}
