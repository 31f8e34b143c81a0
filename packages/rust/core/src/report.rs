//! Run reports and progress reporting.

use std::time::Duration;

use citegraph_storage::ArtifactMeta;

use crate::graph::DanglingRef;

/// An input item the run could not use, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub item: String,
    pub reason: String,
}

impl SkippedItem {
    pub fn new(item: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            item: item.into(),
            reason: reason.to_string(),
        }
    }
}

/// Whether the run rewrote the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Written(ArtifactMeta),
    NoChange,
}

/// Summary of a `sync` or `refresh` run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub status: RunStatus,
    /// Documents found in the documents directory.
    pub documents_scanned: usize,
    /// Documents parsed and merged into the store.
    pub documents_merged: usize,
    /// Documents skipped because their timestamp matched the cache.
    pub documents_unchanged: usize,
    /// Nodes that had a lookup attempted.
    pub citations_fetched: usize,
    /// Nodes whose count changed.
    pub citations_updated: usize,
    /// Lookups that answered without a count.
    pub citations_unknown: usize,
    /// Lookups that failed after the retry policy ran.
    pub citation_failures: Vec<SkippedItem>,
    /// Documents or stored nodes that were left out.
    pub skipped: Vec<SkippedItem>,
    pub dangling: Vec<DanglingRef>,
    pub node_count: usize,
    pub link_count: usize,
    pub elapsed: Duration,
}

impl SyncReport {
    pub(crate) fn empty() -> Self {
        Self {
            status: RunStatus::NoChange,
            documents_scanned: 0,
            documents_merged: 0,
            documents_unchanged: 0,
            citations_fetched: 0,
            citations_updated: 0,
            citations_unknown: 0,
            citation_failures: Vec::new(),
            skipped: Vec::new(),
            dangling: Vec::new(),
            node_count: 0,
            link_count: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn written(&self) -> Option<&ArtifactMeta> {
        match &self.status {
            RunStatus::Written(meta) => Some(meta),
            RunStatus::NoChange => None,
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after a changed document has been parsed and merged.
    fn document_parsed(&self, filename: &str, current: usize, total: usize);
    /// Called after a citation lookup finishes, successful or not.
    fn citation_fetched(&self, id: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &SyncReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_parsed(&self, _filename: &str, _current: usize, _total: usize) {}
    fn citation_fetched(&self, _id: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &SyncReport) {}
}
