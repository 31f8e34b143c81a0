//! Citation enrichment stage.
//!
//! Walks the store in order, looks up eligible nodes one at a time, and
//! records the results. Lookups are strictly sequential with the configured
//! pause between them.

use tracing::{debug, info, instrument, warn};

use citegraph_bibliography::DoiIndex;
use citegraph_citations::{CitationFetcher, FetchOutcome};
use citegraph_shared::RefreshPolicy;

use crate::report::{ProgressReporter, SkippedItem};
use crate::store::NodeStore;

/// Counters produced by [`update_citations`].
#[derive(Debug, Clone, Default)]
pub struct CitationStats {
    /// Nodes with no DOI in the bibliography.
    pub without_doi: usize,
    /// Nodes with a DOI that the policy left alone.
    pub not_eligible: usize,
    /// Lookups performed.
    pub fetched: usize,
    /// Nodes whose count changed.
    pub updated: usize,
    /// Lookups answered without a count.
    pub unknown: usize,
    /// Lookups that failed.
    pub failures: Vec<SkippedItem>,
}

impl CitationStats {
    pub fn changed(&self) -> bool {
        self.updated > 0
    }
}

struct Target {
    id: String,
    doi: String,
    prior: Option<u64>,
}

/// Refresh citation counts for every eligible node in `store`.
///
/// A node is eligible when the bibliography maps its id to a DOI and
/// `policy` wants its current count. When a lookup yields no count the node
/// keeps its prior value, and a node that had none is set to 0.
#[instrument(skip_all, fields(policy = ?policy, dois = index.len()))]
pub async fn update_citations(
    store: &mut NodeStore,
    index: &DoiIndex,
    fetcher: &CitationFetcher,
    policy: RefreshPolicy,
    progress: &dyn ProgressReporter,
) -> CitationStats {
    let mut stats = CitationStats::default();
    let mut targets = Vec::new();

    for node in store.iter() {
        let Some(doi) = index.get(&node.id) else {
            debug!(id = %node.id, "no DOI in bibliography");
            stats.without_doi += 1;
            continue;
        };
        if !policy.wants(node.citations) {
            stats.not_eligible += 1;
            continue;
        }
        targets.push(Target {
            id: node.id.clone(),
            doi: doi.to_string(),
            prior: node.citations,
        });
    }

    info!(
        eligible = targets.len(),
        without_doi = stats.without_doi,
        "starting citation lookups"
    );

    let request_delay = fetcher.config().request_delay;
    let total = targets.len();

    for (i, target) in targets.into_iter().enumerate() {
        if i > 0 && !request_delay.is_zero() {
            tokio::time::sleep(request_delay).await;
        }

        let report = fetcher.fetch(&target.doi).await;
        stats.fetched += 1;

        match report.outcome {
            FetchOutcome::Count(count) => {
                if target.prior != Some(count) {
                    info!(id = %target.id, prior = ?target.prior, count, "citation count updated");
                    store.set_citations(&target.id, Some(count));
                    stats.updated += 1;
                } else {
                    debug!(id = %target.id, count, "citation count unchanged");
                }
            }
            FetchOutcome::Unknown => {
                debug!(id = %target.id, doi = %target.doi, "service has no count for DOI");
                stats.unknown += 1;
                store.set_citations(&target.id, Some(target.prior.unwrap_or(0)));
            }
            ref failed => {
                warn!(
                    id = %target.id,
                    doi = %target.doi,
                    attempts = report.attempts,
                    outcome = ?failed,
                    "citation lookup failed, keeping prior value"
                );
                stats
                    .failures
                    .push(SkippedItem::new(target.id.as_str(), describe(failed)));
                store.set_citations(&target.id, Some(target.prior.unwrap_or(0)));
            }
        }

        progress.citation_fetched(&target.id, i + 1, total);
    }

    info!(
        fetched = stats.fetched,
        updated = stats.updated,
        failed = stats.failures.len(),
        "citation lookups complete"
    );
    stats
}

fn describe(outcome: &FetchOutcome) -> String {
    match outcome {
        FetchOutcome::RateLimited => "rate limited".to_string(),
        FetchOutcome::Transient(reason) => format!("transient failure: {reason}"),
        FetchOutcome::Permanent(reason) => format!("permanent failure: {reason}"),
        FetchOutcome::Count(_) | FetchOutcome::Unknown => "no failure".to_string(),
    }
}
