//! End-to-end runs: `sync` (documents → store → citations → artifact) and
//! `refresh` (artifact → citations → artifact).
//!
//! Both runs follow the same commit order: the artifact is written first and
//! the change cache is only persisted after that write succeeded. A failure
//! anywhere before leaves both files as they were.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use citegraph_bibliography::load_bibliography;
use citegraph_citations::CitationFetcher;
use citegraph_markdown::{list_documents, load_document};
use citegraph_shared::{Result, SyncConfig};
use citegraph_storage::{ChangeCache, load_artifact, write_artifact};

use crate::enrichment::update_citations;
use crate::graph::build_artifact;
use crate::report::{ProgressReporter, RunStatus, SkippedItem, SyncReport};
use crate::store::NodeStore;

/// Run an incremental sync.
///
/// 1. Load the change cache and the previous artifact
/// 2. Re-parse documents whose timestamp changed and merge them
/// 3. Look up citation counts for eligible nodes
/// 4. Rebuild links and sort nodes
/// 5. Write the artifact (per the write policy), then persist the cache
#[instrument(skip_all, fields(documents = %config.documents_dir.display(), artifact = %config.artifact_file.display()))]
pub async fn sync(config: &SyncConfig, progress: &dyn ProgressReporter) -> Result<SyncReport> {
    let start = Instant::now();
    let mut report = SyncReport::empty();

    info!("starting sync");

    // --- Phase 1: Previous state ---
    progress.phase("Loading previous state");
    let mut cache = ChangeCache::load(&config.cache_file)?;
    let mut store = load_store(config, &mut report)?;

    // --- Phase 2: Documents ---
    progress.phase("Scanning documents");
    let documents = list_documents(&config.documents_dir)?;
    report.documents_scanned = documents.len();

    for document in &documents {
        if !cache.should_reparse(&document.filename, document.mtime) {
            report.documents_unchanged += 1;
            continue;
        }

        let merged = load_document(&document.path)
            .and_then(|source| store.merge_document(source.metadata));

        match merged {
            Ok(result) => {
                debug!(file = %document.filename, ?result, "document merged");
                cache.commit(document.filename.as_str(), document.mtime);
                report.documents_merged += 1;
                progress.document_parsed(
                    &document.filename,
                    report.documents_merged,
                    documents.len(),
                );
            }
            Err(e) => {
                warn!(file = %document.filename, error = %e, "skipping document");
                report
                    .skipped
                    .push(SkippedItem::new(document.filename.as_str(), e));
            }
        }
    }

    info!(
        scanned = report.documents_scanned,
        merged = report.documents_merged,
        unchanged = report.documents_unchanged,
        "documents processed"
    );

    let documents_changed = store.is_changed();
    finish(config, store, Some(&mut cache), documents_changed, report, start, progress).await
}

/// Refresh citation counts of the existing artifact without scanning
/// documents. The change cache is neither read nor written.
#[instrument(skip_all, fields(artifact = %config.artifact_file.display(), policy = ?config.refresh))]
pub async fn refresh(config: &SyncConfig, progress: &dyn ProgressReporter) -> Result<SyncReport> {
    let start = Instant::now();
    let mut report = SyncReport::empty();

    info!("starting citation refresh");

    progress.phase("Loading artifact");
    let store = load_store(config, &mut report)?;

    finish(config, store, None, false, report, start, progress).await
}

// ---------------------------------------------------------------------------
// Shared stages
// ---------------------------------------------------------------------------

fn load_store(config: &SyncConfig, report: &mut SyncReport) -> Result<NodeStore> {
    let loaded = load_artifact(&config.artifact_file)?;
    report.skipped.extend(
        loaded
            .dropped
            .into_iter()
            .map(|reason| SkippedItem::new(config.artifact_file.display().to_string(), reason)),
    );

    let store = NodeStore::from_nodes(loaded.nodes);
    debug!(nodes = store.len(), "store seeded from artifact");
    Ok(store)
}

/// Citation stage, link reconstruction, and the write transaction.
async fn finish(
    config: &SyncConfig,
    mut store: NodeStore,
    cache: Option<&mut ChangeCache>,
    documents_changed: bool,
    mut report: SyncReport,
    start: Instant,
    progress: &dyn ProgressReporter,
) -> Result<SyncReport> {
    // --- Citations ---
    progress.phase("Loading bibliography");
    let index = load_bibliography(&config.bibliography_file)?;

    progress.phase("Fetching citation counts");
    let fetcher = CitationFetcher::new(config.citations.clone())?;
    let stats = update_citations(&mut store, &index, &fetcher, config.refresh, progress).await;

    report.citations_fetched = stats.fetched;
    report.citations_updated = stats.updated;
    report.citations_unknown = stats.unknown;
    let citations_changed = stats.changed();
    report.citation_failures = stats.failures;

    // --- Links ---
    progress.phase("Rebuilding links");
    let (artifact, dangling) = build_artifact(store.into_nodes());
    report.node_count = artifact.nodes.len();
    report.link_count = artifact.links.len();
    report.dangling = dangling;

    // --- Write ---
    if config.write.should_write(documents_changed, citations_changed) {
        progress.phase("Writing artifact");
        let meta = write_artifact(&config.artifact_file, &artifact)?;
        if let Some(cache) = cache {
            cache.flush()?;
        }
        report.status = RunStatus::Written(meta);
    } else {
        info!("nothing changed, artifact left untouched");
    }

    report.elapsed = start.elapsed();
    progress.done(&report);

    info!(
        nodes = report.node_count,
        links = report.link_count,
        dangling = report.dangling.len(),
        citations_updated = report.citations_updated,
        written = report.written().is_some(),
        elapsed_ms = report.elapsed.as_millis(),
        "run complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use citegraph_shared::{CitationConfig, RefreshPolicy, WritePolicy};
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::report::SilentProgress;

    struct Fixture {
        _dir: TempDir,
        config: SyncConfig,
    }

    impl Fixture {
        fn new(api_base_url: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path();
            std::fs::create_dir(root.join("milestones")).unwrap();

            let config = SyncConfig {
                documents_dir: root.join("milestones"),
                artifact_file: root.join("static").join("data").join("timeline_data.json"),
                bibliography_file: root.join("static").join("data").join("publications.bib"),
                cache_file: root.join("scripts").join("process_cache.json"),
                refresh: RefreshPolicy::Missing,
                write: WritePolicy::OnChange,
                citations: CitationConfig {
                    api_base_url: api_base_url.to_string(),
                    count_field: "citationCount".into(),
                    request_timeout: Duration::from_secs(5),
                    max_attempts: 3,
                    retry_delay: Duration::ZERO,
                    rate_limit_delay: Duration::ZERO,
                    request_delay: Duration::ZERO,
                },
            };

            Self { _dir: dir, config }
        }

        /// A fixture whose bibliography is empty, so no lookups happen.
        fn offline() -> Self {
            Self::new("http://127.0.0.1:9")
        }

        fn write_doc(&self, name: &str, content: &str) -> PathBuf {
            let path = self.config.documents_dir.join(name);
            std::fs::write(&path, content).unwrap();
            path
        }

        fn write_bib(&self, content: &str) {
            write_file(&self.config.bibliography_file, content);
        }

        fn write_artifact_json(&self, value: Value) {
            write_file(&self.config.artifact_file, &value.to_string());
        }

        fn artifact(&self) -> Value {
            let text = std::fs::read_to_string(&self.config.artifact_file).unwrap();
            serde_json::from_str(&text).unwrap()
        }

        fn node_ids(&self) -> Vec<String> {
            self.artifact()["nodes"]
                .as_array()
                .unwrap()
                .iter()
                .map(|n| n["id"].as_str().unwrap().to_string())
                .collect()
        }

        fn node(&self, id: &str) -> Value {
            self.artifact()["nodes"]
                .as_array()
                .unwrap()
                .iter()
                .find(|n| n["id"] == id)
                .cloned()
                .unwrap()
        }
    }

    fn write_file(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn first_sync_builds_sorted_artifact_with_links() {
        let fx = Fixture::offline();
        fx.write_doc("lstm.md", "---\nid: lstm\nyear: 1997\nparents: rnn\n---\nbody\n");
        fx.write_doc("rnn.md", "---\nid: rnn\nyear: 1986\n---\n");
        fx.write_doc("notes.txt", "ignored");

        let report = sync(&fx.config, &SilentProgress).await.unwrap();

        assert!(report.written().is_some());
        assert_eq!(report.documents_scanned, 2);
        assert_eq!(report.documents_merged, 2);
        assert_eq!(report.node_count, 2);
        assert_eq!(report.link_count, 1);
        assert_eq!(fx.node_ids(), vec!["rnn", "lstm"]);
        assert_eq!(
            fx.artifact()["links"],
            json!([{"source": "rnn", "target": "lstm"}])
        );
        assert!(fx.config.cache_file.exists());
    }

    #[tokio::test]
    async fn second_sync_without_changes_is_a_no_op() {
        let fx = Fixture::offline();
        fx.write_doc("a.md", "---\nid: a\nyear: 2001\n---\n");
        fx.write_doc("b.md", "---\nid: b\nyear: 2002\nparents: [a]\n---\n");

        sync(&fx.config, &SilentProgress).await.unwrap();
        let artifact_before = std::fs::read(&fx.config.artifact_file).unwrap();
        let cache_before = std::fs::read(&fx.config.cache_file).unwrap();

        let report = sync(&fx.config, &SilentProgress).await.unwrap();

        assert_eq!(report.status, RunStatus::NoChange);
        assert_eq!(report.documents_unchanged, 2);
        assert_eq!(report.documents_merged, 0);
        assert_eq!(std::fs::read(&fx.config.artifact_file).unwrap(), artifact_before);
        assert_eq!(std::fs::read(&fx.config.cache_file).unwrap(), cache_before);
    }

    #[tokio::test]
    async fn always_write_rewrites_identical_bytes() {
        let mut fx = Fixture::offline();
        fx.write_doc("a.md", "---\nid: a\ntitle: Réseau\n---\n");
        let first = sync(&fx.config, &SilentProgress).await.unwrap();

        fx.config.write = WritePolicy::Always;
        let second = sync(&fx.config, &SilentProgress).await.unwrap();

        assert_eq!(
            first.written().unwrap().sha256,
            second.written().unwrap().sha256
        );
        let text = std::fs::read_to_string(&fx.config.artifact_file).unwrap();
        assert!(text.contains("Réseau"));
        assert!(text.contains("\n    \"nodes\""));
    }

    #[tokio::test]
    async fn changed_document_keeps_stored_citations() {
        let fx = Fixture::offline();
        fx.write_artifact_json(json!({
            "nodes": [{"id": "lstm", "year": 1997, "citations": 42, "parents": []}],
            "links": []
        }));
        fx.write_doc(
            "lstm.md",
            "---\nid: lstm\nyear: 1997\ntitle: Long Short-Term Memory\n---\n",
        );

        let report = sync(&fx.config, &SilentProgress).await.unwrap();

        assert_eq!(report.documents_merged, 1);
        let node = fx.node("lstm");
        assert_eq!(node["citations"], json!(42));
        assert_eq!(node["title"], json!("Long Short-Term Memory"));
    }

    #[tokio::test]
    async fn stale_cache_entry_triggers_reparse() {
        let fx = Fixture::offline();
        fx.write_doc("a.md", "---\nid: a\n---\n");
        sync(&fx.config, &SilentProgress).await.unwrap();

        write_file(&fx.config.cache_file, r#"{"a.md": 1.0}"#);
        fx.write_doc("a.md", "---\nid: a\nyear: 1999\n---\n");

        let report = sync(&fx.config, &SilentProgress).await.unwrap();
        assert_eq!(report.documents_merged, 1);
        assert_eq!(fx.node("a")["year"], json!(1999));
    }

    #[tokio::test]
    async fn parents_shapes_produce_identical_links() {
        let string_fx = Fixture::offline();
        string_fx.write_doc("a.md", "---\nid: a\n---\n");
        string_fx.write_doc("b.md", "---\nid: b\nparents: a\n---\n");

        let list_fx = Fixture::offline();
        list_fx.write_doc("a.md", "---\nid: a\n---\n");
        list_fx.write_doc("b.md", "---\nid: b\nparents:\n  - a\n---\n");

        sync(&string_fx.config, &SilentProgress).await.unwrap();
        sync(&list_fx.config, &SilentProgress).await.unwrap();

        assert_eq!(string_fx.artifact()["links"], list_fx.artifact()["links"]);
        assert_eq!(string_fx.node("b")["parents"], json!(["a"]));
    }

    #[tokio::test]
    async fn dangling_parent_is_reported_and_omitted() {
        let fx = Fixture::offline();
        fx.write_doc("b.md", "---\nid: b\nparents: [a, ghost]\n---\n");
        fx.write_doc("a.md", "---\nid: a\n---\n");

        let report = sync(&fx.config, &SilentProgress).await.unwrap();

        assert_eq!(report.dangling.len(), 1);
        assert_eq!(report.dangling[0].parent, "ghost");
        assert_eq!(
            fx.artifact()["links"],
            json!([{"source": "a", "target": "b"}])
        );
    }

    #[tokio::test]
    async fn equal_years_keep_merge_order() {
        let fx = Fixture::offline();
        fx.write_doc("1-first.md", "---\nid: first\nyear: 2020\n---\n");
        fx.write_doc("2-middle.md", "---\nid: middle\nyear: 2019\n---\n");
        fx.write_doc("3-second.md", "---\nid: second\nyear: 2020\n---\n");

        sync(&fx.config, &SilentProgress).await.unwrap();
        assert_eq!(fx.node_ids(), vec!["middle", "first", "second"]);
    }

    #[tokio::test]
    async fn document_without_id_is_skipped_and_not_cached() {
        let fx = Fixture::offline();
        fx.write_doc("good.md", "---\nid: good\n---\n");
        fx.write_doc("bad.md", "---\ntitle: no id\n---\n");
        fx.write_doc("broken.md", "---\nid: [unclosed\n---\n");

        let report = sync(&fx.config, &SilentProgress).await.unwrap();

        assert_eq!(report.documents_merged, 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(fx.node_ids(), vec!["good"]);

        let cache = ChangeCache::load(&fx.config.cache_file).unwrap();
        assert!(cache.get("good.md").is_some());
        assert!(cache.get("bad.md").is_none());
        assert!(cache.get("broken.md").is_none());
    }

    #[tokio::test]
    async fn failed_lookup_retries_and_keeps_prior_counts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(6)
            .mount(&server)
            .await;

        let mut fx = Fixture::new(&server.uri());
        fx.config.refresh = RefreshPolicy::All;
        fx.write_artifact_json(json!({
            "nodes": [{"id": "known", "citations": 7, "parents": []}],
            "links": []
        }));
        fx.write_doc("fresh.md", "---\nid: fresh\n---\n");
        fx.write_bib(
            "@article{known, doi = {10.1/known}}\n@article{fresh, doi = {10.1/fresh}}\n",
        );

        let report = sync(&fx.config, &SilentProgress).await.unwrap();

        assert_eq!(report.citations_fetched, 2);
        assert_eq!(report.citation_failures.len(), 2);
        assert_eq!(report.citations_updated, 0);
        assert_eq!(fx.node("known")["citations"], json!(7));
        assert_eq!(fx.node("fresh")["citations"], json!(0));
    }

    #[tokio::test]
    async fn force_refresh_fetches_counted_nodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/DOI:10.1/lstm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"citationCount": 80000})))
            .expect(1)
            .mount(&server)
            .await;

        let mut fx = Fixture::new(&server.uri());
        fx.write_artifact_json(json!({
            "nodes": [{"id": "lstm", "year": 1997, "citations": 5, "parents": []}],
            "links": []
        }));
        fx.write_bib("@inproceedings{lstm,\n  doi = {10.1/lstm}\n}\n");

        let skipped = sync(&fx.config, &SilentProgress).await.unwrap();
        assert_eq!(skipped.citations_fetched, 0);
        assert_eq!(skipped.status, RunStatus::NoChange);

        fx.config.refresh = RefreshPolicy::All;
        let forced = sync(&fx.config, &SilentProgress).await.unwrap();
        assert_eq!(forced.citations_fetched, 1);
        assert_eq!(forced.citations_updated, 1);
        assert!(forced.written().is_some());
        assert_eq!(fx.node("lstm")["citations"], json!(80000));
    }

    #[tokio::test]
    async fn nodes_without_doi_make_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fx = Fixture::new(&server.uri());
        fx.write_doc("a.md", "---\nid: a\n---\n");
        fx.write_bib("@article{other, doi = {10.1/other}}\n");

        let report = sync(&fx.config, &SilentProgress).await.unwrap();
        assert_eq!(report.citations_fetched, 0);
    }

    #[tokio::test]
    async fn missing_documents_dir_is_fatal() {
        let fx = Fixture::offline();
        std::fs::remove_dir(&fx.config.documents_dir).unwrap();

        assert!(sync(&fx.config, &SilentProgress).await.is_err());
        assert!(!fx.config.artifact_file.exists());
        assert!(!fx.config.cache_file.exists());
    }

    #[tokio::test]
    async fn failed_artifact_write_leaves_cache_untouched() {
        let fx = Fixture::offline();
        fx.write_doc("a.md", "---\nid: a\n---\n");
        let temp = fx
            .config
            .artifact_file
            .with_file_name("timeline_data.json.tmp");
        std::fs::create_dir_all(&temp).unwrap();
        std::fs::write(temp.join("blocker"), "x").unwrap();

        assert!(sync(&fx.config, &SilentProgress).await.is_err());
        assert!(!fx.config.artifact_file.exists());
        assert!(!fx.config.cache_file.exists());

        std::fs::remove_dir_all(&temp).unwrap();
        let report = sync(&fx.config, &SilentProgress).await.unwrap();
        assert_eq!(report.documents_merged, 1);
        assert!(report.written().is_some());
    }

    #[tokio::test]
    async fn refresh_updates_artifact_without_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/DOI:10.1/b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"citationCount": 3})))
            .expect(1)
            .mount(&server)
            .await;

        let mut fx = Fixture::new(&server.uri());
        std::fs::remove_dir(&fx.config.documents_dir).unwrap();
        fx.config.refresh = RefreshPolicy::All;
        fx.config.write = WritePolicy::Always;
        fx.write_artifact_json(json!({
            "nodes": [
                {"id": "b", "year": 2010, "citations": 1, "parents": ["a"]},
                {"id": "a", "year": 2000, "parents": []}
            ],
            "links": []
        }));
        fx.write_bib("@article{b, doi = {10.1/b}}\n");

        let report = refresh(&fx.config, &SilentProgress).await.unwrap();

        assert!(report.written().is_some());
        assert_eq!(report.citations_updated, 1);
        assert_eq!(fx.node_ids(), vec!["a", "b"]);
        assert_eq!(fx.node("b")["citations"], json!(3));
        assert_eq!(
            fx.artifact()["links"],
            json!([{"source": "a", "target": "b"}])
        );
        assert!(!fx.config.cache_file.exists());
    }
}
