//! Application configuration for citegraph.
//!
//! The project config lives at `./citegraph.toml` (or wherever `--config`
//! points). CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CitegraphError, Result};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "citegraph.toml";

// ---------------------------------------------------------------------------
// Config structs (matching citegraph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Input and output locations.
    #[serde(default)]
    pub paths: PathsSection,

    /// Citation service settings.
    #[serde(default)]
    pub citations: CitationsSection,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsSection {
    /// Directory holding the milestone `.md` documents.
    #[serde(default = "default_documents_dir")]
    pub documents_dir: String,

    /// The graph artifact (`{ "nodes": [...], "links": [...] }`).
    #[serde(default = "default_artifact_file")]
    pub artifact_file: String,

    /// BibTeX file mapping entry keys to DOIs.
    #[serde(default = "default_bibliography_file")]
    pub bibliography_file: String,

    /// Change-detection cache (filename → mtime).
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            artifact_file: default_artifact_file(),
            bibliography_file: default_bibliography_file(),
            cache_file: default_cache_file(),
        }
    }
}

fn default_documents_dir() -> String {
    "milestones".into()
}
fn default_artifact_file() -> String {
    "static/data/timeline_data.json".into()
}
fn default_bibliography_file() -> String {
    "static/data/publications.bib".into()
}
fn default_cache_file() -> String {
    "scripts/process_cache.json".into()
}

/// `[citations]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationsSection {
    /// Base URL of the paper lookup endpoint; `/DOI:<doi>` is appended.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Response field holding the citation count.
    #[serde(default = "default_count_field")]
    pub count_field: String,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts per DOI before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait after a 5xx, timeout, or connection error.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Wait after a 429 response.
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Pause between consecutive lookups across nodes.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

impl Default for CitationsSection {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            count_field: default_count_field(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.semanticscholar.org/graph/v1/paper".into()
}
fn default_count_field() -> String {
    "citationCount".into()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    5_000
}
fn default_rate_limit_delay_ms() -> u64 {
    120_000
}
fn default_request_delay_ms() -> u64 {
    5_000
}

impl AppConfig {
    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.citations.max_attempts == 0 {
            return Err(CitegraphError::config(
                "citations.max_attempts must be at least 1",
            ));
        }
        if self.citations.count_field.trim().is_empty() {
            return Err(CitegraphError::config(
                "citations.count_field must not be empty",
            ));
        }
        Url::parse(&self.citations.api_base_url).map_err(|e| {
            CitegraphError::config(format!(
                "invalid citations.api_base_url '{}': {e}",
                self.citations.api_base_url
            ))
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runtime config (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

/// Which nodes are eligible for a citation lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Only nodes whose citation count is absent or zero.
    #[default]
    Missing,
    /// Every node with a DOI, regardless of its current count.
    All,
}

impl RefreshPolicy {
    /// Whether a node with `current` citations should be looked up.
    pub fn wants(self, current: Option<u64>) -> bool {
        match self {
            Self::All => true,
            Self::Missing => matches!(current, None | Some(0)),
        }
    }
}

/// When the artifact gets rewritten at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WritePolicy {
    /// Only when a document was merged or a citation count changed.
    #[default]
    OnChange,
    /// After every successful link reconstruction.
    Always,
}

impl WritePolicy {
    /// Decide whether to write given the run's change flags.
    pub fn should_write(self, documents_changed: bool, citations_changed: bool) -> bool {
        match self {
            Self::Always => true,
            Self::OnChange => documents_changed || citations_changed,
        }
    }
}

/// Runtime settings for the citation fetcher.
#[derive(Debug, Clone)]
pub struct CitationConfig {
    /// Base URL of the lookup endpoint.
    pub api_base_url: String,
    /// Response field holding the count.
    pub count_field: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Attempts per DOI (at least 1).
    pub max_attempts: u32,
    /// Wait after a transient failure.
    pub retry_delay: Duration,
    /// Wait after a 429 response.
    pub rate_limit_delay: Duration,
    /// Pause between consecutive lookups.
    pub request_delay: Duration,
}

impl From<&AppConfig> for CitationConfig {
    fn from(config: &AppConfig) -> Self {
        let c = &config.citations;
        Self {
            api_base_url: c.api_base_url.clone(),
            count_field: c.count_field.clone(),
            request_timeout: Duration::from_secs(c.request_timeout_secs),
            max_attempts: c.max_attempts,
            retry_delay: Duration::from_millis(c.retry_delay_ms),
            rate_limit_delay: Duration::from_millis(c.rate_limit_delay_ms),
            request_delay: Duration::from_millis(c.request_delay_ms),
        }
    }
}

/// Runtime configuration for a sync or refresh run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding the milestone documents.
    pub documents_dir: PathBuf,
    /// Graph artifact path.
    pub artifact_file: PathBuf,
    /// BibTeX file path.
    pub bibliography_file: PathBuf,
    /// Change cache path.
    pub cache_file: PathBuf,
    /// Citation lookup eligibility.
    pub refresh: RefreshPolicy,
    /// Artifact write gating.
    pub write: WritePolicy,
    /// Citation fetcher settings.
    pub citations: CitationConfig,
}

impl From<&AppConfig> for SyncConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            documents_dir: PathBuf::from(&config.paths.documents_dir),
            artifact_file: PathBuf::from(&config.paths.artifact_file),
            bibliography_file: PathBuf::from(&config.paths.bibliography_file),
            cache_file: PathBuf::from(&config.paths.cache_file),
            refresh: RefreshPolicy::default(),
            write: WritePolicy::default(),
            citations: CitationConfig::from(config),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the application config.
///
/// An explicit path must exist. Without one, `./citegraph.toml` is used when
/// present, otherwise the built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let config = match explicit {
        Some(path) => load_config_from(path)?,
        None => {
            let path = Path::new(CONFIG_FILE_NAME);
            if path.exists() {
                load_config_from(path)?
            } else {
                tracing::debug!(?path, "config file not found, using defaults");
                AppConfig::default()
            }
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CitegraphError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CitegraphError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write a default config file at `path`. Refuses to overwrite.
pub fn init_config(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Err(CitegraphError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CitegraphError::io(parent, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| CitegraphError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| CitegraphError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}
