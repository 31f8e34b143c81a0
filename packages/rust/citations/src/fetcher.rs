//! Citation fetcher with bounded retries.
//!
//! One lookup is `GET {base}/DOI:{doi}?fields={count_field}`. Each attempt is
//! classified into a [`FetchOutcome`] and the retry loop dispatches on it:
//!
//! | outcome        | action                                       |
//! |----------------|----------------------------------------------|
//! | `Count`        | done                                         |
//! | `Unknown`      | done (2xx without a usable count)            |
//! | `Permanent`    | done, no retry (4xx other than 429, etc.)    |
//! | `RateLimited`  | sleep `rate_limit_delay`, retry              |
//! | `Transient`    | sleep `retry_delay`, retry                   |
//!
//! Every attempt, including ones after a 429, counts against `max_attempts`.
//! No sleep follows the final attempt.

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use citegraph_shared::{CitationConfig, CitegraphError, Result};

/// User-Agent string for lookup requests.
const USER_AGENT: &str = concat!("citegraph/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Classified result of a single lookup attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 2xx with a citation count.
    Count(u64),
    /// 2xx without a count (field missing or null).
    Unknown,
    /// HTTP 429.
    RateLimited,
    /// Timeout, connection error, 5xx, or an unreadable body.
    Transient(String),
    /// Not worth retrying (4xx other than 429, unexpected status, bad URL).
    Permanent(String),
}

impl FetchOutcome {
    fn is_final(&self) -> bool {
        matches!(self, Self::Count(_) | Self::Unknown | Self::Permanent(_))
    }
}

/// Final result of a lookup after the retry policy has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Number of HTTP attempts made.
    pub attempts: u32,
    /// Outcome of the last attempt.
    pub outcome: FetchOutcome,
}

impl FetchReport {
    /// The citation count, if the lookup produced one.
    pub fn count(&self) -> Option<u64> {
        match self.outcome {
            FetchOutcome::Count(n) => Some(n),
            _ => None,
        }
    }

    /// Whether the service answered with a 2xx.
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Count(_) | FetchOutcome::Unknown)
    }
}

// ---------------------------------------------------------------------------
// CitationFetcher
// ---------------------------------------------------------------------------

/// Looks up citation counts by DOI, one request at a time.
pub struct CitationFetcher {
    config: CitationConfig,
    client: Client,
}

impl CitationFetcher {
    /// Create a fetcher with the given configuration.
    pub fn new(config: CitationConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CitegraphError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// The configuration this fetcher was built with.
    pub fn config(&self) -> &CitationConfig {
        &self.config
    }

    /// Look up the citation count for `doi`. Never fails: every problem ends
    /// up as `None`.
    pub async fn fetch_count(&self, doi: &str) -> Option<u64> {
        self.fetch(doi).await.count()
    }

    /// Look up `doi` under the retry policy and report how it went.
    #[instrument(skip(self), fields(max_attempts = self.config.max_attempts))]
    pub async fn fetch(&self, doi: &str) -> FetchReport {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = self.attempt(doi).await;

            if outcome.is_final() {
                debug!(attempt, ?outcome, "lookup finished");
                return FetchReport {
                    attempts: attempt,
                    outcome,
                };
            }

            if attempt >= max_attempts {
                warn!(attempts = attempt, ?outcome, "lookup failed after all attempts");
                return FetchReport {
                    attempts: attempt,
                    outcome,
                };
            }

            let delay = match &outcome {
                FetchOutcome::RateLimited => {
                    warn!(
                        attempt,
                        wait_ms = self.config.rate_limit_delay.as_millis(),
                        "rate limited (429), backing off"
                    );
                    self.config.rate_limit_delay
                }
                _ => {
                    warn!(
                        attempt,
                        ?outcome,
                        wait_ms = self.config.retry_delay.as_millis(),
                        "transient lookup failure, retrying"
                    );
                    self.config.retry_delay
                }
            };

            tokio::time::sleep(delay).await;
        }
    }

    /// Perform one request and classify it.
    async fn attempt(&self, doi: &str) -> FetchOutcome {
        let url = match Url::parse(&lookup_url(&self.config.api_base_url, doi)) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::Permanent(format!("invalid lookup URL: {e}")),
        };

        let response = match self
            .client
            .get(url)
            .query(&[("fields", self.config.count_field.as_str())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return FetchOutcome::Transient(format!("timeout: {e}")),
            Err(e) => return FetchOutcome::Transient(format!("request failed: {e}")),
        };

        let status = response.status();
        if let Some(outcome) = classify_status(status) {
            return outcome;
        }

        match response.text().await {
            Ok(body) => parse_count(&body, &self.config.count_field),
            Err(e) => FetchOutcome::Transient(format!("body read failed: {e}")),
        }
    }
}

/// Build the lookup URL for a DOI.
pub fn lookup_url(base: &str, doi: &str) -> String {
    format!("{}/DOI:{}", base.trim_end_matches('/'), escape_doi(doi))
}

/// Percent-encode the few characters that would change a URL's structure.
/// Slashes stay literal; the service expects them in the path.
fn escape_doi(doi: &str) -> String {
    let mut out = String::with_capacity(doi.len());
    for c in doi.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            c => out.push(c),
        }
    }
    out
}

/// Classify a non-2xx status. `None` means the body should be parsed.
fn classify_status(status: StatusCode) -> Option<FetchOutcome> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Some(FetchOutcome::RateLimited)
    } else if status.is_server_error() {
        Some(FetchOutcome::Transient(format!("HTTP {status}")))
    } else if status.is_success() {
        None
    } else {
        Some(FetchOutcome::Permanent(format!("HTTP {status}")))
    }
}

/// Extract the count field from a 2xx body.
fn parse_count(body: &str, field: &str) -> FetchOutcome {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get(field) {
            None | Some(Value::Null) => FetchOutcome::Unknown,
            Some(value) => match value.as_u64() {
                Some(n) => FetchOutcome::Count(n),
                None => {
                    debug!(%value, "count field is not a non-negative integer");
                    FetchOutcome::Unknown
                }
            },
        },
        Ok(_) => FetchOutcome::Transient("response body is not a JSON object".into()),
        Err(e) => FetchOutcome::Transient(format!("malformed response body: {e}")),
    }
}
