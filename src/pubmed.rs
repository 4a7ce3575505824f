//! PubMed E-utilities API client.
//!
//! Two-phase retrieval protocol: esearch resolves a query to PMIDs,
//! efetch retrieves full records for those PMIDs in batches.
//!
//! API Details:
//! - Search endpoint: GET /esearch.fcgi (JSON)
//! - Fetch endpoint: GET /efetch.fcgi (XML), max ~200 ids per request
//! - Rate limit: 3 req/s without an API key; calls are paced accordingly

use crate::error::{FetcherError, OptionExt, Result};
use rand::Rng;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// PubMed E-utilities base URL
const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Maximum PMIDs per efetch request
const MAX_BATCH_SIZE: usize = 200;

/// Minimum interval between requests (NCBI allows 3 req/s unauthenticated)
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(350);

/// Per-call timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of the batched efetch phase
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// One raw XML document per successful batch
    pub documents: Vec<String>,
    /// Ids covered by successful batches
    pub fetched: usize,
    /// Ids skipped because their batch failed after retries
    pub skipped: usize,
}

/// E-utilities client with rate limiting and bounded retries
pub struct PubmedClient {
    client: reqwest::Client,
    base_url: String,
    last_request: Mutex<Option<Instant>>,
    max_retries: u32,
}

impl PubmedClient {
    /// Create a client against the real E-utilities endpoint
    pub fn new() -> Result<Self> {
        Self::with_base_url(EUTILS_BASE)
    }

    /// Create a client against a custom base URL (used by tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("pharmapapers/1.0 (research tool)")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FetcherError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            last_request: Mutex::new(None),
            max_retries: 2,
        })
    }

    /// Phase 1: resolve a query to an ordered list of PMIDs.
    ///
    /// # Errors
    ///
    /// `FetcherError::Query` for an empty query, a zero `max_results`
    /// (rejected before any network call) or a query the API rejects;
    /// network errors propagate after retries.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(FetcherError::Query("empty search query".to_string()));
        }
        if max_results == 0 {
            return Err(FetcherError::Query(
                "max_results must be a positive integer".to_string(),
            ));
        }

        info!(query = query, max_results = max_results, "Searching PubMed");

        let body = self
            .get_with_retry(
                "esearch.fcgi",
                &[
                    ("db", "pubmed".to_string()),
                    ("term", query.to_string()),
                    ("retmax", max_results.to_string()),
                    ("retmode", "json".to_string()),
                    ("sort", "relevance".to_string()),
                ],
            )
            .await?;

        let response: EsearchResponse = serde_json::from_str(&body)
            .map_err(|e| FetcherError::Parse(format!("Failed to parse esearch response: {e}")))?;

        let result = response
            .esearchresult
            .ok_or_parse("esearch response missing result")?;

        if let Some(error) = result.error {
            return Err(FetcherError::Query(error));
        }

        info!(found = result.idlist.len(), "Search complete");
        Ok(result.idlist)
    }

    /// Phase 2: fetch full records for the given PMIDs, in batches.
    ///
    /// Batches are fetched concurrently (bounded, still paced by the
    /// shared rate limiter) and reassembled in batch order. A batch that
    /// fails after retries is logged and its ids are counted as skipped;
    /// the run continues with the remaining batches. The call fails only
    /// when every batch failed.
    pub async fn fetch_details(&self, pmids: &[String]) -> Result<FetchOutcome> {
        use futures::stream::{self, StreamExt};

        let valid: Vec<&String> = pmids.iter().filter(|id| !id.is_empty()).collect();
        if valid.is_empty() {
            return Ok(FetchOutcome::default());
        }

        let batch_count = valid.len().div_ceil(MAX_BATCH_SIZE);
        info!(
            total = valid.len(),
            batches = batch_count,
            "Fetching record details"
        );

        let concurrent_limit = 3;

        let batches: Vec<(usize, usize, String)> = valid
            .chunks(MAX_BATCH_SIZE)
            .enumerate()
            .map(|(batch_idx, chunk)| {
                let id_count = chunk.len();
                let ids = chunk
                    .iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                (batch_idx, id_count, ids)
            })
            .collect();

        let mut results: Vec<(usize, usize, Result<String>)> =
            stream::iter(batches)
                .map(|(batch_idx, id_count, ids)| {
                    async move {
                        debug!(
                            batch = batch_idx + 1,
                            total_batches = batch_count,
                            ids = id_count,
                            "Fetching batch"
                        );
                        let result = self
                            .get_with_retry(
                                "efetch.fcgi",
                                &[
                                    ("db", "pubmed".to_string()),
                                    ("id", ids),
                                    ("retmode", "xml".to_string()),
                                    ("rettype", "abstract".to_string()),
                                ],
                            )
                            .await;
                        (batch_idx, id_count, result)
                    }
                })
                .buffer_unordered(concurrent_limit)
                .collect()
                .await;

        // Reassemble in batch order before handing documents downstream
        results.sort_by_key(|(batch_idx, _, _)| *batch_idx);

        let mut outcome = FetchOutcome::default();
        let mut last_error = None;

        for (batch_idx, id_count, result) in results {
            match result {
                Ok(document) => {
                    outcome.fetched += id_count;
                    outcome.documents.push(document);
                }
                Err(e) => {
                    warn!(
                        batch = batch_idx + 1,
                        ids = id_count,
                        error = %e,
                        "Batch failed, skipping its ids"
                    );
                    outcome.skipped += id_count;
                    last_error = Some(e);
                }
            }
        }

        if outcome.documents.is_empty() {
            // Every batch failed: surface the last failure as terminal
            return Err(last_error.unwrap_or_else(|| {
                FetcherError::Api {
                    code: 0,
                    message: "no efetch batch succeeded".to_string(),
                }
            }));
        }

        info!(
            fetched = outcome.fetched,
            skipped = outcome.skipped,
            "Fetch complete"
        );
        Ok(outcome)
    }

    /// GET with pacing, bounded retries and exponential backoff.
    ///
    /// Query rejections (HTTP 400) are terminal and never retried.
    async fn get_with_retry(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut backoff = Duration::from_millis(500);

        for attempt in 0..=self.max_retries {
            self.wait_for_rate_limit().await;

            match self.do_get(&url, params).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
                    let wait = backoff + jitter;
                    warn!(
                        endpoint = endpoint,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }

        // Unreachable: the final loop iteration always returns
        Err(FetcherError::Api {
            code: 0,
            message: "retries exhausted".to_string(),
        })
    }

    async fn do_get(&self, url: &str, params: &[(&str, String)]) -> Result<String> {
        debug!(url = %url, params = ?params, "Sending request");

        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetcherError::RateLimited(1));
        }

        if status == reqwest::StatusCode::BAD_REQUEST {
            let message = response.text().await.unwrap_or_default();
            return Err(FetcherError::Query(format!(
                "query rejected by E-utilities: {}",
                truncate(&message, 200)
            )));
        }

        if !status.is_success() {
            return Err(FetcherError::Api {
                code: i32::from(status.as_u16()),
                message: format!("E-utilities error: {status}"),
            });
        }

        Ok(response.text().await?)
    }

    /// Enforce the minimum inter-call delay
    async fn wait_for_rate_limit(&self) {
        let should_wait = {
            let last = self.last_request.lock().ok();
            last.and_then(|l| *l)
                .map(|t| t.elapsed() < MIN_REQUEST_INTERVAL)
        };

        if should_wait == Some(true) {
            tokio::time::sleep(MIN_REQUEST_INTERVAL).await;
        }

        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(Instant::now());
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// === E-utilities response types ===

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: Option<EsearchResult>,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}
