//! Pipeline orchestration: search, fetch, extract, classify, filter.
//!
//! Output rows come back in Phase-1 PMID order regardless of how efetch
//! grouped or ordered the records.

use crate::classify::Classifier;
use crate::error::{FetcherError, Result};
use crate::extract::{self, Paper};
use crate::pubmed::PubmedClient;
use crate::report::{self, OutputRow};
use std::collections::HashMap;
use tracing::{info, warn};

/// Counts reported at the end of a run; diagnostic only, not row data
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RunSummary {
    /// PMIDs returned by the search phase
    pub found: usize,
    /// Ids covered by successful efetch batches
    pub fetched: usize,
    /// Ids skipped because their batch failed after retries
    pub skipped_ids: usize,
    /// Batch documents that could not be parsed at all
    pub unparseable_documents: usize,
    /// Records dropped for a missing identifier
    pub extraction_failures: usize,
    /// Papers with at least one company-affiliated author
    pub qualifying: usize,
}

/// Result of one full pipeline run
#[derive(Debug)]
pub struct PipelineReport {
    pub rows: Vec<OutputRow>,
    pub summary: RunSummary,
}

/// Run the full pipeline for one query.
///
/// # Errors
///
/// Terminal failures only: rejected/empty-result queries, or an efetch
/// phase where no batch succeeded. Per-batch and per-record failures are
/// recovered locally and show up in the summary counts.
pub async fn run_pipeline(
    client: &PubmedClient,
    classifier: &Classifier,
    query: &str,
    max_results: usize,
) -> Result<PipelineReport> {
    let pmids = client.search(query, max_results).await?;
    if pmids.is_empty() {
        return Err(FetcherError::Query(format!(
            "no papers found for query: {query}"
        )));
    }

    let fetch = client.fetch_details(&pmids).await?;

    let mut summary = RunSummary {
        found: pmids.len(),
        fetched: fetch.fetched,
        skipped_ids: fetch.skipped,
        ..Default::default()
    };

    let mut papers: HashMap<String, Paper> = HashMap::new();
    for document in &fetch.documents {
        match extract::extract_papers(document) {
            Ok(outcome) => {
                summary.extraction_failures += outcome.failures;
                for paper in outcome.papers {
                    papers.insert(paper.pmid.clone(), paper);
                }
            }
            Err(e) => {
                warn!(error = %e, "Discarding unparseable efetch document");
                summary.unparseable_documents += 1;
            }
        }
    }

    // Restore Phase-1 order: efetch returns records in its own order and
    // silently omits ids it cannot resolve.
    let mut rows = Vec::new();
    for pmid in &pmids {
        if let Some(paper) = papers.get(pmid) {
            if let Some(row) = report::build_row(paper, classifier) {
                rows.push(row);
            }
        }
    }

    summary.qualifying = rows.len();

    info!(
        found = summary.found,
        fetched = summary.fetched,
        skipped = summary.skipped_ids,
        unparseable = summary.unparseable_documents,
        extraction_failures = summary.extraction_failures,
        qualifying = summary.qualifying,
        "Pipeline complete"
    );

    if rows.is_empty() {
        info!("No papers with pharma/biotech affiliations found");
    }

    Ok(PipelineReport { rows, summary })
}
