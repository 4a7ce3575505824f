//! Output row construction and CSV serialization.
//!
//! One row per qualifying paper (at least one company-affiliated author),
//! with multi-value fields joined by "; ".

use crate::classify::Classifier;
use crate::error::Result;
use crate::extract::Paper;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Join delimiter for multi-value fields
const FIELD_DELIMITER: &str = "; ";

/// CSV column order
pub const OUTPUT_COLUMNS: &[&str] = &[
    "PubmedID",
    "Title",
    "Publication Date",
    "Non-academic Author(s)",
    "Company Affiliation(s)",
    "Corresponding Author Email",
];

/// One row of the final report
#[derive(Debug, Clone, Serialize)]
pub struct OutputRow {
    #[serde(rename = "PubmedID")]
    pub pubmed_id: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Publication Date")]
    pub publication_date: String,
    /// Company-affiliated author names, original author order
    #[serde(rename = "Non-academic Author(s)")]
    pub non_academic_authors: String,
    /// Distinct matched company names, first-seen order
    #[serde(rename = "Company Affiliation(s)")]
    pub company_affiliations: String,
    #[serde(rename = "Corresponding Author Email")]
    pub corresponding_email: String,
}

/// Build the output row for a paper, or `None` if no author classifies as
/// company-affiliated.
///
/// A paper with zero authors can never qualify.
pub fn build_row(paper: &Paper, classifier: &Classifier) -> Option<OutputRow> {
    let mut author_names = Vec::new();
    let mut companies: Vec<String> = Vec::new();

    for author in &paper.authors {
        let affiliation = author.affiliation.as_deref().unwrap_or("");
        let result = classifier.classify(affiliation);

        if result.is_company {
            author_names.push(author.name.clone());
            if let Some(company) = result.company {
                if !companies.contains(&company) {
                    companies.push(company);
                }
            }
        }
    }

    if author_names.is_empty() {
        return None;
    }

    Some(OutputRow {
        pubmed_id: paper.pmid.clone(),
        title: paper.title.clone(),
        publication_date: paper.publication_date.clone(),
        non_academic_authors: author_names.join(FIELD_DELIMITER),
        company_affiliations: companies.join(FIELD_DELIMITER),
        corresponding_email: paper.corresponding_email.clone().unwrap_or_default(),
    })
}

/// Save rows to a CSV file.
///
/// An empty result still writes the header line: zero qualifying papers is
/// a valid empty report, not an error.
pub fn save_csv(path: &Path, rows: &[OutputRow]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(path)?;

    if rows.is_empty() {
        wtr.write_record(OUTPUT_COLUMNS)?;
    } else {
        for row in rows {
            wtr.serialize(row)?;
        }
    }

    wtr.flush()?;
    info!(rows = rows.len(), path = %path.display(), "Saved report");
    Ok(())
}
