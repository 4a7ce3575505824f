//! Affiliation classification heuristics.
//!
//! Decides whether a free-text author affiliation belongs to a
//! pharmaceutical/biotech company or an academic institution. The heuristic
//! is an ordered rule cascade: curated company names first, then generic
//! industry keywords (suppressed by academic markers), then a structural
//! suffix pattern for unlisted companies.
//!
//! The word lists are configuration data, not code: they can be exported to
//! `~/.pharmapapers_heuristics.json` and edited there.

use crate::error::{FetcherError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Outcome of classifying one affiliation string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// True if the affiliation matched a company heuristic
    pub is_company: bool,
    /// Canonical or extracted company name, when known
    pub company: Option<String>,
}

impl Classification {
    fn company(name: String) -> Self {
        Self {
            is_company: true,
            company: Some(name),
        }
    }
}

/// Word lists driving the classifier.
///
/// Treated as a starting configuration, not a closed set: users extend the
/// lists via the heuristics file (see [`HeuristicsFile`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicsConfig {
    /// Canonical names of known pharma/biotech companies
    pub known_companies: Vec<String>,
    /// Generic industry keywords (matched on word boundaries)
    pub industry_keywords: Vec<String>,
    /// Academic markers that veto a keyword match
    pub academic_markers: Vec<String>,
    /// Corporate suffix terms for the structural pattern rule
    pub corporate_suffixes: Vec<String>,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        let to_vec = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();

        Self {
            known_companies: to_vec(&[
                "Pfizer",
                "Novartis",
                "Roche",
                "Johnson & Johnson",
                "J&J",
                "Merck",
                "GSK",
                "GlaxoSmithKline",
                "Sanofi",
                "AstraZeneca",
                "AbbVie",
                "Bristol Myers Squibb",
                "Eli Lilly",
                "Boehringer Ingelheim",
                "Takeda",
                "Bayer",
                "Amgen",
                "Gilead",
                "Biogen",
                "Celgene",
                "Vertex",
                "Regeneron",
                "Alexion",
                "Incyte",
                "Illumina",
                "Moderna",
                "BioNTech",
                "Genentech",
                "Novo Nordisk",
            ]),
            industry_keywords: to_vec(&[
                "pharmaceutical",
                "pharmaceuticals",
                "pharma",
                "biotech",
                "biotechnology",
                "therapeutics",
                "biopharmaceutical",
                "biopharmaceuticals",
                "biosciences",
                "life sciences",
                "drug development",
                "inc",
                "corp",
                "ltd",
                "llc",
                "gmbh",
                "company",
                "laboratories",
            ]),
            academic_markers: to_vec(&[
                "university",
                "college",
                "institute",
                "institution",
                "hospital",
                "school of medicine",
                "medical school",
                "department of",
                "faculty",
                "academy",
                "NIH",
                "CDC",
                "INSERM",
                "Max Planck",
            ]),
            corporate_suffixes: to_vec(&[
                "Pharmaceuticals",
                "Pharma",
                "Biotech",
                "Therapeutics",
                "Biosciences",
                "Lifesciences",
                "Inc",
                "Corp",
                "Ltd",
                "LLC",
                "GmbH",
                "AG",
            ]),
        }
    }
}

/// Rule in the classification cascade.
///
/// Each rule either returns a definitive classification or no opinion,
/// letting the next rule in [`RULE_ORDER`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CascadeRule {
    /// Curated company names; match yields the canonical name
    KnownCompany,
    /// Industry keywords, vetoed by academic markers
    KeywordWithVeto,
    /// Capitalized token run followed by a corporate suffix
    CorporateSuffix,
}

/// Precedence: specific names beat generic keywords beat structural patterns.
const RULE_ORDER: [CascadeRule; 3] = [
    CascadeRule::KnownCompany,
    CascadeRule::KeywordWithVeto,
    CascadeRule::CorporateSuffix,
];

/// Compiled affiliation classifier.
///
/// Built once at startup from a [`HeuristicsConfig`] and passed by reference
/// into the pipeline; `classify` is a pure function of its input.
pub struct Classifier {
    company_re: Regex,
    company_canonical: HashMap<String, String>,
    industry_re: Regex,
    academic_re: Regex,
    suffix_re: Regex,
}

impl Classifier {
    /// Compile a classifier from configuration word lists.
    ///
    /// # Errors
    ///
    /// Returns `FetcherError::Config` if a word list produces an invalid
    /// pattern (e.g. an empty list).
    pub fn new(config: &HeuristicsConfig) -> Result<Self> {
        // Word boundaries keep place and department names from
        // false-positives ("La Rochelle" is not Roche).
        let company_re = boundary_alternation(&config.known_companies)?;
        let company_canonical = config
            .known_companies
            .iter()
            .map(|name| (name.to_lowercase(), name.clone()))
            .collect();

        let industry_re = boundary_alternation(&config.industry_keywords)?;
        let academic_re = boundary_alternation(&config.academic_markers)?;

        // Capitalized token run (up to 5 tokens) immediately followed by a
        // corporate suffix. Case-sensitive: the capitalization is the signal.
        let suffixes = escaped_alternation(&config.corporate_suffixes)?;
        let suffix_pattern = format!(
            r"\b([A-Z][A-Za-z0-9&-]*(?:\s+[A-Z][A-Za-z0-9&-]*){{0,4}}\s+(?:{suffixes}))\.?(?:\s|,|;|$)"
        );
        let suffix_re = Regex::new(&suffix_pattern)
            .map_err(|e| FetcherError::Config(format!("Invalid suffix pattern: {e}")))?;

        Ok(Self {
            company_re,
            company_canonical,
            industry_re,
            academic_re,
            suffix_re,
        })
    }

    /// Classify one affiliation string.
    ///
    /// Empty or missing text is never an error: it classifies as
    /// non-company.
    pub fn classify(&self, affiliation: &str) -> Classification {
        let text = affiliation.trim();
        if text.is_empty() {
            return Classification::default();
        }

        let lower = text.to_lowercase();

        for rule in RULE_ORDER {
            if let Some(result) = self.apply(rule, text, &lower) {
                debug!(rule = ?rule, company = ?result.company, "Affiliation matched");
                return result;
            }
        }

        Classification::default()
    }

    /// Evaluate a single cascade rule; `None` means no opinion.
    fn apply(&self, rule: CascadeRule, text: &str, lower: &str) -> Option<Classification> {
        match rule {
            CascadeRule::KnownCompany => self.match_known_company(lower),
            CascadeRule::KeywordWithVeto => self.match_industry_keyword(text, lower),
            CascadeRule::CorporateSuffix => self.match_corporate_suffix(text),
        }
    }

    fn match_known_company(&self, lower: &str) -> Option<Classification> {
        let matched = self.company_re.find(lower)?.as_str();
        self.company_canonical
            .get(matched)
            .map(|canonical| Classification::company(canonical.clone()))
    }

    /// Generic industry keywords, unless a strong academic marker co-occurs.
    ///
    /// Academic affiliations frequently contain words like "institute" or
    /// "laboratories"; the marker veto keeps those from false-positives.
    fn match_industry_keyword(&self, text: &str, lower: &str) -> Option<Classification> {
        if self.academic_re.is_match(lower) {
            return None;
        }

        if !self.industry_re.is_match(lower) {
            return None;
        }

        // Name candidate: the comma/semicolon segment containing the keyword.
        let segment = text
            .split([',', ';'])
            .find(|part| self.industry_re.is_match(&part.to_lowercase()))
            .unwrap_or(text);

        Some(Classification::company(normalize_company_name(segment)))
    }

    fn match_corporate_suffix(&self, text: &str) -> Option<Classification> {
        self.suffix_re
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| Classification::company(normalize_company_name(m.as_str())))
    }
}

/// Trim, collapse internal whitespace, strip trailing punctuation.
pub fn normalize_company_name(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['.', ',', ';', ':'])
        .trim()
        .to_string()
}

/// Case-insensitive word-boundary alternation over a word list
fn boundary_alternation(words: &[String]) -> Result<Regex> {
    let alternation = escaped_alternation(words)?;
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
        .map_err(|e| FetcherError::Config(format!("Invalid word list pattern: {e}")))
}

fn escaped_alternation(words: &[String]) -> Result<String> {
    let escaped: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();

    if escaped.is_empty() {
        return Err(FetcherError::Config("Empty word list".to_string()));
    }

    Ok(escaped.join("|"))
}

// ============================================================================
// Heuristics file persistence
// ============================================================================

/// Default heuristics file path: `~/.pharmapapers_heuristics.json`
fn default_heuristics_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".pharmapapers_heuristics.json"))
        .ok_or_else(|| FetcherError::Config("Cannot determine home directory".to_string()))
}

/// Loads and saves the classifier word lists
pub struct HeuristicsFile {
    path: PathBuf,
}

impl HeuristicsFile {
    /// Create with the default path
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: default_heuristics_path()?,
        })
    }

    /// Create with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the heuristics file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the config, falling back to the built-in lists if the file is
    /// missing or invalid
    pub fn load(&self) -> HeuristicsConfig {
        if !self.path.exists() {
            debug!("Heuristics file not found: {:?}", self.path);
            return HeuristicsConfig::default();
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<HeuristicsConfig>(&content) {
                Ok(config) => {
                    info!(
                        companies = config.known_companies.len(),
                        "Loaded heuristics from {:?}", self.path
                    );
                    config
                }
                Err(e) => {
                    warn!("Failed to parse heuristics file: {}", e);
                    HeuristicsConfig::default()
                }
            },
            Err(e) => {
                warn!("Failed to read heuristics file: {}", e);
                HeuristicsConfig::default()
            }
        }
    }

    /// Write a config to the file
    pub fn save(&self, config: &HeuristicsConfig) -> Result<()> {
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, content)?;
        info!("Saved heuristics to {:?}", self.path);
        Ok(())
    }
}

impl Default for HeuristicsFile {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            path: PathBuf::from(".pharmapapers_heuristics.json"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&HeuristicsConfig::default()).expect("default config compiles")
    }

    #[test]
    fn test_known_company_match() {
        let c = classifier();
        let result = c.classify("Pfizer Inc., New York, NY, USA");
        assert!(result.is_company);
        assert_eq!(result.company.as_deref(), Some("Pfizer"));
    }

    #[test]
    fn test_known_company_case_insensitive() {
        let c = classifier();
        let result = c.classify("Global Research, NOVARTIS, Basel, Switzerland");
        assert_eq!(result.company.as_deref(), Some("Novartis"));
    }

    #[test]
    fn test_known_company_needs_word_boundary() {
        // "Roche" inside "La Rochelle" and "Biogen" inside "Biogenesis"
        // must not count as company hits.
        let c = classifier();
        let result = c.classify("Département de Biologie, Université de La Rochelle, France");
        assert!(!result.is_company);

        let result = c.classify("Department of Biogenesis, University of Utrecht");
        assert!(!result.is_company);
    }

    #[test]
    fn test_jj_alias_matches() {
        let c = classifier();
        let result = c.classify("J&J, New Brunswick, NJ, USA");
        assert!(result.is_company);
        assert_eq!(result.company.as_deref(), Some("J&J"));
    }

    #[test]
    fn test_known_company_beats_academic_marker() {
        // Rule 1 precedes the veto: a company research institute is still
        // the company.
        let c = classifier();
        let result = c.classify("Novartis Institutes for BioMedical Research, Cambridge, MA");
        assert!(result.is_company);
        assert_eq!(result.company.as_deref(), Some("Novartis"));
    }

    #[test]
    fn test_academic_affiliation_not_company() {
        let c = classifier();
        let result = c.classify("Dept. of Oncology, Johns Hopkins University, Baltimore, MD");
        assert!(!result.is_company);
        assert_eq!(result.company, None);
    }

    #[test]
    fn test_academic_marker_vetoes_keyword() {
        // "Institute of Biotechnology" carries an industry keyword but is
        // academic.
        let c = classifier();
        let result = c.classify("Institute of Biotechnology, Technical University of Munich");
        assert!(!result.is_company);
    }

    #[test]
    fn test_keyword_without_veto_matches() {
        let c = classifier();
        let result = c.classify("Acme Biotechnology, San Diego, CA");
        assert!(result.is_company);
        assert_eq!(result.company.as_deref(), Some("Acme Biotechnology"));
    }

    #[test]
    fn test_keyword_candidate_is_matching_segment() {
        let c = classifier();
        let result = c.classify("Research Division, Zeta Pharmaceuticals, Boston, MA");
        assert_eq!(result.company.as_deref(), Some("Zeta Pharmaceuticals"));
    }

    #[test]
    fn test_corporate_suffix_pattern() {
        // "AG" is a suffix term but not an industry keyword, so only the
        // structural rule can catch this one.
        let c = classifier();
        let result = c.classify("Helvetia Remedies AG, Basel, Switzerland");
        assert!(result.is_company);
        assert_eq!(result.company.as_deref(), Some("Helvetia Remedies AG"));
    }

    #[test]
    fn test_suffix_term_not_matched_inside_word() {
        // "Biotech" inside "Biotechnology" must not satisfy the suffix rule
        let c = classifier();
        let result = c.classify("Center for Applied Biotechnology, University of Ghent");
        assert!(!result.is_company);
    }

    #[test]
    fn test_empty_input() {
        let c = classifier();
        assert_eq!(c.classify(""), Classification::default());
        assert_eq!(c.classify("   "), Classification::default());
    }

    #[test]
    fn test_plain_academic_with_no_keywords() {
        let c = classifier();
        let result = c.classify("Faculty of Science, Leiden");
        assert!(!result.is_company);
    }

    #[test]
    fn test_nih_word_boundary() {
        // "nih" must not match inside an unrelated word
        let c = classifier();
        let result = c.classify("Zenith Biotech, Austin, TX");
        assert!(result.is_company);

        let veto = c.classify("National Cancer Institute, NIH, Bethesda, MD");
        assert!(!veto.is_company);
    }

    #[test]
    fn test_normalize_company_name() {
        assert_eq!(normalize_company_name("  Acme   Pharma. "), "Acme Pharma");
        assert_eq!(normalize_company_name("Beta Corp.,"), "Beta Corp");
        assert_eq!(normalize_company_name("Plain"), "Plain");
    }

    #[test]
    fn test_extended_config() {
        let mut config = HeuristicsConfig::default();
        config.known_companies.push("Hooli Biolabs".to_string());

        let c = Classifier::new(&config).expect("config compiles");
        let result = c.classify("Hooli Biolabs, Palo Alto, CA");
        assert_eq!(result.company.as_deref(), Some("Hooli Biolabs"));
    }

    #[test]
    fn test_heuristics_file_roundtrip() -> Result<()> {
        let temp = tempfile::NamedTempFile::new()?;
        let file = HeuristicsFile::with_path(temp.path().to_path_buf());

        let mut config = HeuristicsConfig::default();
        config.known_companies.push("Initech Bio".to_string());
        file.save(&config)?;

        let loaded = file.load();
        assert!(loaded.known_companies.contains(&"Initech Bio".to_string()));
        Ok(())
    }

    #[test]
    fn test_heuristics_file_missing_falls_back() {
        let file = HeuristicsFile::with_path(PathBuf::from("/nonexistent/heuristics.json"));
        let config = file.load();
        assert!(!config.known_companies.is_empty());
    }
}
