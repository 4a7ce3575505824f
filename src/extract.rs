//! PubMed efetch record extraction.
//!
//! Streaming parse of efetch XML (`<PubmedArticleSet>`) into normalized
//! [`Paper`] entities using quick-xml. Tolerates missing fields: only a
//! missing PMID makes a record unextractable.

use crate::error::{FetcherError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

/// One author of a paper, with raw affiliation text
#[derive(Debug, Clone, Default, Serialize)]
pub struct Author {
    /// "LastName, ForeName" or a collective name
    pub name: String,
    /// Free-text affiliation, as returned by PubMed
    pub affiliation: Option<String>,
    /// Email embedded in the affiliation text, if any
    pub email: Option<String>,
}

/// Normalized publication record
#[derive(Debug, Clone, Default, Serialize)]
pub struct Paper {
    pub pmid: String,
    pub title: String,
    /// Best-effort "YYYY-MM-DD" (partial allowed); raw text when
    /// normalization is impossible
    pub publication_date: String,
    pub authors: Vec<Author>,
    /// First email found scanning affiliations in author order
    pub corresponding_email: Option<String>,
}

/// Result of extracting one efetch document
#[derive(Debug, Default)]
pub struct ExtractOutcome {
    pub papers: Vec<Paper>,
    /// Records skipped because their identifier could not be determined
    pub failures: usize,
}

/// Extract all papers from one efetch XML document.
///
/// Individual malformed records are skipped and counted in
/// [`ExtractOutcome::failures`]; only a document-level XML error fails the
/// call.
pub fn extract_papers(xml: &str) -> Result<ExtractOutcome> {
    let email_re = email_regex()?;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut outcome = ExtractOutcome::default();
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| FetcherError::Parse(format!("XML error: {e}")))?
        {
            Event::Start(e) if e.name().as_ref() == b"PubmedArticle" => {
                match parse_article(&mut reader, &email_re) {
                    Ok(paper) => outcome.papers.push(paper),
                    Err(e) => {
                        warn!(error = %e, "Skipping unextractable record");
                        outcome.failures += 1;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(outcome)
}

fn email_regex() -> Result<Regex> {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
        .map_err(|e| FetcherError::Config(format!("Invalid email pattern: {e}")))
}

fn parse_article(reader: &mut Reader<&[u8]>, email_re: &Regex) -> Result<Paper> {
    let mut paper = Paper::default();
    let mut date = DateParts::default();
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| FetcherError::Parse(format!("XML error: {e}")))?
        {
            Event::Start(e) => match e.name().as_ref() {
                // The first PMID under MedlineCitation identifies the
                // record; later ones (references, corrections) don't.
                b"PMID" if paper.pmid.is_empty() => paper.pmid = read_text(reader)?,
                b"ArticleTitle" => paper.title = read_text_content(reader, b"ArticleTitle")?,
                b"PubDate" => date.fill_from(reader, b"PubDate")?,
                b"ArticleDate" if date.year.is_empty() => {
                    date.fill_from(reader, b"ArticleDate")?;
                }
                b"AuthorList" => paper.authors = parse_author_list(reader)?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"PubmedArticle" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if paper.pmid.is_empty() {
        return Err(FetcherError::Extraction(
            "record has no PMID".to_string(),
        ));
    }

    paper.publication_date = date.render();
    attach_emails(&mut paper, email_re);

    Ok(paper)
}

/// Year/month/day fragments of a PubDate, with MedlineDate raw fallback
#[derive(Debug, Default)]
struct DateParts {
    year: String,
    month: String,
    day: String,
    medline_date: String,
}

impl DateParts {
    fn fill_from(&mut self, reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<()> {
        let mut buf = Vec::new();

        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| FetcherError::Parse(format!("XML error: {e}")))?
            {
                Event::Start(e) => match e.name().as_ref() {
                    b"Year" => self.year = read_text(reader)?,
                    b"Month" => self.month = read_text(reader)?,
                    b"Day" => self.day = read_text(reader)?,
                    b"MedlineDate" => self.medline_date = read_text(reader)?,
                    _ => {}
                },
                Event::End(e) if e.name().as_ref() == end_tag => break,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(())
    }

    /// "YYYY", "YYYY-MM" or "YYYY-MM-DD"; raw MedlineDate text when no
    /// structured year exists
    fn render(&self) -> String {
        if self.year.is_empty() {
            return self.medline_date.clone();
        }

        let mut rendered = self.year.clone();
        if let Some(month) = month_number(&self.month) {
            rendered.push_str(&format!("-{month:02}"));
            if let (Ok(year), Ok(day)) = (self.year.parse::<i32>(), self.day.parse::<u32>()) {
                // Accept the day only when it forms a real calendar date
                if chrono::NaiveDate::from_ymd_opt(year, month, day).is_some() {
                    rendered.push_str(&format!("-{day:02}"));
                }
            }
        }
        rendered
    }
}

/// Handle both numeric and text months
fn month_number(s: &str) -> Option<u32> {
    match s.parse::<u32>() {
        Ok(n) if (1..=12).contains(&n) => Some(n),
        _ => match s.to_lowercase().as_str() {
            "jan" => Some(1),
            "feb" => Some(2),
            "mar" => Some(3),
            "apr" => Some(4),
            "may" => Some(5),
            "jun" => Some(6),
            "jul" => Some(7),
            "aug" => Some(8),
            "sep" => Some(9),
            "oct" => Some(10),
            "nov" => Some(11),
            "dec" => Some(12),
            _ => None,
        },
    }
}

fn parse_author_list(reader: &mut Reader<&[u8]>) -> Result<Vec<Author>> {
    let mut authors = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| FetcherError::Parse(format!("XML error: {e}")))?
        {
            Event::Start(e) if e.name().as_ref() == b"Author" => {
                let author = parse_author(reader)?;
                if !author.name.is_empty() {
                    authors.push(author);
                }
            }
            Event::End(e) if e.name().as_ref() == b"AuthorList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(authors)
}

fn parse_author(reader: &mut Reader<&[u8]>) -> Result<Author> {
    let mut last_name = String::new();
    let mut fore_name = String::new();
    let mut collective = String::new();
    let mut affiliation = String::new();
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| FetcherError::Parse(format!("XML error: {e}")))?
        {
            Event::Start(e) => match e.name().as_ref() {
                b"LastName" => last_name = read_text(reader)?,
                b"ForeName" => fore_name = read_text(reader)?,
                b"CollectiveName" => collective = read_text(reader)?,
                b"Affiliation" => {
                    let text = read_text(reader)?;
                    if affiliation.is_empty() {
                        affiliation = text;
                    } else {
                        // Multiple AffiliationInfo blocks are rare; keep
                        // them all in one scannable string.
                        affiliation.push_str("; ");
                        affiliation.push_str(&text);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Author" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let name = if !last_name.is_empty() {
        if fore_name.is_empty() {
            last_name
        } else {
            format!("{last_name}, {fore_name}")
        }
    } else {
        collective
    };

    Ok(Author {
        name,
        affiliation: (!affiliation.is_empty()).then_some(affiliation),
        email: None,
    })
}

/// Scan affiliations for embedded email addresses; the first hit in author
/// order becomes the paper's corresponding email.
fn attach_emails(paper: &mut Paper, email_re: &Regex) {
    for author in &mut paper.authors {
        if let Some(affiliation) = &author.affiliation {
            if let Some(m) = email_re.find(affiliation) {
                // PubMed affiliations usually end in a period
                let email = m.as_str().trim_end_matches(['.', ',', ';']).to_string();
                if paper.corresponding_email.is_none() {
                    paper.corresponding_email = Some(email.clone());
                }
                author.email = Some(email);
            }
        }
    }
}

/// Read text content until next end tag
fn read_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| FetcherError::Parse(format!("XML error: {e}")))?
        {
            Event::Text(e) => text.push_str(
                &e.unescape()
                    .map_err(|e| FetcherError::Parse(format!("XML error: {e}")))?,
            ),
            Event::End(_) => break,
            Event::Start(_) => {
                // Nested markup (<i>, <sup>, ...)
                text.push_str(&read_text(reader)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

/// Read text content of a specific element, handling nested tags
fn read_text_content(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 1;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| FetcherError::Parse(format!("XML error: {e}")))?
        {
            Event::Text(e) => text.push_str(
                &e.unescape()
                    .map_err(|e| FetcherError::Parse(format!("XML error: {e}")))?,
            ),
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && e.name().as_ref() == end_tag {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">12345</PMID>
      <Article>
        <Journal>
          <JournalIssue>
            <PubDate>
              <Year>2024</Year>
              <Month>Jun</Month>
              <Day>15</Day>
            </PubDate>
          </JournalIssue>
        </Journal>
        <ArticleTitle>A trial of something new.</ArticleTitle>
        <AuthorList>
          <Author>
            <LastName>Smith</LastName>
            <ForeName>John</ForeName>
            <AffiliationInfo>
              <Affiliation>Pfizer Inc., New York, NY, USA. john.smith@pfizer.com.</Affiliation>
            </AffiliationInfo>
          </Author>
          <Author>
            <LastName>Doe</LastName>
            <ForeName>Jane</ForeName>
            <AffiliationInfo>
              <Affiliation>Department of Medicine, Yale University, New Haven, CT.</Affiliation>
            </AffiliationInfo>
          </Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_extract_basic_record() {
        let outcome = extract_papers(SAMPLE_XML).expect("parses");
        assert_eq!(outcome.failures, 0);
        assert_eq!(outcome.papers.len(), 1);

        let paper = &outcome.papers[0];
        assert_eq!(paper.pmid, "12345");
        assert_eq!(paper.title, "A trial of something new.");
        assert_eq!(paper.publication_date, "2024-06-15");
        assert_eq!(paper.authors.len(), 2);
        assert_eq!(paper.authors[0].name, "Smith, John");
        assert_eq!(paper.authors[1].name, "Doe, Jane");
    }

    #[test]
    fn test_email_extraction() {
        let outcome = extract_papers(SAMPLE_XML).expect("parses");
        let paper = &outcome.papers[0];

        assert_eq!(
            paper.corresponding_email.as_deref(),
            Some("john.smith@pfizer.com")
        );
        assert_eq!(paper.authors[0].email.as_deref(), Some("john.smith@pfizer.com"));
        assert_eq!(paper.authors[1].email, None);
    }

    #[test]
    fn test_missing_fields_tolerated() {
        let xml = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>777</PMID>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let outcome = extract_papers(xml).expect("parses");
        assert_eq!(outcome.papers.len(), 1);

        let paper = &outcome.papers[0];
        assert_eq!(paper.pmid, "777");
        assert_eq!(paper.title, "");
        assert_eq!(paper.publication_date, "");
        assert!(paper.authors.is_empty());
        assert_eq!(paper.corresponding_email, None);
    }

    #[test]
    fn test_missing_pmid_counts_as_failure() {
        let xml = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <Article>
        <ArticleTitle>Orphan record</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>42</PMID>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let outcome = extract_papers(xml).expect("parses");
        assert_eq!(outcome.failures, 1);
        assert_eq!(outcome.papers.len(), 1);
        assert_eq!(outcome.papers[0].pmid, "42");
    }

    #[test]
    fn test_medline_date_passthrough() {
        let xml = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>9</PMID>
      <Article>
        <Journal>
          <JournalIssue>
            <PubDate>
              <MedlineDate>1998 Dec-1999 Jan</MedlineDate>
            </PubDate>
          </JournalIssue>
        </Journal>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let outcome = extract_papers(xml).expect("parses");
        assert_eq!(outcome.papers[0].publication_date, "1998 Dec-1999 Jan");
    }

    #[test]
    fn test_year_only_date() {
        let xml = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>10</PMID>
      <Article>
        <Journal>
          <JournalIssue>
            <PubDate><Year>2021</Year></PubDate>
          </JournalIssue>
        </Journal>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let outcome = extract_papers(xml).expect("parses");
        assert_eq!(outcome.papers[0].publication_date, "2021");
    }

    #[test]
    fn test_impossible_day_dropped() {
        let xml = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>13</PMID>
      <Article>
        <Journal>
          <JournalIssue>
            <PubDate>
              <Year>2023</Year>
              <Month>Feb</Month>
              <Day>30</Day>
            </PubDate>
          </JournalIssue>
        </Journal>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let outcome = extract_papers(xml).expect("parses");
        assert_eq!(outcome.papers[0].publication_date, "2023-02");
    }

    #[test]
    fn test_collective_author() {
        let xml = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>11</PMID>
      <Article>
        <AuthorList>
          <Author>
            <CollectiveName>COVID Vaccine Study Group</CollectiveName>
          </Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let outcome = extract_papers(xml).expect("parses");
        let paper = &outcome.papers[0];
        assert_eq!(paper.authors.len(), 1);
        assert_eq!(paper.authors[0].name, "COVID Vaccine Study Group");
        assert_eq!(paper.authors[0].affiliation, None);
    }

    #[test]
    fn test_nested_markup_in_title() {
        let xml = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>12</PMID>
      <Article>
        <ArticleTitle>Effects of <i>in vitro</i> exposure.</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let outcome = extract_papers(xml).expect("parses");
        let title = &outcome.papers[0].title;
        assert!(title.contains("Effects of"));
        assert!(title.contains("in vitro"));
        assert!(title.contains("exposure."));
    }

    #[test]
    fn test_empty_set() {
        let xml = r#"<?xml version="1.0"?><PubmedArticleSet></PubmedArticleSet>"#;
        let outcome = extract_papers(xml).expect("parses");
        assert!(outcome.papers.is_empty());
        assert_eq!(outcome.failures, 0);
    }
}
