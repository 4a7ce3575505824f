//! # pharmapapers
//!
//! PubMed Industry-Affiliation Paper Fetcher - Rust Microservice
//!
//! ## Modules
//!
//! - [`pubmed`] - PubMed E-utilities client (esearch + batched efetch)
//! - [`extract`] - efetch XML record extraction
//! - [`classify`] - pharma/biotech affiliation heuristics
//! - [`pipeline`] - end-to-end run orchestration
//! - [`report`] - output rows and CSV serialization
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pharmapapers::{classify, pipeline, pubmed};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = pubmed::PubmedClient::new()?;
//!     let classifier = classify::Classifier::new(&Default::default())?;
//!     let report = pipeline::run_pipeline(&client, &classifier, "cancer treatment", 100).await?;
//!     println!("Found {} qualifying papers", report.rows.len());
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod pubmed;
pub mod report;

pub use error::{FetcherError, Result};
