//! pharmapapers - PubMed Industry-Affiliation Paper Fetcher
//!
//! Queries PubMed, classifies author affiliations, and reports papers with
//! at least one pharmaceutical/biotech-affiliated author as CSV.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! pharmapapers fetch "cancer treatment" --max-results 50 -f results.csv
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! pharmapapers serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use clap::{Parser, Subcommand};
use pharmapapers::classify::{Classifier, HeuristicsConfig, HeuristicsFile};
use pharmapapers::pipeline::{self, RunSummary};
use pharmapapers::pubmed::PubmedClient;
use pharmapapers::report::{self, OutputRow};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// PubMed Industry-Affiliation Paper Fetcher - Rust Microservice
#[derive(Parser)]
#[command(name = "pharmapapers")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search PubMed and report industry-affiliated papers
    Fetch {
        /// Search query (PubMed query syntax)
        query: String,

        /// Maximum number of search results to retrieve
        #[arg(long, default_value_t = 100)]
        max_results: usize,

        /// Output CSV filename
        #[arg(short, long, default_value = "pubmed_results.csv")]
        file: PathBuf,

        /// Custom heuristics file with classifier word lists
        #[arg(long)]
        heuristics: Option<PathBuf>,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Manage classifier heuristics
    Heuristics {
        #[command(subcommand)]
        action: HeuristicsAction,
    },
}

#[derive(Subcommand)]
enum HeuristicsAction {
    /// Write the built-in word lists to the heuristics file for editing
    Init,
    /// Show heuristics file path
    Path,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Fetch {
            query,
            max_results,
            file,
            heuristics,
        } => run_fetch(query, max_results, file, heuristics).await,
        Commands::Serve { port, host } => run_server(host, port).await,
        Commands::Heuristics { action } => handle_heuristics(action),
    }
}

// ============================================================================
// Fetch Pipeline
// ============================================================================

async fn run_fetch(
    query: String,
    max_results: usize,
    file: PathBuf,
    heuristics: Option<PathBuf>,
) -> Result<()> {
    let classifier = build_classifier(heuristics)?;
    let client = PubmedClient::new()?;

    let result = pipeline::run_pipeline(&client, &classifier, &query, max_results).await?;

    // The report is written even when empty: zero qualifying papers is a
    // valid result, not a failure.
    report::save_csv(&file, &result.rows)
        .with_context(|| format!("Failed to write {}", file.display()))?;

    let s = result.summary;
    println!(
        "Found {} papers, fetched {}, {} with industry-affiliated authors.",
        s.found, s.fetched, s.qualifying
    );
    if s.skipped_ids > 0 {
        println!("Skipped {} ids due to failed batches.", s.skipped_ids);
    }
    if s.extraction_failures > 0 {
        println!("Skipped {} malformed records.", s.extraction_failures);
    }
    if s.qualifying == 0 {
        println!("No papers with pharma/biotech affiliations matched this query.");
    }
    println!("Saved: {}", file.display());

    Ok(())
}

fn build_classifier(heuristics: Option<PathBuf>) -> Result<Classifier> {
    let config = match heuristics {
        Some(path) => HeuristicsFile::with_path(path).load(),
        None => HeuristicsFile::default().load(),
    };
    Ok(Classifier::new(&config)?)
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(host: String, port: u16) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let classifier = build_classifier(None)?;
    let client = PubmedClient::new()?;
    let app_state = Arc::new(AppState { client, classifier });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/search", post(search_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

struct AppState {
    client: PubmedClient,
    classifier: Classifier,
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Search request body
#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_max_results() -> usize {
    100
}

/// Search response
#[derive(Debug, Serialize)]
struct SearchResponse {
    status: String,
    count: usize,
    rows: Vec<OutputRow>,
    summary: Option<RunSummary>,
}

/// Search endpoint handler
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Json<SearchResponse> {
    info!(query = %req.query, max_results = req.max_results, "Search request");

    match pipeline::run_pipeline(&state.client, &state.classifier, &req.query, req.max_results)
        .await
    {
        Ok(report) => Json(SearchResponse {
            status: "success".to_string(),
            count: report.rows.len(),
            rows: report.rows,
            summary: Some(report.summary),
        }),
        Err(e) => {
            error!(error = %e, "Search failed");
            Json(SearchResponse {
                status: format!("error: {}", e),
                count: 0,
                rows: vec![],
                summary: None,
            })
        }
    }
}

// ============================================================================
// Heuristics Management
// ============================================================================

fn handle_heuristics(action: HeuristicsAction) -> Result<()> {
    let file = HeuristicsFile::new()?;

    match action {
        HeuristicsAction::Init => {
            file.save(&HeuristicsConfig::default())?;
            println!("Wrote default heuristics to: {:?}", file.path());
            println!("Edit the word lists there to extend the classifier.");
        }
        HeuristicsAction::Path => {
            println!("Heuristics file: {:?}", file.path());
        }
    }

    Ok(())
}
