//! rustscholar - Google Scholar result-page parser and BibTeX fetcher
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! rustscholar search "deep learning" --count 5 --format csv-header
//! rustscholar url "Deep learning" --author LeCun
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! rustscholar serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use clap::{Parser, Subcommand};
use rustscholar::{
    metadata, pipeline,
    session::{SessionCookie, SessionOptions},
    LayoutVariant, QuerierConfig, Record, ScholarQuerier,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Google Scholar result-page parser and BibTeX fetcher
#[derive(Parser)]
#[command(name = "rustscholar")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Scholar origin (mirror sites work too)
    #[arg(long, global = true, default_value = rustscholar::parser::DEFAULT_SCHOLAR_URL)]
    site: String,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Proxy URL (e.g., http://127.0.0.1:7890)
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Result page layout: current, heading or legacy
    #[arg(long, global = true, default_value = "current")]
    layout: LayoutVariant,

    /// Session cookie to send, as NAME=VALUE (repeatable)
    #[arg(long = "cookie", global = true)]
    cookies: Vec<SessionCookie>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search and print the first results page
    Search {
        /// Search keywords
        #[arg(required = true)]
        query: Vec<String>,

        /// Author name
        #[arg(short, long, default_value = "")]
        author: String,

        /// Maximum number of results (0 = Scholar's default, at most 100)
        #[arg(short, long, default_value = "0")]
        count: u32,

        /// Output format
        #[arg(long, default_value = "txt", value_parser = ["txt", "csv", "csv-header", "bib"])]
        format: String,

        /// CSV separator
        #[arg(long, default_value = "|")]
        sep: char,
    },

    /// Look up the URL and year of an article by exact title
    Url {
        /// Article title
        #[arg(required = true)]
        title: Vec<String>,

        /// Author name
        #[arg(short, long, default_value = "")]
        author: String,
    },

    /// List titles found for an author
    Titles {
        /// Author name
        #[arg(short, long)]
        author: String,
    },

    /// Identify an article and print its metadata as JSON
    Identify {
        /// Article title
        #[arg(required = true)]
        title: Vec<String>,

        /// Author names; the first one filters the search
        #[arg(short, long)]
        author: Vec<String>,

        /// Maximum number of matches to evaluate
        #[arg(short, long, default_value = "1")]
        count: u32,

        /// Give up after this many seconds
        #[arg(long, default_value = "30")]
        deadline: u64,
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
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for results
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    let base = QuerierConfig {
        site: cli.site,
        layout: cli.layout,
        session: SessionOptions {
            timeout: cli.timeout.map(Duration::from_secs),
            proxy: cli.proxy,
            cookies: cli.cookies,
        },
        ..Default::default()
    };

    match cli.command {
        Commands::Search {
            query,
            author,
            count,
            format,
            sep,
        } => run_search(base, query.join(" "), author, count, &format, sep).await,
        Commands::Url { title, author } => run_url(base, title.join(" "), author).await,
        Commands::Titles { author } => {
            let config = QuerierConfig { author, ..base };
            for title in pipeline::titles(config).await? {
                println!("{}", title);
            }
            Ok(())
        }
        Commands::Identify {
            title,
            author,
            count,
            deadline,
        } => {
            let config = QuerierConfig { count, ..base };
            let results = metadata::identify_within(
                config,
                title.join(" "),
                author,
                Duration::from_secs(deadline),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Commands::Serve { port, host } => run_server(base, host, port).await,
    }
}

// ============================================================================
// Search / Lookup
// ============================================================================

async fn run_search(
    base: QuerierConfig,
    query: String,
    author: String,
    count: u32,
    format: &str,
    sep: char,
) -> Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("I need a query string");
    }

    let config = QuerierConfig {
        author,
        count,
        ..base
    };

    let output = match format {
        "bib" => pipeline::bib(config, &query).await?,
        "csv" | "csv-header" => {
            let sep = u8::try_from(sep)
                .ok()
                .filter(u8::is_ascii)
                .context("CSV separator must be a single ASCII character")?;
            pipeline::csv(config, &query, format == "csv-header", sep).await?
        }
        _ => pipeline::txt(config, &query).await?,
    };

    println!("{}", output);
    Ok(())
}

async fn run_url(base: QuerierConfig, title: String, author: String) -> Result<()> {
    let config = QuerierConfig { author, ..base };

    match pipeline::url(config, &title).await? {
        Some(found) => {
            println!("url:  {}", found.url.unwrap_or_default());
            println!("year: {}", found.year.unwrap_or_default());
        }
        None => println!("No article titled {:?} found.", title),
    }
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(base: QuerierConfig, host: String, port: u16) -> Result<()> {
    info!(host = %host, port = port, site = %base.site, "Starting HTTP server");

    let app_state = Arc::new(AppState { base });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/search", post(search_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

struct AppState {
    /// Site, layout and session settings shared by every request
    base: QuerierConfig,
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Search request body
#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    count: u32,
    #[serde(default)]
    bibtex: bool,
}

/// Search response
#[derive(Debug, Serialize)]
struct SearchResponse {
    status: String,
    count: usize,
    results: Vec<Record>,
}

/// Search endpoint handler; every request gets its own session
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Json<SearchResponse> {
    info!(query = %req.query, author = %req.author, bibtex = req.bibtex, "Search request");

    let config = QuerierConfig {
        author: req.author,
        count: req.count,
        ..state.base.clone()
    };

    let result = async {
        let mut querier = ScholarQuerier::new(config)?;
        querier.query(&req.query, req.bibtex).await?;
        Ok::<_, rustscholar::ScholarError>(querier.into_articles())
    }
    .await;

    match result {
        Ok(results) => Json(SearchResponse {
            status: "success".to_string(),
            count: results.len(),
            results,
        }),
        Err(e) => {
            error!(error = %e, "Search failed");
            Json(SearchResponse {
                status: format!("error: {}", e),
                count: 0,
                results: vec![],
            })
        }
    }
}
