//! # rustscholar
//!
//! Google Scholar result-page parser and BibTeX fetcher.
//!
//! ## Modules
//!
//! - [`parser`] - Result-page layouts and citation-popup parsing
//! - [`record`] - Extracted article records
//! - [`querier`] - Search and two-hop BibTeX retrieval
//! - [`session`] - Per-querier HTTP client and cookie jar
//! - [`bibliography`] - BibTeX entry parsing
//! - [`metadata`] - Title/author identification
//! - [`pipeline`] - Text, CSV, BibTeX and URL-lookup rendering
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustscholar::querier::{QuerierConfig, ScholarQuerier};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut querier = ScholarQuerier::new(QuerierConfig::default())?;
//!     querier.query("deep learning", false).await?;
//!     println!("Found {} results", querier.articles().len());
//!     Ok(())
//! }
//! ```

pub mod bibliography;
pub mod error;
pub mod metadata;
pub mod parser;
pub mod pipeline;
pub mod querier;
pub mod record;
pub mod session;

pub use error::{Result, ScholarError};
pub use parser::LayoutVariant;
pub use querier::{CancelToken, QuerierConfig, ScholarQuerier};
pub use record::Record;
