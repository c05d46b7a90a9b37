//! Presentation entry points: run one query and render its records.

use crate::error::Result;
use crate::querier::{QuerierConfig, ScholarQuerier};
use crate::record::Record;
use serde::Serialize;

/// Location of an article found by [`url`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlMatch {
    pub url: Option<String>,
    pub year: Option<String>,
}

async fn run(config: QuerierConfig, query: &str, bibtex: bool) -> Result<Vec<Record>> {
    let mut querier = ScholarQuerier::new(config)?;
    querier.query(query, bibtex).await?;

    let count = querier.count() as usize;
    let mut articles = querier.into_articles();
    if count > 0 {
        articles.truncate(count);
    }
    Ok(articles)
}

/// Text rendering, one block per record separated by blank lines.
pub async fn txt(config: QuerierConfig, query: &str) -> Result<String> {
    let articles = run(config, query, false).await?;
    Ok(articles
        .iter()
        .map(Record::as_txt)
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// Delimited rendering; the header row, if requested, precedes the first record only.
pub async fn csv(config: QuerierConfig, query: &str, header: bool, sep: u8) -> Result<String> {
    let articles = run(config, query, false).await?;

    let mut lines = Vec::with_capacity(articles.len());
    for (i, article) in articles.iter().enumerate() {
        lines.push(article.as_csv(header && i == 0, sep)?);
    }
    Ok(lines.join("\n"))
}

/// The BibTeX entries of all results, separated by blank lines.
pub async fn bib(config: QuerierConfig, query: &str) -> Result<String> {
    let articles = run(config, query, true).await?;
    Ok(articles
        .iter()
        .map(Record::as_bib)
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// Search for `title` and return the url and year of the result whose
/// title matches, ignoring case and whitespace.
pub async fn url(config: QuerierConfig, title: &str) -> Result<Option<UrlMatch>> {
    let config = QuerierConfig { count: 0, ..config };
    let articles = run(config, title, false).await?;

    let wanted = normalize_title(title);
    Ok(articles
        .into_iter()
        .find(|a| a.title.as_deref().map(normalize_title).as_deref() == Some(wanted.as_str()))
        .map(|a| UrlMatch {
            url: a.url,
            year: a.year,
        }))
}

/// Titles found by an empty query under the configured author.
pub async fn titles(config: QuerierConfig) -> Result<Vec<String>> {
    let articles = run(config, "", false).await?;
    Ok(articles.into_iter().filter_map(|a| a.title).collect())
}

fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
