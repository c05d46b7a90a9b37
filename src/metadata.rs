//! Metadata identification for a title/author lookup.
//!
//! Runs a BibTeX-enabled query and maps each resolved entry into an
//! [`ArticleMetadata`] record, ranked by its position on the results page.

use crate::bibliography::{BibliographyParser, BibliographyRecord, NameParts};
use crate::error::{Result, ScholarError};
use crate::querier::{CancelToken, QuerierConfig, ScholarQuerier};
use chrono::NaiveDate;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Identifier scheme under which the BibTeX key is recorded
pub const IDENTIFIER_SCHEME: &str = "googlescholar";

/// Highest relevance, given to the first result
const TOP_RELEVANCE: i32 = 100;

/// Metadata for one identified article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleMetadata {
    pub title: Option<String>,
    /// Display names, given names first
    pub authors: Vec<String>,
    /// `(scheme, value)`; the value is the BibTeX citation key
    pub identifier: (String, String),
    /// 100 for the first result, one less for each following result
    pub source_relevance: i32,
    pub publisher: Option<String>,
    /// January 1st of the publication year
    pub pubdate: Option<NaiveDate>,
}

impl ArticleMetadata {
    /// Map a parsed BibTeX entry found at `rank` (0-based) on the page.
    pub fn from_bibliography(slug: &str, record: &BibliographyRecord, rank: usize) -> Self {
        let rank = i32::try_from(rank).unwrap_or(i32::MAX);

        Self {
            title: record.title().map(str::to_string),
            authors: record.author.iter().map(display_name).collect(),
            identifier: (IDENTIFIER_SCHEME.to_string(), slug.to_string()),
            source_relevance: TOP_RELEVANCE.saturating_sub(rank),
            publisher: record.publisher().map(str::to_string),
            pubdate: record
                .year()
                .and_then(|y| y.parse::<i32>().ok())
                .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)),
        }
    }
}

/// "Given Family", with a full stop after each single-letter initial.
pub fn display_name(name: &NameParts) -> String {
    let given = name
        .given
        .as_deref()
        .map(|given| {
            given
                .split_whitespace()
                .map(|part| {
                    let mut chars = part.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) if c.is_ascii_uppercase() => format!("{}.", c),
                        _ => part.to_string(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|g| !g.is_empty());

    match given {
        Some(given) => format!("{} {}", given, name.family),
        None => name.family.clone(),
    }
}

/// Search for `title` and map every resolvable result.
///
/// The first of `authors` filters the search. Results are limited to the
/// configured count when it is non-zero. Entries whose BibTeX does not
/// parse are logged and skipped.
pub async fn identify(
    config: QuerierConfig,
    title: &str,
    authors: &[String],
    cancel: &CancelToken,
) -> Result<Vec<ArticleMetadata>> {
    let config = QuerierConfig {
        author: authors.first().cloned().unwrap_or_default(),
        ..config
    };

    let mut querier = ScholarQuerier::new(config)?;
    querier.query_with_cancel(title, true, cancel).await?;

    let count = querier.count() as usize;
    let mut articles = querier.into_articles();
    if count > 0 {
        articles.truncate(count);
    }

    let mut results = Vec::new();
    for (rank, article) in articles.iter().enumerate() {
        let Some(text) = article.bibtex() else {
            debug!(title = ?article.title, "No BibTeX for result");
            continue;
        };

        match BibliographyParser::parse_entry(text) {
            Ok((slug, record)) => {
                let metadata = ArticleMetadata::from_bibliography(&slug, &record, rank);
                info!(
                    slug = %slug,
                    title = ?metadata.title,
                    relevance = metadata.source_relevance,
                    "Identified article"
                );
                results.push(metadata);
            }
            Err(e) => warn!(error = %e, title = ?article.title, "Skipping unparseable BibTeX"),
        }
    }

    Ok(results)
}

/// Run [`identify`] on a spawned task and stop waiting after `deadline`.
///
/// When the deadline passes the task is asked to stop at its next
/// cancellation check; a request it has in flight still completes.
pub async fn identify_within(
    config: QuerierConfig,
    title: String,
    authors: Vec<String>,
    deadline: Duration,
) -> Result<Vec<ArticleMetadata>> {
    let cancel = CancelToken::new();
    let task_cancel = cancel.clone();

    let mut handle =
        tokio::spawn(async move { identify(config, &title, &authors, &task_cancel).await });

    match tokio::time::timeout(deadline, &mut handle).await {
        Ok(joined) => joined.map_err(|e| ScholarError::Worker(e.to_string()))?,
        Err(_) => {
            cancel.cancel();
            warn!(deadline = ?deadline, "Identification timed out");
            Err(ScholarError::Timeout(deadline))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const EXPORT: &str = "@article{lecun2015deep,
  title={Deep learning},
  author={LeCun, Yann and Bengio, Y and Hinton, G E},
  year={2015},
  publisher={Nature Publishing Group}
}
";

    fn name(given: Option<&str>, family: &str) -> NameParts {
        NameParts {
            given: given.map(str::to_string),
            family: family.to_string(),
        }
    }

    #[test]
    fn test_display_name_marks_initials() {
        assert_eq!(display_name(&name(Some("Yann"), "LeCun")), "Yann LeCun");
        assert_eq!(display_name(&name(Some("Y"), "Bengio")), "Y. Bengio");
        assert_eq!(display_name(&name(Some("G E"), "Hinton")), "G. E. Hinton");
        assert_eq!(display_name(&name(None, "Plato")), "Plato");
        assert_eq!(display_name(&name(Some(""), "Plato")), "Plato");
    }

    #[test]
    fn test_from_bibliography() -> Result<()> {
        let (slug, record) = BibliographyParser::parse_entry(EXPORT)?;
        let metadata = ArticleMetadata::from_bibliography(&slug, &record, 2);

        assert_eq!(metadata.title.as_deref(), Some("Deep learning"));
        assert_eq!(
            metadata.authors,
            vec!["Yann LeCun", "Y. Bengio", "G. E. Hinton"]
        );
        assert_eq!(
            metadata.identifier,
            ("googlescholar".to_string(), "lecun2015deep".to_string())
        );
        assert_eq!(metadata.source_relevance, 98);
        assert_eq!(metadata.publisher.as_deref(), Some("Nature Publishing Group"));
        assert_eq!(metadata.pubdate, NaiveDate::from_ymd_opt(2015, 1, 1));
        Ok(())
    }

    async fn mock_scholar(server: &mut Server) -> Vec<mockito::Mock> {
        let search = server
            .mock("GET", "/scholar")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".to_string(), "deep learning author:LeCun".to_string()),
                Matcher::UrlEncoded("btnG".to_string(), "Search".to_string()),
            ]))
            .with_status(200)
            .with_body(
                r##"<div class="gs_r"><div class="gs_ri">
                  <h3 class="gs_rt"><a href="/a">Deep learning</a></h3>
                  <div class="gs_fl"><a href="#" onclick="return gs_ocit(event,'abc123','0')">Cite</a></div>
                </div></div>"##,
            )
            .create_async()
            .await;
        let popup = server
            .mock("GET", "/scholar")
            .match_query(Matcher::UrlEncoded("output".to_string(), "cite".to_string()))
            .with_status(200)
            .with_body(r##"<a href="/scholar.bib?q=info:abc123&amp;scisig=S">BibTeX</a>"##)
            .create_async()
            .await;
        let export = server
            .mock("GET", "/scholar.bib")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(EXPORT)
            .create_async()
            .await;
        vec![search, popup, export]
    }

    #[tokio::test]
    async fn test_identify_end_to_end() -> Result<()> {
        let mut server = Server::new_async().await;
        let _mocks = mock_scholar(&mut server).await;

        let config = QuerierConfig {
            site: server.url(),
            count: 1,
            ..Default::default()
        };
        let authors = vec!["LeCun".to_string(), "Bengio".to_string()];
        let results = identify(config, "deep learning", &authors, &CancelToken::new()).await?;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identifier.1, "lecun2015deep");
        assert_eq!(results[0].source_relevance, 100);
        Ok(())
    }

    #[tokio::test]
    async fn test_identify_within_deadline() -> Result<()> {
        let mut server = Server::new_async().await;
        let _mocks = mock_scholar(&mut server).await;

        let config = QuerierConfig {
            site: server.url(),
            ..Default::default()
        };
        let results = identify_within(
            config,
            "deep learning".to_string(),
            vec!["LeCun".to_string()],
            Duration::from_secs(30),
        )
        .await?;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title.as_deref(), Some("Deep learning"));
        Ok(())
    }
}
