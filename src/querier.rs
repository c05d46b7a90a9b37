//! Google Scholar querier.
//!
//! A [`ScholarQuerier`] runs one search per [`query`](ScholarQuerier::query)
//! call, parses the first results page and accumulates the records. When
//! asked for BibTeX it resolves each record through two more requests:
//! the citation popup (keyed by the record's `bibtex_id`) and the export
//! link found on it. All requests go through the querier's own
//! [`Session`], so the cookie Scholar sets on the search is carried to
//! the popup and the export.
//!
//! Requests are strictly sequential. There is no pagination, no retry and
//! no pacing.

use crate::error::{Result, ScholarError};
use crate::parser::{LayoutVariant, ScholarParser, DEFAULT_SCHOLAR_URL};
use crate::record::Record;
use crate::session::{Session, SessionOptions};
use reqwest::cookie::Jar;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Scholar does not return more than 100 results per page.
pub const MAX_RESULTS: u32 = 100;

/// Querier configuration.
#[derive(Debug, Clone)]
pub struct QuerierConfig {
    /// Origin used for requests and for resolving relative links
    pub site: String,
    /// Author filter; empty searches without one
    pub author: String,
    /// Requested results per page, 0 for Scholar's default
    pub count: u32,
    /// Markup revision to parse
    pub layout: LayoutVariant,
    /// HTTP client settings
    pub session: SessionOptions,
}

impl Default for QuerierConfig {
    fn default() -> Self {
        Self {
            site: DEFAULT_SCHOLAR_URL.to_string(),
            author: String::new(),
            count: 0,
            layout: LayoutVariant::default(),
            session: SessionOptions::default(),
        }
    }
}

/// Cooperative cancellation flag.
///
/// Checked between round trips only; a request already in flight runs
/// to completion or failure.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ScholarQuerier {
    session: Session,
    parser: ScholarParser,
    author: String,
    count: u32,
    articles: Vec<Record>,
}

impl ScholarQuerier {
    /// Create a querier with its own, empty cookie jar.
    pub fn new(config: QuerierConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Create a querier that reads and writes the given cookie jar.
    pub fn with_cookie_jar(config: QuerierConfig, jar: Arc<Jar>) -> Result<Self> {
        Self::build(config, Some(jar))
    }

    fn build(config: QuerierConfig, jar: Option<Arc<Jar>>) -> Result<Self> {
        let site = Url::parse(&config.site)
            .map_err(|e| ScholarError::Config(format!("Invalid site '{}': {}", config.site, e)))?;
        if !matches!(site.scheme(), "http" | "https") {
            return Err(ScholarError::Config(format!(
                "Site must be an http(s) URL: {}",
                config.site
            )));
        }

        let session = match jar {
            Some(jar) => Session::with_jar(jar, &site, &config.session)?,
            None => Session::new(&site, &config.session)?,
        };
        let parser = ScholarParser::new(&config.site, config.layout)?;

        if config.count > MAX_RESULTS {
            debug!(requested = config.count, max = MAX_RESULTS, "Clamping result count");
        }

        Ok(Self {
            session,
            parser,
            author: config.author,
            count: config.count.min(MAX_RESULTS),
            articles: Vec::new(),
        })
    }

    pub fn site(&self) -> &str {
        self.parser.site()
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn cookie_jar(&self) -> Arc<Jar> {
        self.session.jar()
    }

    /// Records accumulated so far, in the order they were found.
    pub fn articles(&self) -> &[Record] {
        &self.articles
    }

    pub fn into_articles(self) -> Vec<Record> {
        self.articles
    }

    pub fn clear_articles(&mut self) {
        self.articles.clear();
    }

    /// Build the search URL for `search` under the configured author filter.
    pub fn search_url(&self, search: &str) -> String {
        let query = urlencoding::encode(search);
        let mut url = if self.author.is_empty() {
            format!(
                "{}/scholar?hl=en&q={}&btnG=Search&as_subj=eng&as_sdt=1,5&as_ylo=&as_vis=0",
                self.site(),
                query
            )
        } else {
            format!(
                "{}/scholar?hl=en&q={}+author:{}&btnG=Search&as_subj=eng&as_sdt=1,5&as_ylo=&as_vis=0",
                self.site(),
                query,
                urlencoding::encode(&self.author)
            )
        };

        if self.count != 0 {
            url.push_str(&format!("&num={}", self.count));
        }
        url
    }

    /// URL of the citation popup for a record's `bibtex_id`.
    pub fn citation_info_url(&self, bibtex_id: &str) -> String {
        format!(
            "{}/scholar?q=info:{}:scholar.google.com/&output=cite&hl=de&as_sdt=0,5",
            self.site(),
            urlencoding::encode(bibtex_id)
        )
    }

    /// Search Scholar and append the records found.
    ///
    /// With `bibtex`, every accumulated record that has no BibTeX yet is
    /// resolved afterwards.
    pub async fn query(&mut self, search: &str, bibtex: bool) -> Result<()> {
        self.query_with_cancel(search, bibtex, &CancelToken::new())
            .await
    }

    /// Like [`query`](Self::query), checking `cancel` before each
    /// BibTeX resolution.
    ///
    /// On cancellation the records found so far stay in
    /// [`articles`](Self::articles) and `ScholarError::Cancelled` is
    /// returned.
    pub async fn query_with_cancel(
        &mut self,
        search: &str,
        bibtex: bool,
        cancel: &CancelToken,
    ) -> Result<()> {
        let url = self.search_url(search);
        info!(query = search, author = %self.author, url = %url, "Starting Google Scholar query");

        let html = self.session.get_text(&url).await?;
        let found = self.parse(&html);
        info!(count = found, "Parsed results");

        if !bibtex {
            return Ok(());
        }

        for index in 0..self.articles.len() {
            if cancel.is_cancelled() {
                warn!(remaining = self.articles.len() - index, "BibTeX resolution cancelled");
                return Err(ScholarError::Cancelled);
            }

            let record = &self.articles[index];
            if record.bibtex().is_some() {
                continue;
            }
            let Some(bibtex_id) = record.bibtex_id.clone().filter(|id| !id.is_empty()) else {
                debug!(title = ?record.title, "No bibtex_id, skipping BibTeX lookup");
                continue;
            };

            if let Some(text) = self.fetch_bibtex(&bibtex_id).await? {
                self.articles[index].set_bibtex(text);
            }
        }

        let resolved = self.articles.iter().filter(|r| r.bibtex().is_some()).count();
        info!(resolved, total = self.articles.len(), "BibTeX resolution complete");
        Ok(())
    }

    /// Parse a results page and append its records. Returns how many
    /// records the page yielded.
    pub fn parse(&mut self, html: &str) -> usize {
        let records = self.parser.parse(html);
        let count = records.len();
        self.articles.extend(records);
        count
    }

    /// Fetch the BibTeX entry for `bibtex_id`.
    ///
    /// Returns `None` when the citation popup carries no export link.
    pub async fn fetch_bibtex(&self, bibtex_id: &str) -> Result<Option<String>> {
        let popup = self
            .session
            .get_text(&self.citation_info_url(bibtex_id))
            .await?;

        let Some(path) = self.parser.parse_bibtex_link(&popup) else {
            warn!(bibtex_id, "No BibTeX export link on citation popup");
            return Ok(None);
        };

        let body = self.session.get_text(&self.parser.resolve(&path)).await?;
        Ok(Some(body.trim_end().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const TWO_RESULTS: &str = r##"<html><body><div id="gs_res_ccl_mid">
<div class="gs_r gs_or gs_scl">
  <div class="gs_ri">
    <h3 class="gs_rt"><a href="/citations?view_op=view_citation&amp;citation_for_view=a">Deep learning</a></h3>
    <div class="gs_a">Y LeCun, Y Bengio, G Hinton - nature, 2015 - nature.com</div>
    <div class="gs_fl"><a href="/scholar?cites=1">Cited by 75000</a><a href="/scholar?cluster=1">All 41 versions</a></div>
  </div>
</div>
<div class="gs_r gs_or gs_scl">
  <div class="gs_ri">
    <h3 class="gs_rt"><a href="/citations?view_op=view_citation&amp;citation_for_view=b">Deep learning in neural networks: An overview</a></h3>
    <div class="gs_a">J Schmidhuber - Neural networks, 2015 - Elsevier</div>
    <div class="gs_fl"><a href="/scholar?cites=2">Cited by 20000</a></div>
  </div>
</div>
</div></body></html>"##;

    const RESOLVABLE_RESULTS: &str = r##"<html><body>
<div class="gs_r"><div class="gs_ri">
  <h3 class="gs_rt"><a href="/a">First</a></h3>
  <div class="gs_fl"><a href="#" onclick="return gs_ocit(event,'abc123','0')">Cite</a></div>
</div></div>
<div class="gs_r"><div class="gs_ri">
  <h3 class="gs_rt"><a href="/b">Second</a></h3>
  <div class="gs_fl"><a href="/scholar?cites=9">Cited by 9</a></div>
</div></div>
<div class="gs_r"><div class="gs_ri">
  <h3 class="gs_rt"><a href="/c">Third</a></h3>
  <div class="gs_fl"><a href="#" onclick="return gs_ocit(event,'def456','0')">Cite</a></div>
</div></div>
</body></html>"##;

    const CITE_POPUP: &str = r##"<div id="gs_cit">
<a class="gs_citi" href="/scholar.enw?q=info:abc123:scholar.google.com/&amp;output=citation">EndNote</a>
<a class="gs_citi" href="/scholar.bib?q=info:abc123:scholar.google.com/&amp;output=citation&amp;scisig=SIG">BibTeX</a>
</div>"##;

    const EXPORT_BODY: &str = "@article{lecun2015deep,\n  title={Deep learning},\n  year={2015}\n}\n\n";

    fn config_for(site: &str) -> QuerierConfig {
        QuerierConfig {
            site: site.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_search_url_without_author() -> Result<()> {
        let querier = ScholarQuerier::new(config_for("https://scholar.example.org/"))?;
        assert_eq!(
            querier.search_url("deep learning"),
            "https://scholar.example.org/scholar?hl=en&q=deep%20learning&btnG=Search&as_subj=eng&as_sdt=1,5&as_ylo=&as_vis=0"
        );
        Ok(())
    }

    #[test]
    fn test_search_url_with_author_and_count() -> Result<()> {
        let querier = ScholarQuerier::new(QuerierConfig {
            author: "Geoffrey Hinton".to_string(),
            count: 20,
            ..config_for("https://scholar.example.org")
        })?;
        let url = querier.search_url("backprop");
        assert!(url.contains("q=backprop+author:Geoffrey%20Hinton&"));
        assert!(url.ends_with("&num=20"));
        Ok(())
    }

    #[test]
    fn test_count_is_clamped() -> Result<()> {
        let querier = ScholarQuerier::new(QuerierConfig {
            count: 250,
            ..Default::default()
        })?;
        assert_eq!(querier.count(), MAX_RESULTS);
        assert!(querier.search_url("x").ends_with("&num=100"));
        Ok(())
    }

    #[test]
    fn test_citation_info_url() -> Result<()> {
        let querier = ScholarQuerier::new(config_for("https://scholar.example.org"))?;
        assert_eq!(
            querier.citation_info_url("abc123"),
            "https://scholar.example.org/scholar?q=info:abc123:scholar.google.com/&output=cite&hl=de&as_sdt=0,5"
        );
        Ok(())
    }

    #[test]
    fn test_invalid_site_is_rejected() {
        assert!(matches!(
            ScholarQuerier::new(config_for("scholar.google.com")),
            Err(ScholarError::Config(_))
        ));
        assert!(matches!(
            ScholarQuerier::new(config_for("ftp://scholar.google.com")),
            Err(ScholarError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_query_parses_current_layout_in_order() -> Result<()> {
        let mut server = Server::new_async().await;
        let search = server
            .mock("GET", "/scholar")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".to_string(), "deep learning".to_string()),
                Matcher::UrlEncoded("num".to_string(), "2".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(TWO_RESULTS)
            .expect(1)
            .create_async()
            .await;

        let mut querier = ScholarQuerier::new(QuerierConfig {
            count: 2,
            ..config_for(&server.url())
        })?;
        querier.query("deep learning", false).await?;

        let articles = querier.articles();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title.as_deref(), Some("Deep learning"));
        assert_eq!(
            articles[1].title.as_deref(),
            Some("Deep learning in neural networks: An overview")
        );
        for article in articles {
            let url = article.url.as_deref().expect("url");
            assert!(url.starts_with(&server.url()));
        }
        assert_eq!(articles[0].num_versions, 41);

        search.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_bibtex_two_hop_skips_unresolvable_records() -> Result<()> {
        let mut server = Server::new_async().await;
        let search = server
            .mock("GET", "/scholar")
            .match_query(Matcher::UrlEncoded("btnG".to_string(), "Search".to_string()))
            .with_status(200)
            .with_body(RESOLVABLE_RESULTS)
            .expect(1)
            .create_async()
            .await;
        let popup_abc = server
            .mock("GET", "/scholar")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".to_string(), "info:abc123:scholar.google.com/".to_string()),
                Matcher::UrlEncoded("output".to_string(), "cite".to_string()),
            ]))
            .with_status(200)
            .with_body(CITE_POPUP)
            .expect(1)
            .create_async()
            .await;
        let popup_def = server
            .mock("GET", "/scholar")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".to_string(), "info:def456:scholar.google.com/".to_string()),
                Matcher::UrlEncoded("output".to_string(), "cite".to_string()),
            ]))
            .with_status(200)
            .with_body("<div>No export links here</div>")
            .expect(1)
            .create_async()
            .await;
        let export = server
            .mock("GET", "/scholar.bib")
            .match_query(Matcher::UrlEncoded("scisig".to_string(), "SIG".to_string()))
            .with_status(200)
            .with_body(EXPORT_BODY)
            .expect(1)
            .create_async()
            .await;

        let mut querier = ScholarQuerier::new(config_for(&server.url()))?;
        querier.query("deep learning", true).await?;

        let articles = querier.articles();
        assert_eq!(articles.len(), 3);
        assert_eq!(articles[0].bibtex(), Some(EXPORT_BODY.trim_end()));
        assert_eq!(articles[1].bibtex_id, None);
        assert_eq!(articles[1].as_bib(), "");
        assert_eq!(articles[2].bibtex_id.as_deref(), Some("def456"));
        assert_eq!(articles[2].as_bib(), "");

        search.assert_async().await;
        popup_abc.assert_async().await;
        popup_def.assert_async().await;
        export.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_stops_before_bibtex_lookup() -> Result<()> {
        let mut server = Server::new_async().await;
        let _search = server
            .mock("GET", "/scholar")
            .match_query(Matcher::UrlEncoded("btnG".to_string(), "Search".to_string()))
            .with_status(200)
            .with_body(RESOLVABLE_RESULTS)
            .create_async()
            .await;
        let popup = server
            .mock("GET", "/scholar")
            .match_query(Matcher::UrlEncoded("output".to_string(), "cite".to_string()))
            .expect(0)
            .create_async()
            .await;

        let cancel = CancelToken::new();
        cancel.cancel();

        let mut querier = ScholarQuerier::new(config_for(&server.url()))?;
        let result = querier.query_with_cancel("x", true, &cancel).await;

        assert!(matches!(result, Err(ScholarError::Cancelled)));
        assert_eq!(querier.articles().len(), 3);
        popup.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() -> Result<()> {
        let mut server = Server::new_async().await;
        let _search = server
            .mock("GET", "/scholar")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let mut querier = ScholarQuerier::new(config_for(&server.url()))?;
        let result = querier.query("x", false).await;

        assert!(matches!(result, Err(ScholarError::Http { status: 500, .. })));
        assert!(querier.articles().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_session_cookie_follows_two_hop_but_not_other_queriers() -> Result<()> {
        const ONE_RESULT: &str = r##"<div class="gs_r"><div class="gs_ri">
  <h3 class="gs_rt"><a href="/a">First</a></h3>
  <div class="gs_fl"><a href="#" onclick="return gs_ocit(event,'abc123','0')">Cite</a></div>
</div></div>"##;

        let mut server = Server::new_async().await;
        let first_search = server
            .mock("GET", "/scholar")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".to_string(), "first".to_string()),
                Matcher::UrlEncoded("btnG".to_string(), "Search".to_string()),
            ]))
            .match_header("cookie", Matcher::Missing)
            .with_status(200)
            .with_header("set-cookie", "GSP=abc; Path=/")
            .with_body(ONE_RESULT)
            .expect(1)
            .create_async()
            .await;
        let popup = server
            .mock("GET", "/scholar")
            .match_query(Matcher::UrlEncoded("output".to_string(), "cite".to_string()))
            .match_header("cookie", "GSP=abc")
            .with_status(200)
            .with_body(CITE_POPUP)
            .expect(1)
            .create_async()
            .await;
        let export = server
            .mock("GET", "/scholar.bib")
            .match_query(Matcher::Any)
            .match_header("cookie", "GSP=abc")
            .with_status(200)
            .with_body(EXPORT_BODY)
            .expect(1)
            .create_async()
            .await;
        let second_search = server
            .mock("GET", "/scholar")
            .match_query(Matcher::UrlEncoded("q".to_string(), "second".to_string()))
            .match_header("cookie", Matcher::Missing)
            .with_status(200)
            .with_body(ONE_RESULT)
            .expect(1)
            .create_async()
            .await;

        let mut first = ScholarQuerier::new(config_for(&server.url()))?;
        first.query("first", true).await?;
        assert_eq!(first.articles()[0].bibtex(), Some(EXPORT_BODY.trim_end()));

        let mut second = ScholarQuerier::new(config_for(&server.url()))?;
        second.query("second", false).await?;
        assert_eq!(second.articles().len(), 1);

        first_search.assert_async().await;
        popup.assert_async().await;
        export.assert_async().await;
        second_search.assert_async().await;
        Ok(())
    }
}
