//! HTTP session state for one querier.
//!
//! Scholar hands out a session cookie on first contact and expects it on
//! every later request, including the citation popup and BibTeX export.
//! A [`Session`] owns the client and its cookie jar. Nothing is shared
//! between sessions unless the caller passes the same jar in explicitly.

use crate::error::{Result, ScholarError};
use reqwest::cookie::Jar;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// User agent string for requests
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.8; rv:21.0) Gecko/20100101 Firefox/21.0";

/// A `name=value` cookie to seed into a fresh jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

impl FromStr for SessionCookie {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("cookie name is empty in '{}'", s));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }
}

/// Options for building a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Per-request timeout; `None` keeps reqwest's default
    pub timeout: Option<Duration>,
    /// Proxy URL (e.g., "http://127.0.0.1:7890")
    pub proxy: Option<String>,
    /// Cookies seeded for the origin before the first request
    pub cookies: Vec<SessionCookie>,
}

/// HTTP client plus the cookie jar it reads and writes.
pub struct Session {
    client: reqwest::Client,
    jar: Arc<Jar>,
}

impl Session {
    /// Build a session with a fresh, empty cookie jar.
    pub fn new(site: &Url, options: &SessionOptions) -> Result<Self> {
        Self::with_jar(Arc::new(Jar::default()), site, options)
    }

    /// Build a session around an existing jar.
    pub fn with_jar(jar: Arc<Jar>, site: &Url, options: &SessionOptions) -> Result<Self> {
        for cookie in &options.cookies {
            jar.add_cookie_str(&format!("{}={}; Path=/", cookie.name, cookie.value), site);
        }
        if !options.cookies.is_empty() {
            debug!(count = options.cookies.len(), site = %site, "Seeded session cookies");
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar));

        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(proxy_url) = options.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                ScholarError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, jar })
    }

    /// The jar backing this session.
    pub fn jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    /// GET `url` and return the body.
    ///
    /// Transport failures and non-success statuses are errors.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!(url, "GET");

        let response = self
            .client
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScholarError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}
