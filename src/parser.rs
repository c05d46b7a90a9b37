//! Result-page parsing for the Google Scholar layouts we know about.
//!
//! Scholar has changed its results markup several times. Each revision is
//! handled by one [`ResultBlockExtractor`]; all of them share the
//! [`LinkExtractor`] that reads citation counts, version counts and the
//! BibTeX popup identifier out of a result's footer links.
//!
//! Parsing is tolerant: a block without a title is dropped, and a link
//! whose text does not carry a number leaves the count at zero.

use crate::error::{Result, ScholarError};
use crate::record::Record;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Default Google Scholar origin
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// Path prefix of "Cited by" links
pub const CITATIONS_PREFIX: &str = "/scholar?cites";

/// Path prefix of "All N versions" links
pub const VERSIONS_PREFIX: &str = "/scholar?cluster";

/// Path prefix of the BibTeX export link on the citation popup
pub const BIBTEX_EXPORT_PREFIX: &str = "/scholar.bib";

/// Scholar markup revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutVariant {
    /// Title inside `div.gs_rt > h3`, footer links inside `font > span.gs_fl`.
    Legacy,
    /// `h3.gs_rt`, `div.gs_a` and `div.gs_fl` directly under the block.
    Heading,
    /// Everything wrapped one level deeper in `div.gs_ri`.
    #[default]
    Current,
}

impl fmt::Display for LayoutVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayoutVariant::Legacy => "legacy",
            LayoutVariant::Heading => "heading",
            LayoutVariant::Current => "current",
        };
        f.write_str(name)
    }
}

impl FromStr for LayoutVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(LayoutVariant::Legacy),
            "heading" => Ok(LayoutVariant::Heading),
            "current" => Ok(LayoutVariant::Current),
            other => Err(format!(
                "unknown layout '{}' (expected legacy, heading or current)",
                other
            )),
        }
    }
}

/// Finds result blocks in a document and turns one block into a record.
pub trait ResultBlockExtractor {
    /// Candidate result containers, in document order.
    fn select_blocks<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>>;

    /// Extract a record from one block. The record may lack a title.
    fn extract(&self, block: ElementRef<'_>, links: &LinkExtractor) -> Record;
}

/// Footer link handling shared by every layout.
pub struct LinkExtractor {
    site: String,
    anchor: Selector,
    year_re: Regex,
    ocit_re: Regex,
}

impl LinkExtractor {
    pub fn new(site: &str) -> Result<Self> {
        Ok(Self {
            site: site.trim_end_matches('/').to_string(),
            anchor: selector("a")?,
            year_re: Regex::new(r"\b(?:19|20)\d{2}\b")
                .map_err(|e| ScholarError::Parse(e.to_string()))?,
            ocit_re: Regex::new(r"event,\s*'([\w-]+)'")
                .map_err(|e| ScholarError::Parse(e.to_string()))?,
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    /// Make a link target absolute against the origin.
    ///
    /// Targets that already carry a scheme pass through unchanged, and
    /// protocol-relative targets (`//host/path`) take the origin's scheme.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if let Some(rest) = path.strip_prefix("//") {
            let scheme = self.site.split_once("://").map_or("https", |(s, _)| s);
            return format!("{}://{}", scheme, rest);
        }
        if path.starts_with('/') {
            format!("{}{}", self.site, path)
        } else {
            format!("{}/{}", self.site, path)
        }
    }

    /// First year-looking token in `text`.
    pub fn extract_year(&self, text: &str) -> Option<String> {
        self.year_re.find(text).map(|m| m.as_str().to_string())
    }

    /// Set title and url from a title link.
    pub fn apply_title_link(&self, link: ElementRef<'_>, record: &mut Record) {
        record.title = Some(text_of(link).trim().to_string());
        if let Some(href) = link.value().attr("href") {
            record.url = Some(self.resolve(href));
        }
    }

    /// Read citation, version and BibTeX-id links from a footer container.
    ///
    /// When several anchors qualify for the same field the last one wins.
    pub fn extract_links(&self, container: ElementRef<'_>, record: &mut Record) {
        for anchor in container.select(&self.anchor) {
            let element = anchor.value();

            if let Some(href) = element.attr("href") {
                let text = text_of(anchor);
                let text = text.trim();

                if href.starts_with(CITATIONS_PREFIX) {
                    if text.starts_with("Cited by") {
                        if let Some(n) = text.split_whitespace().last().and_then(|t| t.parse().ok()) {
                            record.num_citations = n;
                        }
                    }
                    record.url_citations = Some(self.resolve(href));
                }

                if href.starts_with(VERSIONS_PREFIX) {
                    if text.starts_with("All ") {
                        if let Some(n) = text.split_whitespace().nth(1).and_then(|t| t.parse().ok()) {
                            record.num_versions = n;
                        }
                    }
                    record.url_versions = Some(self.resolve(href));
                }
            }

            if let Some(onclick) = element.attr("onclick") {
                if onclick.trim_start().starts_with("return gs_ocit") {
                    match self.ocit_re.captures(onclick).and_then(|c| c.get(1)) {
                        Some(id) => record.bibtex_id = Some(id.as_str().to_string()),
                        None => debug!(onclick, "Citation popup handler without identifier"),
                    }
                }
            }
        }
    }
}

/// Oldest layout: `div.gs_rt > h3 > a` and `font > span.gs_fl`.
pub struct LegacyLayout {
    blocks: Selector,
    heading_link: Selector,
}

impl LegacyLayout {
    pub fn new() -> Result<Self> {
        Ok(Self {
            blocks: selector("div.gs_r")?,
            heading_link: selector("h3 a")?,
        })
    }
}

impl ResultBlockExtractor for LegacyLayout {
    fn select_blocks<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        document.select(&self.blocks).collect()
    }

    fn extract(&self, block: ElementRef<'_>, links: &LinkExtractor) -> Record {
        let mut record = Record::new();

        for child in child_elements(block) {
            let name = child.value().name();

            if name == "div" && has_class(child, "gs_rt") {
                if let Some(link) = child.select(&self.heading_link).next() {
                    links.apply_title_link(link, &mut record);
                }
            }

            if name == "font" {
                for inner in child_elements(child) {
                    if inner.value().name() == "span" && has_class(inner, "gs_fl") {
                        links.extract_links(inner, &mut record);
                    }
                }
            }
        }

        record
    }
}

/// `h3.gs_rt`, `div.gs_a`, `div.gs_fl` as direct children of the block.
pub struct HeadingLayout {
    blocks: Selector,
    link: Selector,
}

impl HeadingLayout {
    pub fn new() -> Result<Self> {
        Ok(Self {
            blocks: selector("div.gs_r")?,
            link: selector("a")?,
        })
    }
}

impl ResultBlockExtractor for HeadingLayout {
    fn select_blocks<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        document.select(&self.blocks).collect()
    }

    fn extract(&self, block: ElementRef<'_>, links: &LinkExtractor) -> Record {
        let mut record = Record::new();

        for child in child_elements(block) {
            match child.value().name() {
                "h3" if has_class(child, "gs_rt") => {
                    if let Some(link) = child.select(&self.link).next() {
                        links.apply_title_link(link, &mut record);
                    }
                }
                "div" if has_class(child, "gs_a") => {
                    record.year = links.extract_year(&text_of(child));
                }
                "div" if has_class(child, "gs_fl") => {
                    links.extract_links(child, &mut record);
                }
                _ => {}
            }
        }

        record
    }
}

/// Current layout: the heading layout nested inside `div.gs_ri`.
pub struct CurrentLayout {
    blocks: Selector,
    title_link: Selector,
    meta: Selector,
    footer: Selector,
}

impl CurrentLayout {
    pub fn new() -> Result<Self> {
        Ok(Self {
            blocks: selector("div.gs_r")?,
            title_link: selector("h3.gs_rt a")?,
            meta: selector("div.gs_a")?,
            footer: selector("div.gs_fl")?,
        })
    }
}

impl ResultBlockExtractor for CurrentLayout {
    fn select_blocks<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        document.select(&self.blocks).collect()
    }

    fn extract(&self, block: ElementRef<'_>, links: &LinkExtractor) -> Record {
        let mut record = Record::new();

        for child in child_elements(block) {
            if child.value().name() != "div" || !has_class(child, "gs_ri") {
                continue;
            }

            if let Some(link) = child.select(&self.title_link).next() {
                links.apply_title_link(link, &mut record);
            }

            if let Some(meta) = child.select(&self.meta).next() {
                record.year = links.extract_year(&text_of(meta));
            }

            if let Some(footer) = child.select(&self.footer).next() {
                links.extract_links(footer, &mut record);
            }
        }

        record
    }
}

/// Parses Scholar result pages and citation popups.
pub struct ScholarParser {
    variant: LayoutVariant,
    links: LinkExtractor,
    legacy: LegacyLayout,
    heading: HeadingLayout,
    current: CurrentLayout,
    anchor: Selector,
}

impl ScholarParser {
    /// Create a parser resolving relative links against `site`.
    pub fn new(site: &str, variant: LayoutVariant) -> Result<Self> {
        Ok(Self {
            variant,
            links: LinkExtractor::new(site)?,
            legacy: LegacyLayout::new()?,
            heading: HeadingLayout::new()?,
            current: CurrentLayout::new()?,
            anchor: selector("a[href]")?,
        })
    }

    pub fn variant(&self) -> LayoutVariant {
        self.variant
    }

    pub fn site(&self) -> &str {
        self.links.site()
    }

    /// Make a link target absolute against the origin.
    pub fn resolve(&self, path: &str) -> String {
        self.links.resolve(path)
    }

    fn extractor(&self) -> &dyn ResultBlockExtractor {
        match self.variant {
            LayoutVariant::Legacy => &self.legacy,
            LayoutVariant::Heading => &self.heading,
            LayoutVariant::Current => &self.current,
        }
    }

    /// Extract every titled result on the page, in document order.
    pub fn parse(&self, html: &str) -> Vec<Record> {
        let document = Html::parse_document(html);
        let extractor = self.extractor();

        let blocks = extractor.select_blocks(&document);
        let total = blocks.len();

        let records: Vec<Record> = blocks
            .into_iter()
            .map(|block| extractor.extract(block, &self.links))
            .filter(Record::has_title)
            .collect();

        debug!(
            layout = %self.variant,
            blocks = total,
            records = records.len(),
            "Parsed result page"
        );
        records
    }

    /// First link on a citation popup pointing at the BibTeX export.
    pub fn parse_bibtex_link(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        document
            .select(&self.anchor)
            .filter_map(|a| a.value().attr("href"))
            .find(|href| href.starts_with(BIBTEX_EXPORT_PREFIX))
            .map(str::to_string)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScholarError::Parse(e.to_string()))
}

fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect()
}
