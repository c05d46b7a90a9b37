//! Article records extracted from a Google Scholar results page.
//!
//! A [`Record`] keeps the eight fields the parser knows about in a fixed
//! display order. Callers may attach further fields by name; those are
//! shown after the known ones, in the order they were first set.

use crate::error::{Result, ScholarError};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// The fields a result block can populate, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Url,
    NumCitations,
    NumVersions,
    UrlCitations,
    UrlVersions,
    BibtexId,
    Year,
}

impl Field {
    /// All known fields, in display order.
    pub const ALL: [Field; 8] = [
        Field::Title,
        Field::Url,
        Field::NumCitations,
        Field::NumVersions,
        Field::UrlCitations,
        Field::UrlVersions,
        Field::BibtexId,
        Field::Year,
    ];

    /// Key used for lookup and as the CSV header.
    pub fn key(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Url => "url",
            Field::NumCitations => "num_citations",
            Field::NumVersions => "num_versions",
            Field::UrlCitations => "url_citations",
            Field::UrlVersions => "url_versions",
            Field::BibtexId => "bibtex_id",
            Field::Year => "year",
        }
    }

    /// Human-readable label used by the text rendering.
    pub fn label(self) -> &'static str {
        match self {
            Field::Title => "Title",
            Field::Url => "URL",
            Field::NumCitations => "Citations",
            Field::NumVersions => "Versions",
            Field::UrlCitations => "Citations list",
            Field::UrlVersions => "Versions list",
            Field::BibtexId => "Bibtex ID",
            Field::Year => "Year",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// One search result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub title: Option<String>,
    pub url: Option<String>,
    pub num_citations: u32,
    pub num_versions: u32,
    pub url_citations: Option<String>,
    pub url_versions: Option<String>,
    pub bibtex_id: Option<String>,
    /// Four-digit publication year
    pub year: Option<String>,
    extra: Vec<(String, String)>,
    bibtex: Option<String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the record carries a non-empty title.
    pub fn has_title(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Look up a field by key, rendered as a string.
    ///
    /// Unset optional fields and unknown keys yield `None`.
    pub fn get(&self, key: &str) -> Option<String> {
        match Field::from_key(key) {
            Some(field) => self.known_value(field),
            None => self
                .extra
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()),
        }
    }

    /// Set a field by key.
    ///
    /// Counts that do not parse as integers and years that are not four
    /// digits leave the current value untouched. Unknown keys are kept in
    /// first-seen order after the known fields.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match Field::from_key(key) {
            Some(Field::Title) => self.title = Some(value),
            Some(Field::Url) => self.url = Some(value),
            Some(Field::NumCitations) => {
                if let Ok(n) = value.trim().parse() {
                    self.num_citations = n;
                }
            }
            Some(Field::NumVersions) => {
                if let Ok(n) = value.trim().parse() {
                    self.num_versions = n;
                }
            }
            Some(Field::UrlCitations) => self.url_citations = Some(value),
            Some(Field::UrlVersions) => self.url_versions = Some(value),
            Some(Field::BibtexId) => self.bibtex_id = Some(value),
            Some(Field::Year) => {
                if is_year(&value) {
                    self.year = Some(value);
                }
            }
            None => match self.extra.iter_mut().find(|(k, _)| *k == key) {
                Some((_, v)) => *v = value,
                None => self.extra.push((key.to_string(), value)),
            },
        }
    }

    /// Reset a known field to its default, or drop an extra field.
    pub fn remove(&mut self, key: &str) {
        match Field::from_key(key) {
            Some(Field::Title) => self.title = None,
            Some(Field::Url) => self.url = None,
            Some(Field::NumCitations) => self.num_citations = 0,
            Some(Field::NumVersions) => self.num_versions = 0,
            Some(Field::UrlCitations) => self.url_citations = None,
            Some(Field::UrlVersions) => self.url_versions = None,
            Some(Field::BibtexId) => self.bibtex_id = None,
            Some(Field::Year) => self.year = None,
            None => self.extra.retain(|(k, _)| k != key),
        }
    }

    /// Keys in display order.
    pub fn keys(&self) -> Vec<&str> {
        Field::ALL
            .iter()
            .map(|f| f.key())
            .chain(self.extra.iter().map(|(k, _)| k.as_str()))
            .collect()
    }

    /// `(label, value)` pairs in display order. Unset values are empty.
    pub fn fields(&self) -> Vec<(&str, String)> {
        Field::ALL
            .iter()
            .map(|&f| (f.label(), self.known_value(f).unwrap_or_default()))
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.clone())))
            .collect()
    }

    pub fn bibtex(&self) -> Option<&str> {
        self.bibtex.as_deref()
    }

    pub fn set_bibtex(&mut self, bibtex: impl Into<String>) {
        self.bibtex = Some(bibtex.into());
    }

    /// One line per field, labels right-aligned.
    pub fn as_txt(&self) -> String {
        let fields = self.fields();
        let width = fields.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
        fields
            .iter()
            .map(|(label, value)| format!("{:>width$} {}", label, value, width = width))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Delimited rendering with an optional header row of keys.
    pub fn as_csv(&self, header: bool, sep: u8) -> Result<String> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(sep)
            .quote_style(csv::QuoteStyle::Never)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        if header {
            wtr.write_record(self.keys())?;
        }
        wtr.write_record(self.fields().into_iter().map(|(_, v)| v))?;

        let bytes = wtr
            .into_inner()
            .map_err(|e| ScholarError::Io(e.into_error()))?;
        let text = String::from_utf8(bytes).map_err(|e| ScholarError::Parse(e.to_string()))?;
        Ok(text.trim_end_matches('\n').to_string())
    }

    /// The raw bibliography entry, or an empty string.
    pub fn as_bib(&self) -> &str {
        self.bibtex.as_deref().unwrap_or("")
    }

    fn known_value(&self, field: Field) -> Option<String> {
        match field {
            Field::Title => self.title.clone(),
            Field::Url => self.url.clone(),
            Field::NumCitations => Some(self.num_citations.to_string()),
            Field::NumVersions => Some(self.num_versions.to_string()),
            Field::UrlCitations => self.url_citations.clone(),
            Field::UrlVersions => self.url_versions.clone(),
            Field::BibtexId => self.bibtex_id.clone(),
            Field::Year => self.year.clone(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("title", &self.title)?;
        map.serialize_entry("url", &self.url)?;
        map.serialize_entry("num_citations", &self.num_citations)?;
        map.serialize_entry("num_versions", &self.num_versions)?;
        map.serialize_entry("url_citations", &self.url_citations)?;
        map.serialize_entry("url_versions", &self.url_versions)?;
        map.serialize_entry("bibtex_id", &self.bibtex_id)?;
        map.serialize_entry("year", &self.year)?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        if let Some(bibtex) = &self.bibtex {
            map.serialize_entry("bibtex", bibtex)?;
        }
        map.end()
    }
}

fn is_year(value: &str) -> bool {
    value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit())
}
