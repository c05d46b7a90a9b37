//! BibTeX entry parsing.
//!
//! Turns the export body fetched for a record into a field map keyed by
//! the entry's citation key. Authors are split into given/family parts
//! and the year is exposed as `issued.literal`, the shape downstream
//! metadata mapping expects.

use crate::error::{OptionExt, Result, ScholarError};
use biblatex::{Bibliography, Chunk, Entry, Person, Spanned};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One author name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameParts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    pub family: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issued {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
}

/// Fields of one parsed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographyRecord {
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<NameParts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<Issued>,
    /// Every other field as plain text, keyed by lowercase field name
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl BibliographyRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title")
    }

    pub fn publisher(&self) -> Option<&str> {
        self.get("publisher")
    }

    /// The `issued.literal` year, if any.
    pub fn year(&self) -> Option<&str> {
        self.issued.as_ref().and_then(|i| i.literal.as_deref())
    }

    fn from_entry(entry: &Entry) -> Self {
        let author = entry
            .author()
            .unwrap_or_default()
            .iter()
            .filter(|p| !p.name.is_empty() || !p.given_name.is_empty())
            .map(name_parts)
            .collect();

        let mut issued = None;
        let mut fields = BTreeMap::new();
        for (key, chunks) in &entry.fields {
            let value = chunks_to_string(chunks);
            match key.as_str() {
                "author" => {}
                "year" => {
                    issued = Some(Issued {
                        literal: Some(value.trim().to_string()),
                    })
                }
                _ => {
                    fields.insert(key.to_lowercase(), value);
                }
            }
        }

        Self {
            entry_type: entry.entry_type.to_string(),
            author,
            issued,
            fields,
        }
    }
}

/// Parser for exported BibTeX text.
pub struct BibliographyParser;

impl BibliographyParser {
    /// Parse every entry in `text`, keyed by citation key.
    pub fn parse(text: &str) -> Result<BTreeMap<String, BibliographyRecord>> {
        let bibliography = parse_bibliography(text)?;
        Ok(bibliography
            .iter()
            .map(|entry| (entry.key.clone(), BibliographyRecord::from_entry(entry)))
            .collect())
    }

    /// Parse the first entry in `text`, returning its key and fields.
    pub fn parse_entry(text: &str) -> Result<(String, BibliographyRecord)> {
        let bibliography = parse_bibliography(text)?;
        let entry = bibliography
            .iter()
            .next()
            .ok_or_parse("empty bibliography")?;
        Ok((entry.key.clone(), BibliographyRecord::from_entry(entry)))
    }
}

fn parse_bibliography(text: &str) -> Result<Bibliography> {
    Bibliography::parse(text)
        .map_err(|e| ScholarError::Parse(format!("failed to parse BibTeX: {}", e)))
}

fn name_parts(person: &Person) -> NameParts {
    let family = [person.prefix.as_str(), person.name.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    NameParts {
        given: Some(person.given_name.trim().to_string()).filter(|g| !g.is_empty()),
        family,
    }
}

fn chunks_to_string(chunks: &[Spanned<Chunk>]) -> String {
    chunks
        .iter()
        .map(|c| match &c.v {
            Chunk::Normal(s) => s.as_str(),
            Chunk::Verbatim(s) => s.as_str(),
            Chunk::Math(s) => s.as_str(),
        })
        .collect()
}
