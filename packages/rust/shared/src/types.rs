//! Core domain types for the Newswatch ingestion and triage pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Titled
// ---------------------------------------------------------------------------

/// Anything that carries a headline. Topic ordering and adjacency
/// deduplication work over this rather than a concrete record type.
pub trait Titled {
    fn title(&self) -> &str;
}

/// Case-folded form of a title used for case-insensitive equality.
///
/// Unicode-aware; SQLite's `UPPER()` only folds ASCII.
pub fn title_key(title: &str) -> String {
    title.to_uppercase()
}

// ---------------------------------------------------------------------------
// CandidateArticle
// ---------------------------------------------------------------------------

/// A raw, unvalidated article produced by an ingestion source.
///
/// One JSON object per line on the `ingest` input:
/// `{"title": "...", "link": "https://...", "date": "2025-02-10T08:00:00Z"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateArticle {
    /// Headline as published, including any outlet suffix.
    #[serde(default)]
    pub title: String,
    /// Canonical article URL.
    pub link: String,
    /// Approximate publication timestamp, in the source's own format.
    #[serde(default, alias = "date", skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

impl CandidateArticle {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            published: None,
        }
    }

    pub fn published(mut self, published: impl Into<String>) -> Self {
        self.published = Some(published.into());
        self
    }
}

impl Titled for CandidateArticle {
    fn title(&self) -> &str {
        &self.title
    }
}

// ---------------------------------------------------------------------------
// TitleMemoryEntry
// ---------------------------------------------------------------------------

/// One row of the append-only fuzzy-dedup corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleMemoryEntry {
    pub id: i64,
    pub original_title: String,
    /// Normalized title; unique across the table.
    pub cleaned_title: String,
    pub link: String,
    pub first_seen_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Relevance
// ---------------------------------------------------------------------------

/// Human verdict recorded during triage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    Yes,
    No,
    #[default]
    Maybe,
}

impl Relevance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Maybe => "maybe",
        }
    }
}

impl std::fmt::Display for Relevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relevance {
    type Err = crate::NewswatchError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "maybe" | "" => Ok(Self::Maybe),
            other => Err(crate::NewswatchError::parse(format!(
                "unknown relevance '{other}': expected yes, no, or maybe"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SourceRecord / NewSource
// ---------------------------------------------------------------------------

/// A persisted, accepted article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: i64,
    pub title: String,
    /// Unique across the table.
    pub link: String,
    pub date: DateTime<Utc>,
    pub summary: String,
    /// Classifier verdict at ingestion time.
    pub importance: bool,
    pub importance_reasoning: String,
    /// Set by triage once a human has dealt with the record.
    pub processed: bool,
    pub relevance: Relevance,
    /// Name of the ingestion source that produced this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Titled for SourceRecord {
    fn title(&self) -> &str {
        &self.title
    }
}

/// Insert payload for a [`SourceRecord`], built by the pipeline coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSource {
    pub title: String,
    pub link: String,
    pub date: DateTime<Utc>,
    pub summary: String,
    pub importance: bool,
    pub importance_reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_accepts_date_alias() {
        let line = r#"{"title":"Quake hits coast","link":"https://example.com/a","date":"20250210120000"}"#;
        let parsed: CandidateArticle = serde_json::from_str(line).expect("parse candidate");
        assert_eq!(parsed.published.as_deref(), Some("20250210120000"));
        assert_eq!(parsed.title(), "Quake hits coast");
    }

    #[test]
    fn candidate_without_date_or_title() {
        let parsed: CandidateArticle =
            serde_json::from_str(r#"{"link":"https://example.com/b"}"#).expect("parse");
        assert!(parsed.published.is_none());
        assert!(parsed.title.is_empty());
    }

    #[test]
    fn title_key_folds_non_ascii() {
        assert_eq!(title_key("Ölpreis explodiert"), title_key("ölpreis explodiert"));
        assert_eq!(title_key("São Paulo floods"), "SÃO PAULO FLOODS");
    }

    #[test]
    fn relevance_parses_and_displays() {
        assert_eq!("YES".parse::<Relevance>().unwrap(), Relevance::Yes);
        assert_eq!("".parse::<Relevance>().unwrap(), Relevance::Maybe);
        assert!("perhaps".parse::<Relevance>().is_err());
        assert_eq!(Relevance::No.to_string(), "no");
        assert_eq!(Relevance::default(), Relevance::Maybe);
    }
}
