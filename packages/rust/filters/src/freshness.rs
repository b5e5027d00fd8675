//! Publication-date parsing and the freshness window.
//!
//! Ingestion sources report dates in different shapes, so the caller names
//! the format per source with [`DateFormat`].

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use newswatch_shared::{CandidateArticle, FiltersConfig, NewswatchError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Date path segment used by frontpage scrapers, e.g. `/2025-02/10/`.
static URL_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d{4})-(\d{2})/(\d{2})/").expect("valid regex"));

/// How a source encodes the publication timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateFormat {
    /// `2025-02-10T08:00:00Z` in the `published` field (alerts feeds).
    #[default]
    Rfc3339,
    /// `20250210080000` in the `published` field (tabular event feeds).
    Compact,
    /// Date encoded in the link path as `/YYYY-MM/DD/`.
    UrlPath,
    /// No timestamp available; ingestion time stands in for it.
    AssumeNow,
}

impl DateFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rfc3339 => "rfc3339",
            Self::Compact => "compact",
            Self::UrlPath => "url-path",
            Self::AssumeNow => "assume-now",
        }
    }
}

impl std::fmt::Display for DateFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateFormat {
    type Err = NewswatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rfc3339" => Ok(Self::Rfc3339),
            "compact" => Ok(Self::Compact),
            "url-path" => Ok(Self::UrlPath),
            "assume-now" => Ok(Self::AssumeNow),
            other => Err(NewswatchError::parse(format!(
                "unknown date format '{other}': expected rfc3339, compact, url-path, or assume-now"
            ))),
        }
    }
}

/// Extract the publication time of `candidate` according to `format`.
pub fn parse_published(
    candidate: &CandidateArticle,
    format: DateFormat,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let field = || {
        candidate
            .published
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NewswatchError::parse("missing publication date"))
    };

    match format {
        DateFormat::Rfc3339 => {
            let raw = field()?;
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| NewswatchError::parse(format!("bad RFC 3339 date '{raw}': {e}")))
        }
        DateFormat::Compact => {
            let raw = field()?;
            NaiveDateTime::parse_from_str(raw, "%Y%m%d%H%M%S")
                .map(|dt| dt.and_utc())
                .map_err(|e| NewswatchError::parse(format!("bad compact date '{raw}': {e}")))
        }
        DateFormat::UrlPath => {
            let caps = URL_DATE_RE.captures(&candidate.link).ok_or_else(|| {
                NewswatchError::parse(format!("no date in link '{}'", candidate.link))
            })?;
            let num = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
            NaiveDate::from_ymd_opt(num(1) as i32, num(2), num(3))
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
                .ok_or_else(|| {
                    NewswatchError::parse(format!("invalid date in link '{}'", candidate.link))
                })
        }
        DateFormat::AssumeNow => Ok(now),
    }
}

/// Accepts timestamps strictly inside `(now - window, now + window)`.
/// A bound beyond chrono's representable range leaves that side open.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessWindow {
    window: Duration,
}

impl Default for FreshnessWindow {
    fn default() -> Self {
        Self::from_config(&FiltersConfig::default())
    }
}

impl FreshnessWindow {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_config(config: &FiltersConfig) -> Self {
        Self::new(Duration::try_days(config.freshness_window_days).unwrap_or(Duration::MAX))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether `published` falls inside the window around `now`.
    pub fn contains(&self, published: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let after_start = now
            .checked_sub_signed(self.window)
            .is_none_or(|start| published > start);
        let before_end = now
            .checked_add_signed(self.window)
            .is_none_or(|end| published < end);
        after_start && before_end
    }

    /// Parse the candidate's date and check it. Missing or unparsable dates
    /// are logged and rejected.
    pub fn is_fresh(
        &self,
        candidate: &CandidateArticle,
        format: DateFormat,
        now: DateTime<Utc>,
    ) -> bool {
        match parse_published(candidate, format, now) {
            Ok(published) => {
                let fresh = self.contains(published, now);
                if !fresh {
                    tracing::debug!(link = %candidate.link, %published, "stale candidate");
                }
                fresh
            }
            Err(e) => {
                tracing::info!(link = %candidate.link, error = %e, "rejecting candidate without usable date");
                false
            }
        }
    }
}
