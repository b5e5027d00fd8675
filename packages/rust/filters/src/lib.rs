//! Candidate filters for the Newswatch ingestion pipeline.
//!
//! Every filter here is a decision on a single [`CandidateArticle`]:
//! - [`title`] — strips outlet suffixes from headlines
//! - [`host`] — rejects blocklisted hosts
//! - [`freshness`] — rejects articles outside a rolling window around now
//! - [`similarity`] — the fixed-window Hamming rule for near-identical titles
//! - [`dedup`] — exact and fuzzy duplicate detection against the store
//!
//! [`CandidateArticle`]: newswatch_shared::CandidateArticle

pub mod dedup;
pub mod freshness;
pub mod host;
pub mod similarity;
pub mod title;

pub use dedup::{DuplicateDetector, Verdict};
pub use freshness::{DateFormat, FreshnessWindow, parse_published};
pub use host::HostFilter;
pub use similarity::{SimilarityRule, hamming, skip_adjacent_similar};
pub use title::{TitleNormalizer, normalize};
