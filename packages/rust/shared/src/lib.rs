//! Shared types, error model, and configuration for Newswatch.
//!
//! This crate is the foundation depended on by all other Newswatch crates.
//! It provides:
//! - [`NewswatchError`] — the unified error type
//! - Domain types ([`CandidateArticle`], [`SourceRecord`], [`TitleMemoryEntry`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, ExtractionConfig, FiltersConfig, MAX_FRESHNESS_WINDOW_DAYS,
    OpenRouterConfig,
    SimilarityConfig, TopicDefinition, TriageConfig, api_key, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{NewswatchError, Result};
pub use types::{
    CandidateArticle, NewSource, Relevance, SourceRecord, TitleMemoryEntry, Titled, title_key,
};
