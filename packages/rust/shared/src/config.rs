//! Application configuration for Newswatch.
//!
//! User config lives at `~/.newswatch/newswatch.toml`.
//! CLI flags override config file values, which override defaults.
//! The config is read once per process start; nothing reloads it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NewswatchError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "newswatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".newswatch";

// ---------------------------------------------------------------------------
// Config structs (matching newswatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Host blocklist, freshness window, and title cleanup.
    #[serde(default)]
    pub filters: FiltersConfig,

    /// Fuzzy title-match tuning.
    #[serde(default)]
    pub similarity: SimilarityConfig,

    /// OpenRouter settings for the classifier.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Article text extraction.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Triage queue preparation.
    #[serde(default)]
    pub triage: TriageConfig,

    /// Topic buckets in display priority order.
    #[serde(default = "default_topics")]
    pub topics: Vec<TopicDefinition>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the libSQL database file. A leading `~/` expands to home.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Upper bound on any single store operation.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            store_timeout_secs: default_store_timeout(),
        }
    }
}

fn default_database_path() -> String {
    "~/.newswatch/newswatch.db".into()
}
fn default_store_timeout() -> u64 {
    10
}

/// Upper bound for `filters.freshness_window_days` (about a century).
pub const MAX_FRESHNESS_WINDOW_DAYS: i64 = 36_500;

/// `[filters]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersConfig {
    /// Exact hosts whose articles are never ingested.
    #[serde(default = "default_blocked_hosts")]
    pub blocked_hosts: Vec<String>,

    /// Half-width of the freshness window around "now", in days
    /// (1 to [`MAX_FRESHNESS_WINDOW_DAYS`]).
    #[serde(default = "default_freshness_days")]
    pub freshness_window_days: i64,

    /// Outlet-suffix markers, applied in order.
    #[serde(default = "default_title_markers")]
    pub title_markers: Vec<String>,

    /// A marker is only trimmed if it starts at or after this many characters.
    #[serde(default = "default_title_min_offset")]
    pub title_min_offset: usize,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            blocked_hosts: default_blocked_hosts(),
            freshness_window_days: default_freshness_days(),
            title_markers: default_title_markers(),
            title_min_offset: default_title_min_offset(),
        }
    }
}

fn default_blocked_hosts() -> Vec<String> {
    [
        "www.washingtonpost.com",
        "www.youtube.com",
        "www.naturalnews.com",
        "facebook.com",
        "m.facebook.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_freshness_days() -> i64 {
    15
}
fn default_title_markers() -> Vec<String> {
    vec![" – ".into(), " - ".into(), "|".into()]
}
fn default_title_min_offset() -> usize {
    15
}

/// `[similarity]` section. The defaults are empirical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Titles whose lengths differ by more than this are never similar.
    #[serde(default = "default_max_length_diff")]
    pub max_length_diff: usize,

    /// The shorter title must be strictly longer than this.
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Number of leading characters compared.
    #[serde(default = "default_window")]
    pub window: usize,

    /// Maximum Hamming distance within the window.
    #[serde(default = "default_max_distance")]
    pub max_distance: usize,

    /// How many recent title-memory rows are compared per candidate.
    #[serde(default = "default_memory_candidates")]
    pub memory_candidates: u32,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            max_length_diff: default_max_length_diff(),
            min_length: default_min_length(),
            window: default_window(),
            max_distance: default_max_distance(),
            memory_candidates: default_memory_candidates(),
        }
    }
}

fn default_max_length_diff() -> usize {
    10
}
fn default_min_length() -> usize {
    20
}
fn default_window() -> usize {
    30
}
fn default_max_distance() -> usize {
    5
}
fn default_memory_candidates() -> u32 {
    10
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for summaries and importance checks.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Per-request timeout.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            default_model: default_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_llm_timeout() -> u64 {
    60
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// HTTP timeout for fetching an article.
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,

    /// Extracted text shorter than this is treated as a failed extraction.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,

    /// Hosts fetched through a reader-friendly mirror instead.
    #[serde(default = "default_host_rewrites")]
    pub host_rewrites: BTreeMap<String, String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_extraction_timeout(),
            min_content_chars: default_min_content_chars(),
            host_rewrites: default_host_rewrites(),
        }
    }
}

fn default_extraction_timeout() -> u64 {
    30
}
fn default_min_content_chars() -> usize {
    200
}
fn default_host_rewrites() -> BTreeMap<String, String> {
    BTreeMap::from([("www.reuters.com".to_string(), "neuters.de".to_string())])
}

/// `[triage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Case-insensitive regexes; matching titles are skipped and marked processed.
    #[serde(default)]
    pub skip_patterns: Vec<String>,
}

/// `[[topics]]` entry: a named bucket of case-insensitive title patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDefinition {
    pub name: String,
    pub keywords: Vec<String>,
}

impl TopicDefinition {
    pub fn new(name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

fn default_topics() -> Vec<TopicDefinition> {
    vec![
        TopicDefinition::new("nuclear", &["nuclear", "warhead", "icbm"]),
        TopicDefinition::new("war", &["war\\b", "invasion", "missile", "drone strike"]),
        TopicDefinition::new("pandemic", &["pandemic", "outbreak", "h5n1", "bird flu"]),
        TopicDefinition::new("ai", &["\\bai\\b", "openai", "artificial intelligence"]),
    ]
}

// ---------------------------------------------------------------------------
// Derived runtime values
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Store timeout as a [`Duration`].
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.store_timeout_secs)
    }

    /// Resolved database path with `~/` expanded.
    pub fn database_path(&self) -> Result<PathBuf> {
        expand_home(&self.defaults.database_path)
    }

    /// Check cross-field constraints that serde defaults can't express.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_FRESHNESS_WINDOW_DAYS).contains(&self.filters.freshness_window_days) {
            return Err(NewswatchError::config(format!(
                "filters.freshness_window_days must be between 1 and {MAX_FRESHNESS_WINDOW_DAYS}"
            )));
        }
        if self.similarity.window == 0 {
            return Err(NewswatchError::config("similarity.window must be at least 1"));
        }
        if self.filters.title_markers.iter().any(|m| m.is_empty()) {
            return Err(NewswatchError::config("filters.title_markers may not contain empty markers"));
        }
        for topic in &self.topics {
            if topic.keywords.is_empty() {
                return Err(NewswatchError::config(format!(
                    "topic '{}' has no keywords",
                    topic.name
                )));
            }
        }
        Ok(())
    }
}

fn expand_home(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| NewswatchError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.newswatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NewswatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.newswatch/newswatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NewswatchError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        NewswatchError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NewswatchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NewswatchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NewswatchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenRouter API key from the env var named in the config.
pub fn api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(NewswatchError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("blocked_hosts"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("[[topics]]"));
    }

    #[test]
    fn empty_file_gets_defaults() {
        let config: AppConfig = toml::from_str("").expect("parse empty");
        assert_eq!(config.filters.freshness_window_days, 15);
        assert_eq!(config.filters.title_min_offset, 15);
        assert_eq!(config.similarity.max_distance, 5);
        assert_eq!(config.similarity.memory_candidates, 10);
        assert!(config.filters.blocked_hosts.contains(&"www.youtube.com".to_string()));
        assert!(!config.topics.is_empty());
        assert_eq!(config.store_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn config_with_topics_and_overrides() {
        let toml_str = r#"
[defaults]
database_path = "/tmp/newswatch.db"

[filters]
blocked_hosts = ["spam.example"]
freshness_window_days = 3

[[topics]]
name = "war"
keywords = ["war", "invasion"]

[[topics]]
name = "flu"
keywords = ["flu"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        config.validate().expect("valid");
        assert_eq!(config.topics.len(), 2);
        assert_eq!(config.topics[1].name, "flu");
        assert_eq!(config.filters.blocked_hosts, vec!["spam.example".to_string()]);
        assert_eq!(config.filters.title_markers.len(), 3);
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/newswatch.db")
        );
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.filters.freshness_window_days = 0;
        assert!(config.validate().is_err());

        config.filters.freshness_window_days = 200_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("between 1 and 36500"));

        config.filters.freshness_window_days = MAX_FRESHNESS_WINDOW_DAYS;
        assert!(config.validate().is_ok());

        let mut config = AppConfig::default();
        config.topics.push(TopicDefinition::new("empty", &[]));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn api_key_lookup() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "NW_TEST_NONEXISTENT_KEY_12345".into();
        let result = api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
