//! Host blocklist.

use std::collections::HashSet;

use newswatch_shared::{FiltersConfig, NewswatchError, Result};
use url::Url;

/// Rejects links whose host is on the configured blocklist.
///
/// Matching is on the exact host: blocking `facebook.com` does not block
/// `m.facebook.com`, so both are listed by default.
#[derive(Debug, Clone)]
pub struct HostFilter {
    blocked: HashSet<String>,
}

impl Default for HostFilter {
    fn default() -> Self {
        Self::from_config(&FiltersConfig::default())
    }
}

impl HostFilter {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocked: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &FiltersConfig) -> Self {
        Self::new(&config.blocked_hosts)
    }

    /// Whether the link's host is allowed. Links that don't parse or have no
    /// host are a [`NewswatchError::Parse`].
    pub fn is_allowed(&self, link: &str) -> Result<bool> {
        let url = Url::parse(link)
            .map_err(|e| NewswatchError::parse(format!("invalid link '{link}': {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| NewswatchError::parse(format!("link has no host: '{link}'")))?;
        Ok(!self.blocked.contains(&host.to_ascii_lowercase()))
    }

    /// Like [`is_allowed`](Self::is_allowed), but malformed links are logged
    /// and rejected.
    pub fn check(&self, link: &str) -> bool {
        match self.is_allowed(link) {
            Ok(allowed) => {
                if !allowed {
                    tracing::debug!(link, "blocked host");
                }
                allowed
            }
            Err(e) => {
                tracing::info!(link, error = %e, "rejecting candidate with malformed link");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blocklist() {
        let filter = HostFilter::default();
        assert!(!filter.is_allowed("https://www.youtube.com/watch?v=abc").unwrap());
        assert!(!filter.is_allowed("https://m.facebook.com/story").unwrap());
        assert!(filter.is_allowed("https://www.example.com/news/1").unwrap());
    }

    #[test]
    fn exact_host_only() {
        let filter = HostFilter::new(["facebook.com"]);
        assert!(!filter.is_allowed("https://facebook.com/x").unwrap());
        assert!(filter.is_allowed("https://www.facebook.com/x").unwrap());
    }

    #[test]
    fn host_match_ignores_case() {
        let filter = HostFilter::new(["WWW.Example.COM"]);
        assert!(!filter.is_allowed("https://www.EXAMPLE.com/a").unwrap());
    }

    #[test]
    fn malformed_links_fail_closed() {
        let filter = HostFilter::default();
        assert!(filter.is_allowed("not a url").is_err());
        assert!(filter.is_allowed("mailto:someone@example.com").is_err());
        assert!(!filter.check("not a url"));
        assert!(filter.check("https://www.example.com/"));
    }
}
