//! HTTP-backed [`ContentExtractor`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use newswatch_shared::{ExtractionConfig, NewswatchError, Result};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::html::{extract_text, extract_title};
use crate::{ContentExtractor, ExtractedArticle};

/// User-Agent string for article fetches.
const USER_AGENT: &str = concat!("Newswatch/", env!("CARGO_PKG_VERSION"));

/// Fetches article pages and extracts their main text.
pub struct HttpExtractor {
    client: Client,
    min_content_chars: usize,
    host_rewrites: BTreeMap<String, String>,
}

impl HttpExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NewswatchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            min_content_chars: config.min_content_chars,
            host_rewrites: config.host_rewrites.clone(),
        })
    }

    /// The URL actually fetched for `link`: hosts with a configured mirror
    /// are swapped for it, everything else is fetched as-is.
    pub fn fetch_url(&self, link: &str) -> Result<Url> {
        let mut url = Url::parse(link)
            .map_err(|e| NewswatchError::parse(format!("invalid link '{link}': {e}")))?;

        let mirror = url.host_str().and_then(|h| self.host_rewrites.get(h)).cloned();
        if let Some(mirror) = mirror {
            url.set_host(Some(&mirror))
                .map_err(|e| NewswatchError::parse(format!("bad mirror host '{mirror}': {e}")))?;
            debug!(%link, %url, "fetching through mirror");
        }
        Ok(url)
    }
}

#[async_trait]
impl ContentExtractor for HttpExtractor {
    #[instrument(skip_all, fields(link = %link))]
    async fn extract(&self, link: &str) -> Result<ExtractedArticle> {
        let url = self.fetch_url(link)?;

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| NewswatchError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewswatchError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| NewswatchError::Network(format!("{url}: body read failed: {e}")))?;

        let text = extract_text(&body)?;
        let chars = text.chars().count();
        if chars < self.min_content_chars {
            return Err(NewswatchError::Extraction(format!(
                "{url}: only {chars} characters of text (need {})",
                self.min_content_chars
            )));
        }

        debug!(chars, "extracted article text");
        Ok(ExtractedArticle {
            title: extract_title(&body),
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article_page(paragraphs: usize) -> String {
        let body = "<p>The regional authority confirmed the evacuation of coastal districts.</p>"
            .repeat(paragraphs);
        format!(
            "<html><head><title>Evacuations ordered</title></head>\
             <body><nav>Home</nav><article>{body}</article></body></html>"
        )
    }

    fn extractor(min_content_chars: usize, rewrites: &[(&str, &str)]) -> HttpExtractor {
        let config = ExtractionConfig {
            timeout_secs: 5,
            min_content_chars,
            host_rewrites: rewrites
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        HttpExtractor::new(&config).unwrap()
    }

    #[tokio::test]
    async fn extracts_title_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(article_page(5))
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let article = extractor(200, &[])
            .extract(&format!("{}/story", server.uri()))
            .await
            .unwrap();
        assert_eq!(article.title.as_deref(), Some("Evacuations ordered"));
        assert!(article.text.contains("evacuation of coastal districts"));
        assert!(!article.text.contains("Home"));
    }

    #[tokio::test]
    async fn short_pages_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stub"))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_page(1)))
            .mount(&server)
            .await;

        let err = extractor(200, &[])
            .extract(&format!("{}/stub", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, NewswatchError::Extraction(_)));
    }

    #[tokio::test]
    async fn http_errors_are_network_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = extractor(10, &[])
            .extract(&format!("{}/gone", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn mirror_rewrite_is_applied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/world/story"))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_page(5)))
            .mount(&server)
            .await;

        let port = server.address().port();
        let extractor = extractor(200, &[("www.wire.test", "127.0.0.1")]);
        let link = format!("http://www.wire.test:{port}/world/story");
        assert_eq!(
            extractor.fetch_url(&link).unwrap().as_str(),
            format!("http://127.0.0.1:{port}/world/story")
        );

        let article = extractor.extract(&link).await.unwrap();
        assert!(article.text.contains("coastal districts"));
    }

    #[test]
    fn default_rewrites_cover_reuters() {
        let extractor = HttpExtractor::new(&ExtractionConfig::default()).unwrap();
        assert_eq!(
            extractor
                .fetch_url("https://www.reuters.com/world/some-story/")
                .unwrap()
                .as_str(),
            "https://neuters.de/world/some-story/"
        );
    }
}
