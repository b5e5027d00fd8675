//! Summarization and importance classification.
//!
//! The pipeline depends on the [`Classifier`] trait only. The shipped
//! implementation, [`OpenRouterClassifier`], talks to any OpenAI-compatible
//! `/chat/completions` endpoint and asks for JSON object responses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use newswatch_shared::{NewswatchError, OpenRouterConfig, Result};

/// Importance verdict for a summarized article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportanceVerdict {
    /// Whether the event could plausibly threaten humanity at large. Only
    /// these articles are persisted.
    pub is_important: bool,
    /// Highly important, even if not existentially so.
    pub high_importance: bool,
    pub reasoning: String,
}

/// Opaque, fallible summarization and importance classification.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Summarize article text.
    async fn summarize(&self, text: &str) -> Result<String>;

    /// Judge a `"# {title}\n\n{summary}"` snippet.
    async fn assess_importance(&self, snippet: &str) -> Result<ImportanceVerdict>;
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

const SUMMARY_PROMPT: &str = "\
You are a JSON API that returns a {\"summary\": string, \"error\": string | null} object.
The summary first describes the contents of the article in two paragraphs or less, then \
lists the most salient, new and informative facts in one additional paragraph. State the \
contents directly; do not open with \"The article says\" or similar.
If the input is not an article, leave summary empty and describe the problem in error.";

const IMPORTANCE_PROMPT: &str = "\
You are a JSON API that returns a {\"existential_importance_reasoning\": string, \
\"existential_importance_bool\": boolean, \"high_importance_bool\": boolean, \
\"error\": string | null} object.
existential_importance_reasoning explains whether the item describes an event that could \
threaten humanity as a whole; existential_importance_bool is that determination. \
high_importance_bool says whether the event is highly important even if not existentially so.
Events are existentially important when they involve:
- more than a hundred deaths;
- a spreading sickness or a new pathogen;
- conflict between nuclear powers, or conflict that could escalate into global war;
- terrorist groups displaying new capabilities;
- new AI capabilities that could be misused at scale.
Opinion pieces, reviews of past events, and small developments within an ongoing conflict \
are not existentially important.";

// ---------------------------------------------------------------------------
// Wire types (OpenAI-compatible chat completions)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryBox {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImportanceBox {
    #[serde(default)]
    existential_importance_reasoning: String,
    #[serde(default)]
    existential_importance_bool: bool,
    #[serde(default)]
    high_importance_bool: bool,
    #[serde(default)]
    error: Option<String>,
}

fn reported_error(error: &Option<String>) -> Option<&str> {
    error.as_deref().map(str::trim).filter(|e| !e.is_empty())
}

// ---------------------------------------------------------------------------
// OpenRouterClassifier
// ---------------------------------------------------------------------------

/// [`Classifier`] backed by an OpenAI-compatible chat-completions API.
pub struct OpenRouterClassifier {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenRouterClassifier {
    pub fn new(config: &OpenRouterConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NewswatchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.default_model.clone(),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| NewswatchError::config(format!("invalid API key: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Send one system + user exchange and return the raw JSON content.
    async fn complete_json(&self, system: &str, input: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let user = format!("<INPUT>\n{input}\n</INPUT>");
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!(model = %self.model, "chat completion request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| NewswatchError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewswatchError::Classifier(format!(
                "chat completion failed ({status}): {body}"
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| NewswatchError::Classifier(format!("unreadable response: {e}")))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| NewswatchError::Classifier("empty completion".into()))
    }
}

#[async_trait]
impl Classifier for OpenRouterClassifier {
    #[instrument(skip_all, fields(chars = text.len()))]
    async fn summarize(&self, text: &str) -> Result<String> {
        let raw = self.complete_json(SUMMARY_PROMPT, text).await?;
        let parsed: SummaryBox = serde_json::from_str(&raw)
            .map_err(|e| NewswatchError::Classifier(format!("bad summary JSON: {e}")))?;

        if let Some(error) = reported_error(&parsed.error) {
            return Err(NewswatchError::Classifier(format!("summarizer reported: {error}")));
        }
        let summary = parsed.summary.trim();
        if summary.is_empty() {
            return Err(NewswatchError::Classifier("empty summary".into()));
        }
        Ok(summary.to_string())
    }

    #[instrument(skip_all)]
    async fn assess_importance(&self, snippet: &str) -> Result<ImportanceVerdict> {
        let raw = self.complete_json(IMPORTANCE_PROMPT, snippet).await?;
        let parsed: ImportanceBox = serde_json::from_str(&raw)
            .map_err(|e| NewswatchError::Classifier(format!("bad importance JSON: {e}")))?;

        if let Some(error) = reported_error(&parsed.error) {
            return Err(NewswatchError::Classifier(format!("classifier reported: {error}")));
        }
        Ok(ImportanceVerdict {
            is_important: parsed.existential_importance_bool,
            high_importance: parsed.high_importance_bool,
            reasoning: parsed.existential_importance_reasoning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn classifier(server: &MockServer) -> OpenRouterClassifier {
        let config = OpenRouterConfig {
            base_url: format!("{}/api/v1/", server.uri()),
            timeout_secs: 5,
            ..OpenRouterConfig::default()
        };
        OpenRouterClassifier::new(&config, "test-key").unwrap()
    }

    fn completion(content: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content.to_string() } }]
        }))
    }

    #[tokio::test]
    async fn summarize_returns_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "response_format": { "type": "json_object" }
            })))
            .respond_with(completion(serde_json::json!({
                "summary": "An earthquake struck the coast.",
                "error": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summary = classifier(&server).summarize("Article text").await.unwrap();
        assert_eq!(summary, "An earthquake struck the coast.");
    }

    #[tokio::test]
    async fn error_field_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(completion(serde_json::json!({
                "summary": "",
                "error": "input is a cookie banner"
            })))
            .mount(&server)
            .await;

        let err = classifier(&server).summarize("Accept cookies").await.unwrap_err();
        assert!(matches!(err, NewswatchError::Classifier(_)));
        assert!(err.to_string().contains("cookie banner"));
    }

    #[tokio::test]
    async fn importance_verdict_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(completion(serde_json::json!({
                "existential_importance_reasoning": "New pathogen spreading quickly.",
                "existential_importance_bool": true,
                "high_importance_bool": true,
                "error": ""
            })))
            .mount(&server)
            .await;

        let verdict = classifier(&server)
            .assess_importance("# Outbreak\n\nA new virus.")
            .await
            .unwrap();
        assert!(verdict.is_important);
        assert!(verdict.high_importance);
        assert_eq!(verdict.reasoning, "New pathogen spreading quickly.");
    }

    #[tokio::test]
    async fn http_failure_and_garbage_are_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;
        let err = classifier(&server).summarize("text").await.unwrap_err();
        assert!(err.to_string().contains("429"));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(completion(serde_json::json!("not an object")))
            .mount(&server)
            .await;
        let err = classifier(&server).assess_importance("x").await.unwrap_err();
        assert!(matches!(err, NewswatchError::Classifier(_)));
    }
}
