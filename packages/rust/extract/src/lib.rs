//! Article text extraction.
//!
//! The pipeline only needs "give me the readable text behind this link". That
//! is the [`ContentExtractor`] trait; [`HttpExtractor`] is the implementation
//! shipped with the binary.

mod html;
mod http;

use async_trait::async_trait;
use newswatch_shared::Result;

pub use html::{extract_text, extract_title};
pub use http::HttpExtractor;

/// Readable content of an article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    /// Page title, if the page declares one.
    pub title: Option<String>,
    /// Main body as plain Markdown-ish text.
    pub text: String,
}

/// Fetches a link and returns its readable text.
///
/// Failures (network, unreadable page, too little text) are
/// [`NewswatchError::Extraction`] or [`NewswatchError::Network`]; callers
/// treat either as "reject this candidate".
///
/// [`NewswatchError::Extraction`]: newswatch_shared::NewswatchError::Extraction
/// [`NewswatchError::Network`]: newswatch_shared::NewswatchError::Network
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, link: &str) -> Result<ExtractedArticle>;
}
