//! HTML → readable text.

use std::sync::LazyLock;

use newswatch_shared::{NewswatchError, Result};
use scraper::{Html, Selector};

/// Content containers, most specific first.
static CONTENT_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["article", "main", "[role=\"main\"]", ".article-body", ".story-body", ".content"]
        .iter()
        .map(|s| Selector::parse(s).expect("valid selector"))
        .collect()
});

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("valid selector"));

static CHROME: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "nav, header, footer, aside, script, style, form, .sidebar, .nav, .newsletter, .related",
    )
    .expect("valid selector")
});

static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("meta[property=\"og:title\"]").expect("valid selector")
});
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));

/// Page title: `og:title`, then `<title>`, then the first `<h1>`.
pub fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    let og = doc
        .select(&OG_TITLE)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string());

    og.filter(|s| !s.is_empty())
        .or_else(|| element_text(&doc, &TITLE))
        .or_else(|| element_text(&doc, &H1))
}

fn element_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
}

/// Main article text of a page, converted to Markdown.
pub fn extract_text(html: &str) -> Result<String> {
    let content = content_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg",
            "form", "img", "figure",
        ])
        .build();

    let markdown = converter
        .convert(&content)
        .map_err(|e| NewswatchError::Extraction(format!("htmd conversion failed: {e}")))?;

    Ok(collapse_blank_lines(&markdown))
}

/// Inner HTML of the first matching content container (or `<body>`), with
/// navigation chrome removed.
fn content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    let inner = CONTENT_SELECTORS
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .or_else(|| doc.select(&BODY).next())
        .map(|el| el.inner_html())
        .unwrap_or_else(|| html.to_string());

    strip_chrome(&inner)
}

fn strip_chrome(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let mut result = html.to_string();
    for el in doc.select(&CHROME) {
        result = result.replace(&el.html(), "");
    }
    result
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html><head>
  <title>Quake hits coast | Example News</title>
  <meta property="og:title" content="Quake hits coast">
</head>
<body>
  <header><a href="/">Example News</a></header>
  <nav><a href="/world">World</a></nav>
  <article>
    <h1>Quake hits coast</h1>
    <p>A strong earthquake struck the northern coast early on Monday.</p>
    <aside>Sign up for our newsletter</aside>
    <p>Officials said damage was limited.</p>
  </article>
  <footer>© Example News</footer>
</body></html>"#;

    #[test]
    fn prefers_og_title() {
        assert_eq!(extract_title(PAGE).as_deref(), Some("Quake hits coast"));
    }

    #[test]
    fn falls_back_to_title_then_h1() {
        let html = "<html><head><title>  Plain   title </title></head><body><h1>Heading</h1></body></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Plain title"));

        let html = "<html><body><h1>Only heading</h1></body></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Only heading"));

        assert_eq!(extract_title("<html><body><p>x</p></body></html>"), None);
    }

    #[test]
    fn extracts_article_without_chrome() {
        let text = extract_text(PAGE).unwrap();
        assert!(text.contains("A strong earthquake struck"));
        assert!(text.contains("damage was limited"));
        assert!(!text.contains("newsletter"));
        assert!(!text.contains("World"));
        assert!(!text.contains("©"));
    }

    #[test]
    fn body_fallback() {
        let html = "<html><body><nav>Menu</nav><p>Body paragraph text.</p></body></html>";
        let text = extract_text(html).unwrap();
        assert!(text.contains("Body paragraph text."));
        assert!(!text.contains("Menu"));
    }
}
