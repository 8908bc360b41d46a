//! Landing-page content extraction.
//!
//! Given an article URL, [`extract`] downloads the page and pulls out the
//! readable body text and a cover image. The page is fetched through a
//! [`RetryingClient`], so transient failures get a bounded number of further
//! attempts while 401/403 give up immediately. Every failure degrades to an
//! empty [`ExtractedContent`]; callers fall back to a title-based summary.
//!
//! # Body text
//!
//! Structural selectors are tried in order (`article`, `[itemprop=articleBody]`,
//! common CMS content classes, `main`). A match shorter than
//! [`MIN_BODY_CHARS`] is treated as a miss, in which case every `<p>` on the
//! page is concatenated instead.
//!
//! # Cover image
//!
//! Open Graph and Twitter card metadata first, then `link rel=image_src`,
//! `itemprop=image`, and finally the first `<img>` in the article body.
//! Protocol-relative URLs are upgraded to https; relative paths are rejected.

use crate::http::HttpClient;
use crate::models::ExtractedContent;
use crate::retry::RetryingClient;
use crate::utils::{absolute_image_url, normalize_whitespace, truncate_chars, truncate_for_log};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Below this many characters a structural match is considered boilerplate.
pub const MIN_BODY_CHARS: usize = 100;

static BODY_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "article",
        "[itemprop=articleBody]",
        ".article-body",
        ".article-content",
        ".story-body",
        ".post-content",
        ".entry-content",
        "main",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

/// Elements whose text is never article prose.
const NON_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Image candidates and the attribute holding the URL, in preference order.
static IMAGE_SELECTORS: Lazy<Vec<(Selector, &'static str)>> = Lazy::new(|| {
    [
        (r#"meta[property="og:image"]"#, "content"),
        (r#"meta[property="og:image:url"]"#, "content"),
        (r#"meta[name="twitter:image"]"#, "content"),
        (r#"meta[name="twitter:image:src"]"#, "content"),
        (r#"link[rel="image_src"]"#, "href"),
        (r#"meta[itemprop="image"]"#, "content"),
        ("article img[src]", "src"),
        ("figure img[src]", "src"),
        ("img[src]", "src"),
    ]
    .iter()
    .map(|(s, attr)| (Selector::parse(s).unwrap(), *attr))
    .collect()
});

/// Tunables for landing-page extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Deadline per attempt.
    pub timeout: Duration,
    /// Total attempts for transient failures.
    pub attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Body text is truncated to this many characters.
    pub max_body_chars: usize,
}

/// Fetch `url` and extract its body text and cover image.
///
/// # Arguments
///
/// * `client` - HTTP client; wrapped in a [`RetryingClient`] for this call
/// * `url` - Landing page of the article
/// * `cfg` - Timeouts, retry budget and body length bound
///
/// # Returns
///
/// The extracted content, or an empty value if the page could not be fetched.
#[instrument(level = "info", skip_all, fields(url = %truncate_for_log(url, 120)))]
pub async fn extract<C: HttpClient>(client: &C, url: &str, cfg: &ExtractorConfig) -> ExtractedContent {
    let client = RetryingClient::new(client, cfg.attempts, cfg.retry_delay);
    let response = match client.get(url, cfg.timeout).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Extraction gave up");
            return ExtractedContent::default();
        }
    };

    match response.status {
        401 | 403 => {
            warn!(status = response.status, "Landing page refused access; not retrying");
            ExtractedContent::default()
        }
        status if !response.is_success() => {
            warn!(status, "Extraction gave up");
            ExtractedContent::default()
        }
        _ => {
            let content = extract_from_html(&response.body, cfg.max_body_chars);
            debug!(
                body_chars = content.body_text.chars().count(),
                has_image = content.cover_image_url.is_some(),
                "Extracted landing page"
            );
            content
        }
    }
}

/// Pure extraction over an already downloaded document.
pub fn extract_from_html(html: &str, max_body_chars: usize) -> ExtractedContent {
    let document = Html::parse_document(html);
    let body = body_text(&document);
    ExtractedContent {
        body_text: truncate_chars(&body, max_body_chars),
        cover_image_url: cover_image(&document),
    }
}

fn body_text(document: &Html) -> String {
    for selector in BODY_SELECTORS.iter() {
        if let Some(element) = document.select(selector).next() {
            let text = element_text(element);
            if text.chars().count() >= MIN_BODY_CHARS {
                return text;
            }
        }
    }
    let paragraphs: Vec<String> = document
        .select(&PARAGRAPHS)
        .map(element_text)
        .filter(|p| !p.is_empty())
        .collect();
    paragraphs.join(" ")
}

/// Visible text under `element`, leaving out script, style and noscript contents.
fn element_text(element: ElementRef<'_>) -> String {
    let parts: Vec<&str> = element
        .descendants()
        .filter_map(|node| node.value().as_text().map(|text| (node, text)))
        .filter(|(node, _)| {
            !node
                .ancestors()
                .take_while(|ancestor| ancestor.id() != element.id())
                .filter_map(|ancestor| ancestor.value().as_element().map(|e| e.name()))
                .any(|name| NON_TEXT_TAGS.contains(&name))
        })
        .map(|(_, text)| &**text)
        .collect();
    normalize_whitespace(&parts.join(" "))
}

fn cover_image(document: &Html) -> Option<String> {
    IMAGE_SELECTORS.iter().find_map(|(selector, attr)| {
        document
            .select(selector)
            .filter_map(|el| el.value().attr(attr))
            .find_map(absolute_image_url)
    })
}
