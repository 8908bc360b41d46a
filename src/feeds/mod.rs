//! Feed fetcher.
//!
//! [`fetch`] downloads one configured feed and parses it into [`RawItem`]s.
//! It never fails: a timeout, a non-2xx response or a malformed document is
//! logged and yields an empty list, so one bad source cannot abort its topic.
//! Sources are not retried within a run.

pub mod parser;

use crate::error::FetchError;
use crate::http::HttpClient;
use crate::models::{FeedSource, RawItem};
use crate::utils::truncate_for_log;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

pub use parser::parse_feed;

/// Fetch and parse one feed.
///
/// # Arguments
///
/// * `client` - HTTP client used for the request
/// * `source` - The feed to fetch
/// * `timeout` - Deadline for the whole request, body included
///
/// # Returns
///
/// The parsed items in feed order, or an empty vector on any failure.
#[instrument(level = "info", skip_all, fields(topic = %source.topic, source = %source.display_name))]
pub async fn fetch<C: HttpClient>(client: &C, source: &FeedSource, timeout: Duration) -> Vec<RawItem> {
    let t0 = Instant::now();
    let endpoint = truncate_for_log(&source.endpoint, 120);

    let response = match client.get(&source.endpoint, timeout).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, %endpoint, "Feed fetch failed");
            return Vec::new();
        }
    };
    if !response.is_success() {
        warn!(error = %FetchError::Status(response.status), %endpoint, "Feed returned non-success status");
        return Vec::new();
    }

    match parse_feed(&response.body) {
        Ok(items) => {
            info!(
                count = items.len(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Fetched feed"
            );
            items
        }
        Err(e) => {
            warn!(error = %e, %endpoint, "Feed payload could not be parsed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::FakeHttp;

    const FEED_URL: &str = "https://feeds.test/world.xml";

    fn source() -> FeedSource {
        FeedSource {
            topic: "world".into(),
            endpoint: FEED_URL.into(),
            display_name: "Test Wire".into(),
        }
    }

    #[tokio::test]
    async fn test_fetch_parses_items() {
        let http = FakeHttp::new().ok(
            FEED_URL,
            r#"<rss><channel><item><title>One</title><link>https://a.test/1</link></item></channel></rss>"#,
        );
        let items = fetch(&http, &source(), Duration::from_secs(1)).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].canonical_url, "https://a.test/1");
    }

    #[tokio::test]
    async fn test_server_error_yields_no_items_and_no_retry() {
        let http = FakeHttp::new().status(FEED_URL, 500);
        let items = fetch(&http, &source(), Duration::from_secs(1)).await;
        assert!(items.is_empty());
        assert_eq!(http.calls(FEED_URL), 1);
    }

    #[tokio::test]
    async fn test_timeout_yields_no_items() {
        let http = FakeHttp::new().fail(FEED_URL, FetchError::Timeout(Duration::from_secs(1)));
        assert!(fetch(&http, &source(), Duration::from_secs(1)).await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_yields_no_items() {
        let http = FakeHttp::new().ok(FEED_URL, "<html><body>oops</body></html>");
        assert!(fetch(&http, &source(), Duration::from_secs(1)).await.is_empty());
    }
}
