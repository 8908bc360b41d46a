//! HTTP access for feeds and landing pages.
//!
//! Everything that talks to the network goes through [`HttpClient`], which
//! hands back the status code and body for every response instead of turning
//! non-2xx into errors. Callers decide what a status means: the feed fetcher
//! treats any non-2xx as "no items", the extractor distinguishes terminal
//! authorization failures from transient ones.

use crate::error::FetchError;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Status and body of one GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal async GET used by the fetcher and extractor.
pub trait HttpClient {
    /// Fetch `url`, giving up after `timeout`.
    ///
    /// Returns `Ok` for any status code; `Err` only for timeouts and
    /// transport failures.
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError>;
}

impl<T: HttpClient> HttpClient for &T {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
        (**self).get(url, timeout).await
    }
}

/// [`HttpClient`] over a shared `reqwest` connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
        let t0 = Instant::now();
        // One deadline covers both the headers and the body.
        let request = async {
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(HttpResponse { status, body })
        };
        let result = match tokio::time::timeout(timeout, request).await {
            Err(_) => Err(FetchError::Timeout(timeout)),
            Ok(Err(e)) if e.is_timeout() => Err(FetchError::Timeout(timeout)),
            Ok(Err(e)) => Err(FetchError::Transport(e.to_string())),
            Ok(Ok(response)) => Ok(response),
        };
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            status = ?result.as_ref().map(|r| r.status).ok(),
            "GET finished"
        );
        result
    }
}
