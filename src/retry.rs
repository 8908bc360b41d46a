//! Bounded retry for landing-page fetches.
//!
//! [`RetryingClient`] decorates any [`HttpClient`] with a fixed number of
//! attempts separated by a fixed delay. Only transient outcomes are retried:
//! timeouts, transport errors, 5xx, 408 and 429. Any other response,
//! including 401/403, is returned on the first attempt so permanently
//! blocked sources cost exactly one request.

use crate::error::{FetchError, is_transient_status};
use crate::http::{HttpClient, HttpResponse};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{instrument, warn};

pub struct RetryingClient<T> {
    /// The client to wrap.
    inner: T,
    /// Total attempts, including the first.
    attempts: u32,
    /// Pause between attempts.
    delay: Duration,
}

impl<T> RetryingClient<T>
where
    T: HttpClient,
{
    /// Wrap `inner`. `attempts` is clamped to at least one.
    pub fn new(inner: T, attempts: u32, delay: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl<T> fmt::Debug for RetryingClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingClient")
            .field("attempts", &self.attempts)
            .field("delay", &self.delay)
            .finish()
    }
}

impl<T> HttpClient for RetryingClient<T>
where
    T: HttpClient,
{
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = self.inner.get(url, timeout).await;
            let retryable = match &outcome {
                Ok(response) => is_transient_status(response.status),
                Err(e) => e.is_transient(),
            };
            if !retryable || attempt >= self.attempts {
                return outcome;
            }

            warn!(
                attempt,
                max = self.attempts,
                elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                delay = ?self.delay,
                outcome = %describe(&outcome),
                "GET attempt failed; retrying"
            );
            sleep(self.delay).await;
        }
    }
}

fn describe(outcome: &Result<HttpResponse, FetchError>) -> String {
    match outcome {
        Ok(response) => format!("HTTP {}", response.status),
        Err(e) => e.to_string(),
    }
}
