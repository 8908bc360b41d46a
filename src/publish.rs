//! Persistence gateway: read, merge, write, verify.
//!
//! The store has no transactions, so every publish follows the same
//! optimistic protocol against a single key:
//!
//! | Step   | Call                      | On failure                         |
//! |--------|---------------------------|------------------------------------|
//! | read   | `get(key)`                | absent = first run; bad JSON fails |
//! | merge  | [`merge`]                 | cannot fail                        |
//! | write  | `put(key)`, `make_public` | topic fails (`success: false`)     |
//! | verify | `metadata(key)`, `get`    | `verified: false`, not retried     |
//!
//! Verification checks that the stored size equals the bytes written and that
//! the stored document decodes to the same number of articles.
//!
//! # Concurrency
//!
//! Two runs publishing the same topic at once can lose each other's articles.
//! Runs must be serialized by whatever schedules them.

use crate::catalog::AGGREGATE_TOPIC;
use crate::error::PublishError;
use crate::merge::{MergeOutcome, MergePolicy, merge, url_delta};
use crate::models::{Article, RunResult, TopicDataset};
use crate::store::{BlobStore, CACHE_CONTROL, CONTENT_TYPE_JSON, aggregate_key, topic_key};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

/// What one publish did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub total_articles: usize,
    pub new_articles: usize,
    pub removed_articles: usize,
    pub verified: bool,
}

impl PublishOutcome {
    pub fn into_result(self, topic: &str) -> RunResult {
        RunResult {
            topic: topic.to_string(),
            success: true,
            total_articles: self.total_articles,
            new_articles: self.new_articles,
            removed_articles: self.removed_articles,
            verified: self.verified,
            error: None,
        }
    }
}

/// Load the dataset stored under `key`.
///
/// # Returns
///
/// `Ok(None)` if nothing has been published there yet.
///
/// # Errors
///
/// [`PublishError::Store`] if the read fails, [`PublishError::Decode`] if the
/// stored bytes are not a dataset.
pub async fn load_dataset<S: BlobStore>(store: &S, key: &str) -> Result<Option<TopicDataset>, PublishError> {
    match store.get(key).await? {
        None => Ok(None),
        Some(bytes) => TopicDataset::from_json(&bytes)
            .map(Some)
            .map_err(|source| PublishError::Decode {
                key: key.to_string(),
                source,
            }),
    }
}

/// Merge `fresh` into the stored dataset for `topic` and write it back.
///
/// # Arguments
///
/// * `store` - Durable store holding the previous dataset
/// * `topic` - Topic name; determines the storage key
/// * `fresh` - Articles produced by this run
/// * `now` - Becomes the dataset's `updated_at` and anchors retention
/// * `policy` - Cap and retention applied during the merge
#[instrument(level = "info", skip_all, fields(%topic, fresh = fresh.len()))]
pub async fn publish<S: BlobStore>(
    store: &S,
    topic: &str,
    fresh: Vec<Article>,
    now: DateTime<Utc>,
    policy: &MergePolicy,
) -> Result<PublishOutcome, PublishError> {
    let key = topic_key(topic);
    let existing = match load_dataset(store, &key).await? {
        Some(dataset) => dataset,
        None => {
            info!(%key, "No stored dataset; starting empty");
            TopicDataset::empty(topic, now)
        }
    };

    let MergeOutcome {
        dataset,
        evicted,
        expired,
        new_articles,
        removed_articles,
    } = merge(fresh, &existing, now, policy);

    let verified = write_verified(store, &key, &dataset).await?;

    info!(
        %key,
        total = dataset.articles.len(),
        new_articles,
        removed_articles,
        evicted,
        expired,
        verified,
        "Published topic dataset"
    );
    Ok(PublishOutcome {
        total_articles: dataset.articles.len(),
        new_articles,
        removed_articles,
        verified,
    })
}

/// Rebuild the aggregate from topic datasets and write it.
///
/// The aggregate is derived, not merged: it is recomputed from `topics` on
/// every run (latest copy wins per URL, same retention and cap), and the
/// previous aggregate is read only to report what changed.
#[instrument(level = "info", skip_all, fields(topics = topics.len()))]
pub async fn publish_aggregate<S: BlobStore>(
    store: &S,
    topics: &[TopicDataset],
    now: DateTime<Utc>,
    policy: &MergePolicy,
) -> Result<PublishOutcome, PublishError> {
    let key = aggregate_key();
    let pooled: Vec<Article> = topics.iter().flat_map(|t| t.articles.iter().cloned()).collect();
    let pooled_count = pooled.len();
    let derived = merge(pooled, &TopicDataset::empty(AGGREGATE_TOPIC, now), now, policy);

    let previous = match load_dataset(store, &key).await {
        Ok(previous) => previous.map(|d| d.articles).unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, %key, "Previous aggregate unreadable; replacing it");
            Vec::new()
        }
    };
    let (new_articles, removed_articles) = url_delta(&previous, &derived.dataset.articles);

    let verified = write_verified(store, &key, &derived.dataset).await?;

    info!(
        %key,
        pooled = pooled_count,
        total = derived.dataset.articles.len(),
        evicted = derived.evicted,
        expired = derived.expired,
        verified,
        "Published aggregate dataset"
    );
    Ok(PublishOutcome {
        total_articles: derived.dataset.articles.len(),
        new_articles,
        removed_articles,
        verified,
    })
}

/// Write `dataset` under `key`, then read it back.
///
/// Returns whether the read-back matched. Only the write itself can fail the
/// call; a failed read-back is an unverified publish.
async fn write_verified<S: BlobStore>(
    store: &S,
    key: &str,
    dataset: &TopicDataset,
) -> Result<bool, PublishError> {
    let bytes = dataset.to_json().map_err(PublishError::Encode)?;
    store.put(key, &bytes, CONTENT_TYPE_JSON, CACHE_CONTROL).await?;
    store.make_public(key).await?;

    let expected_size = bytes.len() as u64;
    let expected_count = dataset.articles.len();

    let meta = match store.metadata(key).await {
        Ok(Some(meta)) => meta,
        Ok(None) => {
            error!(%key, "Verification failed: object missing after write");
            return Ok(false);
        }
        Err(e) => {
            error!(%key, error = %e, "Verification failed: metadata unreadable");
            return Ok(false);
        }
    };
    let stored_count = match store.get(key).await {
        Ok(Some(stored)) => TopicDataset::from_json(&stored).ok().map(|d| d.articles.len()),
        Ok(None) => None,
        Err(e) => {
            error!(%key, error = %e, "Verification failed: object unreadable");
            return Ok(false);
        }
    };

    if meta.size != expected_size || stored_count != Some(expected_count) {
        error!(
            %key,
            expected_size,
            actual_size = meta.size,
            expected_count,
            actual_count = ?stored_count,
            "Verification failed: stored dataset does not match what was written"
        );
        return Ok(false);
    }
    debug!(
        %key,
        size = meta.size,
        last_modified = %meta.last_modified,
        content_type = %meta.content_type,
        cache_control = %meta.cache_control,
        "Verified stored dataset"
    );
    Ok(true)
}
