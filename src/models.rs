//! Data models for feed items, articles and the persisted per-topic datasets.
//!
//! This module defines the structures that flow through the pipeline:
//! - [`FeedSource`]: one configured feed endpoint belonging to a topic
//! - [`RawItem`]: an item stub parsed out of a feed
//! - [`ExtractedContent`]: best-effort body text and cover image of a landing page
//! - [`Article`]: the summarized, publishable value object
//! - [`TopicDataset`]: the persisted wire document for one topic (or the aggregate)
//! - [`RunResult`] / [`RunReport`]: per-topic audit records of one run
//!
//! [`Article`] and [`TopicDataset`] serialize to the wire format consumed by
//! the downstream reader, so their field names are part of a public contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single feed endpoint for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    /// Topic (category) this feed contributes to.
    #[serde(default)]
    pub topic: String,
    /// Feed URL (RSS or Atom).
    pub endpoint: String,
    /// Human-readable outlet name, copied onto every article from this feed.
    #[serde(rename = "name")]
    pub display_name: String,
}

/// An item stub as parsed from a feed, before extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub canonical_url: String,
    /// Publication timestamp exactly as the feed reported it.
    pub published_at_raw: Option<String>,
    /// Image discovered inside the feed item itself.
    pub embedded_image_url: Option<String>,
}

/// Result of extracting a landing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    pub body_text: String,
    pub cover_image_url: Option<String>,
}

impl ExtractedContent {
    pub fn is_empty(&self) -> bool {
        self.body_text.is_empty() && self.cover_image_url.is_none()
    }
}

/// A summarized article. Identity is [`Article::url`].
///
/// Articles are never mutated once built; a merge replaces an article with a
/// newer copy sharing the same URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    /// Canonical URL, the deduplication key.
    pub url: String,
    pub summary: String,
    #[serde(default)]
    pub image: Option<String>,
    /// `None` when the feed's timestamp could not be parsed.
    #[serde(with = "timestamp", default)]
    pub published_at: Option<DateTime<Utc>>,
    pub source: String,
    /// Owning topic. Not part of the wire format; restored from the dataset.
    #[serde(skip)]
    pub topic: String,
}

/// The persisted document for one topic.
///
/// Invariants after every publish: at most `cap` articles, no duplicate URLs,
/// articles sorted by `published_at` descending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicDataset {
    pub category: String,
    pub updated_at: DateTime<Utc>,
    pub articles: Vec<Article>,
}

impl TopicDataset {
    pub fn empty(category: &str, now: DateTime<Utc>) -> Self {
        Self {
            category: category.to_string(),
            updated_at: now,
            articles: Vec::new(),
        }
    }

    /// Decode a stored dataset, restoring each article's topic from `category`.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        let mut dataset: TopicDataset = serde_json::from_slice(bytes)?;
        for article in &mut dataset.articles {
            article.topic = dataset.category.clone();
        }
        Ok(dataset)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Per-topic audit record of one run. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub topic: String,
    /// False when the topic's publish failed (or the run was cancelled first).
    pub success: bool,
    pub total_articles: usize,
    pub new_articles: usize,
    pub removed_articles: usize,
    /// False when the write landed but the read-back did not match.
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    pub fn failed(topic: &str, error: impl ToString) -> Self {
        Self {
            topic: topic.to_string(),
            success: false,
            total_articles: 0,
            new_articles: 0,
            removed_articles: 0,
            verified: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub total_categories: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_articles: usize,
}

/// Report returned to the trigger after a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub summary: RunSummary,
    pub results: Vec<RunResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<RunResult>,
}

impl RunReport {
    pub fn new(results: Vec<RunResult>, aggregate: Option<RunResult>, timestamp: DateTime<Utc>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        let summary = RunSummary {
            total_categories: results.len(),
            successful,
            failed,
            total_articles: results.iter().map(|r| r.total_articles).sum(),
        };
        Self {
            success: failed == 0,
            timestamp,
            summary,
            results,
            aggregate,
        }
    }
}

/// Serde adapter for optional article timestamps.
///
/// Writes RFC 3339 (or `null`). Reads leniently: any string the feed parser
/// understands, or a unix timestamp in seconds or milliseconds. Anything else
/// becomes `None` instead of failing the whole dataset.
pub mod timestamp {
    use crate::utils::parse_timestamp;
    use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<Value>::deserialize(d)?;
        Ok(match raw {
            Some(Value::String(s)) => parse_timestamp(&s),
            Some(Value::Number(n)) => n.as_i64().and_then(|v| {
                if v.abs() >= 100_000_000_000 {
                    Utc.timestamp_millis_opt(v).single()
                } else {
                    Utc.timestamp_opt(v, 0).single()
                }
            }),
            _ => None,
        })
    }
}
