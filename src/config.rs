//! Pipeline configuration.
//!
//! Every knob has a default, so running without a config file works. A YAML
//! file may override any subset of fields:
//!
//! ```yaml
//! cap: 500
//! retention_days: 7
//! batch_size: 6
//! topics:
//!   - name: climate
//!     keywords: [climate, emissions]
//!     sources:
//!       - endpoint: https://example.org/climate.xml
//!         name: Example Climate
//! ```
//!
//! Retention filtering is off unless `retention_days` is set.

use crate::catalog::{Catalog, TopicSpec};
use crate::error::ConfigError;
use crate::extractor::ExtractorConfig;
use crate::merge::MergePolicy;
use crate::summarizer::SummaryBounds;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Maximum articles kept per dataset.
    pub cap: usize,
    /// Maximum article age in days. Absent disables age filtering.
    pub retention_days: Option<u32>,
    /// Articles extracted and summarized concurrently per batch.
    pub batch_size: usize,
    /// Feeds of one topic fetched concurrently.
    pub source_concurrency: usize,
    pub source_timeout_secs: u64,
    pub extract_timeout_secs: u64,
    pub extract_attempts: u32,
    pub extract_retry_delay_ms: u64,
    pub max_body_chars: usize,
    pub summary_min_words: usize,
    pub summary_max_words: usize,
    pub user_agent: String,
    /// Re-distribute fresh articles across topics by keyword before publishing.
    pub reclassify: bool,
    /// Replaces the built-in catalog when present.
    pub topics: Option<Vec<TopicSpec>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cap: 700,
            retention_days: None,
            batch_size: 8,
            source_concurrency: 4,
            source_timeout_secs: 15,
            extract_timeout_secs: 10,
            extract_attempts: 2,
            extract_retry_delay_ms: 1000,
            max_body_chars: 3000,
            summary_min_words: 30,
            summary_max_words: 40,
            user_agent: format!("topic_digest/{}", env!("CARGO_PKG_VERSION")),
            reclassify: false,
            topics: None,
        }
    }
}

impl PipelineConfig {
    /// Load from an optional YAML file, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                info!(path = %path.display(), "Loaded configuration file");
                Self::from_yaml(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg.to_string())) };
        if self.cap == 0 {
            return invalid("cap must be positive");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive");
        }
        if self.source_concurrency == 0 {
            return invalid("source_concurrency must be positive");
        }
        if self.extract_attempts == 0 {
            return invalid("extract_attempts must be at least 1");
        }
        if self.summary_min_words == 0 || self.summary_min_words > self.summary_max_words {
            return invalid("summary word bounds must satisfy 0 < min <= max");
        }
        if self.retention_days == Some(0) {
            return invalid("retention_days must be positive when set");
        }
        Ok(())
    }

    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        match &self.topics {
            Some(topics) => Catalog::new(topics.clone()),
            None => Ok(Catalog::builtin()),
        }
    }

    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy {
            cap: self.cap,
            retention: self
                .retention_days
                .map(|days| chrono::Duration::days(i64::from(days))),
        }
    }

    pub fn summary_bounds(&self) -> SummaryBounds {
        SummaryBounds {
            min_words: self.summary_min_words,
            max_words: self.summary_max_words,
        }
    }

    pub fn extractor(&self) -> ExtractorConfig {
        ExtractorConfig {
            timeout: Duration::from_secs(self.extract_timeout_secs),
            attempts: self.extract_attempts,
            retry_delay: Duration::from_millis(self.extract_retry_delay_ms),
            max_body_chars: self.max_body_chars,
        }
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}
