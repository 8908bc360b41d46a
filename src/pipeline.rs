//! Run orchestrator.
//!
//! One run walks the catalog topic by topic, sequentially, so outbound volume
//! and memory stay bounded by a single topic. The only state crossing topic
//! boundaries is the run's set of claimed URLs, which is what keeps an article
//! in at most one topic. A topic that fails (a store write error, a corrupt
//! stored dataset) is recorded and the run moves on.
//!
//! After the topics, the aggregate dataset is rebuilt from what was just
//! published and written under its reserved key.
//!
//! # Modes
//!
//! - default: each topic is processed and published before the next starts;
//!   exclusivity comes from fetch order.
//! - `reclassify`: every topic is processed first, then the pooled articles are
//!   redistributed by keyword ([`crate::classifier`]) and each topic published.
//!
//! # Cancellation
//!
//! [`CancelFlag`] is checked between topics and between extraction batches.
//! Topics not published when it trips are reported as failed with `cancelled`,
//! and the aggregate is skipped.

use crate::catalog::{AGGREGATE_TOPIC, Catalog};
use crate::classifier::{Candidate, classify};
use crate::config::PipelineConfig;
use crate::error::Cancelled;
use crate::http::HttpClient;
use crate::merge::MergePolicy;
use crate::models::{Article, RunReport, RunResult, TopicDataset};
use crate::processor::process_topic;
use crate::publish::{load_dataset, publish, publish_aggregate};
use crate::store::{BlobStore, topic_key};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Shared, clonable stop signal.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execute one pipeline run.
///
/// # Arguments
///
/// * `config` - Pipeline settings
/// * `catalog` - Topics in processing order
/// * `client` - HTTP client for feeds and landing pages
/// * `store` - Durable store holding the datasets
/// * `cancel` - Stop signal, checked between topics and batches
/// * `now` - Run timestamp; every dataset written gets it as `updated_at`
///
/// # Returns
///
/// A complete report: one [`RunResult`] per catalog topic, in catalog order,
/// whatever happened to each.
#[instrument(level = "info", skip_all, fields(topics = catalog.topics().len(), reclassify = config.reclassify))]
pub async fn run_pipeline<C: HttpClient, S: BlobStore>(
    config: &PipelineConfig,
    catalog: &Catalog,
    client: &C,
    store: &S,
    cancel: &CancelFlag,
    now: DateTime<Utc>,
) -> RunReport {
    let t0 = Instant::now();
    let policy = config.merge_policy();
    info!(
        cap = policy.cap,
        retention_days = ?config.retention_days,
        "Pipeline run starting"
    );

    let results = if config.reclassify {
        run_reclassified(config, catalog, client, store, cancel, now, &policy).await
    } else {
        run_sequential(config, catalog, client, store, cancel, now, &policy).await
    };

    let aggregate = if cancel.is_cancelled() {
        warn!("Run cancelled; skipping aggregate");
        None
    } else {
        Some(build_aggregate(catalog, store, &results, now, &policy).await)
    };

    let report = RunReport::new(results, aggregate, now);
    info!(
        success = report.success,
        successful = report.summary.successful,
        failed = report.summary.failed,
        total_articles = report.summary.total_articles,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Pipeline run finished"
    );
    report
}

async fn run_sequential<C: HttpClient, S: BlobStore>(
    config: &PipelineConfig,
    catalog: &Catalog,
    client: &C,
    store: &S,
    cancel: &CancelFlag,
    now: DateTime<Utc>,
    policy: &MergePolicy,
) -> Vec<RunResult> {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut results = Vec::with_capacity(catalog.topics().len());

    for topic in catalog.topics() {
        if cancel.is_cancelled() {
            results.push(RunResult::failed(&topic.name, Cancelled));
            continue;
        }
        let result = match process_topic(client, topic, config, &mut claimed, cancel).await {
            Err(cancelled) => RunResult::failed(&topic.name, cancelled),
            Ok(candidates) => {
                let articles = candidates.into_iter().map(|c| c.article).collect();
                publish_topic(store, &topic.name, articles, now, policy).await
            }
        };
        results.push(result);
    }
    results
}

async fn run_reclassified<C: HttpClient, S: BlobStore>(
    config: &PipelineConfig,
    catalog: &Catalog,
    client: &C,
    store: &S,
    cancel: &CancelFlag,
    now: DateTime<Utc>,
    policy: &MergePolicy,
) -> Vec<RunResult> {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut pool: Vec<Candidate> = Vec::new();

    for topic in catalog.topics() {
        if cancel.is_cancelled() {
            break;
        }
        match process_topic(client, topic, config, &mut claimed, cancel).await {
            Ok(candidates) => pool.extend(candidates),
            Err(Cancelled) => break,
        }
    }

    if cancel.is_cancelled() {
        return catalog
            .topics()
            .iter()
            .map(|t| RunResult::failed(&t.name, Cancelled))
            .collect();
    }

    let mut classification = classify(pool, catalog);
    let mut results = Vec::with_capacity(catalog.topics().len());
    for topic in catalog.topics() {
        if cancel.is_cancelled() {
            results.push(RunResult::failed(&topic.name, Cancelled));
            continue;
        }
        let articles = classification.take(&topic.name);
        results.push(publish_topic(store, &topic.name, articles, now, policy).await);
    }
    results
}

async fn publish_topic<S: BlobStore>(
    store: &S,
    topic: &str,
    articles: Vec<Article>,
    now: DateTime<Utc>,
    policy: &MergePolicy,
) -> RunResult {
    match publish(store, topic, articles, now, policy).await {
        Ok(outcome) => outcome.into_result(topic),
        Err(e) => {
            error!(%topic, error = %e, "Publish failed");
            RunResult::failed(topic, e)
        }
    }
}

/// Re-read every topic published this run and write the aggregate.
async fn build_aggregate<S: BlobStore>(
    catalog: &Catalog,
    store: &S,
    results: &[RunResult],
    now: DateTime<Utc>,
    policy: &MergePolicy,
) -> RunResult {
    let published: HashSet<&str> = results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.topic.as_str())
        .collect();

    let mut datasets: Vec<TopicDataset> = Vec::new();
    for topic in catalog.topics().iter().filter(|t| published.contains(t.name.as_str())) {
        let key = topic_key(&topic.name);
        match load_dataset(store, &key).await {
            Ok(Some(dataset)) => datasets.push(dataset),
            Ok(None) => warn!(%key, "Published dataset missing on re-read"),
            Err(e) => warn!(%key, error = %e, "Published dataset unreadable on re-read"),
        }
    }

    match publish_aggregate(store, &datasets, now, policy).await {
        Ok(outcome) => outcome.into_result(AGGREGATE_TOPIC),
        Err(e) => {
            error!(error = %e, "Aggregate publish failed");
            RunResult::failed(AGGREGATE_TOPIC, e)
        }
    }
}
