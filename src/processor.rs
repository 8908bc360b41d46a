//! Topic processor: feeds in, summarized articles out.
//!
//! For one topic this module:
//! 1. fetches every source with bounded parallelism (results kept in source order)
//! 2. concatenates the items and drops repeated URLs (first occurrence wins)
//! 3. drops URLs already claimed by an earlier topic this run, claiming the rest
//! 4. extracts and summarizes the survivors in fixed-size batches
//!
//! A batch runs fully concurrently, but the next batch does not start until
//! the current one has resolved, which caps concurrent connections to
//! article sites at `batch_size`. Cancellation is checked before each batch.

use crate::catalog::TopicSpec;
use crate::classifier::Candidate;
use crate::config::PipelineConfig;
use crate::error::Cancelled;
use crate::extractor::{ExtractorConfig, extract};
use crate::feeds;
use crate::http::HttpClient;
use crate::models::{Article, FeedSource, RawItem};
use crate::pipeline::CancelFlag;
use crate::summarizer::{SummaryBounds, summarize, word_count};
use crate::utils::{parse_timestamp, truncate_for_log};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Fetch, dedupe, claim, extract and summarize one topic.
///
/// # Arguments
///
/// * `client` - HTTP client shared by feeds and landing pages
/// * `topic` - Topic whose sources are processed
/// * `config` - Concurrency, timeouts and summary bounds
/// * `claimed` - URLs taken by earlier topics in this run; extended in place
/// * `cancel` - Checked before each extraction batch
///
/// # Returns
///
/// The topic's articles with the body text each was summarized from, in feed
/// order, or [`Cancelled`] if the run was interrupted between batches.
#[instrument(level = "info", skip_all, fields(topic = %topic.name))]
pub async fn process_topic<C: HttpClient>(
    client: &C,
    topic: &TopicSpec,
    config: &PipelineConfig,
    claimed: &mut HashSet<String>,
    cancel: &CancelFlag,
) -> Result<Vec<Candidate>, Cancelled> {
    let t0 = Instant::now();
    let timeout = config.source_timeout();

    let per_source: Vec<(&FeedSource, Vec<RawItem>)> = stream::iter(topic.sources.iter())
        .map(|source| async move { (source, feeds::fetch(client, source, timeout).await) })
        .buffered(config.source_concurrency.max(1))
        .collect()
        .await;

    let fetched: usize = per_source.iter().map(|(_, items)| items.len()).sum();
    let unique: Vec<(&FeedSource, RawItem)> = per_source
        .into_iter()
        .flat_map(|(source, items)| items.into_iter().map(move |item| (source, item)))
        .unique_by(|(_, item)| item.canonical_url.clone())
        .collect();
    let unique_count = unique.len();
    let fresh: Vec<(&FeedSource, RawItem)> = unique
        .into_iter()
        .filter(|(_, item)| claimed.insert(item.canonical_url.clone()))
        .collect();

    info!(
        sources = topic.sources.len(),
        fetched,
        unique = unique_count,
        claimed_elsewhere = unique_count - fresh.len(),
        to_process = fresh.len(),
        "Collected feed items"
    );

    let extractor = config.extractor();
    let bounds = config.summary_bounds();
    let mut candidates = Vec::with_capacity(fresh.len());
    for (n, batch) in fresh.chunks(config.batch_size.max(1)).enumerate() {
        if cancel.is_cancelled() {
            info!(completed_batches = n, "Cancelled between batches");
            return Err(Cancelled);
        }
        let built = join_all(
            batch
                .iter()
                .map(|(source, item)| build_article(client, &topic.name, source, item, &extractor, bounds)),
        )
        .await;
        debug!(batch = n, size = built.len(), "Batch complete");
        candidates.extend(built);
    }

    info!(
        articles = candidates.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Processed topic"
    );
    Ok(candidates)
}

/// Extract and summarize one item. Never fails; a failed extraction
/// leaves the title as the summary.
async fn build_article<C: HttpClient>(
    client: &C,
    topic: &str,
    source: &FeedSource,
    item: &RawItem,
    extractor: &ExtractorConfig,
    bounds: SummaryBounds,
) -> Candidate {
    let content = extract(client, &item.canonical_url, extractor).await;
    if content.is_empty() {
        debug!(url = %truncate_for_log(&item.canonical_url, 120), "No landing-page content; summarizing the title");
    }
    let summary = summarize(&content.body_text, &item.title, bounds);
    let published_at = item.published_at_raw.as_deref().and_then(parse_timestamp);
    debug!(
        url = %truncate_for_log(&item.canonical_url, 120),
        body_chars = content.body_text.len(),
        summary_words = word_count(&summary),
        dated = published_at.is_some(),
        "Built article"
    );
    let article = Article {
        title: item.title.clone(),
        url: item.canonical_url.clone(),
        summary,
        image: item.embedded_image_url.clone().or(content.cover_image_url),
        published_at,
        source: source.display_name.clone(),
        topic: topic.to_string(),
    };
    Candidate {
        article,
        body: content.body_text,
    }
}
