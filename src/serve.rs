//! Read side: shuffled pages over a published dataset.
//!
//! Every request gets its own Fisher-Yates shuffle of the stored list, so
//! different callers see different orderings of the same articles. The
//! stored dataset is only ever read.

use crate::catalog::AGGREGATE_TOPIC;
use crate::error::PublishError;
use crate::models::{Article, TopicDataset};
use crate::publish::load_dataset;
use crate::store::{BlobStore, aggregate_key, topic_key};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, instrument};

pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total_articles: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

/// One page of a shuffled dataset.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub category: String,
    pub updated_at: DateTime<Utc>,
    pub articles: Vec<Article>,
    pub pagination: Pagination,
}

/// Shuffle a copy of `dataset` and cut out one page.
///
/// `page` is 1-based (0 is read as 1) and `limit` is clamped to
/// `1..=MAX_PAGE_SIZE`. A page past the end is empty.
pub fn shuffled_page<R: Rng + ?Sized>(dataset: &TopicDataset, page: usize, limit: usize, rng: &mut R) -> Page {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    let total_articles = dataset.articles.len();
    let total_pages = total_articles.div_ceil(limit);

    let mut order: Vec<&Article> = dataset.articles.iter().collect();
    order.shuffle(rng);
    let articles = order
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .cloned()
        .collect();

    Page {
        category: dataset.category.clone(),
        updated_at: dataset.updated_at,
        articles,
        pagination: Pagination {
            page,
            limit,
            total_articles,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        },
    }
}

/// Load `category` from the store and serve one shuffled page of it.
///
/// # Returns
///
/// `Ok(None)` if nothing has been published for the category yet.
#[instrument(level = "info", skip(store, rng))]
pub async fn load_page<S: BlobStore, R: Rng + ?Sized>(
    store: &S,
    category: &str,
    page: usize,
    limit: usize,
    rng: &mut R,
) -> Result<Option<Page>, PublishError> {
    let key = if category == AGGREGATE_TOPIC {
        aggregate_key()
    } else {
        topic_key(category)
    };
    if !store.exists(&key).await? {
        debug!(%key, "No dataset published yet");
        return Ok(None);
    }
    Ok(load_dataset(store, &key)
        .await?
        .map(|dataset| shuffled_page(&dataset, page, limit, rng)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CACHE_CONTROL, CONTENT_TYPE_JSON, MemoryBlobStore};
    use chrono::{Duration, TimeZone};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn dataset(n: usize) -> TopicDataset {
        let base = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let mut dataset = TopicDataset::empty("world", base);
        dataset.articles = (0..n)
            .map(|i| Article {
                title: format!("Story {i}"),
                url: format!("https://a.test/{i}"),
                summary: String::new(),
                image: None,
                published_at: Some(base - Duration::hours(i as i64)),
                source: "Wire".into(),
                topic: "world".into(),
            })
            .collect();
        dataset
    }

    fn urls(page: &Page) -> Vec<&str> {
        page.articles.iter().map(|a| a.url.as_str()).collect()
    }

    #[test]
    fn test_two_reads_same_set_different_order() {
        let data = dataset(20);
        let before = data.clone();
        let first = shuffled_page(&data, 1, 20, &mut StdRng::seed_from_u64(1));
        let second = shuffled_page(&data, 1, 20, &mut StdRng::seed_from_u64(2));

        let a: HashSet<_> = urls(&first).into_iter().collect();
        let b: HashSet<_> = urls(&second).into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
        assert_ne!(urls(&first), urls(&second));
        assert_eq!(data.articles, before.articles);
    }

    #[test]
    fn test_pagination() {
        let data = dataset(25);
        let mut rng = StdRng::seed_from_u64(7);

        let first = shuffled_page(&data, 1, 10, &mut rng);
        assert_eq!(first.articles.len(), 10);
        assert_eq!(
            first.pagination,
            Pagination {
                page: 1,
                limit: 10,
                total_articles: 25,
                total_pages: 3,
                has_next: true,
                has_prev: false,
            }
        );

        let last = shuffled_page(&data, 3, 10, &mut rng);
        assert_eq!(last.articles.len(), 5);
        assert!(!last.pagination.has_next);
        assert!(last.pagination.has_prev);

        let past_end = shuffled_page(&data, 9, 10, &mut rng);
        assert!(past_end.articles.is_empty());
    }

    #[test]
    fn test_limits_are_clamped() {
        let data = dataset(3);
        let mut rng = StdRng::seed_from_u64(7);
        let page = shuffled_page(&data, 0, 0, &mut rng);
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.limit, 1);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(shuffled_page(&data, 1, 5000, &mut rng).pagination.limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_empty_dataset() {
        let page = shuffled_page(&dataset(0), 1, 10, &mut StdRng::seed_from_u64(1));
        assert!(page.articles.is_empty());
        assert_eq!(page.pagination.total_pages, 0);
        assert!(!page.pagination.has_next);
    }

    #[tokio::test]
    async fn test_load_page_reads_without_writing() {
        let store = MemoryBlobStore::new();
        let bytes = dataset(4).to_json().unwrap();
        store
            .put("news/news_world.json", &bytes, CONTENT_TYPE_JSON, CACHE_CONTROL)
            .await
            .unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let page = load_page(&store, "world", 1, 10, &mut rng).await.unwrap().unwrap();
        assert_eq!(page.articles.len(), 4);
        assert_eq!(store.get("news/news_world.json").await.unwrap().unwrap(), bytes);

        assert!(load_page(&store, "sports", 1, 10, &mut rng).await.unwrap().is_none());
    }
}
