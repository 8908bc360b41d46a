//! Merge and retention engine.
//!
//! Folds freshly processed articles into a previously published dataset:
//!
//! 1. concatenate new then existing articles
//! 2. dedupe by URL, keeping the copy with the later `published_at`
//!    (a known timestamp beats a missing one; ties keep the first seen)
//! 3. if retention is enabled, drop articles older than the horizon or
//!    without a timestamp
//! 4. stable sort by `published_at` descending, missing timestamps last
//! 5. truncate to the cap, counting what was evicted
//!
//! `updated_at` is always set to `now`, even when nothing changed.

use crate::models::{Article, TopicDataset};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Size and age limits applied on every merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePolicy {
    /// Maximum articles kept per dataset.
    pub cap: usize,
    /// Maximum article age; `None` disables age-based filtering.
    pub retention: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub dataset: TopicDataset,
    /// Articles dropped by the cap.
    pub evicted: usize,
    /// Articles dropped by retention.
    pub expired: usize,
    /// URLs in the result that were not in the existing dataset.
    pub new_articles: usize,
    /// URLs in the existing dataset that are no longer present.
    pub removed_articles: usize,
}

/// Merge `fresh` into `existing` under `policy`.
pub fn merge(
    fresh: Vec<Article>,
    existing: &TopicDataset,
    now: DateTime<Utc>,
    policy: &MergePolicy,
) -> MergeOutcome {
    let combined = fresh.into_iter().chain(existing.articles.iter().cloned());
    let mut articles = dedupe_latest(combined);

    let mut expired = 0;
    if let Some(horizon) = policy.retention.map(|r| now - r) {
        let before = articles.len();
        articles.retain(|a| a.published_at.is_some_and(|ts| ts >= horizon));
        expired = before - articles.len();
    }

    sort_newest_first(&mut articles);

    let evicted = articles.len().saturating_sub(policy.cap);
    articles.truncate(policy.cap);

    let (new_articles, removed_articles) = url_delta(&existing.articles, &articles);

    MergeOutcome {
        dataset: TopicDataset {
            category: existing.category.clone(),
            updated_at: now,
            articles,
        },
        evicted,
        expired,
        new_articles,
        removed_articles,
    }
}

/// Count URLs added to and removed from `previous` to get `current`.
pub fn url_delta(previous: &[Article], current: &[Article]) -> (usize, usize) {
    let before: HashSet<&str> = previous.iter().map(|a| a.url.as_str()).collect();
    let after: HashSet<&str> = current.iter().map(|a| a.url.as_str()).collect();
    (
        after.difference(&before).count(),
        before.difference(&after).count(),
    )
}

/// Dedupe by URL at first-occurrence position, keeping the later-published copy.
pub fn dedupe_latest(articles: impl IntoIterator<Item = Article>) -> Vec<Article> {
    let mut out: Vec<Article> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for article in articles {
        match index.get(&article.url) {
            Some(&i) => {
                if is_newer(&article, &out[i]) {
                    out[i] = article;
                }
            }
            None => {
                index.insert(article.url.clone(), out.len());
                out.push(article);
            }
        }
    }
    out
}

fn is_newer(candidate: &Article, current: &Article) -> bool {
    match (candidate.published_at, current.published_at) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Stable sort by `published_at` descending; undated articles go last.
pub fn sort_newest_first(articles: &mut [Article]) {
    articles.sort_by(|a, b| match (a.published_at, b.published_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    fn article(url: &str, published: Option<DateTime<Utc>>, title: &str) -> Article {
        Article {
            title: title.into(),
            url: url.into(),
            summary: format!("summary of {title}"),
            image: None,
            published_at: published,
            source: "Wire".into(),
            topic: "world".into(),
        }
    }

    fn policy(cap: usize) -> MergePolicy {
        MergePolicy { cap, retention: None }
    }

    #[test]
    fn test_same_url_keeps_later_published_copy() {
        let existing = TopicDataset::empty("world", at(0));
        let fresh = vec![
            article("https://a.test/x", Some(at(1)), "early"),
            article("https://a.test/x", Some(at(5)), "late"),
        ];
        let out = merge(fresh, &existing, at(10), &policy(10));
        assert_eq!(out.dataset.articles.len(), 1);
        assert_eq!(out.dataset.articles[0].title, "late");
    }

    #[test]
    fn test_tie_keeps_first_and_dated_beats_undated() {
        let merged = dedupe_latest(vec![
            article("https://a.test/1", Some(at(1)), "first"),
            article("https://a.test/1", Some(at(1)), "second"),
            article("https://a.test/2", None, "undated"),
            article("https://a.test/2", Some(at(0)), "dated"),
        ]);
        assert_eq!(merged[0].title, "first");
        assert_eq!(merged[1].title, "dated");
    }

    #[test]
    fn test_fresh_copy_replaces_stored_copy_when_newer() {
        let mut existing = TopicDataset::empty("world", at(0));
        existing.articles = vec![article("https://a.test/x", Some(at(1)), "stored")];
        let out = merge(
            vec![article("https://a.test/x", Some(at(2)), "fresh")],
            &existing,
            at(3),
            &policy(10),
        );
        assert_eq!(out.dataset.articles[0].title, "fresh");
        assert_eq!(out.new_articles, 0);
        assert_eq!(out.removed_articles, 0);
    }

    #[test]
    fn test_sorted_newest_first_with_undated_last() {
        let existing = TopicDataset::empty("world", at(0));
        let out = merge(
            vec![
                article("https://a.test/old", Some(at(1)), "old"),
                article("https://a.test/none", None, "none"),
                article("https://a.test/new", Some(at(9)), "new"),
            ],
            &existing,
            at(10),
            &policy(10),
        );
        let titles: Vec<_> = out.dataset.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "old", "none"]);
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let mut existing = TopicDataset::empty("world", at(0));
        existing.articles = (0..700)
            .rev()
            .map(|i| article(&format!("https://a.test/old/{i}"), Some(at(i)), "old"))
            .collect();
        let fresh: Vec<Article> = (0..50)
            .map(|i| article(&format!("https://a.test/new/{i}"), Some(at(1000 + i)), "new"))
            .collect();

        let out = merge(fresh, &existing, at(2000), &policy(700));
        assert_eq!(out.dataset.articles.len(), 700);
        assert_eq!(out.evicted, 50);
        assert_eq!(out.new_articles, 50);
        assert_eq!(out.removed_articles, 50);

        let kept: HashSet<&str> = out.dataset.articles.iter().map(|a| a.url.as_str()).collect();
        for i in 0..50 {
            assert!(!kept.contains(format!("https://a.test/old/{i}").as_str()));
        }
        assert!(kept.contains("https://a.test/old/50"));
    }

    #[test]
    fn test_retention_drops_old_and_undated() {
        let existing = TopicDataset::empty("world", at(0));
        let policy = MergePolicy {
            cap: 10,
            retention: Some(Duration::hours(24)),
        };
        let now = at(100);
        let out = merge(
            vec![
                article("https://a.test/fresh", Some(at(90)), "fresh"),
                article("https://a.test/stale", Some(at(10)), "stale"),
                article("https://a.test/undated", None, "undated"),
            ],
            &existing,
            now,
            &policy,
        );
        assert_eq!(out.dataset.articles.len(), 1);
        assert_eq!(out.expired, 2);
        assert!(
            out.dataset
                .articles
                .iter()
                .all(|a| now - a.published_at.unwrap() <= Duration::hours(24))
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut existing = TopicDataset::empty("world", at(0));
        existing.articles = vec![
            article("https://a.test/2", Some(at(2)), "b"),
            article("https://a.test/1", Some(at(1)), "a"),
            article("https://a.test/0", None, "c"),
        ];
        let out = merge(Vec::new(), &existing, at(5), &policy(10));
        assert_eq!(out.dataset.articles, existing.articles);
        assert_eq!(out.dataset.updated_at, at(5));
        assert_eq!(out.evicted + out.new_articles + out.removed_articles, 0);

        let again = merge(existing.articles.clone(), &out.dataset, at(6), &policy(10));
        assert_eq!(again.dataset.articles, existing.articles);
    }
}
