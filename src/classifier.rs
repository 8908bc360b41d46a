//! Keyword category validator.
//!
//! Re-distributes a pool of freshly summarized articles by content rather than
//! by the feed they came from. Topics are visited in [`Catalog::priority`]
//! order; each keeps the unclaimed articles whose title, summary or body
//! contains one of its keywords (case-insensitive substring). Text and
//! keywords are both folded first: lowercased, with every run of punctuation
//! or whitespace turned into a single space, so `" war "` matches "War," but
//! not "software". The catch-all
//! topic, visited last, takes whatever is left. A URL is claimed at most once
//! per pass, so every article ends up in at most one topic.

use crate::catalog::Catalog;
use crate::models::Article;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// An article awaiting classification, with the body text it was summarized from.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub article: Article,
    pub body: String,
}

impl Candidate {
    fn haystack(&self) -> String {
        fold(&format!(
            " {} {} {} ",
            self.article.title, self.article.summary, self.body
        ))
    }
}

/// Lowercase `text` and collapse every run of non-alphanumerics to one space.
fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut gap = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
            gap = false;
        } else if !gap {
            out.push(' ');
            gap = true;
        }
    }
    out
}

#[derive(Debug, Default)]
pub struct Classification {
    /// Claimed articles per topic, in pool order, re-stamped with their new topic.
    pub by_topic: HashMap<String, Vec<Article>>,
    /// Articles no topic accepted (only possible without a catch-all).
    pub unclaimed: usize,
}

impl Classification {
    /// Articles assigned to `topic`, empty if none.
    pub fn take(&mut self, topic: &str) -> Vec<Article> {
        self.by_topic.remove(topic).unwrap_or_default()
    }
}

/// Assign each candidate to at most one topic.
pub fn classify(pool: Vec<Candidate>, catalog: &Catalog) -> Classification {
    let haystacks: Vec<String> = pool.iter().map(Candidate::haystack).collect();
    let mut claimed: HashSet<String> = HashSet::new();
    let mut taken = vec![false; pool.len()];
    let mut result = Classification::default();

    for topic in catalog.priority() {
        let keywords: Vec<String> = topic
            .keywords
            .iter()
            .map(|k| fold(k))
            .filter(|k| !k.trim().is_empty())
            .collect();
        let mut accepted = Vec::new();
        for (i, candidate) in pool.iter().enumerate() {
            if taken[i] {
                continue;
            }
            let url = &candidate.article.url;
            if claimed.contains(url) {
                // Duplicate of an article already placed this pass.
                taken[i] = true;
                continue;
            }
            let matches =
                topic.catch_all || keywords.iter().any(|k| haystacks[i].contains(k.as_str()));
            if matches {
                claimed.insert(url.clone());
                taken[i] = true;
                accepted.push(i);
            }
        }
        debug!(topic = %topic.name, count = accepted.len(), "Classified articles");
        let articles = accepted
            .into_iter()
            .map(|i| Article {
                topic: topic.name.clone(),
                ..pool[i].article.clone()
            })
            .collect();
        result.by_topic.insert(topic.name.clone(), articles);
    }

    result.unclaimed = taken.iter().filter(|t| !**t).count();
    info!(
        pooled = pool.len(),
        placed = claimed.len(),
        unclaimed = result.unclaimed,
        "Reclassified article pool"
    );
    result
}
