//! Source catalog: the ordered mapping of topic to feeds and keywords.
//!
//! Topic order matters twice. The orchestrator processes topics in catalog
//! order, so the first topic to claim a URL keeps it. The category validator
//! walks [`Catalog::priority`], which is catalog order with the catch-all
//! topic moved to the end. The built-in catalog therefore lists its narrow
//! topics first and the broad `world` topic just before the catch-all.
//!
//! Keywords are matched against lowercased text whose punctuation has been
//! folded to single spaces, padded with a space at both ends. A keyword
//! written with surrounding spaces (`" war "`) only matches a whole word.
//!
//! The catalog is immutable once built. A YAML config may replace the
//! built-in topics wholesale.

use crate::error::ConfigError;
use crate::models::FeedSource;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Reserved name of the derived all-topics dataset.
pub const AGGREGATE_TOPIC: &str = "all";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSpec {
    pub name: String,
    /// Lowercase terms used by the category validator. Pad with spaces to
    /// require whole-word matches.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// The catch-all topic accepts whatever no other topic claims.
    #[serde(default)]
    pub catch_all: bool,
    pub sources: Vec<FeedSource>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    topics: Vec<TopicSpec>,
}

impl Catalog {
    /// Validate and freeze a list of topics.
    ///
    /// Every source is stamped with the topic it was listed under, and
    /// keywords are lowercased once here so matching never has to.
    pub fn new(mut topics: Vec<TopicSpec>) -> Result<Self, ConfigError> {
        if topics.is_empty() {
            return Err(ConfigError::Invalid("catalog has no topics".into()));
        }
        let mut seen = HashSet::new();
        for topic in &mut topics {
            topic.name = topic.name.trim().to_string();
            if topic.name.is_empty() {
                return Err(ConfigError::Invalid("topic name is empty".into()));
            }
            if topic.name.eq_ignore_ascii_case(AGGREGATE_TOPIC) {
                return Err(ConfigError::Invalid(format!(
                    "topic name '{AGGREGATE_TOPIC}' is reserved for the aggregate dataset"
                )));
            }
            if !seen.insert(topic.name.clone()) {
                return Err(ConfigError::Invalid(format!("duplicate topic '{}'", topic.name)));
            }
            for source in &mut topic.sources {
                source.topic = topic.name.clone();
            }
            for keyword in &mut topic.keywords {
                *keyword = keyword.to_lowercase();
            }
        }
        if topics.iter().filter(|t| t.catch_all).count() > 1 {
            return Err(ConfigError::Invalid("more than one catch-all topic".into()));
        }
        Ok(Self { topics })
    }

    /// The compiled-in catalog used when no config overrides it.
    pub fn builtin() -> Self {
        let topics = BUILTIN
            .iter()
            .map(|(name, catch_all, keywords, sources)| TopicSpec {
                name: name.to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                catch_all: *catch_all,
                sources: sources
                    .iter()
                    .map(|(endpoint, display_name)| FeedSource {
                        topic: name.to_string(),
                        endpoint: endpoint.to_string(),
                        display_name: display_name.to_string(),
                    })
                    .collect(),
            })
            .collect();
        Self { topics }
    }

    /// Topics in processing order.
    pub fn topics(&self) -> &[TopicSpec] {
        &self.topics
    }

    /// Topics in classification order: most specific first, catch-all last.
    pub fn priority(&self) -> Vec<&TopicSpec> {
        let (catch_all, specific): (Vec<_>, Vec<_>) = self.topics.iter().partition(|t| t.catch_all);
        specific.into_iter().chain(catch_all).collect()
    }
}

type BuiltinTopic = (
    &'static str,
    bool,
    &'static [&'static str],
    &'static [(&'static str, &'static str)],
);

const BUILTIN: &[BuiltinTopic] = &[
    (
        "technology",
        false,
        &[
            "software", " ai ", "artificial intelligence", "startup", "semiconductor", " chip ",
            " chips ", "chipmaker", "smartphone", " apple ", "google", "microsoft", "cyber",
            " app ", " apps ", "robot",
        ],
        &[
            ("https://feeds.arstechnica.com/arstechnica/index", "Ars Technica"),
            ("https://www.theverge.com/rss/index.xml", "The Verge"),
            ("https://feeds.bbci.co.uk/news/technology/rss.xml", "BBC Technology"),
        ],
    ),
    (
        "science",
        false,
        &[
            "scientist", "research", " study ", " nasa ", "outer space", "spacecraft",
            "space station", "astronaut", "climate", "species", "physics", "telescope", "fossil",
            " planet ", " planets ",
        ],
        &[
            ("https://feeds.bbci.co.uk/news/science_and_environment/rss.xml", "BBC Science"),
            ("https://www.sciencedaily.com/rss/top/science.xml", "ScienceDaily"),
            ("https://www.nasa.gov/rss/dyn/breaking_news.rss", "NASA"),
        ],
    ),
    (
        "health",
        false,
        &[
            "health", "hospital", "vaccine", "disease", "patients", "doctor", "cancer",
            "medical", " drug ", " drugs ", "pandemic",
        ],
        &[
            ("https://feeds.bbci.co.uk/news/health/rss.xml", "BBC Health"),
            ("https://feeds.npr.org/1128/rss.xml", "NPR Health"),
        ],
    ),
    (
        "business",
        false,
        &[
            "stock market", " stocks ", "share price", "economy", "inflation", "interest rate",
            "earnings", "revenue", " bank ", " banks ", "investor", " trade ", "tariff",
        ],
        &[
            ("https://feeds.bbci.co.uk/news/business/rss.xml", "BBC Business"),
            (
                "https://search.cnbc.com/rs/search/combinedcms/view.xml?partnerId=wrss01&id=100003114",
                "CNBC",
            ),
        ],
    ),
    (
        "sports",
        false,
        &[
            " league ", "championship", "tournament", " coach ", "football", "basketball",
            "tennis", "olympic", "world cup", "premier league", " match ",
        ],
        &[
            ("https://www.espn.com/espn/rss/news", "ESPN"),
            ("https://feeds.bbci.co.uk/sport/rss.xml", "BBC Sport"),
        ],
    ),
    (
        "world",
        false,
        &[
            " war ", " wars ", "warfare", "election", "president", "prime minister", " minister ",
            "government", "united nations", "ceasefire", "diplomat", "refugee", "parliament",
            "sanctions",
        ],
        &[
            ("https://feeds.bbci.co.uk/news/world/rss.xml", "BBC World"),
            ("https://www.aljazeera.com/xml/rss/all.xml", "Al Jazeera"),
            ("https://www.theguardian.com/world/rss", "Guardian World"),
        ],
    ),
    (
        "general",
        true,
        &[],
        &[
            ("https://feeds.npr.org/1001/rss.xml", "NPR News"),
            ("https://feeds.bbci.co.uk/news/rss.xml", "BBC News"),
        ],
    ),
];
