//! Extractive summarizer.
//!
//! Picks whole sentences from the article body and stitches them back together
//! in their original order. Sentences are ranked by a weighted score:
//!
//! | signal   | weight | value                                              |
//! |----------|--------|----------------------------------------------------|
//! | position | 0.4    | `1 - i/n`, so the lead sentence scores highest     |
//! | length   | 0.4    | 1.0 for 10-30 words, proportionally less otherwise |
//! | keyword  | 0.2    | 1.0 if any [`NEWSWORTHY`] term appears             |
//!
//! Selection is greedy by score until the word count reaches the lower bound,
//! skipping sentences that would push it past the upper bound. If that leaves
//! the summary short, the best skipped sentence is added in its document
//! position and the result is cut at the upper bound. When nothing fits, the
//! best sentence alone is cut. A cut is marked with `...`.
//! The function is pure and never fails: with no usable sentences the title
//! is returned as-is.

use once_cell::sync::Lazy;
use regex::Regex;

/// Fragments shorter than this (in characters) are not sentences.
const MIN_SENTENCE_CHARS: usize = 20;

const POSITION_WEIGHT: f64 = 0.4;
const LENGTH_WEIGHT: f64 = 0.4;
const KEYWORD_WEIGHT: f64 = 0.2;

/// Terms that mark a sentence as carrying the news.
pub const NEWSWORTHY: &[&str] = &[
    "announced",
    "said",
    "reported",
    "according",
    "officials",
    "government",
    "president",
    "million",
    "billion",
    "percent",
    "new",
    "first",
    "study",
    "found",
    "will",
];

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+(\s+|$)").unwrap());

/// Target size of a summary, in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryBounds {
    pub min_words: usize,
    pub max_words: usize,
}

impl Default for SummaryBounds {
    fn default() -> Self {
        Self {
            min_words: 30,
            max_words: 40,
        }
    }
}

#[derive(Debug)]
struct Sentence<'a> {
    index: usize,
    text: &'a str,
    words: usize,
    score: f64,
}

/// Summarize `text`, falling back to `title` when it has no usable sentences.
pub fn summarize(text: &str, title: &str, bounds: SummaryBounds) -> String {
    let max_words = bounds.max_words.max(1);
    let min_words = bounds.min_words.min(max_words);

    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return title.trim().to_string();
    }

    let n = sentences.len() as f64;
    let mut ranked: Vec<Sentence<'_>> = sentences
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let words = text.split_whitespace().count();
            let score = POSITION_WEIGHT * (1.0 - index as f64 / n)
                + LENGTH_WEIGHT * length_score(words)
                + KEYWORD_WEIGHT * keyword_score(text);
            Sentence {
                index,
                text,
                words,
                score,
            }
        })
        .collect();
    // Stable: equal scores keep document order.
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut chosen: Vec<&Sentence<'_>> = Vec::new();
    let mut total = 0usize;
    let mut skipped: Option<&Sentence<'_>> = None;
    for sentence in &ranked {
        if total >= min_words {
            break;
        }
        if total + sentence.words > max_words {
            skipped.get_or_insert(sentence);
            continue;
        }
        total += sentence.words;
        chosen.push(sentence);
    }

    if chosen.is_empty() {
        // Every sentence alone overshoots; cut the best one.
        return truncate_words(ranked[0].text, max_words);
    }

    // Still short: take the best skipped sentence too and cut at the upper bound.
    let padded = match skipped {
        Some(next) if total < min_words => {
            chosen.push(next);
            true
        }
        _ => false,
    };
    chosen.sort_by_key(|s| s.index);
    let joined = chosen.iter().map(|s| s.text).collect::<Vec<_>>().join(" ");
    if padded {
        truncate_words(&joined, max_words)
    } else {
        joined
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        push_sentence(&mut sentences, &text[start..m.start() + m.as_str().trim_end().len()]);
        start = m.end();
    }
    push_sentence(&mut sentences, &text[start..]);
    sentences
}

fn push_sentence<'a>(out: &mut Vec<&'a str>, candidate: &'a str) {
    let candidate = candidate.trim();
    if candidate.chars().count() >= MIN_SENTENCE_CHARS {
        out.push(candidate);
    }
}

fn length_score(words: usize) -> f64 {
    match words {
        0 => 0.0,
        w if w < 10 => w as f64 / 10.0,
        w if w <= 30 => 1.0,
        w => 30.0 / w as f64,
    }
}

fn keyword_score(sentence: &str) -> f64 {
    let lower = sentence.to_lowercase();
    let hit = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| NEWSWORTHY.contains(&word));
    if hit { 1.0 } else { 0.0 }
}

/// Keep at most `max` words; mark a cut with `...`.
fn truncate_words(text: &str, max: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max {
        return words.join(" ");
    }
    let kept = words[..max].join(" ");
    format!("{}...", kept.trim_end_matches(['.', ',', ';', ':']))
}

/// Number of whitespace-separated words in a summary.
pub fn word_count(summary: &str) -> usize {
    summary.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: SummaryBounds = SummaryBounds {
        min_words: 30,
        max_words: 40,
    };

    const BODY: &str = "The city council announced a new transit plan on Monday after months of debate. \
        Officials said the plan will add twelve bus routes and extend service hours across the region. \
        Critics argued the budget was too small. \
        The mayor praised the vote as a turning point for commuters who rely on public transport every day. \
        Weather was mild.";

    #[test]
    fn test_empty_text_falls_back_to_title() {
        assert_eq!(summarize("", "  Transit plan approved ", BOUNDS), "Transit plan approved");
        assert_eq!(summarize("Too short.", "Title", BOUNDS), "Title");
    }

    #[test]
    fn test_summary_within_word_bounds() {
        let summary = summarize(BODY, "Transit", BOUNDS);
        let words = word_count(&summary);
        assert!(words <= BOUNDS.max_words, "{words} words: {summary}");
        assert!(words >= BOUNDS.min_words, "{words} words: {summary}");
    }

    #[test]
    fn test_summary_keeps_document_order() {
        let summary = summarize(BODY, "Transit", BOUNDS);
        let council = summary.find("council").unwrap();
        let officials = summary.find("Officials").unwrap();
        assert!(council < officials);
    }

    #[test]
    fn test_overlong_single_sentence_is_truncated_with_marker() {
        let body = format!("{}.", vec!["word"; 80].join(" "));
        let summary = summarize(&body, "Title", BOUNDS);
        assert!(summary.ends_with("..."));
        assert_eq!(word_count(&summary), BOUNDS.max_words);
    }

    #[test]
    fn test_padding_sentence_is_placed_in_document_order() {
        // The second sentence ranks higher, so it is chosen first; the longer
        // opening sentence no longer fits and is used only to reach the lower bound.
        let opening = "The harbour district spent the long wet winter rebuilding its old stone piers \
            while local fishing crews moved their boats to a quieter cove further down the rocky coast \
            near the old white lighthouse.";
        let follow_up = "Officials said the repaired piers would reopen to visitors in early June after \
            a final careful round of safety inspections.";
        assert_eq!(word_count(opening), 34);
        assert_eq!(word_count(follow_up), 20);

        let summary = summarize(&format!("{opening} {follow_up}"), "Harbour", BOUNDS);
        assert_eq!(word_count(&summary), BOUNDS.max_words);
        assert!(summary.starts_with("The harbour district spent"), "{summary}");
        assert!(summary.ends_with("Officials said the repaired piers would..."), "{summary}");
    }

    #[test]
    fn test_short_text_returned_whole() {
        let body = "Officials confirmed the bridge will reopen next week.";
        assert_eq!(summarize(body, "Bridge", BOUNDS), body);
    }

    #[test]
    fn test_is_deterministic() {
        assert_eq!(summarize(BODY, "T", BOUNDS), summarize(BODY, "T", BOUNDS));
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("First sentence is long enough! Tiny. Is the third one long enough?");
        assert_eq!(
            sentences,
            vec!["First sentence is long enough!", "Is the third one long enough?"]
        );
    }

    #[test]
    fn test_length_score() {
        assert_eq!(length_score(5), 0.5);
        assert_eq!(length_score(20), 1.0);
        assert_eq!(length_score(60), 0.5);
    }
}
