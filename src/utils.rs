//! Utility functions for text normalization, timestamp parsing and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Whitespace normalization and char-safe truncation of extracted text
//! - Lenient parsing of the many timestamp layouts feeds emit
//! - String truncation for logging
//! - File system validation for the local blob store

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Keep at most `max` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => s[..cut].to_string(),
    }
}

/// Parse a feed timestamp into UTC.
///
/// Accepts RFC 2822 (RSS `pubDate`), RFC 3339 (Atom), and a handful of
/// zone-less layouts seen in the wild, which are taken to be UTC.
/// Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Canonical form of an article link, used as its identity.
///
/// Trims the input and drops any `#fragment`. Links that do not parse as
/// absolute URLs are kept as trimmed text. Empty input yields `None`.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match Url::parse(raw) {
        Ok(mut url) if matches!(url.scheme(), "http" | "https") => {
            url.set_fragment(None);
            Some(url.to_string())
        }
        _ => Some(raw.to_string()),
    }
}

/// Accept an image reference only if it is absolute.
///
/// Protocol-relative `//host/path` becomes `https://host/path`. Relative
/// paths, `data:` URIs and anything else that is not http(s) are rejected
/// rather than resolved.
pub fn absolute_image_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let candidate = match raw.strip_prefix("//") {
        Some(rest) if !rest.is_empty() => format!("https://{rest}"),
        _ => raw.to_string(),
    };
    let url = Url::parse(&candidate).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url.to_string()),
        _ => None,
    }
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Store directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let s = "é".repeat(10);
        assert!(truncate_for_log(&s, 3).starts_with("ééé…"));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("日本語テキスト", 2), "日本");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 5, 6, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp("Tue, 06 May 2025 14:30:00 +0000"), Some(expected));
        assert_eq!(parse_timestamp("Tue, 06 May 2025 16:30:00 +0200"), Some(expected));
        assert_eq!(parse_timestamp("2025-05-06T14:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-05-06 14:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-05-06"),
            Some(Utc.with_ymd_and_hms(2025, 5, 6, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2025-13-45"), None);
    }

    #[test]
    fn test_canonicalize_url() {
        assert_eq!(
            canonicalize_url("  https://news.test/a?id=1#comments "),
            Some("https://news.test/a?id=1".to_string())
        );
        assert_eq!(canonicalize_url("not a url"), Some("not a url".to_string()));
        assert_eq!(canonicalize_url("   "), None);
    }

    #[test]
    fn test_absolute_image_url() {
        assert_eq!(
            absolute_image_url("//cdn.test/img.jpg"),
            Some("https://cdn.test/img.jpg".to_string())
        );
        assert_eq!(
            absolute_image_url("https://cdn.test/img.jpg"),
            Some("https://cdn.test/img.jpg".to_string())
        );
        assert_eq!(absolute_image_url("/images/a.jpg"), None);
        assert_eq!(absolute_image_url("images/a.jpg"), None);
        assert_eq!(absolute_image_url("data:image/png;base64,AAAA"), None);
        assert_eq!(absolute_image_url(""), None);
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_nested_dirs() {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let root = std::env::temp_dir().join(format!("topic_digest_writable_{}_{nanos}", std::process::id()));
        let nested = root.join("a/b");

        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__probe_write__").exists());

        let _ = std::fs::remove_dir_all(&root);
    }
}
