//! Candidate image URL extraction from rendered result pages.
//!
//! Image results are not reliably present as `<img src>` attributes; most of
//! them sit inside inline script blobs as JSON strings with escaped slashes
//! and unicode escapes. The extractor therefore scans the raw HTML text
//! instead of the DOM.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Substrings that mark a URL as belonging to the search engine itself or
/// as page chrome rather than a result image.
pub const DEFAULT_BLOCKLIST: &[&str] = &["google.com", "gstatic.com", "favicon", "logo"];

const IMAGE_URL_PATTERN: &str =
    r#"(?i)(?:https?://|https?:\\/\\/)[^"'\s\\]+\.(?:jpg|jpeg|png|gif|webp)"#;

fn image_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IMAGE_URL_PATTERN).expect("image URL pattern is valid"))
}

/// Pulls candidate image URLs out of an HTML snapshot.
#[derive(Debug, Clone)]
pub struct CandidateExtractor {
    blocklist: Vec<String>,
}

impl CandidateExtractor {
    /// Creates an extractor with the default blocklist.
    pub fn new() -> Self {
        Self {
            blocklist: DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replaces the blocklist.
    pub fn with_blocklist<I, S>(mut self, blocklist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocklist = blocklist.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the blocklisted substrings.
    pub fn blocklist(&self) -> &[String] {
        &self.blocklist
    }

    /// Returns the unique candidate URLs in first-occurrence order.
    pub fn extract(&self, html: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for m in image_url_regex().find_iter(html) {
            let url = decode(m.as_str());
            if !self.is_allowed(&url) {
                continue;
            }
            if seen.insert(url.clone()) {
                candidates.push(url);
            }
        }

        candidates
    }

    fn is_allowed(&self, url: &str) -> bool {
        url.starts_with("http") && !self.blocklist.iter().any(|b| url.contains(b.as_str()))
    }
}

impl Default for CandidateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves JSON escapes in a raw match.
fn decode(raw: &str) -> String {
    let unescaped = serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| {
        raw.replace("\\u003d", "=")
            .replace("\\u0026", "&")
            .replace("\\u002f", "/")
    });
    unescaped.replace("\\/", "/")
}
