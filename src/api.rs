//! HTTP boundary for image search.
//!
//! [`handle_search`] maps request parameters onto [`SearchService::search`]
//! and turns the outcome into a status code and JSON body. It does not bind
//! to any web framework; a router only has to decode the query string into
//! [`SearchParams`] and write the [`ApiResponse`] back out.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::search::{clamp_limit, DEFAULT_LIMIT};
use crate::{SearchError, SearchResult, SearchService};

/// Message for a request without a usable `q`.
pub const MISSING_QUERY_MESSAGE: &str = "Missing required query parameter \"q\"";

/// Message while the service has not finished starting.
pub const STARTING_UP_MESSAGE: &str = "Server starting up, please try again in a few seconds.";

/// Message when every browser session stayed busy.
pub const BUSY_MESSAGE: &str = "All browser sessions are busy, please try again.";

/// Message once the browser sessions have been shut down.
pub const SHUT_DOWN_MESSAGE: &str = "Server is shutting down, please try again later.";

/// Message for any other pipeline failure.
pub const SCRAPE_FAILED_MESSAGE: &str = "Failed to scrape images. Please try again.";

/// Query string of a search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Search terms.
    pub q: Option<String>,
    /// Requested number of images, as sent.
    pub count: Option<String>,
}

impl SearchParams {
    /// Params with a query and no count.
    pub fn query(q: impl Into<String>) -> Self {
        Self {
            q: Some(q.into()),
            count: None,
        }
    }

    /// Sets the raw count.
    pub fn with_count(mut self, count: impl Into<String>) -> Self {
        self.count = Some(count.into());
        self
    }
}

/// JSON body of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiBody {
    /// `{query, count, images}`
    Result(SearchResult),
    /// `{error}`
    Error { error: String },
}

impl ApiBody {
    fn error(message: &str) -> Self {
        ApiBody::Error {
            error: message.to_string(),
        }
    }
}

/// Status code plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: ApiBody,
}

impl ApiResponse {
    fn ok(result: SearchResult) -> Self {
        Self {
            status: 200,
            body: ApiBody::Result(result),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: ApiBody::error(message),
        }
    }

    /// Body serialized as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.body).unwrap_or_else(|_| {
            format!("{{\"error\":\"{}\"}}", SCRAPE_FAILED_MESSAGE)
        })
    }
}

/// Parses the raw `count` parameter.
///
/// Only the leading integer is read, so `"7.9"` is 7 and `"5abc"` is 5.
/// Missing, unparsable and zero counts mean the default of 20; anything else
/// is clamped into `[1, 50]`.
pub fn clamp_count(raw: Option<&str>) -> usize {
    let requested = raw.and_then(leading_int).filter(|&n| n != 0);

    match requested {
        None => DEFAULT_LIMIT,
        Some(n) if n < 0 => clamp_limit(0),
        Some(n) => clamp_limit(usize::try_from(n).unwrap_or(usize::MAX)),
    }
}

/// Reads an optionally signed integer from the start of `raw`.
///
/// Leading whitespace is skipped and parsing stops at the first character
/// that is not a digit. A `0x` prefix switches to hexadecimal. Values out of
/// range saturate.
fn leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let (radix, s) = match s.get(..2) {
        Some("0x") | Some("0X") => (16, &s[2..]),
        _ => (10, s),
    };
    let digits = s
        .find(|c: char| !c.is_digit(radix))
        .map_or(s, |end| &s[..end]);
    if digits.is_empty() {
        return None;
    }

    let magnitude = digits.chars().try_fold(0i64, |acc, c| {
        let digit = i64::from(c.to_digit(radix)?);
        acc.checked_mul(i64::from(radix))?.checked_add(digit)
    });
    Some(match (magnitude, negative) {
        (Some(n), false) => n,
        (Some(n), true) => -n,
        (None, false) => i64::MAX,
        (None, true) => i64::MIN,
    })
}

/// Handles one search request.
///
/// `service` is `None` until startup has finished launching the browsers.
pub async fn handle_search(service: Option<&SearchService>, params: &SearchParams) -> ApiResponse {
    let Some(query) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
        return ApiResponse::error(400, MISSING_QUERY_MESSAGE);
    };

    let Some(service) = service else {
        return ApiResponse::error(503, STARTING_UP_MESSAGE);
    };

    let limit = clamp_count(params.count.as_deref());

    match service.search(query, limit).await {
        Ok(result) => ApiResponse::ok(result),
        Err(e) => {
            error!("Search for \"{}\" failed: {}", query, e);
            match &e {
                SearchError::InvalidQuery(_) => ApiResponse::error(400, MISSING_QUERY_MESSAGE),
                SearchError::PoolExhausted(_) => ApiResponse::error(503, BUSY_MESSAGE),
                SearchError::ServiceUnavailable(_) => ApiResponse::error(503, SHUT_DOWN_MESSAGE),
                other => ApiResponse::error(other.status_code(), SCRAPE_FAILED_MESSAGE),
            }
        }
    }
}
