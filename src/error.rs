//! Error types for the image search library.

use thiserror::Error;

use crate::render::RenderStage;

/// Result type alias for image search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while harvesting images.
#[derive(Error, Debug)]
pub enum SearchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The service cannot take requests yet (or any more).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Every browser session stayed checked out for the whole acquire window.
    #[error("No browser session became available within {0}s")]
    PoolExhausted(u64),

    /// No browser session could be started.
    #[error("No browser sessions could be started")]
    NoSessions,

    /// The search page did not load in time.
    #[error("Navigation timed out after {0}s")]
    NavigationTimeout(u64),

    /// A rendering stage failed.
    #[error("Render failed while {stage}: {message}")]
    Render {
        /// Stage the renderer was in.
        stage: RenderStage,
        /// Underlying failure.
        message: String,
    },

    /// Browser automation failure (launch, tab handling, CDP).
    #[error("Browser error: {0}")]
    Browser(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl SearchError {
    /// HTTP status the boundary layer answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            SearchError::InvalidQuery(_) => 400,
            SearchError::ServiceUnavailable(_) | SearchError::PoolExhausted(_) => 503,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_query() {
        let err = SearchError::InvalidQuery("empty query".to_string());
        assert_eq!(err.to_string(), "Invalid query: empty query");
    }

    #[test]
    fn test_error_display_navigation_timeout() {
        let err = SearchError::NavigationTimeout(15);
        assert_eq!(err.to_string(), "Navigation timed out after 15s");
    }

    #[test]
    fn test_error_display_render() {
        let err = SearchError::Render {
            stage: RenderStage::Scrolling,
            message: "target closed".to_string(),
        };
        assert_eq!(err.to_string(), "Render failed while scrolling: target closed");
    }

    #[test]
    fn test_error_display_pool_exhausted() {
        let err = SearchError::PoolExhausted(30);
        assert_eq!(
            err.to_string(),
            "No browser session became available within 30s"
        );
    }

    #[test]
    fn test_error_display_no_sessions() {
        assert_eq!(
            SearchError::NoSessions.to_string(),
            "No browser sessions could be started"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(SearchError::InvalidQuery(String::new()).status_code(), 400);
        assert_eq!(
            SearchError::ServiceUnavailable("starting".into()).status_code(),
            503
        );
        assert_eq!(SearchError::PoolExhausted(30).status_code(), 503);
        assert_eq!(SearchError::NavigationTimeout(15).status_code(), 500);
        assert_eq!(SearchError::Browser("crashed".into()).status_code(), 500);
        assert_eq!(SearchError::Other("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_error_debug() {
        let err = SearchError::NoSessions;
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("NoSessions"));
    }
}
