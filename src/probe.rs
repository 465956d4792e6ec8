//! Reachability probes for candidate image URLs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Client};

use crate::{Result, SearchError};

/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Status line and content type of a probed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw `Content-Type` header, if present.
    pub content_type: Option<String>,
}

impl ProbeResponse {
    /// Creates a probe response.
    pub fn new(status: u16, content_type: Option<&str>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
        }
    }

    /// Whether the response proves the URL serves an image: exactly 200 and
    /// an `image/*` content type.
    pub fn is_image(&self) -> bool {
        self.status == 200
            && self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("image/"))
    }
}

/// Lightweight existence/type check for a URL.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Fetches the status and content type of `url` without its body.
    async fn head(&self, url: &str) -> Result<ProbeResponse>;
}

/// Probe that issues HTTP `HEAD` requests with reqwest.
///
/// Redirects are not followed: a candidate only counts when it answers 200
/// itself.
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// Creates a probe with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    /// Creates a probe whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; a3s-image-search/0.1)")
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Creates a probe with a custom reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn head(&self, url: &str) -> Result<ProbeResponse> {
        let response = self.client.head(url).send().await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        Ok(ProbeResponse::new(response.status().as_u16(), content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_ok() {
        assert!(ProbeResponse::new(200, Some("image/jpeg")).is_image());
        assert!(ProbeResponse::new(200, Some("image/webp; charset=binary")).is_image());
    }

    #[test]
    fn test_is_image_wrong_status() {
        assert!(!ProbeResponse::new(204, Some("image/png")).is_image());
        assert!(!ProbeResponse::new(301, Some("image/png")).is_image());
        assert!(!ProbeResponse::new(404, Some("image/png")).is_image());
    }

    #[test]
    fn test_is_image_wrong_type() {
        assert!(!ProbeResponse::new(200, Some("text/html")).is_image());
        assert!(!ProbeResponse::new(200, Some("Image/png")).is_image());
        assert!(!ProbeResponse::new(200, None).is_image());
    }

    #[test]
    fn test_http_probe_new() {
        assert!(HttpProbe::new().is_ok());
    }

    #[test]
    fn test_http_probe_with_client() {
        let client = Client::builder().user_agent("test-agent").build().unwrap();
        let _probe = HttpProbe::with_client(client);
    }

    #[tokio::test]
    async fn test_http_probe_invalid_url_is_error() {
        let probe = HttpProbe::new().unwrap();
        assert!(probe.head("not a url").await.is_err());
    }
}
