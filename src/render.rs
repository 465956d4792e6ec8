//! Rendering of the image search results page.
//!
//! A render opens a tab on a pooled session, stops it from fetching images,
//! stylesheets, fonts and media, loads the results page,
//! dismisses the cookie consent prompt when one is shown, scrolls to trigger
//! lazy loading, and captures the final HTML. The tab is closed afterwards
//! whether or not the render succeeded; the session stays open.

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::session::{BrowserSession, BrowserTab, ResourceKind};
use crate::{Result, SearchError};

/// Desktop Chrome user agent sent with every search page.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Stage of a render, reported with failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    /// Opening the tab and loading the results page.
    Navigating,
    /// Looking for and dismissing the consent prompt.
    ConsentCheck,
    /// Scrolling to load more results.
    Scrolling,
    /// Reading the rendered HTML.
    Extracting,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderStage::Navigating => "navigating",
            RenderStage::ConsentCheck => "checking consent",
            RenderStage::Scrolling => "scrolling",
            RenderStage::Extracting => "extracting",
        };
        f.write_str(name)
    }
}

/// Renderer settings.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Results page URL; the encoded query is appended as `q`.
    pub search_url: String,
    /// Maximum time for the page to load.
    pub navigation_timeout: Duration,
    /// Selector of the consent prompt's accept button.
    pub consent_selector: String,
    /// Pause after dismissing the consent prompt.
    pub consent_pause: Duration,
    /// Pixels scrolled per step.
    pub scroll_step: u32,
    /// Pause before each scroll step.
    pub scroll_interval: Duration,
    /// Scrolling stops once the total distance exceeds this many pixels.
    pub max_scroll: u64,
    /// User agent set on each tab.
    pub user_agent: Option<String>,
    /// Subresources the tab refuses to load. Empty loads everything.
    pub blocked_resources: Vec<ResourceKind>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.google.com/search?tbm=isch".to_string(),
            navigation_timeout: Duration::from_secs(15),
            consent_selector: r#"button[aria-label="Accept all"]"#.to_string(),
            consent_pause: Duration::from_millis(500),
            scroll_step: 500,
            scroll_interval: Duration::from_millis(50),
            max_scroll: 5000,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            blocked_resources: ResourceKind::HEAVY.to_vec(),
        }
    }
}

/// Drives a browser session through one search page.
#[derive(Debug, Clone, Default)]
pub struct PageRenderer {
    config: RenderConfig,
}

impl PageRenderer {
    /// Creates a renderer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a renderer with the given settings.
    pub fn with_config(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Returns the renderer settings.
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Results page URL for `query`.
    pub fn search_url(&self, query: &str) -> String {
        let separator = if self.config.search_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}q={}",
            self.config.search_url,
            separator,
            urlencoding::encode(query)
        )
    }

    /// Renders the results page for `query` and returns its HTML.
    pub async fn render(&self, session: &dyn BrowserSession, query: &str) -> Result<String> {
        let tab = session.new_tab().await.map_err(|e| SearchError::Render {
            stage: RenderStage::Navigating,
            message: e.to_string(),
        })?;

        let outcome = self.drive(tab.as_ref(), query).await;

        if let Err(e) = tab.close().await {
            warn!("Failed to close browser tab: {}", e);
        }

        match &outcome {
            Ok(html) => debug!("Rendered {} bytes for '{}'", html.len(), query),
            Err(e) => warn!("Render failed for '{}' on {}: {}", query, session.identity(), e),
        }
        outcome
    }

    async fn drive(&self, tab: &dyn BrowserTab, query: &str) -> Result<String> {
        let url = self.search_url(query);

        if let Some(ref ua) = self.config.user_agent {
            tab.set_user_agent(ua)
                .await
                .map_err(|e| stage_error(RenderStage::Navigating, e))?;
        }

        if !self.config.blocked_resources.is_empty() {
            if let Err(e) = tab.block_resources(&self.config.blocked_resources).await {
                warn!("Failed to block page resources: {}", e);
            }
        }

        info!("Navigating to {}", url);
        timeout(self.config.navigation_timeout, tab.navigate(&url))
            .await
            .map_err(|_| SearchError::NavigationTimeout(self.config.navigation_timeout.as_secs()))?
            .map_err(|e| stage_error(RenderStage::Navigating, e))?;

        self.dismiss_consent(tab).await;

        let scrolled = self
            .scroll(tab)
            .await
            .map_err(|e| stage_error(RenderStage::Scrolling, e))?;
        debug!("Scrolled {}px", scrolled);

        tab.content()
            .await
            .map_err(|e| stage_error(RenderStage::Extracting, e))
    }

    /// Clicks the consent button if it is shown. Never fails.
    async fn dismiss_consent(&self, tab: &dyn BrowserTab) {
        match tab.click_if_present(&self.config.consent_selector).await {
            Ok(true) => {
                debug!("Dismissed consent prompt");
                sleep(self.config.consent_pause).await;
            }
            Ok(false) => {}
            Err(e) => debug!(
                "Ignoring failure while {}: {}",
                RenderStage::ConsentCheck,
                e
            ),
        }
    }

    /// Scrolls in fixed steps until the page bottom or the scroll cap.
    ///
    /// Returns the total distance scrolled.
    async fn scroll(&self, tab: &dyn BrowserTab) -> Result<u64> {
        let step = self.config.scroll_step.max(1);
        let mut total = 0u64;

        loop {
            sleep(self.config.scroll_interval).await;
            tab.scroll_by(step).await?;
            total += u64::from(step);

            let height = tab.scroll_height().await?;
            if total >= height || total > self.config.max_scroll {
                return Ok(total);
            }
        }
    }
}

fn stage_error(stage: RenderStage, err: SearchError) -> SearchError {
    match err {
        SearchError::Render { .. } | SearchError::NavigationTimeout(_) => err,
        other => SearchError::Render {
            stage,
            message: other.to_string(),
        },
    }
}
