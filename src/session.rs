//! Browser automation abstraction.
//!
//! The pool and the renderer only talk to these traits. The `chromium`
//! module provides the CDP-backed implementation; tests provide fakes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{EgressIdentity, Result, SearchError};

/// Kinds of subresource a tab can refuse to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Font,
    Media,
}

impl ResourceKind {
    /// Everything a results page can do without: only its HTML is read.
    pub const HEAVY: [ResourceKind; 4] = [
        ResourceKind::Image,
        ResourceKind::Stylesheet,
        ResourceKind::Font,
        ResourceKind::Media,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Image => "image",
            ResourceKind::Stylesheet => "stylesheet",
            ResourceKind::Font => "font",
            ResourceKind::Media => "media",
        };
        f.write_str(name)
    }
}

/// Starts browser sessions bound to an egress identity.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Launches a new session whose traffic leaves through `identity`.
    async fn launch(&self, identity: &EgressIdentity) -> Result<Arc<dyn BrowserSession>>;
}

/// A long-lived browser bound to one egress identity.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Identity this session's traffic uses.
    fn identity(&self) -> &EgressIdentity;

    /// Opens a fresh tab. The caller is responsible for closing it.
    async fn new_tab(&self) -> Result<Box<dyn BrowserTab>>;

    /// Shuts the browser down.
    async fn close(&self) -> Result<()>;
}

/// A single page/tab inside a session.
#[async_trait]
pub trait BrowserTab: Send + Sync {
    /// Overrides the user agent for subsequent requests from this tab.
    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

    /// Aborts every later request of the given kinds made by this tab.
    ///
    /// The default keeps loading everything.
    async fn block_resources(&self, _kinds: &[ResourceKind]) -> Result<()> {
        Ok(())
    }

    /// Navigates to `url` and waits until the document is parsed.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Clicks the first element matching `selector`.
    ///
    /// Returns `Ok(false)` when nothing matches.
    async fn click_if_present(&self, selector: &str) -> Result<bool>;

    /// Evaluates a JavaScript expression and returns its JSON value.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Scrolls the window down by `distance` pixels.
    async fn scroll_by(&self, distance: u32) -> Result<()> {
        self.evaluate(&format!("window.scrollBy(0, {})", distance))
            .await
            .map(|_| ())
    }

    /// Current height of the document body in pixels.
    async fn scroll_height(&self) -> Result<u64> {
        let value = self.evaluate("document.body.scrollHeight").await?;
        value
            .as_f64()
            .filter(|h| *h >= 0.0)
            .map(|h| h as u64)
            .ok_or_else(|| SearchError::Browser(format!("Unexpected scroll height: {}", value)))
    }

    /// Serialized HTML of the current document.
    async fn content(&self) -> Result<String>;

    /// Closes the tab.
    async fn close(self: Box<Self>) -> Result<()>;
}
