//! Chrome sessions driven over the DevTools protocol.
//!
//! This module is only available when the `headless` Cargo feature is enabled.
//! Each egress identity gets its own Chrome process with a private profile
//! directory; proxy identities pass `--proxy-server` to that process.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::chrome_path::resolve_chrome;
use crate::config::ScraperConfig;
use crate::session::{BrowserSession, BrowserTab, ResourceKind, SessionLauncher};
use crate::{EgressIdentity, Result, SearchError};

/// Arguments passed to every Chrome process.
const BASE_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-blink-features=AutomationControlled",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-default-apps",
    "--disable-sync",
    "--mute-audio",
    "--no-first-run",
    "--window-size=1920,1080",
];

/// Launches one Chrome process per egress identity.
#[derive(Debug)]
pub struct ChromiumLauncher {
    headless: bool,
    chrome_path: Option<PathBuf>,
    user_agent: Option<String>,
    extra_args: Vec<String>,
    user_data_root: PathBuf,
    launched: AtomicUsize,
}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            user_agent: None,
            extra_args: Vec::new(),
            user_data_root: std::env::temp_dir().join("a3s-image-search"),
            launched: AtomicUsize::new(0),
        }
    }
}

impl ChromiumLauncher {
    /// Creates a headless launcher that auto-detects Chrome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a launcher from the scraper configuration.
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            headless: config.headless,
            chrome_path: config.chrome_path.as_ref().map(PathBuf::from),
            user_agent: config.user_agent.clone(),
            ..Self::default()
        }
    }

    /// Runs browsers with or without a window.
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Uses a specific Chrome executable.
    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    /// Appends a launch argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Directory under which per-session profiles are created.
    pub fn with_user_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.user_data_root = root.into();
        self
    }

    /// Command-line arguments for the process serving `identity`.
    pub fn launch_args(&self, identity: &EgressIdentity) -> Vec<String> {
        let mut args: Vec<String> = BASE_ARGS.iter().map(|a| a.to_string()).collect();

        if self.headless {
            args.push("--headless=new".to_string());
        }

        if let Some(ref ua) = self.user_agent {
            args.push(format!("--user-agent={}", ua));
        }

        if let Some(proxy) = identity.proxy() {
            if proxy.username.is_some() {
                warn!(
                    "Chrome ignores proxy credentials on the command line: {}",
                    identity
                );
            }
            args.push(format!("--proxy-server={}", proxy.display_url()));
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    fn next_user_data_dir(&self) -> PathBuf {
        let n = self.launched.fetch_add(1, Ordering::SeqCst);
        self.user_data_root
            .join(format!("session-{}-{}", std::process::id(), n))
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(&self, identity: &EgressIdentity) -> Result<Arc<dyn BrowserSession>> {
        let user_data_dir = self.next_user_data_dir();
        let mut builder = BrowserConfig::builder().user_data_dir(&user_data_dir);

        if !self.headless {
            builder = builder.with_head();
        }

        if let Some(path) = resolve_chrome(self.chrome_path.as_deref()) {
            debug!("Using Chrome at: {}", path.display());
            builder = builder.chrome_executable(path);
        }

        for arg in self.launch_args(identity) {
            builder = builder.arg(arg);
        }

        let browser_config = builder
            .build()
            .map_err(|e| SearchError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SearchError::Browser(format!("Failed to launch browser: {}", e)))?;

        let label = identity.label().to_string();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error ({}): {}", label, e);
                }
            }
            debug!("CDP handler for {} exited", label);
        });

        debug!(
            "Browser for {} started with profile {}",
            identity,
            user_data_dir.display()
        );

        Ok(Arc::new(ChromiumSession {
            identity: identity.clone(),
            browser: Mutex::new(Some(browser)),
            handler: StdMutex::new(Some(handler_task)),
            user_data_dir,
        }))
    }
}

/// A running Chrome process.
pub struct ChromiumSession {
    identity: EgressIdentity,
    browser: Mutex<Option<Browser>>,
    handler: StdMutex<Option<JoinHandle<()>>>,
    user_data_dir: PathBuf,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    fn identity(&self) -> &EgressIdentity {
        &self.identity
    }

    async fn new_tab(&self) -> Result<Box<dyn BrowserTab>> {
        let guard = self.browser.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| SearchError::Browser(format!("Browser for {} is closed", self.identity)))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SearchError::Browser(format!("Failed to open tab: {}", e)))?;

        Ok(Box::new(ChromiumTab {
            page,
            interceptor: StdMutex::new(None),
        }))
    }

    async fn close(&self) -> Result<()> {
        let browser = self.browser.lock().await.take();
        let Some(mut browser) = browser else {
            return Ok(());
        };

        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| SearchError::Browser(format!("Failed to close browser: {}", e)));
        if let Err(e) = browser.wait().await {
            debug!("Waiting for browser exit failed: {}", e);
        }

        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handler) = handler {
            handler.abort();
        }

        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!(
                "Failed to remove profile {}: {}",
                self.user_data_dir.display(),
                e
            );
        }

        closed
    }
}

/// A single Chrome tab.
pub struct ChromiumTab {
    page: Page,
    /// Task answering paused requests while resources are blocked.
    interceptor: StdMutex<Option<JoinHandle<()>>>,
}

fn resource_type(kind: ResourceKind) -> ResourceType {
    match kind {
        ResourceKind::Image => ResourceType::Image,
        ResourceKind::Stylesheet => ResourceType::Stylesheet,
        ResourceKind::Font => ResourceType::Font,
        ResourceKind::Media => ResourceType::Media,
    }
}

fn request_patterns(blocked: &[ResourceType]) -> Vec<RequestPattern> {
    blocked
        .iter()
        .map(|kind| RequestPattern {
            url_pattern: Some("*".to_string()),
            resource_type: Some(kind.clone()),
            request_stage: Some(RequestStage::Request),
        })
        .collect()
}

/// Maps the `errorText` of a `Page.navigate` reply to a result.
fn navigation_result(url: &str, error_text: Option<&str>) -> Result<()> {
    match error_text {
        Some(text) if !text.is_empty() => Err(SearchError::Browser(format!(
            "Navigation to {} failed: {}",
            url, text
        ))),
        _ => Ok(()),
    }
}

impl ChromiumTab {
    fn take_interceptor(&self) -> Option<JoinHandle<()>> {
        self.interceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl BrowserTab for ChromiumTab {
    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.page
            .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map(|_| ())
            .map_err(|e| SearchError::Browser(format!("Failed to set user agent: {}", e)))
    }

    async fn block_resources(&self, kinds: &[ResourceKind]) -> Result<()> {
        if kinds.is_empty() {
            return Ok(());
        }
        let blocked: Vec<ResourceType> = kinds.iter().copied().map(resource_type).collect();

        // Listen before enabling so no paused request goes unanswered.
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| SearchError::Browser(format!("Failed to watch requests: {}", e)))?;

        let page = self.page.clone();
        let filter = blocked.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let answered = if filter.contains(&event.resource_type) {
                    page.execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = answered {
                    debug!("Failed to answer paused request: {}", e);
                }
            }
        });

        let enabled = self
            .page
            .execute(EnableParams {
                patterns: Some(request_patterns(&blocked)),
                handle_auth_requests: None,
            })
            .await;
        if let Err(e) = enabled {
            task.abort();
            return Err(SearchError::Browser(format!(
                "Failed to enable request interception: {}",
                e
            )));
        }

        let previous = self
            .interceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let mut parsed = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(|e| SearchError::Browser(format!("Failed to watch page load: {}", e)))?;

        let reply = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| SearchError::Browser(format!("Navigation failed: {}", e)))?;
        navigation_result(url, reply.result.error_text.as_deref())?;

        match parsed.next().await {
            Some(_) => Ok(()),
            None => Err(SearchError::Browser(format!(
                "Tab closed before {} was parsed",
                url
            ))),
        }
    }

    async fn click_if_present(&self, selector: &str) -> Result<bool> {
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(false);
        };
        element
            .click()
            .await
            .map_err(|e| SearchError::Browser(format!("Click on '{}' failed: {}", selector, e)))?;
        Ok(true)
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| SearchError::Browser(format!("Script failed: {}", e)))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| SearchError::Browser(format!("Failed to get page content: {}", e)))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if let Some(interceptor) = self.take_interceptor() {
            interceptor.abort();
        }
        self.page
            .close()
            .await
            .map_err(|e| SearchError::Browser(format!("Failed to close tab: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProxyConfig;

    #[test]
    fn test_launcher_defaults() {
        let launcher = ChromiumLauncher::new();
        assert!(launcher.headless);
        assert!(launcher.chrome_path.is_none());
        assert!(launcher.user_data_root.ends_with("a3s-image-search"));
    }

    #[test]
    fn test_launch_args_direct() {
        let launcher = ChromiumLauncher::new();
        let args = launcher.launch_args(&EgressIdentity::direct());

        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert!(args.contains(&"--window-size=1920,1080".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--proxy-server")));
    }

    #[test]
    fn test_launch_args_proxy() {
        let launcher = ChromiumLauncher::new();
        let identity = EgressIdentity::via_proxy(ProxyConfig::new("10.0.0.5", 3128));
        let args = launcher.launch_args(&identity);
        assert!(args.contains(&"--proxy-server=http://10.0.0.5:3128".to_string()));
    }

    #[test]
    fn test_launch_args_proxy_credentials_not_leaked() {
        let launcher = ChromiumLauncher::new();
        let identity =
            EgressIdentity::via_proxy(ProxyConfig::new("10.0.0.5", 3128).with_auth("u", "secret"));
        let args = launcher.launch_args(&identity);
        assert!(!args.iter().any(|a| a.contains("secret")));
    }

    #[test]
    fn test_launch_args_headful_and_extra() {
        let launcher = ChromiumLauncher::new()
            .with_headless(false)
            .with_arg("--lang=en-US");
        let args = launcher.launch_args(&EgressIdentity::direct());
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert_eq!(args.last().map(String::as_str), Some("--lang=en-US"));
    }

    #[test]
    fn test_from_config() {
        let config = ScraperConfig {
            headless: false,
            chrome_path: Some("/usr/bin/chromium".to_string()),
            user_agent: Some("TestAgent/1.0".to_string()),
            ..ScraperConfig::default()
        };
        let launcher = ChromiumLauncher::from_config(&config);
        assert!(!launcher.headless);
        assert_eq!(launcher.chrome_path, Some(PathBuf::from("/usr/bin/chromium")));

        let args = launcher.launch_args(&EgressIdentity::direct());
        assert!(args.contains(&"--user-agent=TestAgent/1.0".to_string()));
    }

    #[test]
    fn test_resource_types() {
        let types: Vec<ResourceType> = ResourceKind::HEAVY.iter().copied().map(resource_type).collect();
        assert_eq!(
            types,
            vec![
                ResourceType::Image,
                ResourceType::Stylesheet,
                ResourceType::Font,
                ResourceType::Media
            ]
        );
    }

    #[test]
    fn test_request_patterns_pause_before_sending() {
        let patterns = request_patterns(&[ResourceType::Image, ResourceType::Font]);
        assert_eq!(patterns.len(), 2);
        assert!(patterns
            .iter()
            .all(|p| p.url_pattern.as_deref() == Some("*")
                && p.request_stage == Some(RequestStage::Request)));
        assert_eq!(patterns[1].resource_type, Some(ResourceType::Font));
    }

    #[test]
    fn test_navigation_result() {
        assert!(navigation_result("https://example.com", None).is_ok());
        assert!(navigation_result("https://example.com", Some("")).is_ok());

        let err = navigation_result("https://example.com", Some("net::ERR_NAME_NOT_RESOLVED"))
            .unwrap_err();
        assert!(err.to_string().contains("net::ERR_NAME_NOT_RESOLVED"));
    }

    #[test]
    fn test_user_data_dirs_are_distinct() {
        let launcher = ChromiumLauncher::new().with_user_data_root("/tmp/profiles");
        let a = launcher.next_user_data_dir();
        let b = launcher.next_user_data_dir();
        assert_ne!(a, b);
        assert!(a.starts_with("/tmp/profiles"));
    }
}
