//! Scraper configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{ResultCache, DEFAULT_CAPACITY};
use crate::egress::{parse_proxy_entries, EgressIdentity, ProxyConfig};
use crate::render::{RenderConfig, DEFAULT_USER_AGENT};
use crate::session::ResourceKind;
use crate::{Result, SearchError};

/// Default port for proxy entries that do not name one.
pub const DEFAULT_PROXY_PORT: u16 = 3128;

/// Settings for the whole scraping pipeline.
///
/// Every field has a default, so a partial JSON document (or `{}`) is a
/// valid configuration. Durations are whole seconds unless the field name
/// says otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Proxy entries: bare hosts, `host:port`, or full proxy URLs.
    #[serde(default)]
    pub proxies: Vec<String>,
    /// Port used for proxy entries without one.
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,
    /// Page load timeout in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout: u64,
    /// Pause after dismissing the consent prompt.
    #[serde(default = "default_consent_pause_ms")]
    pub consent_pause_ms: u64,
    /// Pixels per scroll step.
    #[serde(default = "default_scroll_step")]
    pub scroll_step: u32,
    /// Pause before each scroll step.
    #[serde(default = "default_scroll_interval_ms")]
    pub scroll_interval_ms: u64,
    /// Total scroll distance cap in pixels.
    #[serde(default = "default_max_scroll")]
    pub max_scroll: u64,
    /// Abort image, stylesheet, font and media requests of search pages.
    #[serde(default = "default_true")]
    pub block_resources: bool,
    /// Per-candidate probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,
    /// Candidates probed concurrently per wave.
    #[serde(default = "default_wave_size")]
    pub wave_size: usize,
    /// Result cache lifetime in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// Maximum number of cached results.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// How long a search waits for an idle session, in seconds.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: u64,
    /// Coalesce concurrent searches for the same query and limit.
    #[serde(default = "default_true")]
    pub single_flight: bool,
    /// Run browsers without a window.
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Browser executable; detected when unset.
    #[serde(default)]
    pub chrome_path: Option<String>,
    /// User agent for search pages; the browser's own when unset.
    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,
}

fn default_proxy_port() -> u16 {
    DEFAULT_PROXY_PORT
}

fn default_navigation_timeout() -> u64 {
    15
}

fn default_consent_pause_ms() -> u64 {
    500
}

fn default_scroll_step() -> u32 {
    500
}

fn default_scroll_interval_ms() -> u64 {
    50
}

fn default_max_scroll() -> u64 {
    5000
}

fn default_probe_timeout() -> u64 {
    3
}

fn default_wave_size() -> usize {
    20
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> Option<String> {
    Some(DEFAULT_USER_AGENT.to_string())
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            proxies: Vec::new(),
            proxy_port: DEFAULT_PROXY_PORT,
            navigation_timeout: default_navigation_timeout(),
            consent_pause_ms: default_consent_pause_ms(),
            scroll_step: default_scroll_step(),
            scroll_interval_ms: default_scroll_interval_ms(),
            max_scroll: default_max_scroll(),
            block_resources: true,
            probe_timeout: default_probe_timeout(),
            wave_size: default_wave_size(),
            cache_ttl: default_cache_ttl(),
            cache_capacity: DEFAULT_CAPACITY,
            acquire_timeout: default_acquire_timeout(),
            single_flight: true,
            headless: true,
            chrome_path: None,
            user_agent: default_user_agent(),
        }
    }
}

impl ScraperConfig {
    /// Reads `PROXY_LIST` and `PROXY_PORT` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from a variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(list) = lookup("PROXY_LIST") {
            config.proxies = split_list(&list);
        }

        if let Some(port) = lookup("PROXY_PORT") {
            let port = port.trim();
            if !port.is_empty() {
                config.proxy_port = port
                    .parse()
                    .map_err(|_| SearchError::Config(format!("Invalid PROXY_PORT: {}", port)))?;
            }
        }

        Ok(config)
    }

    /// Parses a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SearchError::Config(e.to_string()))
    }

    /// Replaces the proxy entries with a comma-separated list.
    pub fn set_proxy_list(&mut self, list: &str) {
        self.proxies = split_list(list);
    }

    /// Parsed proxy entries. Entries that do not parse are logged and left out.
    pub fn proxy_configs(&self) -> Vec<ProxyConfig> {
        parse_proxy_entries(&self.proxies, self.proxy_port)
    }

    /// Identities to launch: direct first, then one per usable proxy.
    pub fn identities(&self) -> Vec<EgressIdentity> {
        EgressIdentity::from_proxies(self.proxy_configs())
    }

    /// Renderer settings.
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            navigation_timeout: Duration::from_secs(self.navigation_timeout),
            consent_pause: Duration::from_millis(self.consent_pause_ms),
            scroll_step: self.scroll_step,
            scroll_interval: Duration::from_millis(self.scroll_interval_ms),
            max_scroll: self.max_scroll,
            user_agent: self.user_agent.clone(),
            blocked_resources: if self.block_resources {
                ResourceKind::HEAVY.to_vec()
            } else {
                Vec::new()
            },
            ..RenderConfig::default()
        }
    }

    /// Per-candidate probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    /// Session checkout timeout.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout)
    }

    /// An empty result cache with the configured TTL and capacity.
    pub fn cache(&self) -> ResultCache {
        ResultCache::with_settings(Duration::from_secs(self.cache_ttl), self.cache_capacity)
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
