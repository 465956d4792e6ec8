//! # a3s-image-search
//!
//! Harvests image URLs from a rendered image search page.
//!
//! A fixed pool of browser sessions, each bound to its own egress identity
//! (the direct connection or one proxy), renders the results page. Candidate
//! URLs are pulled out of the HTML, confirmed with concurrent `HEAD` probes,
//! and cached per query for an hour.
//!
//! - Exclusive, round-robin checkout of browser sessions
//! - Wave-based validation that stops once enough images are confirmed
//! - TTL result cache with optional single-flight coalescing
//! - Framework-agnostic HTTP boundary in [`api`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use a3s_image_search::{
//!     chromium::ChromiumLauncher, EgressPool, HttpProbe, ScraperConfig, SearchService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ScraperConfig::from_env()?;
//!     let launcher = ChromiumLauncher::from_config(&config);
//!     let pool = EgressPool::start(&launcher, config.identities()).await?;
//!
//!     let probe = HttpProbe::with_timeout(config.probe_timeout())?;
//!     let service = SearchService::from_config(Arc::new(pool), Arc::new(probe), &config);
//!
//!     let result = service.search("red panda", 10).await?;
//!     for url in &result.images {
//!         println!("{}", url);
//!     }
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

mod error;
mod result;

pub mod api;
pub mod cache;
pub mod config;
pub mod egress;
pub mod extract;
pub mod pool;
pub mod probe;
pub mod render;
pub mod search;
pub mod session;
pub mod validate;

#[cfg(feature = "headless")]
pub mod chrome_path;
#[cfg(feature = "headless")]
pub mod chromium;

pub use cache::{CacheKey, ResultCache};
pub use config::ScraperConfig;
pub use egress::{EgressIdentity, ProxyConfig, ProxyProtocol};
pub use error::{Result, SearchError};
pub use extract::CandidateExtractor;
pub use pool::{EgressPool, SessionLease};
pub use probe::{HttpProbe, ProbeResponse, ReachabilityProbe};
pub use render::{PageRenderer, RenderConfig, RenderStage};
pub use result::SearchResult;
pub use search::SearchService;
pub use session::{BrowserSession, BrowserTab, ResourceKind, SessionLauncher};
pub use validate::ValidationPipeline;
