//! Search orchestration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{CacheKey, ResultCache};
use crate::config::ScraperConfig;
use crate::extract::CandidateExtractor;
use crate::pool::EgressPool;
use crate::probe::ReachabilityProbe;
use crate::render::PageRenderer;
use crate::validate::ValidationPipeline;
use crate::{Result, SearchError, SearchResult};

/// Smallest number of images a search may ask for.
pub const MIN_LIMIT: usize = 1;

/// Largest number of images a search may ask for.
pub const MAX_LIMIT: usize = 50;

/// Number of images returned when the caller does not say.
pub const DEFAULT_LIMIT: usize = 20;

/// Clamps a requested image count into `[MIN_LIMIT, MAX_LIMIT]`.
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(MIN_LIMIT, MAX_LIMIT)
}

type Gate = Arc<Mutex<()>>;

/// Image search over a pool of browser sessions.
///
/// `search` serves from the cache when it can; otherwise it checks out a
/// session, renders the results page, extracts candidate URLs and validates
/// them before caching the result.
pub struct SearchService {
    pool: Arc<EgressPool>,
    renderer: PageRenderer,
    extractor: CandidateExtractor,
    validator: ValidationPipeline,
    cache: ResultCache,
    single_flight: bool,
    in_flight: Mutex<HashMap<CacheKey, Gate>>,
}

impl SearchService {
    /// Creates a service with default renderer, extractor and cache settings.
    pub fn new(pool: Arc<EgressPool>, probe: Arc<dyn ReachabilityProbe>) -> Self {
        Self {
            pool,
            renderer: PageRenderer::new(),
            extractor: CandidateExtractor::new(),
            validator: ValidationPipeline::new(probe),
            cache: ResultCache::new(),
            single_flight: true,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a service wired from `config`.
    ///
    /// The pool's acquire timeout is left as the pool was built.
    pub fn from_config(
        pool: Arc<EgressPool>,
        probe: Arc<dyn ReachabilityProbe>,
        config: &ScraperConfig,
    ) -> Self {
        let validator = ValidationPipeline::new(probe)
            .with_wave_size(config.wave_size)
            .with_probe_timeout(config.probe_timeout());

        Self {
            pool,
            renderer: PageRenderer::with_config(config.render_config()),
            extractor: CandidateExtractor::new(),
            validator,
            cache: config.cache(),
            single_flight: config.single_flight,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the page renderer.
    pub fn with_renderer(mut self, renderer: PageRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Sets the candidate extractor.
    pub fn with_extractor(mut self, extractor: CandidateExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Sets the validation pipeline.
    pub fn with_validator(mut self, validator: ValidationPipeline) -> Self {
        self.validator = validator;
        self
    }

    /// Sets the result cache.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = cache;
        self
    }

    /// Enables or disables coalescing of concurrent searches for the same key.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Returns the session pool.
    pub fn pool(&self) -> &Arc<EgressPool> {
        &self.pool
    }

    /// Returns the result cache.
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Searches for up to `limit` validated image URLs.
    ///
    /// `limit` is clamped to `[1, 50]`. Non-empty results are cached; empty
    /// results and failures are not. Nothing is retried.
    pub async fn search(&self, query: &str, limit: usize) -> Result<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidQuery("Query cannot be empty".into()));
        }

        let limit = clamp_limit(limit);
        let key = CacheKey::new(query, limit);

        if let Some(cached) = self.cache.get(&key).await {
            info!("Serving from cache: \"{}\"", query);
            return Ok(cached);
        }

        if !self.single_flight {
            return self.scrape_and_store(query, limit, key).await;
        }

        let gate = self.gate(&key).await;
        let outcome = {
            let _turn = gate.lock().await;
            match self.cache.get(&key).await {
                Some(cached) => {
                    debug!("Joined in-flight search for \"{}\"", query);
                    Ok(cached)
                }
                None => self.scrape_and_store(query, limit, key.clone()).await,
            }
        };
        self.release_gate(&key, gate).await;
        outcome
    }

    /// Closes every browser session.
    pub async fn shutdown(&self) {
        self.pool.shutdown_all().await;
    }

    async fn scrape_and_store(
        &self,
        query: &str,
        limit: usize,
        key: CacheKey,
    ) -> Result<SearchResult> {
        info!("Search request: \"{}\" (max {} images)", query, limit);
        let start = Instant::now();

        let html = {
            let lease = self.pool.acquire().await?;
            debug!("Rendering \"{}\" on {}", query, lease.identity());
            self.renderer.render(lease.session(), query).await?
        };

        let candidates = self.extractor.extract(&html);
        debug!("Found {} candidates for \"{}\"", candidates.len(), query);

        let images = self.validator.validate(&candidates, limit).await;
        let result = SearchResult::new(query, limit, images);

        info!(
            "Validated {} images for \"{}\" in {}ms",
            result.count,
            query,
            start.elapsed().as_millis()
        );

        if !result.is_empty() {
            self.cache.put(key, result.clone()).await;
        }
        Ok(result)
    }

    async fn gate(&self, key: &CacheKey) -> Gate {
        let mut in_flight = self.in_flight.lock().await;
        Arc::clone(in_flight.entry(key.clone()).or_default())
    }

    async fn release_gate(&self, key: &CacheKey, gate: Gate) {
        let mut in_flight = self.in_flight.lock().await;
        // One reference is ours, one is the table's; anything more is a waiter.
        if Arc::strong_count(&gate) <= 2 {
            in_flight.remove(key);
        }
    }
}
