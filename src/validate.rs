//! Wave-based validation of candidate URLs.
//!
//! Candidates are probed in fixed-size waves. All probes of a wave run
//! concurrently and the wave is awaited as a whole before the stop condition
//! is checked, so no candidate beyond the current wave is probed until the
//! wave has fully resolved.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::probe::{ReachabilityProbe, DEFAULT_PROBE_TIMEOUT};

/// Default number of candidates probed concurrently.
pub const DEFAULT_WAVE_SIZE: usize = 20;

/// Probes candidates until enough of them are confirmed images.
#[derive(Clone)]
pub struct ValidationPipeline {
    probe: Arc<dyn ReachabilityProbe>,
    wave_size: usize,
    probe_timeout: Duration,
}

impl ValidationPipeline {
    /// Creates a pipeline with the default wave size and probe timeout.
    pub fn new(probe: Arc<dyn ReachabilityProbe>) -> Self {
        Self {
            probe,
            wave_size: DEFAULT_WAVE_SIZE,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Sets the wave size. Zero is treated as one.
    pub fn with_wave_size(mut self, wave_size: usize) -> Self {
        self.wave_size = wave_size.max(1);
        self
    }

    /// Sets the per-probe timeout.
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Returns the wave size.
    pub fn wave_size(&self) -> usize {
        self.wave_size
    }

    /// Returns the per-probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Returns at most `limit` candidates that answered as images, in
    /// candidate order.
    pub async fn validate(&self, candidates: &[String], limit: usize) -> Vec<String> {
        let mut validated = Vec::with_capacity(limit.min(candidates.len()));

        for (wave_index, wave) in candidates.chunks(self.wave_size).enumerate() {
            if validated.len() >= limit {
                break;
            }

            let outcomes = join_all(wave.iter().map(|url| self.check(url))).await;
            let before = validated.len();

            for (url, ok) in wave.iter().zip(outcomes) {
                if ok && validated.len() < limit {
                    validated.push(url.clone());
                }
            }

            debug!(
                "Validation wave {}: {}/{} passed, {} collected",
                wave_index + 1,
                validated.len() - before,
                wave.len(),
                validated.len()
            );
        }

        validated
    }

    async fn check(&self, url: &str) -> bool {
        match timeout(self.probe_timeout, self.probe.head(url)).await {
            Ok(Ok(response)) => {
                let ok = response.is_image();
                if !ok {
                    trace!(
                        "Rejected {}: status {} type {:?}",
                        url,
                        response.status,
                        response.content_type
                    );
                }
                ok
            }
            Ok(Err(e)) => {
                trace!("Probe failed for {}: {}", url, e);
                false
            }
            Err(_) => {
                trace!("Probe timed out for {}", url);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeResponse;
    use crate::{Result, SearchError};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Answers 200 image/jpeg for URLs in `good`, 404 otherwise.
    struct FakeProbe {
        good: HashSet<String>,
        slow: HashSet<String>,
        broken: HashSet<String>,
        probed: Mutex<Vec<String>>,
    }

    impl FakeProbe {
        fn new(good: &[String]) -> Self {
            Self {
                good: good.iter().cloned().collect(),
                slow: HashSet::new(),
                broken: HashSet::new(),
                probed: Mutex::new(Vec::new()),
            }
        }

        fn probed(&self) -> Vec<String> {
            self.probed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReachabilityProbe for FakeProbe {
        async fn head(&self, url: &str) -> Result<ProbeResponse> {
            self.probed.lock().unwrap().push(url.to_string());
            if self.slow.contains(url) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.broken.contains(url) {
                return Err(SearchError::Other("connection reset".to_string()));
            }
            if self.good.contains(url) {
                Ok(ProbeResponse::new(200, Some("image/jpeg")))
            } else {
                Ok(ProbeResponse::new(404, Some("text/html")))
            }
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://img.example/{}.jpg", i)).collect()
    }

    fn pipeline(probe: &Arc<FakeProbe>) -> ValidationPipeline {
        ValidationPipeline::new(Arc::clone(probe) as Arc<dyn ReachabilityProbe>)
    }

    #[test]
    fn test_defaults() {
        let probe = Arc::new(FakeProbe::new(&[]));
        let pipeline = pipeline(&probe);
        assert_eq!(pipeline.wave_size(), 20);
        assert_eq!(pipeline.probe_timeout(), Duration::from_secs(3));
        assert_eq!(pipeline.with_wave_size(0).wave_size(), 1);
    }

    #[tokio::test]
    async fn test_returns_all_successes_below_limit_in_order() {
        let candidates = urls(30);
        let good = vec![
            candidates[27].clone(),
            candidates[3].clone(),
            candidates[11].clone(),
        ];
        let probe = Arc::new(FakeProbe::new(&good));

        let validated = pipeline(&probe).validate(&candidates, 10).await;

        assert_eq!(
            validated,
            vec![
                candidates[3].clone(),
                candidates[11].clone(),
                candidates[27].clone(),
            ]
        );
        // Both waves ran, nothing beyond the candidates was probed.
        assert_eq!(probe.probed().len(), 30);
    }

    #[tokio::test]
    async fn test_first_wave_satisfies_limit() {
        let candidates = urls(40);
        let good: Vec<String> = [1, 2, 4, 5, 8, 9, 12, 19]
            .iter()
            .map(|&i| candidates[i].clone())
            .collect();
        let probe = Arc::new(FakeProbe::new(&good));

        let validated = pipeline(&probe).validate(&candidates, 5).await;

        assert_eq!(validated, good[..5].to_vec());
        let probed = probe.probed();
        assert_eq!(probed.len(), 20);
        assert!(probed.iter().all(|u| candidates[..20].contains(u)));
    }

    #[tokio::test]
    async fn test_stops_between_waves_once_limit_reached() {
        let candidates = urls(60);
        let good: Vec<String> = vec![candidates[5].clone(), candidates[25].clone(), candidates[45].clone()];
        let probe = Arc::new(FakeProbe::new(&good));

        let validated = pipeline(&probe).validate(&candidates, 2).await;

        assert_eq!(validated, vec![candidates[5].clone(), candidates[25].clone()]);
        assert_eq!(probe.probed().len(), 40);
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let probe = Arc::new(FakeProbe::new(&[]));
        let validated = pipeline(&probe).validate(&[], 5).await;
        assert!(validated.is_empty());
        assert!(probe.probed().is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_excluded() {
        let candidates = urls(3);
        let mut fake = FakeProbe::new(&candidates);
        fake.broken.insert(candidates[1].clone());
        let probe = Arc::new(fake);

        let validated = pipeline(&probe).validate(&candidates, 10).await;
        assert_eq!(validated, vec![candidates[0].clone(), candidates[2].clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_times_out() {
        let candidates = urls(3);
        let mut fake = FakeProbe::new(&candidates);
        fake.slow.insert(candidates[0].clone());
        let probe = Arc::new(fake);

        let validated = pipeline(&probe).validate(&candidates, 10).await;
        assert_eq!(validated, vec![candidates[1].clone(), candidates[2].clone()]);
    }

    #[tokio::test]
    async fn test_custom_wave_size() {
        let candidates = urls(10);
        let probe = Arc::new(FakeProbe::new(&candidates));

        let validated = pipeline(&probe)
            .with_wave_size(3)
            .validate(&candidates, 4)
            .await;

        assert_eq!(validated, candidates[..4].to_vec());
        // Two waves of three: the limit is only checked between waves.
        assert_eq!(probe.probed().len(), 6);
    }
}
