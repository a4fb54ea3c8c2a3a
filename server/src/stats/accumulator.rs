use crate::probe::{BODY_SAMPLE_LIMIT, RequestOutcome, truncate_chars};
use crate::protocol::{EndpointSummary, ErrorSample, LastError};
use indexmap::IndexMap;
use parking_lot::Mutex;

use super::percentile::{percentile, tail_percentiles};

/// Error samples kept per run
pub const DEFAULT_ERROR_SAMPLE_CAP: usize = 5;

/// Counters for one logical endpoint
#[derive(Debug, Clone, Default)]
pub struct EndpointStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub mean_latency_ms: f64,
    samples: Vec<f64>,
}

impl EndpointStats {
    fn record(&mut self, success: bool, latency_ms: f64) {
        self.total += 1;
        if success {
            self.success += 1;
        } else {
            self.failed += 1;
        }
        self.mean_latency_ms += (latency_ms - self.mean_latency_ms) / self.total as f64;
        self.samples.push(latency_ms);
    }

    /// failures / total, 0 before the first outcome
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }

    pub fn p95_latency_ms(&self) -> f64 {
        percentile(&self.samples, 95.0)
    }

    pub fn summary(&self, name: &str) -> EndpointSummary {
        EndpointSummary {
            name: name.to_string(),
            total: self.total,
            success: self.success,
            failed: self.failed,
            error_rate: self.error_rate(),
            mean_latency_ms: self.mean_latency_ms,
            p95_latency_ms: self.p95_latency_ms(),
        }
    }
}

/// Run-wide totals at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub last_error: Option<LastError>,
}

impl Totals {
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

/// Everything the aggregating phase needs, copied out of the lock
#[derive(Debug, Clone)]
pub struct FinalStats {
    pub totals: Totals,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub endpoints: Vec<EndpointSummary>,
    pub error_samples: Vec<ErrorSample>,
}

#[derive(Debug, Default)]
struct Inner {
    totals: Totals,
    endpoints: IndexMap<String, EndpointStats>,
    samples: Vec<f64>,
    error_samples: Vec<ErrorSample>,
}

/// Shared, concurrently written statistics of one run.
///
/// Each `record` updates counters, mean and samples under one lock, so
/// readers never observe a total that disagrees with its mean.
#[derive(Debug)]
pub struct StatsAccumulator {
    inner: Mutex<Inner>,
    error_sample_cap: usize,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::with_error_sample_cap(DEFAULT_ERROR_SAMPLE_CAP)
    }

    pub fn with_error_sample_cap(error_sample_cap: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            error_sample_cap,
        }
    }

    /// Fold one outcome into the stats of `endpoint`
    pub fn record(&self, endpoint: &str, outcome: &RequestOutcome) {
        let latency_ms = outcome.elapsed_ms();
        let mut inner = self.inner.lock();

        inner.totals.total += 1;
        if outcome.success {
            inner.totals.success += 1;
        } else {
            inner.totals.failed += 1;
            inner.totals.last_error = Some(LastError {
                url: outcome.url.clone(),
                status: outcome.status,
                error: outcome.error.clone(),
            });
        }

        match inner.endpoints.get_mut(endpoint) {
            Some(stats) => stats.record(outcome.success, latency_ms),
            None => {
                let mut stats = EndpointStats::default();
                stats.record(outcome.success, latency_ms);
                inner.endpoints.insert(endpoint.to_string(), stats);
            }
        }
        inner.samples.push(latency_ms);

        // Insert-only while under the cap: the first failures stay
        if !outcome.success && inner.error_samples.len() < self.error_sample_cap {
            inner.error_samples.push(ErrorSample {
                endpoint: endpoint.to_string(),
                url: outcome.url.clone(),
                status: outcome.status,
                error: outcome.error.clone(),
                body: outcome
                    .body_sample
                    .as_deref()
                    .map(|b| truncate_chars(b, BODY_SAMPLE_LIMIT))
                    .unwrap_or_default(),
                elapsed_ms: latency_ms,
            });
        }
    }

    pub fn totals(&self) -> Totals {
        self.inner.lock().totals.clone()
    }

    /// Run-wide percentile in milliseconds; the sample list is left untouched
    pub fn percentile(&self, p: f64) -> f64 {
        let samples = self.inner.lock().samples.clone();
        percentile(&samples, p)
    }

    pub fn endpoint(&self, name: &str) -> Option<EndpointStats> {
        self.inner.lock().endpoints.get(name).cloned()
    }

    pub fn endpoint_names(&self) -> Vec<String> {
        self.inner.lock().endpoints.keys().cloned().collect()
    }

    pub fn error_samples(&self) -> Vec<ErrorSample> {
        self.inner.lock().error_samples.clone()
    }

    /// Copy everything out and compute percentiles without holding the lock
    pub fn finalize(&self) -> FinalStats {
        let (totals, endpoints, samples, error_samples) = {
            let inner = self.inner.lock();
            (
                inner.totals.clone(),
                inner.endpoints.clone(),
                inner.samples.clone(),
                inner.error_samples.clone(),
            )
        };

        let (p50, p95, p99) = tail_percentiles(&samples);
        let endpoints = endpoints
            .iter()
            .map(|(name, stats)| stats.summary(name))
            .collect();

        FinalStats {
            totals,
            p50,
            p95,
            p99,
            endpoints,
            error_samples,
        }
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn outcome(success: bool, ms: u64) -> RequestOutcome {
        RequestOutcome {
            url: "http://target/x".to_string(),
            elapsed: Duration::from_millis(ms),
            success,
            status: Some(if success { 200 } else { 503 }),
            error: None,
            body_sample: (!success).then(|| "unavailable".to_string()),
            body: None,
        }
    }

    #[test]
    fn test_running_mean() {
        let stats = StatsAccumulator::new();
        stats.record("login", &outcome(true, 10));
        stats.record("login", &outcome(true, 20));
        stats.record("login", &outcome(true, 60));

        let login = stats.endpoint("login").unwrap();
        assert_eq!(login.total, 3);
        assert!((login.mean_latency_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_endpoints_created_lazily_in_first_seen_order() {
        let stats = StatsAccumulator::new();
        assert!(stats.endpoint("login").is_none());
        stats.record("login", &outcome(true, 1));
        stats.record("wallet_balance", &outcome(true, 1));
        stats.record("login", &outcome(true, 1));
        assert_eq!(stats.endpoint_names(), vec!["login", "wallet_balance"]);
    }

    #[test]
    fn test_error_rate_and_totals() {
        let stats = StatsAccumulator::new();
        for i in 0..10 {
            stats.record("game_start", &outcome(i % 5 != 0, 5));
        }
        let ep = stats.endpoint("game_start").unwrap();
        assert_eq!(ep.total, ep.success + ep.failed);
        assert!((ep.error_rate() - 0.2).abs() < 1e-9);

        let totals = stats.totals();
        assert_eq!(totals.total, 10);
        assert_eq!(totals.failed, 2);
        assert_eq!(totals.last_error.unwrap().status, Some(503));
    }

    #[test]
    fn test_error_samples_capped_and_stable() {
        let stats = StatsAccumulator::with_error_sample_cap(2);
        let mut first = outcome(false, 1);
        first.url = "http://target/first".to_string();
        stats.record("a", &first);
        stats.record("a", &outcome(false, 2));
        let mut late = outcome(false, 3);
        late.url = "http://target/late".to_string();
        stats.record("a", &late);

        let samples = stats.error_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].url, "http://target/first");
        assert!(samples.iter().all(|s| s.url != "http://target/late"));
        // last_error still tracks the newest failure
        assert_eq!(
            stats.totals().last_error.unwrap().url,
            "http://target/late"
        );
    }

    #[test]
    fn test_percentile_queries_are_repeatable() {
        let stats = StatsAccumulator::new();
        for ms in [30, 10, 20] {
            stats.record("a", &outcome(true, ms));
        }
        assert_eq!(stats.percentile(50.0), 20.0);
        assert_eq!(stats.percentile(50.0), 20.0);
        assert_eq!(StatsAccumulator::new().percentile(99.0), 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_record_loses_nothing() {
        let stats = Arc::new(StatsAccumulator::new());
        let mut handles = Vec::new();
        for worker in 0..16 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..250 {
                    stats.record("shared", &outcome((worker + i) % 7 != 0, 1));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let final_stats = stats.finalize();
        assert_eq!(final_stats.totals.total, 4000);
        assert_eq!(
            final_stats.totals.total,
            final_stats.totals.success + final_stats.totals.failed
        );
        let shared = stats.endpoint("shared").unwrap();
        assert_eq!(shared.total, 4000);
        assert!((shared.mean_latency_ms - 1.0).abs() < 1e-9);
    }
}
