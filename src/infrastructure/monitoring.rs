// Recommendation metrics
// Counters for how feeds were produced and how long scoring took

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::models::Algorithm;

/// Metrics collector shared by the service and the HTTP layer
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<RecommendationMetrics>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationMetrics {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub cold_start_requests: u64,
    pub popularity_fallbacks: u64,
    pub timeouts: u64,
    pub shared_flights: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub snapshot_rebuilds: u64,
    /// Users with a last-good ranking held for timeout fallback
    pub cached_rankings: usize,
    /// Entries served per algorithm tag
    pub entries_by_algorithm: BTreeMap<String, u64>,
    pub scoring_latency: LatencySummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub sum_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
}

impl LatencySummary {
    fn observe(&mut self, duration_ms: f64) {
        if self.count == 0 || duration_ms < self.min_ms {
            self.min_ms = duration_ms;
        }
        if duration_ms > self.max_ms {
            self.max_ms = duration_ms;
        }
        self.count += 1;
        self.sum_ms += duration_ms;
        self.avg_ms = self.sum_ms / self.count as f64;
    }
}

/// How one feed request was served, as reported to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Scored,
    ColdStart,
    TimedOut,
    Failed,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_request<'a, I>(&self, outcome: RequestOutcome, duration: Duration, algorithms: I)
    where
        I: IntoIterator<Item = &'a Algorithm>,
    {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        match outcome {
            RequestOutcome::Scored => {}
            RequestOutcome::ColdStart => metrics.cold_start_requests += 1,
            RequestOutcome::TimedOut => metrics.timeouts += 1,
            RequestOutcome::Failed => metrics.failed_requests += 1,
        }

        let mut fell_back = false;
        for algorithm in algorithms {
            if !algorithm.is_personalized() {
                fell_back = true;
            }
            *metrics
                .entries_by_algorithm
                .entry(algorithm.as_str().to_string())
                .or_insert(0) += 1;
        }
        if fell_back {
            metrics.popularity_fallbacks += 1;
        }

        metrics.scoring_latency.observe(duration.as_secs_f64() * 1000.0);
    }

    pub async fn record_shared_flight(&self) {
        self.metrics.write().await.shared_flights += 1;
    }

    pub async fn record_cache_lookup(&self, hit: bool) {
        let mut metrics = self.metrics.write().await;
        if hit {
            metrics.cache_hits += 1;
        } else {
            metrics.cache_misses += 1;
        }
    }

    pub async fn record_snapshot_rebuild(&self) {
        self.metrics.write().await.snapshot_rebuilds += 1;
    }

    pub async fn get_metrics_snapshot(&self) -> RecommendationMetrics {
        self.metrics.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_outcomes_are_counted() {
        let collector = MetricsCollector::new();
        collector
            .record_request(
                RequestOutcome::ColdStart,
                Duration::from_millis(4),
                &[Algorithm::PopularityBased, Algorithm::PopularityBased],
            )
            .await;
        collector
            .record_request(RequestOutcome::Scored, Duration::from_millis(8), &[Algorithm::Hybrid])
            .await;
        collector.record_cache_lookup(false).await;

        let snapshot = collector.get_metrics_snapshot().await;
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.cold_start_requests, 1);
        assert_eq!(snapshot.popularity_fallbacks, 1);
        assert_eq!(snapshot.entries_by_algorithm["popularity_based"], 2);
        assert_eq!(snapshot.entries_by_algorithm["hybrid"], 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.scoring_latency.count, 2);
        assert!((snapshot.scoring_latency.min_ms - 4.0).abs() < 1e-9);
        assert!((snapshot.scoring_latency.avg_ms - 6.0).abs() < 1e-9);
    }
}
