use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::constants::{CACHE_HIT_RATE_TARGET, METRICS_BUFFER_CAPACITY, RESPONSE_TIME_TARGET_MS};

/// One recorded request observation.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSample {
    pub response_time_ms: u64,
    pub cache_hit: bool,
    pub timestamp: DateTime<Utc>,
}

impl PerformanceSample {
    pub fn new(response_time_ms: u64, cache_hit: bool) -> Self {
        Self {
            response_time_ms,
            cache_hit,
            timestamp: Utc::now(),
        }
    }
}

/// Tunable alert thresholds. Response time alerts fire above the target,
/// hit-rate alerts below it.
#[derive(Debug, Clone)]
pub struct PerformanceThresholds {
    pub response_time_ms: u64,
    pub cache_hit_rate: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            response_time_ms: RESPONSE_TIME_TARGET_MS,
            cache_hit_rate: CACHE_HIT_RATE_TARGET,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Warning,
    Critical,
}

impl HealthState {
    fn worst(self, other: HealthState) -> HealthState {
        use HealthState::*;
        match (self, other) {
            (Critical, _) | (_, Critical) => Critical,
            (Warning, _) | (_, Warning) => Warning,
            _ => Healthy,
        }
    }
}

/// Per-metric health breakdown entry.
#[derive(Debug, Clone, Serialize)]
pub struct MetricHealth {
    pub value: f64,
    pub threshold: f64,
    pub status: HealthState,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub response_time: MetricHealth,
    pub cache_hit_rate: MetricHealth,
    pub sample_count: usize,
}

/// Rolling averages over a time window.
#[derive(Debug, Clone, Serialize)]
pub struct MetricAverages {
    pub response_time_ms: f64,
    pub cache_hit_rate: f64,
    pub sample_count: usize,
}

// Shared recorder for passing between handlers
pub type SharedMetrics = Arc<MetricsRecorder>;

/// Process-wide rolling window of performance samples with threshold alerts.
///
/// Samples live in a bounded ring buffer; the oldest observation is evicted on
/// overflow. Alerts are structured warn logs so breaches stay queryable
/// through `health_status` rather than vanishing into stdout.
#[derive(Debug)]
pub struct MetricsRecorder {
    samples: RwLock<VecDeque<PerformanceSample>>,
    thresholds: PerformanceThresholds,
    capacity: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::with_thresholds(PerformanceThresholds::default())
    }

    pub fn with_thresholds(thresholds: PerformanceThresholds) -> Self {
        Self {
            samples: RwLock::new(VecDeque::with_capacity(METRICS_BUFFER_CAPACITY)),
            thresholds,
            capacity: METRICS_BUFFER_CAPACITY,
        }
    }

    pub async fn record(&self, sample: PerformanceSample) {
        if sample.response_time_ms > self.thresholds.response_time_ms {
            warn!(
                response_time_ms = sample.response_time_ms,
                threshold_ms = self.thresholds.response_time_ms,
                "Performance alert: response time over target"
            );
        }

        let mut samples = self.samples.write().await;
        if samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Rolling averages over the last `window_minutes`. `None` when the
    /// window holds no samples.
    pub async fn averages(&self, window_minutes: i64) -> Option<MetricAverages> {
        let cutoff = Utc::now() - Duration::minutes(window_minutes);
        let samples = self.samples.read().await;

        let recent: Vec<&PerformanceSample> =
            samples.iter().filter(|s| s.timestamp >= cutoff).collect();
        if recent.is_empty() {
            return None;
        }

        let count = recent.len();
        let total_ms: u64 = recent.iter().map(|s| s.response_time_ms).sum();
        let hits = recent.iter().filter(|s| s.cache_hit).count();

        Some(MetricAverages {
            response_time_ms: total_ms as f64 / count as f64,
            cache_hit_rate: hits as f64 / count as f64,
            sample_count: count,
        })
    }

    /// Health over the last 5 minutes. Never errors; with no samples the
    /// status is healthy (nothing observed, nothing breached).
    pub async fn health_status(&self) -> HealthReport {
        let averages = self.averages(5).await;

        let (response_time_ms, hit_rate, sample_count) = match averages {
            Some(a) => (a.response_time_ms, a.cache_hit_rate, a.sample_count),
            None => {
                return HealthReport {
                    status: HealthState::Healthy,
                    response_time: MetricHealth {
                        value: 0.0,
                        threshold: self.thresholds.response_time_ms as f64,
                        status: HealthState::Healthy,
                    },
                    cache_hit_rate: MetricHealth {
                        value: 0.0,
                        threshold: self.thresholds.cache_hit_rate,
                        status: HealthState::Healthy,
                    },
                    sample_count: 0,
                };
            }
        };

        let rt_threshold = self.thresholds.response_time_ms as f64;
        let rt_status = if response_time_ms > rt_threshold * 2.0 {
            HealthState::Critical
        } else if response_time_ms > rt_threshold * 1.5 {
            HealthState::Warning
        } else {
            HealthState::Healthy
        };

        let hr_threshold = self.thresholds.cache_hit_rate;
        let hr_status = if hit_rate < hr_threshold * 0.7 {
            HealthState::Critical
        } else if hit_rate < hr_threshold * 0.9 {
            HealthState::Warning
        } else {
            HealthState::Healthy
        };

        HealthReport {
            status: rt_status.worst(hr_status),
            response_time: MetricHealth {
                value: response_time_ms,
                threshold: rt_threshold,
                status: rt_status,
            },
            cache_hit_rate: MetricHealth {
                value: hit_rate,
                threshold: hr_threshold,
                status: hr_status,
            },
            sample_count,
        }
    }

    pub async fn sample_count(&self) -> usize {
        self.samples.read().await.len()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
