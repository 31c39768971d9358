//! C2: rolling per-(service, metric) baseline anomaly detector.
//!
//! Grounded on the teacher's observability baseline/z-score pattern, re-tuned to this pipeline's
//! thresholds, and on `original_source/src/detection/anomaly_detector.py` for the exact constants
//! (warm-up count, window size, TTLs, deployment-correlation window).

use async_trait::async_trait;
use autopilot_common::config::DetectorConfig;
use autopilot_common::retry::{RetryExecutor, RetryStrategy};
use autopilot_common::{Anomaly, Baseline, ComponentHealth, Error, Result, Severity};
use autopilot_store::KeyValueStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of correlating an anomaly's timestamp against a service's recent deployments.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentCorrelation {
    pub correlated: bool,
    pub version: Option<String>,
    pub age_minutes: i64,
    pub confidence: CorrelationConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationConfidence {
    High,
    Medium,
}

/// The C2 collaborator contract.
#[async_trait]
pub trait AnomalyDetector: Send + Sync {
    /// Feed one sample for `(service, metric)`. Returns `Some(Anomaly)` once warm-up has
    /// completed and the sample's z-score exceeds the configured threshold.
    async fn detect(&self, service: &str, metric: &str, value: f64) -> Result<Option<Anomaly>>;

    /// Error-rate spike path: given a window's `(error_count, total_count)`, detect a spike
    /// against the service's `"error_rate"` baseline.
    async fn detect_error_rate_spike(
        &self,
        service: &str,
        error_count: u64,
        total_count: u64,
    ) -> Result<Option<Anomaly>>;

    /// Record that `service` deployed `version` at `at`, for later correlation.
    async fn record_deployment(&self, service: &str, version: &str, at: DateTime<Utc>) -> Result<()>;

    /// Correlate an anomaly timestamp against the service's recent deployments.
    async fn correlate_deployment(&self, service: &str, at: DateTime<Utc>) -> Result<DeploymentCorrelation>;

    /// The service's recent anomaly ring buffer, most recent last.
    async fn recent_anomalies(&self, service: &str) -> Result<Vec<Anomaly>>;

    async fn health_check(&self) -> Result<ComponentHealth>;
}

pub struct StandardAnomalyDetector {
    store: Arc<dyn KeyValueStore>,
    config: DetectorConfig,
}

impl StandardAnomalyDetector {
    pub fn new(store: Arc<dyn KeyValueStore>, config: DetectorConfig) -> Self {
        Self { store, config }
    }

    fn baseline_key(service: &str, metric: &str) -> String {
        format!("baseline:{service}:{metric}")
    }

    fn recent_anomalies_key(service: &str) -> String {
        format!("recent_anomalies:{service}")
    }

    fn deployments_key(service: &str) -> String {
        format!("deployments:{service}")
    }

    async fn load_baseline(&self, service: &str, metric: &str) -> Result<Baseline> {
        let key = Self::baseline_key(service, metric);
        match self.store.get(&key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).map_err(Error::MalformedInput),
            Ok(None) => Ok(Baseline::new(service, metric)),
            Err(e) => {
                warn!("baseline load failed for {key}, starting fresh: {e}");
                Ok(Baseline::new(service, metric))
            }
        }
    }

    /// §7: a write that only ever persists best-effort telemetry (a baseline update or a
    /// recent-anomaly append) — a `TransientStorage` failure is retried once with backoff,
    /// exactly as the orchestrator's `rpop_resilient` retries a queue read, then logged and
    /// dropped rather than propagated. Detection must never block on this.
    async fn best_effort_write<F>(&self, label: String, op: F)
    where
        F: Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>> + Send,
    {
        let result = match op().await {
            Ok(()) => Ok(()),
            Err(e @ Error::TransientStorage(_)) => {
                let executor = RetryExecutor::new(RetryStrategy::for_error(&e), label.clone());
                executor.execute(op).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("{label} failed, dropping: {e}");
        }
    }

    /// Append `value` to the baseline's window, recompute mean/sample-stddev, and persist.
    async fn push_and_store(&self, mut baseline: Baseline, value: f64) -> Result<()> {
        baseline.values.push(value);
        if baseline.values.len() > self.config.baseline_window {
            let overflow = baseline.values.len() - self.config.baseline_window;
            baseline.values.drain(0..overflow);
        }
        baseline.count = baseline.values.len() as u32;
        baseline.mean = mean(&baseline.values);
        baseline.stddev = sample_stddev(&baseline.values, baseline.mean);
        baseline.updated_at = Utc::now();

        let key = Self::baseline_key(&baseline.service, &baseline.metric);
        let bytes = serde_json::to_vec(&baseline)?;
        let ttl = Duration::from_secs(self.config.baseline_ttl_days as u64 * 86_400);

        let store = self.store.clone();
        let label = format!("baseline write {key}");
        self.best_effort_write(label, move || {
            let store = store.clone();
            let key = key.clone();
            let bytes = bytes.clone();
            Box::pin(async move { store.set(&key, bytes, Some(ttl)).await })
        })
        .await;
        Ok(())
    }

    async fn append_recent_anomaly(&self, anomaly: &Anomaly) -> Result<()> {
        let key = Self::recent_anomalies_key(&anomaly.service);
        let bytes = serde_json::to_vec(anomaly)?;
        let cap = self.config.recent_anomalies_cap as i64 - 1;
        let ttl = Duration::from_secs(self.config.recent_anomalies_ttl_hours as u64 * 3_600);

        let store = self.store.clone();
        let label = format!("recent-anomaly append {key}");
        self.best_effort_write(label, move || {
            let store = store.clone();
            let key = key.clone();
            let bytes = bytes.clone();
            Box::pin(async move {
                store.lpush(&key, bytes).await?;
                store.ltrim(&key, 0, cap).await?;
                store.expire(&key, ttl).await
            })
        })
        .await;
        Ok(())
    }
}

#[async_trait]
impl AnomalyDetector for StandardAnomalyDetector {
    async fn detect(&self, service: &str, metric: &str, value: f64) -> Result<Option<Anomaly>> {
        let baseline = self.load_baseline(service, metric).await?;

        if baseline.count < self.config.warmup_samples {
            debug!("{service}/{metric} warming up ({}/{})", baseline.count, self.config.warmup_samples);
            self.push_and_store(baseline, value).await?;
            return Ok(None);
        }

        let mean = baseline.mean;
        let stddev = baseline.stddev;
        let z_score = if stddev == 0.0 { 0.0 } else { (value - mean).abs() / stddev };

        self.push_and_store(baseline, value).await?;

        if z_score > self.config.z_score_threshold {
            let deviation_pct = if mean == 0.0 { 0.0 } else { (value - mean) / mean * 100.0 };
            let anomaly = Anomaly {
                service: service.to_string(),
                metric: metric.to_string(),
                value,
                mean,
                stddev,
                z_score,
                deviation_pct,
                severity: Severity::from_z_score(z_score),
                detected_at: Utc::now(),
            };
            self.append_recent_anomaly(&anomaly).await?;
            Ok(Some(anomaly))
        } else {
            Ok(None)
        }
    }

    async fn detect_error_rate_spike(
        &self,
        service: &str,
        error_count: u64,
        total_count: u64,
    ) -> Result<Option<Anomaly>> {
        if total_count == 0 {
            return Ok(None);
        }
        let rate = error_count as f64 / total_count as f64 * 100.0;
        let baseline = self.load_baseline(service, "error_rate").await?;

        let spiking =
            rate > self.config.error_rate_spike_multiplier * baseline.mean && rate > self.config.error_rate_spike_floor;

        let mean = baseline.mean;
        let stddev = baseline.stddev;
        self.push_and_store(baseline, rate).await?;

        if !spiking {
            return Ok(None);
        }

        let severity = if rate > self.config.error_rate_critical_threshold {
            Severity::Critical
        } else {
            Severity::Medium
        };
        let deviation_pct = if mean == 0.0 { 0.0 } else { (rate - mean) / mean * 100.0 };
        let anomaly = Anomaly {
            service: service.to_string(),
            metric: "error_rate".to_string(),
            value: rate,
            mean,
            stddev,
            z_score: if stddev == 0.0 { 0.0 } else { (rate - mean).abs() / stddev },
            deviation_pct,
            severity,
            detected_at: Utc::now(),
        };
        self.append_recent_anomaly(&anomaly).await?;
        Ok(Some(anomaly))
    }

    async fn record_deployment(&self, service: &str, version: &str, at: DateTime<Utc>) -> Result<()> {
        self.store
            .zadd(&Self::deployments_key(service), version, at.timestamp() as f64)
            .await
    }

    async fn correlate_deployment(&self, service: &str, at: DateTime<Utc>) -> Result<DeploymentCorrelation> {
        let window_start = at - chrono::Duration::minutes(self.config.deployment_correlation_window_minutes);
        let members = self
            .store
            .zrange_by_score(
                &Self::deployments_key(service),
                window_start.timestamp() as f64,
                at.timestamp() as f64,
            )
            .await?;

        match members.into_iter().max_by(|a, b| a.1.partial_cmp(&b.1).unwrap()) {
            Some((version, score)) => {
                let deployed_at = DateTime::<Utc>::from_timestamp(score as i64, 0).unwrap_or(at);
                let age_minutes = (at - deployed_at).num_minutes();
                let confidence = if age_minutes < self.config.deployment_correlation_high_confidence_minutes {
                    CorrelationConfidence::High
                } else {
                    CorrelationConfidence::Medium
                };
                Ok(DeploymentCorrelation {
                    correlated: true,
                    version: Some(version),
                    age_minutes,
                    confidence,
                })
            }
            None => Ok(DeploymentCorrelation {
                correlated: false,
                version: None,
                age_minutes: 0,
                confidence: CorrelationConfidence::Medium,
            }),
        }
    }

    async fn recent_anomalies(&self, service: &str) -> Result<Vec<Anomaly>> {
        let key = Self::recent_anomalies_key(service);
        let raw = self.store.lrange(&key, 0, -1).await?;
        raw.iter()
            .map(|bytes| serde_json::from_slice(bytes).map_err(Error::MalformedInput))
            .collect()
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        self.store.health_check().await
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation (N-1 denominator), 0 for fewer than two samples.
fn sample_stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Construct the standard detector over a shared store.
pub async fn create_detector(
    store: Arc<dyn KeyValueStore>,
    config: DetectorConfig,
) -> Result<Arc<dyn AnomalyDetector + Send + Sync>> {
    Ok(Arc::new(StandardAnomalyDetector::new(store, config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_common::config::DetectorConfig;
    use autopilot_store::MemoryStore;

    fn config() -> DetectorConfig {
        autopilot_common::Config::default().detector
    }

    #[tokio::test]
    async fn warms_up_before_emitting() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let detector = StandardAnomalyDetector::new(store, config());

        for v in [100.0, 102.0, 98.0, 101.0, 99.0, 103.0, 97.0, 100.0, 101.0, 99.0] {
            let result = detector.detect("svc", "latency_ms", v).await.unwrap();
            assert!(result.is_none());
        }
    }

    #[tokio::test]
    async fn emits_anomaly_past_threshold() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let detector = StandardAnomalyDetector::new(store, config());

        for v in [98.0, 99.0, 100.0, 101.0, 102.0, 98.0, 99.0, 100.0, 101.0, 102.0] {
            detector.detect("svc", "latency_ms", v).await.unwrap();
        }

        let anomaly = detector.detect("svc", "latency_ms", 2000.0).await.unwrap();
        assert!(anomaly.is_some());
        let anomaly = anomaly.unwrap();
        assert!(anomaly.z_score > 2.5);
        assert!(matches!(anomaly.severity, Severity::Critical | Severity::High));
    }

    #[tokio::test]
    async fn deployment_correlation_window() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let detector = StandardAnomalyDetector::new(store, config());

        let deploy_time = Utc::now() - chrono::Duration::minutes(5);
        detector.record_deployment("svc", "v3.2.1", deploy_time).await.unwrap();

        let correlation = detector.correlate_deployment("svc", Utc::now()).await.unwrap();
        assert!(correlation.correlated);
        assert_eq!(correlation.version, Some("v3.2.1".to_string()));
        assert_eq!(correlation.confidence, CorrelationConfidence::High);
    }

    #[tokio::test]
    async fn error_rate_spike_requires_both_conditions() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let detector = StandardAnomalyDetector::new(store, config());

        for _ in 0..10 {
            detector.detect_error_rate_spike("svc", 0, 100).await.unwrap();
        }

        let spike = detector.detect_error_rate_spike("svc", 10, 100).await.unwrap();
        assert!(spike.is_some());
    }
}
