//! Wires every component behind `Arc<dyn Trait + Send + Sync>` and spawns the four cooperative
//! loops (§5): L1 metric-stream poller, L2 log-stream poller, L3 anomaly correlator, L4
//! approved-action drainer.
//!
//! Grounded on the reference `PipelineGuard::new`/`monitoring_cycle` task shape
//! (`crates/mcp-pipeline-guard/src/guard.rs`): each loop is a `tokio::spawn`ed task wrapping a
//! `tokio::time::interval`, and the orchestrator holds every `JoinHandle`, aborting them on
//! `Drop` exactly as the reference guard does.
//!
//! Two ambient resilience primitives from `autopilot_common` back the §7 error-handling design:
//! a `RetryExecutor` retries a `TransientStorage` queue read once with backoff before it's
//! dropped, and a `CircuitBreaker` over C1 health pauses the autonomous (L3/L4) paths once the
//! store looks unavailable, matching the "unavailable for > 30s" escalation rule.

use crate::ingest::{IngestedLog, IngestedMetric, LOG_QUEUE_KEY, METRIC_QUEUE_KEY};
use autopilot_analyzer::{AnalysisContext, IncidentAnalyzer};
use autopilot_audit::DecisionLogger;
use autopilot_common::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use autopilot_common::config::Config;
use autopilot_common::retry::{RetryExecutor, RetryStrategy};
use autopilot_common::{ComponentHealth, DecisionOutcome, Error, HealthLevel, HealthStatus, Result};
use autopilot_detector::AnomalyDetector;
use autopilot_executor::{ActionExecutor, AutonomousExecutor, DecisionContext};
use autopilot_knowledge::KnowledgeBase;
use autopilot_learning::LearningEngine;
use autopilot_repeat::RepeatEliminator;
use autopilot_risk::DeploymentRiskAnalyzer;
use autopilot_store::KeyValueStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

pub struct Orchestrator {
    pub store: Arc<dyn KeyValueStore>,
    pub detector: Arc<dyn AnomalyDetector>,
    pub knowledge: Arc<dyn KnowledgeBase>,
    pub learning: Arc<dyn LearningEngine>,
    pub analyzer: Arc<dyn IncidentAnalyzer>,
    pub action_executor: Arc<dyn ActionExecutor>,
    pub autonomous_executor: Arc<dyn AutonomousExecutor>,
    pub repeat_eliminator: Arc<dyn RepeatEliminator>,
    pub risk_analyzer: Arc<dyn DeploymentRiskAnalyzer>,
    pub decision_logger: Arc<dyn DecisionLogger>,
    pub config: Arc<Config>,
    /// Gates the autonomous (L3/L4) paths on C1 availability. `failure_threshold`/`timeout` are
    /// tuned against the L3 cadence so the breaker opens once the store has been failing its
    /// health check continuously for roughly the §7 "unavailable for > 30s" escalation window.
    store_breaker: CircuitBreaker,
    start_time: std::time::Instant,
}

impl Orchestrator {
    pub async fn build(config: Arc<Config>) -> Result<Arc<Self>> {
        let store = autopilot_store::create_store(config.clone()).await?;
        let detector = autopilot_detector::create_detector(store.clone(), config.detector.clone()).await?;
        let knowledge = autopilot_knowledge::create_knowledge_base(store.clone(), config.knowledge.clone()).await?;
        let learning = autopilot_learning::create_learning_engine(store.clone(), config.learning.clone()).await?;
        let analyzer = autopilot_analyzer::create_analyzer(store.clone(), knowledge.clone(), learning.clone(), config.analyzer.clone()).await?;

        let providers = autopilot_executor::default_providers();
        let action_executor = autopilot_executor::create_action_executor(store.clone(), providers, config.executor.clone()).await?;
        let autonomous_executor = autopilot_executor::create_autonomous_executor(
            store.clone(),
            action_executor.clone(),
            detector.clone(),
            learning.clone(),
            config.executor.clone(),
        )
        .await?;

        let repeat_eliminator = autopilot_repeat::create_repeat_eliminator(store.clone(), action_executor.clone(), config.repeat.clone()).await?;
        let risk_analyzer = autopilot_risk::create_risk_analyzer(store.clone(), config.risk.clone()).await?;
        let decision_logger = autopilot_audit::create_decision_logger(store.clone(), config.audit.clone()).await?;

        info!("all pipeline components constructed");

        let l3_interval_secs = (config.runtime.anomaly_correlation_interval_ms.max(1) as f64 / 1000.0).max(0.1);
        let failure_threshold = (30.0 / l3_interval_secs).ceil().max(1.0) as u32;
        let store_breaker = CircuitBreaker::new(
            "store_availability".to_string(),
            CircuitBreakerConfig {
                failure_threshold,
                success_threshold: 2,
                timeout: Duration::from_secs(30),
                window_size: failure_threshold * 2,
                minimum_requests: 1,
            },
        );

        Ok(Arc::new(Self {
            store,
            detector,
            knowledge,
            learning,
            analyzer,
            action_executor,
            autonomous_executor,
            repeat_eliminator,
            risk_analyzer,
            decision_logger,
            config,
            store_breaker,
            start_time: std::time::Instant::now(),
        }))
    }

    pub async fn health_status(&self) -> Result<HealthStatus> {
        let checks: Vec<(&str, Result<ComponentHealth>)> = vec![
            ("store", self.store.health_check().await),
            ("detector", self.detector.health_check().await),
            ("knowledge", self.knowledge.health_check().await),
            ("learning", self.learning.health_check().await),
            ("analyzer", self.analyzer.health_check().await),
            ("executor", self.action_executor.health_check().await),
            ("autonomous_executor", self.autonomous_executor.health_check().await),
            ("repeat_eliminator", self.repeat_eliminator.health_check().await),
            ("risk_analyzer", self.risk_analyzer.health_check().await),
            ("decision_logger", self.decision_logger.health_check().await),
        ];

        let mut components = HashMap::new();
        for (name, result) in checks {
            let health = result.unwrap_or_else(|e| ComponentHealth::critical(format!("health check failed: {e}")));
            components.insert(name.to_string(), health);
        }

        let mut status = HealthStatus {
            overall_health: HealthLevel::Unknown,
            components,
            last_check: Utc::now(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        };
        status.calculate_overall_health();
        Ok(status)
    }

    /// Retry a `TransientStorage` failure once with short backoff (§7); any other error, or a
    /// second failure, is handed back to the caller to log and drop rather than block the loop.
    async fn rpop_resilient(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.store.rpop(key).await {
            Ok(v) => Ok(v),
            Err(e @ Error::TransientStorage(_)) => {
                let store = self.store.clone();
                let owned_key = key.to_string();
                let executor = RetryExecutor::new(RetryStrategy::for_error(&e), format!("rpop:{key}"));
                executor
                    .execute(move || {
                        let store = store.clone();
                        let owned_key = owned_key.clone();
                        Box::pin(async move { store.rpop(&owned_key).await })
                    })
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// L1: drain the metric ingestion queue, feeding each sample to the detector.
    async fn metric_poll_tick(&self) -> Result<()> {
        loop {
            let bytes = match self.rpop_resilient(METRIC_QUEUE_KEY).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                Err(e) => {
                    warn!("metric queue unavailable after retry, deferring to next tick: {e}");
                    break;
                }
            };
            let sample: IngestedMetric = match serde_json::from_slice(&bytes) {
                Ok(s) => s,
                Err(e) => {
                    warn!("dropping malformed metric sample: {e}");
                    continue;
                }
            };
            if let Some(anomaly) = self.detector.detect(&sample.service, &sample.metric, sample.value).await? {
                debug!(service = %anomaly.service, metric = %anomaly.metric, z = anomaly.z_score, "anomaly detected");
            }
        }
        Ok(())
    }

    /// L2: drain the log ingestion queue, feeding error-rate counters and the per-service
    /// recent-log ring buffer the correlator reads from.
    async fn log_poll_tick(&self) -> Result<()> {
        loop {
            let bytes = match self.rpop_resilient(LOG_QUEUE_KEY).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                Err(e) => {
                    warn!("log queue unavailable after retry, deferring to next tick: {e}");
                    break;
                }
            };
            let entry: IngestedLog = match serde_json::from_slice(&bytes) {
                Ok(e) => e,
                Err(e) => {
                    warn!("dropping malformed log entry: {e}");
                    continue;
                }
            };

            let counts_key = format!("log_counts:{}", entry.service);
            let total = self.store.hincr_by(&counts_key, "total", 1).await?;

            if entry.is_error {
                let errors = self.store.hincr_by(&counts_key, "errors", 1).await?;
                if let Some(anomaly) = self.detector.detect_error_rate_spike(&entry.service, errors.max(0) as u64, total.max(1) as u64).await? {
                    debug!(service = %anomaly.service, "error-rate spike detected");
                }
            }

            let logs_key = format!("recent_logs:{}", entry.service);
            self.store.lpush(&logs_key, entry.message.clone().into_bytes()).await?;
            self.store.ltrim(&logs_key, 0, 19).await?;
        }
        Ok(())
    }

    /// §7: record this tick's C1 reachability against `store_breaker`, pausing the autonomous
    /// (L3/L4) paths once the store has been unhealthy for roughly 30s straight.
    async fn autonomous_path_allowed(&self) -> bool {
        let healthy = self.store.health_check().await.is_ok();
        self.store_breaker.record_call_result(healthy).await;
        let allowed = self.store_breaker.should_allow_call().await;
        if !allowed {
            warn!("store_availability circuit open, pausing autonomous decision-making until C1 recovers");
        }
        allowed
    }

    /// L3: for each service with a fresh anomaly cluster, compose an incident, decide on its
    /// top candidate actions, and feed the outcome back into C4/C8.
    async fn anomaly_correlation_tick(&self) -> Result<()> {
        if !self.autonomous_path_allowed().await {
            return Ok(());
        }

        let keys = self.store.keys("recent_anomalies:").await?;
        for key in keys {
            let Some(service) = key.strip_prefix("recent_anomalies:") else { continue };

            let cooldown_key = format!("last_incident_at:{service}");
            if self.store.get(&cooldown_key).await?.is_some() {
                continue;
            }

            let anomalies = self.detector.recent_anomalies(service).await?;
            if anomalies.len() < self.config.correlation.anomaly_trigger_count {
                continue;
            }

            let logs_raw = self.store.lrange(&format!("recent_logs:{service}"), 0, 19).await?;
            let logs = logs_raw.into_iter().map(|b| String::from_utf8_lossy(&b).to_string()).collect();

            let ctx = AnalysisContext { service: service.to_string(), anomalies, logs, ..Default::default() };
            let incident = match self.analyzer.analyze(ctx).await {
                Ok(incident) => incident,
                Err(e) => {
                    error!(service, "incident analysis failed: {e}");
                    continue;
                }
            };

            self.store
                .set_ex(&cooldown_key, Duration::from_secs(self.config.correlation.incident_cooldown_seconds), Vec::new())
                .await?;

            info!(
                incident_id = %incident.incident_id,
                service = %incident.service,
                category = %incident.category,
                "incident composed"
            );

            self.decide_and_execute(&incident).await?;
        }
        Ok(())
    }

    async fn decide_and_execute(&self, incident: &autopilot_common::Incident) -> Result<()> {
        let ctx = DecisionContext::default();
        let mut action_types_taken = Vec::new();
        let mut any_succeeded = false;

        for candidate in incident.recommended_actions.iter().take(self.config.analyzer.top_actions) {
            let log = self.autonomous_executor.decide(incident, candidate, None, &ctx).await?;
            let outcome = log.outcome;
            self.decision_logger.log_decision(log).await?;

            if outcome == Some(DecisionOutcome::Success) || outcome == Some(DecisionOutcome::Failure) {
                action_types_taken.push(candidate.action_type.clone());
                any_succeeded = any_succeeded || outcome == Some(DecisionOutcome::Success);
            }
        }

        if !action_types_taken.is_empty() {
            let (_, _, should_prevent) = self.repeat_eliminator.record_occurrence(incident, &action_types_taken, any_succeeded).await?;
            if should_prevent {
                match self.repeat_eliminator.apply_preventive(incident).await {
                    Ok(outcome) => info!(applied = outcome.applied, pattern_id = %outcome.pattern_id, "preventive measure evaluated"),
                    Err(e) => warn!("preventive application failed: {e}"),
                }
            }
        }

        Ok(())
    }

    /// L4: drain `actions:approved`, executing whatever a human (or the autonomous path, though
    /// that executes inline) has approved but not yet run.
    async fn approved_action_drain_tick(&self) -> Result<()> {
        if !self.store_breaker.should_allow_call().await {
            warn!("store_availability circuit open, deferring approved-action drain");
            return Ok(());
        }

        while let Some(bytes) = self.store.rpop("actions:approved").await? {
            let id = String::from_utf8_lossy(&bytes).to_string();
            match self.action_executor.execute(&id).await {
                Ok(action) => info!(action_id = %action.id, status = ?action.status, "drained approved action"),
                Err(e) => error!(action_id = %id, "failed to execute approved action: {e}"),
            }
        }
        Ok(())
    }
}

/// Holds every loop's `JoinHandle`; aborts them all on drop or explicit shutdown.
pub struct Runtime {
    handles: Vec<JoinHandle<()>>,
    shutdown_deadline: Duration,
}

impl Runtime {
    pub fn spawn(orchestrator: Arc<Orchestrator>) -> Self {
        let shutdown_deadline = Duration::from_secs(orchestrator.config.runtime.shutdown_deadline_seconds);

        let handles = vec![
            spawn_loop("metric_poller", Duration::from_millis(orchestrator.config.runtime.metrics_poll_interval_ms), {
                let o = orchestrator.clone();
                move || {
                    let o = o.clone();
                    async move { o.metric_poll_tick().await }
                }
            }),
            spawn_loop("log_poller", Duration::from_millis(orchestrator.config.runtime.logs_poll_interval_ms), {
                let o = orchestrator.clone();
                move || {
                    let o = o.clone();
                    async move { o.log_poll_tick().await }
                }
            }),
            spawn_loop(
                "anomaly_correlator",
                Duration::from_millis(orchestrator.config.runtime.anomaly_correlation_interval_ms),
                {
                    let o = orchestrator.clone();
                    move || {
                        let o = o.clone();
                        async move { o.anomaly_correlation_tick().await }
                    }
                },
            ),
            spawn_loop(
                "approved_action_drainer",
                Duration::from_millis(orchestrator.config.runtime.approved_action_drain_interval_ms),
                {
                    let o = orchestrator.clone();
                    move || {
                        let o = o.clone();
                        async move { o.approved_action_drain_tick().await }
                    }
                },
            ),
        ];

        Self { handles, shutdown_deadline }
    }

    /// Abort every loop and wait up to the configured deadline for them to settle.
    pub async fn shutdown(self) {
        info!("shutting down pipeline loops");
        for handle in &self.handles {
            handle.abort();
        }
        let _ = tokio::time::timeout(self.shutdown_deadline, futures_join_all(self.handles)).await;
        info!("pipeline loops shut down");
    }
}

async fn futures_join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

fn spawn_loop<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = tick().await {
                error!(loop_name = name, "error in loop: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::IngestedMetric;

    async fn build() -> Arc<Orchestrator> {
        Orchestrator::build(Arc::new(Config::default())).await.expect("orchestrator builds against the in-memory store")
    }

    #[tokio::test]
    async fn builds_and_reports_healthy_with_memory_backend() {
        let orchestrator = build().await;
        let health = orchestrator.health_status().await.unwrap();
        assert_eq!(health.overall_health, HealthLevel::Healthy);
        assert_eq!(health.components.len(), 10);
    }

    #[tokio::test]
    async fn metric_poll_tick_drains_queue_and_feeds_detector() {
        let orchestrator = build().await;
        let sample = IngestedMetric { service: "checkout".to_string(), metric: "latency_ms".to_string(), value: 42.0 };
        orchestrator.store.lpush(METRIC_QUEUE_KEY, serde_json::to_vec(&sample).unwrap()).await.unwrap();

        orchestrator.metric_poll_tick().await.unwrap();

        assert!(orchestrator.store.rpop(METRIC_QUEUE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn log_poll_tick_tracks_counts_and_recent_log_ring_buffer() {
        let orchestrator = build().await;
        let entry = IngestedLog { service: "checkout".to_string(), message: "panic: out of memory".to_string(), is_error: true };
        orchestrator.store.lpush(LOG_QUEUE_KEY, serde_json::to_vec(&entry).unwrap()).await.unwrap();

        orchestrator.log_poll_tick().await.unwrap();

        let logs = orchestrator.store.lrange("recent_logs:checkout", 0, 19).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(String::from_utf8_lossy(&logs[0]), "panic: out of memory");
    }

    #[tokio::test]
    async fn approved_action_drain_tick_empties_the_approved_queue() {
        let orchestrator = build().await;
        orchestrator.approved_action_drain_tick().await.unwrap();
        assert!(orchestrator.store.rpop("actions:approved").await.unwrap().is_none());
    }
}
