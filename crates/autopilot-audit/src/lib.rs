//! C10: persists `DecisionLog`s produced by the autonomous executor for audit, review, and
//! learning, and records their outcomes once execution results are known.
//!
//! Grounded on `original_source/src/analytics/decision_logger.py`'s `DecisionLogger` - the
//! triple-write pattern (by-id, per-service list, global timeline) and the aggregate stats
//! query are carried over directly; the human-readable rendering is dropped in favor of
//! `tracing`'s structured logging, matching how the rest of this workspace reports decisions.

use async_trait::async_trait;
use autopilot_common::config::AuditConfig;
use autopilot_common::{ComponentHealth, Decision, DecisionLog, DecisionOutcome, Error, Result};
use autopilot_store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Aggregate statistics over a window of recent decisions, mirroring
/// `DecisionLogger.get_decision_stats` from the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionStats {
    pub total: usize,
    pub approved: usize,
    pub denied: usize,
    pub deferred: usize,
    pub approval_rate: f64,
    pub average_confidence: f64,
    pub by_action_type: HashMap<String, ActionTypeStats>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActionTypeStats {
    pub total: usize,
    pub approved: usize,
}

#[async_trait]
pub trait DecisionLogger: Send + Sync {
    async fn log_decision(&self, log: DecisionLog) -> Result<()>;
    async fn record_outcome(&self, decision_id: &str, outcome: DecisionOutcome) -> Result<()>;
    async fn get_decision(&self, decision_id: &str) -> Result<Option<DecisionLog>>;
    async fn recent_decisions(&self, service: Option<&str>, limit: usize) -> Result<Vec<DecisionLog>>;
    async fn decision_stats(&self, service: Option<&str>) -> Result<DecisionStats>;
    async fn health_check(&self) -> Result<ComponentHealth>;
}

pub struct StandardDecisionLogger {
    store: Arc<dyn KeyValueStore>,
    config: AuditConfig,
}

impl StandardDecisionLogger {
    pub fn new(store: Arc<dyn KeyValueStore>, config: AuditConfig) -> Self {
        Self { store, config }
    }

    fn by_id_key(decision_id: &str) -> String {
        format!("decision_log:{decision_id}")
    }

    fn service_key(service: &str) -> String {
        format!("decision_logs:{service}")
    }

    const TIMELINE_KEY: &'static str = "decision_logs:timeline";
}

#[async_trait]
impl DecisionLogger for StandardDecisionLogger {
    async fn log_decision(&self, log: DecisionLog) -> Result<()> {
        let bytes = serde_json::to_vec(&log)?;

        self.store.lpush(&Self::service_key(&log.service), bytes.clone()).await?;
        self.store.ltrim(&Self::service_key(&log.service), 0, self.config.per_service_cap as i64 - 1).await?;

        self.store.lpush(Self::TIMELINE_KEY, bytes.clone()).await?;
        self.store.ltrim(Self::TIMELINE_KEY, 0, self.config.timeline_cap as i64 - 1).await?;

        self.store
            .set(
                &Self::by_id_key(&log.decision_id),
                bytes,
                Some(Duration::from_secs(self.config.decision_log_ttl_days as u64 * 86_400)),
            )
            .await?;

        info!(
            decision_id = %log.decision_id,
            service = %log.service,
            decision = ?log.decision,
            confidence = log.final_confidence,
            "decision logged"
        );
        Ok(())
    }

    async fn record_outcome(&self, decision_id: &str, outcome: DecisionOutcome) -> Result<()> {
        let key = Self::by_id_key(decision_id);
        let Some(bytes) = self.store.get(&key).await? else {
            return Err(Error::InvalidState(format!("no decision log found for {decision_id}")));
        };
        let mut log: DecisionLog = serde_json::from_slice(&bytes).map_err(Error::MalformedInput)?;
        log.outcome = Some(outcome);

        let bytes = serde_json::to_vec(&log)?;
        self.store
            .set(&key, bytes, Some(Duration::from_secs(self.config.decision_log_ttl_days as u64 * 86_400)))
            .await?;

        info!(decision_id, outcome = ?log.outcome, "decision outcome recorded");
        Ok(())
    }

    async fn get_decision(&self, decision_id: &str) -> Result<Option<DecisionLog>> {
        let Some(bytes) = self.store.get(&Self::by_id_key(decision_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes).map_err(Error::MalformedInput)?))
    }

    async fn recent_decisions(&self, service: Option<&str>, limit: usize) -> Result<Vec<DecisionLog>> {
        let key = match service {
            Some(service) => Self::service_key(service),
            None => Self::TIMELINE_KEY.to_string(),
        };
        let raw = self.store.lrange(&key, 0, limit as i64 - 1).await?;
        raw.iter().map(|b| serde_json::from_slice(b).map_err(Error::MalformedInput)).collect()
    }

    async fn decision_stats(&self, service: Option<&str>) -> Result<DecisionStats> {
        let decisions = self.recent_decisions(service, 100).await?;
        if decisions.is_empty() {
            return Ok(DecisionStats {
                total: 0,
                approved: 0,
                denied: 0,
                deferred: 0,
                approval_rate: 0.0,
                average_confidence: 0.0,
                by_action_type: HashMap::new(),
            });
        }

        let total = decisions.len();
        let approved = decisions.iter().filter(|d| d.decision == Decision::Approved).count();
        let denied = decisions.iter().filter(|d| d.decision == Decision::Denied).count();
        let deferred = decisions.iter().filter(|d| d.decision == Decision::Deferred).count();
        let average_confidence = decisions.iter().map(|d| d.final_confidence).sum::<f64>() / total as f64;

        let mut by_action_type: HashMap<String, ActionTypeStats> = HashMap::new();
        for d in &decisions {
            let entry = by_action_type.entry(d.action_type.clone()).or_default();
            entry.total += 1;
            if d.decision == Decision::Approved {
                entry.approved += 1;
            }
        }

        Ok(DecisionStats {
            total,
            approved,
            denied,
            deferred,
            approval_rate: approved as f64 / total as f64,
            average_confidence,
            by_action_type,
        })
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        self.store.health_check().await
    }
}

pub async fn create_decision_logger(store: Arc<dyn KeyValueStore>, config: AuditConfig) -> Result<Arc<dyn DecisionLogger + Send + Sync>> {
    Ok(Arc::new(StandardDecisionLogger::new(store, config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_common::Contribution;
    use autopilot_store::MemoryStore;
    use chrono::Utc;

    fn sample_log(service: &str, decision: Decision, confidence: f64) -> DecisionLog {
        DecisionLog {
            decision_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            incident_id: "inc-1".to_string(),
            service: service.to_string(),
            action_type: "restart_pod".to_string(),
            decision,
            final_confidence: confidence,
            threshold: 75.0,
            reasoning_summary: "test".to_string(),
            contributions: vec![Contribution {
                source: "rule".to_string(),
                value: confidence,
                weight: 1.0,
                weighted: confidence,
                reasoning: "test".to_string(),
                factors: vec![],
            }],
            factors_for: vec![],
            factors_against: vec![],
            safety_checks: vec![],
            matched_pattern: None,
            execution_mode: "Supervised".to_string(),
            outcome: None,
        }
    }

    fn config() -> AuditConfig {
        autopilot_common::Config::default().audit
    }

    #[tokio::test]
    async fn logs_and_retrieves_by_id() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let logger = StandardDecisionLogger::new(store, config());
        let log = sample_log("checkout", Decision::Approved, 90.0);
        let id = log.decision_id.clone();

        logger.log_decision(log).await.unwrap();
        let fetched = logger.get_decision(&id).await.unwrap().unwrap();
        assert_eq!(fetched.service, "checkout");
        assert_eq!(fetched.decision, Decision::Approved);
    }

    #[tokio::test]
    async fn record_outcome_updates_stored_log() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let logger = StandardDecisionLogger::new(store, config());
        let log = sample_log("checkout", Decision::Approved, 90.0);
        let id = log.decision_id.clone();

        logger.log_decision(log).await.unwrap();
        logger.record_outcome(&id, DecisionOutcome::Success).await.unwrap();

        let fetched = logger.get_decision(&id).await.unwrap().unwrap();
        assert_eq!(fetched.outcome, Some(DecisionOutcome::Success));
    }

    #[tokio::test]
    async fn record_outcome_fails_for_unknown_decision() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let logger = StandardDecisionLogger::new(store, config());
        let result = logger.record_outcome("missing", DecisionOutcome::Success).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn decision_stats_aggregates_by_service_and_action() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let logger = StandardDecisionLogger::new(store, config());

        logger.log_decision(sample_log("checkout", Decision::Approved, 90.0)).await.unwrap();
        logger.log_decision(sample_log("checkout", Decision::Denied, 40.0)).await.unwrap();
        logger.log_decision(sample_log("checkout", Decision::Approved, 80.0)).await.unwrap();

        let stats = logger.decision_stats(Some("checkout")).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.approved, 2);
        assert_eq!(stats.denied, 1);
        assert!((stats.approval_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.by_action_type["restart_pod"].total, 3);
    }

    #[tokio::test]
    async fn recent_decisions_respects_timeline_vs_service_scope() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let logger = StandardDecisionLogger::new(store, config());

        logger.log_decision(sample_log("checkout", Decision::Approved, 90.0)).await.unwrap();
        logger.log_decision(sample_log("inventory", Decision::Approved, 90.0)).await.unwrap();

        assert_eq!(logger.recent_decisions(Some("checkout"), 10).await.unwrap().len(), 1);
        assert_eq!(logger.recent_decisions(None, 10).await.unwrap().len(), 2);
    }
}
