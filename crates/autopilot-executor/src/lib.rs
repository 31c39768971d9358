//! C6 + C7: the Action state machine, its provider dispatch, and the safety-railed autonomous
//! decision loop built on top of it.

pub mod action;
pub mod autonomous;
pub mod provider;

pub use action::{create_action_executor, ActionExecutor, StandardActionExecutor};
pub use autonomous::{create_autonomous_executor, AutonomousExecutor, DecisionContext, StandardAutonomousExecutor};
pub use provider::{default_providers, ActionProvider, GenericProvider, ProviderResult};

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_analyzer::{AiAnalysis, AiRecommendedAction};
    use autopilot_common::{BlastRadius, Incident, ScoredAction, Severity};
    use autopilot_detector::StandardAnomalyDetector;
    use autopilot_learning::StandardLearningEngine;
    use autopilot_store::{KeyValueStore, MemoryStore};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn incident(service: &str, blast_radius: BlastRadius) -> Incident {
        Incident {
            incident_id: "inc-1".to_string(),
            fingerprint: "abc123abc123abc123abc123".to_string(),
            service: service.to_string(),
            category: "kubernetes".to_string(),
            subcategory: "pod_crash".to_string(),
            severity: Severity::Critical,
            symptoms: vec!["High memory_usage_percent: 97.00 (threshold: 40.00)".to_string()],
            signals: vec!["oomkilled".to_string()],
            matched_patterns: vec![],
            best_pattern_id: Some("k8s_oom_killed_001".to_string()),
            pattern_confidence: 90.0,
            root_cause: "Pod OOMKilled".to_string(),
            root_cause_confidence: 90.0,
            contributing_factors: vec![],
            similar_incident_count: 0,
            historical_success_rate: 0.0,
            avg_resolution_seconds: 120.0,
            recommended_actions: vec![],
            autonomous_safe: true,
            autonomous_reason: "pattern promoted".to_string(),
            blast_radius,
            affected_services: vec![service.to_string()],
            predicted_resolution_seconds: 120.0,
            recurrence_probability: 0.2,
            timestamp: Utc::now(),
        }
    }

    fn candidate(action_type: &str, confidence: f64) -> ScoredAction {
        ScoredAction {
            action_type: action_type.to_string(),
            action_category: "kubernetes".to_string(),
            confidence,
            params: HashMap::new(),
            requires_approval: false,
        }
    }

    async fn build_autonomous(store: Arc<dyn KeyValueStore>) -> Arc<dyn AutonomousExecutor + Send + Sync> {
        let mut executor_config = autopilot_common::Config::default().executor;
        executor_config.mode = autopilot_common::Mode::Autonomous;
        let action_executor = create_action_executor(store.clone(), default_providers(), executor_config.clone()).await.unwrap();
        let detector: Arc<dyn autopilot_detector::AnomalyDetector> =
            Arc::new(StandardAnomalyDetector::new(store.clone(), autopilot_common::Config::default().detector));
        let learning: Arc<dyn autopilot_learning::LearningEngine> =
            Arc::new(StandardLearningEngine::new(store.clone(), autopilot_common::Config::default().learning));
        create_autonomous_executor(store, action_executor, detector, learning, executor_config).await.unwrap()
    }

    #[tokio::test]
    async fn approves_and_executes_high_confidence_low_risk_action() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let executor = build_autonomous(store).await;

        let incident = incident("api", BlastRadius::Low);
        let candidate = candidate("restart_pod", 95.0);
        let ai = AiAnalysis {
            root_cause_description: "OOM".to_string(),
            root_cause_confidence: 90.0,
            contributing_factors: vec![],
            recommended_actions: vec![AiRecommendedAction { action_type: "restart_pod".to_string(), priority: 1 }],
            preventive_measures: vec![],
        };

        let log = executor.decide(&incident, &candidate, Some(&ai), &DecisionContext::default()).await.unwrap();
        assert_eq!(log.decision, autopilot_common::Decision::Approved);
        assert_eq!(log.outcome, Some(autopilot_common::DecisionOutcome::Success));
    }

    #[tokio::test]
    async fn denies_on_low_ai_and_rule_confidence() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let executor = build_autonomous(store).await;

        let incident = incident("widget", BlastRadius::Low);
        let candidate = candidate("some_unknown_action", 40.0);

        let log = executor.decide(&incident, &candidate, None, &DecisionContext::default()).await.unwrap();
        assert_eq!(log.decision, autopilot_common::Decision::Denied);
        assert_eq!(log.outcome, Some(autopilot_common::DecisionOutcome::Pending));
    }

    #[tokio::test]
    async fn manual_mode_always_defers() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut executor_config = autopilot_common::Config::default().executor;
        executor_config.mode = autopilot_common::Mode::Manual;
        let action_executor = create_action_executor(store.clone(), default_providers(), executor_config.clone()).await.unwrap();
        let detector: Arc<dyn autopilot_detector::AnomalyDetector> =
            Arc::new(StandardAnomalyDetector::new(store.clone(), autopilot_common::Config::default().detector));
        let learning: Arc<dyn autopilot_learning::LearningEngine> =
            Arc::new(StandardLearningEngine::new(store.clone(), autopilot_common::Config::default().learning));
        let executor = create_autonomous_executor(store, action_executor, detector, learning, executor_config).await.unwrap();

        let incident = incident("api", BlastRadius::Low);
        let candidate = candidate("restart_pod", 99.0);
        let log = executor.decide(&incident, &candidate, None, &DecisionContext::default()).await.unwrap();
        assert_eq!(log.decision, autopilot_common::Decision::Deferred);
    }

    #[tokio::test]
    async fn concurrency_cap_vetoes_when_exceeded() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        for i in 0..3 {
            store.lpush("autonomous:active_actions", format!("action-{i}").into_bytes()).await.unwrap();
        }
        let executor = build_autonomous(store).await;

        let incident = incident("api", BlastRadius::Low);
        let candidate = candidate("restart_pod", 99.0);
        let log = executor.decide(&incident, &candidate, None, &DecisionContext::default()).await.unwrap();
        assert_eq!(log.decision, autopilot_common::Decision::Denied);
        assert!(log.factors_against.iter().any(|f| f.contains("already active")));
    }
}
