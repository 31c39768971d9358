//! Configuration for the ops autopilot incident-response pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration, constructed once and shared read-only across components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub detector: DetectorConfig,
    pub knowledge: KnowledgeConfig,
    pub learning: LearningConfig,
    pub analyzer: AnalyzerConfig,
    pub executor: ExecutorConfig,
    pub repeat: RepeatConfig,
    pub risk: RiskConfig,
    pub audit: AuditConfig,
    pub correlation: CorrelationConfig,
    pub runtime: RuntimeConfig,
}

/// Backend selection for the C1 KeyValueStore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreBackend {
    Memory,
    Sled { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

/// AnomalyDetector thresholds (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub warmup_samples: u32,
    pub z_score_threshold: f64,
    pub baseline_window: usize,
    pub baseline_ttl_days: u32,
    pub recent_anomalies_cap: usize,
    pub recent_anomalies_ttl_hours: u32,
    pub error_rate_spike_multiplier: f64,
    pub error_rate_spike_floor: f64,
    pub error_rate_critical_threshold: f64,
    pub deployment_correlation_window_minutes: i64,
    pub deployment_correlation_high_confidence_minutes: i64,
}

/// KnowledgeBase match-scoring knobs (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    pub signal_match_bonus: f64,
    pub min_confidence: f64,
}

/// LearningEngine confidence-adjustment knobs (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    pub ema_alpha: f64,
    pub positive_cap: f64,
    pub negative_floor: f64,
    pub promotion_min_matches: u32,
    pub promotion_min_success_rate: f64,
    pub promotion_min_autonomous_success_rate: f64,
    pub demotion_min_failures: u32,
    pub demotion_min_failure_rate: f64,
    pub adjusted_confidence_blend_threshold: u32,
}

/// IncidentAnalyzer composition knobs (§4.4-4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub top_actions: usize,
    pub default_resolution_seconds: f64,
    pub incident_ttl_days: u32,
    pub incidents_by_key_cap: usize,
    pub ai_analyzer_timeout_ms: u64,
}

/// AutonomousExecutor gating and scoring knobs (§4.6-4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub mode: crate::types::Mode,
    pub confidence_threshold: f64,
    pub max_concurrent_actions: u32,
    pub cooldown_seconds: i64,
    pub rule_weight: f64,
    pub ai_weight: f64,
    pub history_weight: f64,
    pub weight_epsilon: f64,
    pub weight_adaptation_step: f64,
    pub reinforce_confidence_threshold: f64,
    pub penalize_confidence_threshold: f64,
    pub action_ttl_hours: u32,
    pub dry_run: bool,
}

/// RepeatEliminator knobs (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatConfig {
    pub repeat_pattern_ttl_days: u32,
    pub prevention_occurrence_threshold: u32,
    pub escalation_occurrence_threshold: u32,
    pub permanent_fixes_global_cap: usize,
    pub permanent_fixes_per_service_cap: usize,
}

/// DeploymentRiskAnalyzer factor weights (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub weight_historical: f64,
    pub weight_criticality: f64,
    pub weight_current_health: f64,
    pub weight_change_magnitude: f64,
    pub weight_timing: f64,
    pub weight_dependencies: f64,
    pub weight_recent: f64,
    pub assessment_ttl_days: u32,
    pub default_rollback_threshold_pct: f64,
}

/// DecisionLogger retention (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub decision_log_ttl_days: u32,
    pub per_service_cap: usize,
    pub timeline_cap: usize,
}

/// L3 anomaly-correlator tuning: how many recent anomalies make a "cluster", and how long to
/// wait before composing another incident for the same service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    pub anomaly_trigger_count: usize,
    pub incident_cooldown_seconds: u64,
}

/// Process-level knobs: loop cadence, shutdown deadline, logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub metrics_poll_interval_ms: u64,
    pub logs_poll_interval_ms: u64,
    pub anomaly_correlation_interval_ms: u64,
    pub approved_action_drain_interval_ms: u64,
    pub shutdown_deadline_seconds: u64,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                backend: StoreBackend::Memory,
            },
            detector: DetectorConfig {
                warmup_samples: 10,
                z_score_threshold: 2.5,
                baseline_window: 1000,
                baseline_ttl_days: 7,
                recent_anomalies_cap: 100,
                recent_anomalies_ttl_hours: 24,
                error_rate_spike_multiplier: 3.0,
                error_rate_spike_floor: 1.0,
                error_rate_critical_threshold: 5.0,
                deployment_correlation_window_minutes: 30,
                deployment_correlation_high_confidence_minutes: 10,
            },
            knowledge: KnowledgeConfig {
                signal_match_bonus: 0.5,
                min_confidence: 50.0,
            },
            learning: LearningConfig {
                ema_alpha: 0.3,
                positive_cap: 5.0,
                negative_floor: -10.0,
                promotion_min_matches: 10,
                promotion_min_success_rate: 0.90,
                promotion_min_autonomous_success_rate: 0.95,
                demotion_min_failures: 3,
                demotion_min_failure_rate: 0.30,
                adjusted_confidence_blend_threshold: 5,
            },
            analyzer: AnalyzerConfig {
                top_actions: 5,
                default_resolution_seconds: 300.0,
                incident_ttl_days: 30,
                incidents_by_key_cap: 100,
                ai_analyzer_timeout_ms: 10_000,
            },
            executor: ExecutorConfig {
                mode: crate::types::Mode::Supervised,
                confidence_threshold: 75.0,
                max_concurrent_actions: 3,
                cooldown_seconds: 300,
                rule_weight: 0.40,
                ai_weight: 0.40,
                history_weight: 0.20,
                weight_epsilon: 1e-3,
                weight_adaptation_step: 0.02,
                reinforce_confidence_threshold: 90.0,
                penalize_confidence_threshold: 75.0,
                action_ttl_hours: 24,
                dry_run: true,
            },
            repeat: RepeatConfig {
                repeat_pattern_ttl_days: 90,
                prevention_occurrence_threshold: 3,
                escalation_occurrence_threshold: 5,
                permanent_fixes_global_cap: 1000,
                permanent_fixes_per_service_cap: 100,
            },
            risk: RiskConfig {
                weight_historical: 0.25,
                weight_criticality: 0.20,
                weight_current_health: 0.15,
                weight_change_magnitude: 0.15,
                weight_timing: 0.10,
                weight_dependencies: 0.10,
                weight_recent: 0.05,
                assessment_ttl_days: 7,
                default_rollback_threshold_pct: 70.0,
            },
            audit: AuditConfig {
                decision_log_ttl_days: 30,
                per_service_cap: 100,
                timeline_cap: 1000,
            },
            correlation: CorrelationConfig {
                anomaly_trigger_count: 2,
                incident_cooldown_seconds: 300,
            },
            runtime: RuntimeConfig {
                metrics_poll_interval_ms: 5_000,
                logs_poll_interval_ms: 5_000,
                anomaly_correlation_interval_ms: 2_000,
                approved_action_drain_interval_ms: 1_000,
                shutdown_deadline_seconds: 30,
                log_filter: "info".to_string(),
            },
        }
    }
}
