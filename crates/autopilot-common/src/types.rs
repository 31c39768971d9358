//! Shared data model (§3 of the design) for the incident-response pipeline.
//!
//! Everything here is a plain value type; the components that own mutation (AnomalyDetector
//! for Baselines, LearningEngine for PatternStats, AutonomousExecutor for the Action lifecycle)
//! live in their own crates and import these shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Severity ordered low to critical; `Ord` gives the "max severity across anomalies" rule (§4.4)
/// a natural `.max()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_z_score(z: f64) -> Self {
        if z > 4.0 {
            Severity::Critical
        } else if z > 3.0 {
            Severity::High
        } else if z > 2.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Rolling per-(service, metric) baseline. Mutated exclusively by the AnomalyDetector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub service: String,
    pub metric: String,
    pub mean: f64,
    pub stddev: f64,
    pub count: u32,
    /// Bounded to the last 1000 values (§3 invariant).
    pub values: Vec<f64>,
    pub updated_at: DateTime<Utc>,
}

impl Baseline {
    pub fn new(service: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            metric: metric.into(),
            mean: 0.0,
            stddev: 0.0,
            count: 0,
            values: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// A sample that exceeded the rolling z-score threshold for its (service, metric) baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub service: String,
    pub metric: String,
    pub value: f64,
    pub mean: f64,
    pub stddev: f64,
    pub z_score: f64,
    pub deviation_pct: f64,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
}

impl Anomaly {
    /// Lowercased text representation, used by symptom/signal matching (§4.2).
    pub fn as_text(&self) -> String {
        format!(
            "{} {} value={:.2} mean={:.2} severity={}",
            self.service, self.metric, self.value, self.mean, self.severity
        )
        .to_lowercase()
    }

    /// Strict `>` over the baseline mean; `value == mean` is defined as `Above` (§9 open
    /// question, resolved).
    pub fn direction(&self) -> Direction {
        if self.value < self.mean {
            Direction::Below
        } else {
            Direction::Above
        }
    }
}

/// Whether the anomalous value sits above or below its baseline (used for fingerprinting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    Above,
    Below,
}

/// A symptom kind a pattern can test for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymptomType {
    Metric,
    Event,
    Log,
    Status,
}

/// Comparison a metric symptom applies between the anomaly's value and the symptom's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    Above,
    Below,
    Equals,
    Contains,
    Matches,
}

/// A single testable condition within an `IncidentPattern`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symptom {
    pub symptom_type: SymptomType,
    pub name: String,
    pub condition: Condition,
    /// Threshold value. Kept as a string so both numeric and textual thresholds are
    /// representable; numeric comparisons parse both sides as `f64` when possible (§9).
    pub value: String,
    pub weight: f64,
}

impl Symptom {
    fn numeric_value(&self) -> Option<f64> {
        self.value.parse::<f64>().ok()
    }

    /// True iff this symptom matches against the given anomaly, using `condition`.
    pub fn matches_metric(&self, anomaly: &Anomaly) -> bool {
        if self.symptom_type != SymptomType::Metric || anomaly.metric != self.name {
            return false;
        }
        match self.condition {
            Condition::Above => self
                .numeric_value()
                .map(|t| anomaly.value > t)
                .unwrap_or(false),
            Condition::Below => self
                .numeric_value()
                .map(|t| anomaly.value < t)
                .unwrap_or(false),
            Condition::Equals => self
                .numeric_value()
                .map(|t| (anomaly.value - t).abs() < f64::EPSILON)
                .unwrap_or_else(|| anomaly.value.to_string() == self.value),
            Condition::Contains | Condition::Matches => {
                anomaly.as_text().contains(&self.value.to_lowercase())
            }
        }
    }

    /// True iff this symptom (event/log kind) matches against a lowercase text corpus.
    pub fn matches_text(&self, corpus: &str) -> bool {
        corpus.contains(&self.name.to_lowercase())
    }
}

/// A concrete remediation action a pattern recommends, before per-incident scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub action_type: String,
    pub action_category: String,
    pub base_confidence: f64,
    pub params: HashMap<String, serde_json::Value>,
    pub requires_approval: bool,
    pub estimated_resolution_seconds: u32,
    pub rollback_action: Option<String>,
}

/// Category of known failure pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternCategory {
    Kubernetes,
    Database,
    Cloud,
    Application,
    Cicd,
    Network,
    Security,
    Monitoring,
}

/// Estimated proportion of the service fleet an action or incident affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlastRadius {
    Low,
    Medium,
    High,
    Critical,
}

/// A named, catalogued failure mode. Loaded at startup, never mutated at runtime; the
/// `autonomous_safe` flag is additionally overlaid by LearningEngine promotion state when read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentPattern {
    pub pattern_id: String,
    pub name: String,
    pub category: PatternCategory,
    pub subcategory: String,
    pub severity: Severity,
    pub symptoms: Vec<Symptom>,
    pub signals: Vec<String>,
    pub root_causes: Vec<String>,
    pub actions: Vec<RecommendedAction>,
    pub autonomous_safe: bool,
    pub blast_radius: BlastRadius,
    pub avg_resolution_seconds: u32,
    pub tags: Vec<String>,
    pub related_patterns: Vec<String>,
}

/// Execution risk tier assigned to a proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Risk {
    Low,
    Medium,
    High,
}

/// Action lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Pending,
    Approved,
    Executing,
    Success,
    Failed,
    Cancelled,
}

impl ActionStatus {
    /// Terminal statuses are never overwritten (§8 invariant).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Success | ActionStatus::Failed | ActionStatus::Cancelled
        )
    }
}

/// A single remediation action moving through `pending -> approved -> executing -> terminal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub incident_id: String,
    pub action_type: String,
    pub service: String,
    pub params: HashMap<String, serde_json::Value>,
    pub reasoning: String,
    pub risk: Risk,
    pub status: ActionStatus,
    pub proposed_at: DateTime<Utc>,
    pub proposed_by: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Per-pattern outcome statistics. Mutated exclusively by the LearningEngine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternStats {
    pub pattern_id: String,
    pub total_matches: u32,
    pub successes: u32,
    pub failures: u32,
    pub avg_resolution_seconds: f64,
    pub confidence_adjustment: f64,
    pub is_promoted: bool,
    pub is_demoted: bool,
    pub per_action_rate: HashMap<String, f64>,
    pub last_matched_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Outcome ids already folded into these stats, for idempotent `RecordOutcome` (§8).
    pub seen_outcome_ids: Vec<String>,
    pub autonomous_attempts: u32,
    pub autonomous_successes: u32,
}

impl PatternStats {
    pub fn new(pattern_id: impl Into<String>) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            total_matches: 0,
            successes: 0,
            failures: 0,
            avg_resolution_seconds: 0.0,
            confidence_adjustment: 0.0,
            is_promoted: false,
            is_demoted: false,
            per_action_rate: HashMap::new(),
            last_matched_at: None,
            last_success_at: None,
            consecutive_failures: 0,
            seen_outcome_ids: Vec::new(),
            autonomous_attempts: 0,
            autonomous_successes: 0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_matches == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_matches as f64
        }
    }

    pub fn autonomous_success_rate(&self) -> f64 {
        if self.autonomous_attempts == 0 {
            1.0
        } else {
            self.autonomous_successes as f64 / self.autonomous_attempts as f64
        }
    }
}

/// A single recorded learning outcome, fed into the LearningEngine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningOutcome {
    pub outcome_id: String,
    pub incident_id: String,
    pub pattern_id: String,
    pub action_type: String,
    pub action_category: String,
    pub success: bool,
    pub confidence_at_execution: f64,
    pub execution_seconds: f64,
    pub pre_metrics: HashMap<String, f64>,
    pub post_metrics: HashMap<String, f64>,
    pub improvement_score: f64,
    pub timestamp: DateTime<Utc>,
    /// Whether this outcome resulted from an autonomous (unattended) execution, used by the
    /// promotion predicate's autonomous-success-rate clause.
    pub autonomous: bool,
}

/// A pattern match against a composed incident, with its normalized confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern_id: String,
    pub confidence: f64,
}

/// A recommended action ranked for a specific incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAction {
    pub action_type: String,
    pub action_category: String,
    pub confidence: f64,
    pub params: HashMap<String, serde_json::Value>,
    pub requires_approval: bool,
}

/// A composed incident: the output artifact of the IncidentAnalyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: String,
    pub fingerprint: String,
    pub service: String,
    pub category: String,
    pub subcategory: String,
    pub severity: Severity,
    pub symptoms: Vec<String>,
    pub signals: Vec<String>,
    pub matched_patterns: Vec<PatternMatch>,
    pub best_pattern_id: Option<String>,
    pub pattern_confidence: f64,
    pub root_cause: String,
    pub root_cause_confidence: f64,
    pub contributing_factors: Vec<String>,
    pub similar_incident_count: u32,
    pub historical_success_rate: f64,
    pub avg_resolution_seconds: f64,
    pub recommended_actions: Vec<ScoredAction>,
    pub autonomous_safe: bool,
    pub autonomous_reason: String,
    pub blast_radius: BlastRadius,
    pub affected_services: Vec<String>,
    pub predicted_resolution_seconds: f64,
    pub recurrence_probability: f64,
    pub timestamp: DateTime<Utc>,
}

/// A recurring incident fingerprint tracked by the RepeatEliminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatPattern {
    pub pattern_id: String,
    pub service: String,
    pub root_cause_hash: String,
    pub symptom_signature: String,
    pub occurrence_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub successful_fixes: Vec<String>,
    pub failed_fixes: Vec<String>,
    pub permanent_fix_applied: bool,
    pub permanent_fix_details: Option<String>,
    pub escalated: bool,
}

/// Criticality tier used by the DeploymentRiskAnalyzer to weight a service's importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
    Tier4,
}

/// One of the seven weighted risk factors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub score: f64,
    pub weight: f64,
    pub details: String,
    pub mitigations: Vec<String>,
}

/// Overall risk tier derived from a `DeploymentRiskAssessment`'s score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Minimal => "minimal",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Pre-deploy risk assessment for a single deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRiskAssessment {
    pub deployment_id: String,
    pub service: String,
    pub version: String,
    pub previous_version: Option<String>,
    pub overall_score: f64,
    pub risk_level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub should_proceed: bool,
    pub requires_approval: bool,
    pub auto_rollback_enabled: bool,
    pub rollback_threshold_minutes: u32,
    pub rollback_confidence: f64,
    pub recommendations: Vec<String>,
    pub assessed_at: DateTime<Utc>,
    pub historical_context: String,
}

/// A decision outcome label, recorded on a DecisionLog once the action resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionOutcome {
    Success,
    Failure,
    Pending,
}

/// A single weighted contribution to a confidence decision (rule/ai/history).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub source: String,
    pub value: f64,
    pub weight: f64,
    pub weighted: f64,
    pub reasoning: String,
    pub factors: Vec<String>,
}

/// The executor's approval/denial/deferral for a single proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Denied,
    Deferred,
}

/// Execution mode gating whether actions may run without human approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Manual,
    Supervised,
    Autonomous,
    NightMode { start_hour: u32, end_hour: u32 },
}

/// A structured, queryable audit trail entry for a single autonomous decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLog {
    pub decision_id: String,
    pub timestamp: DateTime<Utc>,
    pub incident_id: String,
    pub service: String,
    pub action_type: String,
    pub decision: Decision,
    pub final_confidence: f64,
    pub threshold: f64,
    pub reasoning_summary: String,
    pub contributions: Vec<Contribution>,
    pub factors_for: Vec<String>,
    pub factors_against: Vec<String>,
    pub safety_checks: Vec<String>,
    pub matched_pattern: Option<String>,
    pub execution_mode: String,
    pub outcome: Option<DecisionOutcome>,
}
