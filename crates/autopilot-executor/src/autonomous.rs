//! C6: decide whether a proposed action runs automatically, execute it, and loop the outcome
//! back into online weight adaptation.
//!
//! Grounded on `original_source/src/autonomous_executor.py` for the safety-rail ordering,
//! confidence composition, and reinforce/penalize weight update.

use crate::action::ActionExecutor;
use async_trait::async_trait;
use autopilot_analyzer::AiAnalysis;
use autopilot_common::config::ExecutorConfig;
use autopilot_common::{
    ActionStatus, ComponentHealth, Contribution, Decision, DecisionLog, DecisionOutcome, Error, Incident, Mode, Result, Risk,
    ScoredAction, Severity,
};
use autopilot_detector::AnomalyDetector;
use autopilot_learning::LearningEngine;
use chrono::{Timelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const ACTIVE_ACTIONS_KEY: &str = "autonomous:active_actions";
const WEIGHTS_KEY: &str = "executor:weights";
const ROLLBACK_BUDGET_PER_HOUR: usize = 2;

#[derive(Debug, Clone, Copy)]
struct Weights {
    rule: f64,
    ai: f64,
    history: f64,
}

fn is_rollback_action(action_type: &str) -> bool {
    action_type.contains("rollback")
}

fn is_restart_action(action_type: &str) -> bool {
    action_type.contains("restart")
}

fn is_clear_cache_action(action_type: &str) -> bool {
    action_type == "cache_flush" || action_type.contains("clear_cache")
}

fn blast_radius_score(radius: autopilot_common::BlastRadius) -> u32 {
    match radius {
        autopilot_common::BlastRadius::Low => 25,
        autopilot_common::BlastRadius::Medium => 50,
        autopilot_common::BlastRadius::High => 75,
        autopilot_common::BlastRadius::Critical => 100,
    }
}

/// Extra context a decision needs beyond the incident and candidate action.
#[derive(Debug, Clone, Default)]
pub struct DecisionContext {
    pub recent_deployment_minutes_ago: Option<i64>,
}

/// The C6 collaborator contract.
#[async_trait]
pub trait AutonomousExecutor: Send + Sync {
    async fn decide(
        &self,
        incident: &Incident,
        candidate: &ScoredAction,
        ai: Option<&AiAnalysis>,
        ctx: &DecisionContext,
    ) -> Result<DecisionLog>;

    async fn health_check(&self) -> Result<ComponentHealth>;
}

pub struct StandardAutonomousExecutor {
    store: Arc<dyn autopilot_store::KeyValueStore>,
    action_executor: Arc<dyn ActionExecutor>,
    detector: Arc<dyn AnomalyDetector>,
    learning: Arc<dyn LearningEngine>,
    config: ExecutorConfig,
}

impl StandardAutonomousExecutor {
    pub fn new(
        store: Arc<dyn autopilot_store::KeyValueStore>,
        action_executor: Arc<dyn ActionExecutor>,
        detector: Arc<dyn AnomalyDetector>,
        learning: Arc<dyn LearningEngine>,
        config: ExecutorConfig,
    ) -> Self {
        Self { store, action_executor, detector, learning, config }
    }

    async fn load_weights(&self) -> Result<Weights> {
        let rule = self.store.hget(WEIGHTS_KEY, "rule").await?.and_then(|b| parse_f64(&b));
        let ai = self.store.hget(WEIGHTS_KEY, "ai").await?.and_then(|b| parse_f64(&b));
        let history = self.store.hget(WEIGHTS_KEY, "history").await?.and_then(|b| parse_f64(&b));
        Ok(Weights {
            rule: rule.unwrap_or(self.config.rule_weight),
            ai: ai.unwrap_or(self.config.ai_weight),
            history: history.unwrap_or(self.config.history_weight),
        })
    }

    async fn save_weights(&self, weights: &Weights) -> Result<()> {
        self.store.hset(WEIGHTS_KEY, "rule", weights.rule.to_string().into_bytes()).await?;
        self.store.hset(WEIGHTS_KEY, "ai", weights.ai.to_string().into_bytes()).await?;
        self.store.hset(WEIGHTS_KEY, "history", weights.history.to_string().into_bytes()).await
    }

    fn mode_permits_attempt(&self, candidate_risk: Risk) -> bool {
        match self.config.mode {
            Mode::Manual => false,
            Mode::Supervised => candidate_risk == Risk::Low,
            Mode::Autonomous => true,
            Mode::NightMode { start_hour, end_hour } => {
                let hour = Utc::now().hour();
                if start_hour <= end_hour {
                    hour >= start_hour && hour < end_hour
                } else {
                    hour >= start_hour || hour < end_hour
                }
            }
        }
    }

    fn rule_confidence(&self, incident: &Incident, candidate: &ScoredAction, risk: Risk, ctx: &DecisionContext) -> (f64, Vec<String>) {
        let mut confidence: f64 = 50.0;
        let mut factors = Vec::new();

        match risk {
            Risk::Low => {
                confidence += 20.0;
                factors.push("low-risk action".to_string());
            }
            Risk::High => {
                confidence -= 20.0;
                factors.push("high-risk action".to_string());
            }
            Risk::Medium => {}
        }

        if is_rollback_action(&candidate.action_type) && ctx.recent_deployment_minutes_ago.map(|m| m < 10).unwrap_or(false) {
            confidence += 25.0;
            factors.push("rollback shortly after deployment".to_string());
        }

        if candidate.action_type.contains("scale") && incident.symptoms.iter().any(|s| s.to_lowercase().contains("latency")) {
            confidence += 15.0;
            factors.push("scale action with latency anomaly present".to_string());
        }
        if is_restart_action(&candidate.action_type) && incident.symptoms.iter().any(|s| s.to_lowercase().contains("memory")) {
            confidence += 15.0;
            factors.push("restart action with memory anomaly present".to_string());
        }
        if incident.severity == Severity::Critical {
            confidence += 10.0;
            factors.push("critical severity incident".to_string());
        }

        (confidence.clamp(0.0, 100.0), factors)
    }

    fn ai_confidence(&self, ai: Option<&AiAnalysis>, action_type: &str) -> (f64, String) {
        let Some(ai) = ai else {
            return (30.0, "no AI analysis available, heavily discounted".to_string());
        };
        let base = ai.root_cause_confidence;
        match ai.recommends(action_type) {
            Some(rec) => {
                let bonus = (6 - rec.priority.min(5)) as f64 * 5.0;
                (base + bonus, format!("AI recommends this action at priority {}", rec.priority))
            }
            None => (base * 0.6, "AI does not mention this action, discounted".to_string()),
        }
    }

    async fn historical_confidence(&self, incident: &Incident, candidate: &ScoredAction) -> Result<(f64, String)> {
        if incident.similar_incident_count == 0 {
            return Ok((50.0, "no similar incidents on record".to_string()));
        }
        let rate = self
            .learning
            .action_success_rate(&candidate.action_category, &candidate.action_type)
            .await?;
        Ok((rate * 100.0, format!("historical success rate over similar incidents: {:.0}%", rate * 100.0)))
    }

    async fn run_safety_rails(&self, incident: &Incident, candidate: &ScoredAction) -> Result<Vec<String>> {
        let mut checks = Vec::new();

        let active = self.store.llen(ACTIVE_ACTIONS_KEY).await?;
        if active >= self.config.max_concurrent_actions {
            return Err(Error::SafetyViolation(format!("{active} actions already active, max is {}", self.config.max_concurrent_actions)));
        }
        checks.push(format!("concurrency ok ({active}/{})", self.config.max_concurrent_actions));

        let cooldown_key = format!("cooldown:{}:{}", incident.service, candidate.action_type);
        if self.store.get(&cooldown_key).await?.is_some() {
            return Err(Error::SafetyViolation(format!(
                "cooldown active for {} on {}",
                candidate.action_type, incident.service
            )));
        }
        checks.push("cooldown clear".to_string());

        if is_rollback_action(&candidate.action_type) {
            let budget_key = format!("rollback_budget:{}", incident.service);
            let hour_ago = (Utc::now() - chrono::Duration::hours(1)).timestamp() as f64;
            let recent = self.store.zrange_by_score(&budget_key, hour_ago, Utc::now().timestamp() as f64).await?;
            if recent.len() >= ROLLBACK_BUDGET_PER_HOUR {
                return Err(Error::SafetyViolation(format!("rollback budget exhausted for {}", incident.service)));
            }
            checks.push("rollback budget available".to_string());
        }

        if candidate.action_type.contains("scale") {
            let target = candidate.params.get("target_replicas").and_then(|v| v.as_i64());
            let current = candidate.params.get("current_replicas").and_then(|v| v.as_i64());
            if let (Some(target), Some(current)) = (target, current) {
                if target < 1 || target > current * 3 {
                    return Err(Error::SafetyViolation(format!("target replicas {target} out of bounds for current {current}")));
                }
            }
            checks.push("scale bounds ok".to_string());
        }

        let recent_anomalies = self.detector.recent_anomalies(&incident.service).await?;
        let critical_count = recent_anomalies.iter().rev().take(10).filter(|a| a.severity == Severity::Critical).count();
        if critical_count >= 3 {
            return Err(Error::SafetyViolation(format!(
                "service health critical: {critical_count} of last 10 anomalies were critical"
            )));
        }
        checks.push("service health ok".to_string());

        let sensitive = is_rollback_action(&candidate.action_type) || is_restart_action(&candidate.action_type) || is_clear_cache_action(&candidate.action_type);
        if sensitive {
            let score = blast_radius_score(incident.blast_radius);
            if score >= 80 && score > 50 {
                return Err(Error::SafetyViolation(format!(
                    "blast radius {score} exceeds cap of 50 for action type {}",
                    candidate.action_type
                )));
            }
            checks.push("blast radius within cap".to_string());
        }

        Ok(checks)
    }

    async fn mark_executing(&self, action_id: &str) -> Result<()> {
        self.store.lpush(ACTIVE_ACTIONS_KEY, action_id.as_bytes().to_vec()).await
    }

    async fn unmark_executing(&self, action_id: &str) -> Result<()> {
        self.store.lrem(ACTIVE_ACTIONS_KEY, action_id.as_bytes()).await.map(|_| ())
    }

    async fn apply_cooldown_and_budget(&self, incident: &Incident, candidate: &ScoredAction) -> Result<()> {
        let cooldown_key = format!("cooldown:{}:{}", incident.service, candidate.action_type);
        self.store.set_ex(&cooldown_key, std::time::Duration::from_secs(self.config.cooldown_seconds as u64), b"1".to_vec()).await?;

        if is_rollback_action(&candidate.action_type) {
            let budget_key = format!("rollback_budget:{}", incident.service);
            self.store.zadd(&budget_key, &Uuid::new_v4().to_string(), Utc::now().timestamp() as f64).await?;
        }
        Ok(())
    }

    async fn adapt_weights(&self, success: bool, confidence: f64) -> Result<()> {
        let reinforce = success && confidence >= self.config.reinforce_confidence_threshold;
        let penalize = !success && confidence >= self.config.penalize_confidence_threshold;
        if !reinforce && !penalize {
            return Ok(());
        }

        let mut weights = self.load_weights().await?;
        let step = if reinforce { self.config.weight_adaptation_step } else { -self.config.weight_adaptation_step };
        weights.rule = (weights.rule + step).max(self.config.weight_epsilon);
        weights.ai = (weights.ai + step).max(self.config.weight_epsilon);
        weights.history = (weights.history + step).max(self.config.weight_epsilon);

        let sum = weights.rule + weights.ai + weights.history;
        weights.rule /= sum;
        weights.ai /= sum;
        weights.history /= sum;

        self.save_weights(&weights).await?;
        info!(reinforce, penalize, "adapted executor confidence weights");
        Ok(())
    }
}

#[async_trait]
impl AutonomousExecutor for StandardAutonomousExecutor {
    async fn decide(
        &self,
        incident: &Incident,
        candidate: &ScoredAction,
        ai: Option<&AiAnalysis>,
        ctx: &DecisionContext,
    ) -> Result<DecisionLog> {
        let weights = self.load_weights().await?;
        let action_risk = if candidate.confidence >= 80.0 { Risk::Low } else if candidate.confidence >= 50.0 { Risk::Medium } else { Risk::High };

        let (rule_value, rule_factors) = self.rule_confidence(incident, candidate, action_risk, ctx);
        let (ai_value, ai_reasoning) = self.ai_confidence(ai, &candidate.action_type);
        let (history_value, history_reasoning) = self.historical_confidence(incident, candidate).await?;

        let contributions = vec![
            Contribution {
                source: "rule".to_string(),
                value: rule_value,
                weight: weights.rule,
                weighted: rule_value * weights.rule,
                reasoning: "rule-based heuristics over action type, risk, and incident severity".to_string(),
                factors: rule_factors,
            },
            Contribution {
                source: "ai".to_string(),
                value: ai_value,
                weight: weights.ai,
                weighted: ai_value * weights.ai,
                reasoning: ai_reasoning,
                factors: Vec::new(),
            },
            Contribution {
                source: "history".to_string(),
                value: history_value,
                weight: weights.history,
                weighted: history_value * weights.history,
                reasoning: history_reasoning,
                factors: Vec::new(),
            },
        ];

        let final_confidence: f64 = contributions.iter().map(|c| c.weighted).sum();
        let mode_permits = self.mode_permits_attempt(action_risk);

        let mut decision_id = Uuid::new_v4().to_string();
        let mut decision = Decision::Deferred;
        let mut safety_checks = Vec::new();
        let mut factors_against = Vec::new();
        let mut outcome = None;

        if !mode_permits {
            factors_against.push(format!("execution mode {:?} does not permit autonomous execution", self.config.mode));
        } else {
            match self.run_safety_rails(incident, candidate).await {
                Err(Error::SafetyViolation(reason)) => {
                    decision = Decision::Denied;
                    factors_against.push(reason);
                }
                Err(e) => return Err(e),
                Ok(checks) => {
                    safety_checks = checks;
                    if final_confidence >= self.config.confidence_threshold {
                        decision = Decision::Approved;
                    } else {
                        decision = Decision::Denied;
                        factors_against.push(format!("confidence {final_confidence:.1} below threshold {}", self.config.confidence_threshold));
                    }
                }
            }
        }

        if decision == Decision::Approved {
            let action = self
                .action_executor
                .propose(
                    &incident.incident_id,
                    &candidate.action_type,
                    &incident.service,
                    candidate.params.clone(),
                    &format!("autonomous decision {decision_id}"),
                    action_risk,
                    "autonomous_executor",
                )
                .await?;
            self.action_executor.approve(&action.id, "autonomous_executor").await?;
            self.mark_executing(&action.id).await?;
            self.apply_cooldown_and_budget(incident, candidate).await?;

            let executed = self.action_executor.execute(&action.id).await?;
            self.unmark_executing(&action.id).await?;

            let succeeded = executed.status == ActionStatus::Success;
            outcome = Some(if succeeded { DecisionOutcome::Success } else { DecisionOutcome::Failure });
            self.adapt_weights(succeeded, final_confidence).await?;
            decision_id = action.id;

            if !succeeded {
                warn!(incident_id = %incident.incident_id, action_type = %candidate.action_type, "autonomous execution failed");
            }
        } else {
            outcome = Some(DecisionOutcome::Pending);
        }

        let reasoning_summary = format!(
            "{:?}: weighted confidence {final_confidence:.1} vs threshold {}",
            decision, self.config.confidence_threshold
        );

        let log = DecisionLog {
            decision_id,
            timestamp: Utc::now(),
            incident_id: incident.incident_id.clone(),
            service: incident.service.clone(),
            action_type: candidate.action_type.clone(),
            decision,
            final_confidence,
            threshold: self.config.confidence_threshold,
            reasoning_summary,
            contributions,
            factors_for: safety_checks.clone(),
            factors_against,
            safety_checks,
            matched_pattern: incident.best_pattern_id.clone(),
            execution_mode: format!("{:?}", self.config.mode),
            outcome,
        };

        Ok(log)
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        self.store.health_check().await
    }
}

fn parse_f64(bytes: &[u8]) -> Option<f64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

pub async fn create_autonomous_executor(
    store: Arc<dyn autopilot_store::KeyValueStore>,
    action_executor: Arc<dyn ActionExecutor>,
    detector: Arc<dyn AnomalyDetector>,
    learning: Arc<dyn LearningEngine>,
    config: ExecutorConfig,
) -> Result<Arc<dyn AutonomousExecutor + Send + Sync>> {
    Ok(Arc::new(StandardAutonomousExecutor::new(store, action_executor, detector, learning, config)))
}
