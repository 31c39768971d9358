//! C4: the exclusive authority on per-pattern confidence adjustment, per-action historical
//! success rate, and autonomous-safe promotion/demotion.
//!
//! Grounded on `original_source/src/learning/learning_engine.py` for the exact EMA/adjustment
//! arithmetic and promotion/demotion predicates.

use async_trait::async_trait;
use autopilot_common::config::LearningConfig;
use autopilot_common::{ComponentHealth, Error, LearningOutcome, PatternStats, Result};
use autopilot_store::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

const STATS_KEY_PREFIX: &str = "pattern_stats:";
const PATTERN_LOG_KEY_PREFIX: &str = "learning_log:";
const TIMELINE_KEY: &str = "learning_timeline";
const PATTERN_LOG_CAP: i64 = 1000;
const TIMELINE_CAP: i64 = 10000;

/// Why a pattern is or isn't safe to execute autonomously.
#[derive(Debug, Clone, PartialEq)]
pub struct AutonomySafetyVerdict {
    pub safe: bool,
    pub reasons: Vec<String>,
}

/// The C4 collaborator contract.
#[async_trait]
pub trait LearningEngine: Send + Sync {
    /// Fold one outcome into its pattern's stats. Idempotent on `outcome.outcome_id`.
    async fn record_outcome(&self, outcome: LearningOutcome) -> Result<PatternStats>;

    async fn get_stats(&self, pattern_id: &str) -> Result<PatternStats>;

    /// `base + confidence_adjustment`, blended with the raw success rate once enough history
    /// has accumulated, clamped to `[0, 100]`.
    async fn adjusted_confidence(&self, pattern_id: &str, base: f64) -> Result<f64>;

    /// The per-(category:type) action EMA success rate, `0.5` if never observed.
    async fn action_success_rate(&self, action_category: &str, action_type: &str) -> Result<f64>;

    async fn autonomy_verdict(&self, pattern_id: &str) -> Result<AutonomySafetyVerdict>;

    async fn health_check(&self) -> Result<ComponentHealth>;
}

pub struct StandardLearningEngine {
    store: Arc<dyn KeyValueStore>,
    config: LearningConfig,
}

impl StandardLearningEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, config: LearningConfig) -> Self {
        Self { store, config }
    }

    fn stats_key(pattern_id: &str) -> String {
        format!("{STATS_KEY_PREFIX}{pattern_id}")
    }

    async fn load_stats(&self, pattern_id: &str) -> Result<PatternStats> {
        match self.store.get(&Self::stats_key(pattern_id)).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(Error::MalformedInput),
            None => Ok(PatternStats::new(pattern_id)),
        }
    }

    async fn store_stats(&self, stats: &PatternStats) -> Result<()> {
        let bytes = serde_json::to_vec(stats)?;
        self.store.set(&Self::stats_key(&stats.pattern_id), bytes, None).await
    }

    fn positive_adjustment(&self, outcome: &LearningOutcome, stats: &PatternStats) -> f64 {
        let mut adjustment = 2.0;
        adjustment += if outcome.confidence_at_execution < 60.0 {
            3.0
        } else if outcome.confidence_at_execution < 80.0 {
            1.5
        } else {
            0.0
        };
        if stats.avg_resolution_seconds > 0.0 && outcome.execution_seconds < 0.5 * stats.avg_resolution_seconds {
            adjustment += 1.0;
        }
        adjustment += if outcome.improvement_score > 50.0 {
            2.0
        } else if outcome.improvement_score > 25.0 {
            1.0
        } else {
            0.0
        };

        if stats.successes > 50 {
            adjustment *= 0.5;
        } else if stats.successes > 20 {
            adjustment *= 0.75;
        }

        adjustment.min(self.config.positive_cap)
    }

    fn negative_adjustment(&self, outcome: &LearningOutcome) -> f64 {
        let mut adjustment = -3.0;
        adjustment += if outcome.confidence_at_execution > 90.0 {
            -5.0
        } else if outcome.confidence_at_execution > 75.0 {
            -2.0
        } else {
            0.0
        };
        if outcome.improvement_score < -25.0 {
            adjustment -= 3.0;
        }
        adjustment.max(self.config.negative_floor)
    }

    fn promotion_satisfied(&self, stats: &PatternStats) -> Vec<String> {
        let mut reasons = Vec::new();
        if stats.total_matches < self.config.promotion_min_matches {
            reasons.push(format!(
                "needs {} total matches, has {}",
                self.config.promotion_min_matches, stats.total_matches
            ));
        }
        if stats.success_rate() < self.config.promotion_min_success_rate {
            reasons.push(format!(
                "success rate {:.0}% below required {:.0}%",
                stats.success_rate() * 100.0,
                self.config.promotion_min_success_rate * 100.0
            ));
        }
        if stats.autonomous_attempts > 0 && stats.autonomous_success_rate() < self.config.promotion_min_autonomous_success_rate {
            reasons.push(format!(
                "autonomous success rate {:.0}% below required {:.0}%",
                stats.autonomous_success_rate() * 100.0,
                self.config.promotion_min_autonomous_success_rate * 100.0
            ));
        }
        reasons
    }

    fn demotion_satisfied(&self, stats: &PatternStats) -> bool {
        stats.failures >= self.config.demotion_min_failures
            && stats.total_matches > 0
            && (stats.failures as f64 / stats.total_matches as f64) >= self.config.demotion_min_failure_rate
    }
}

#[async_trait]
impl LearningEngine for StandardLearningEngine {
    async fn record_outcome(&self, outcome: LearningOutcome) -> Result<PatternStats> {
        let mut stats = self.load_stats(&outcome.pattern_id).await?;

        if stats.seen_outcome_ids.contains(&outcome.outcome_id) {
            debug!("outcome {} already folded into {}", outcome.outcome_id, outcome.pattern_id);
            return Ok(stats);
        }

        stats.total_matches += 1;
        stats.last_matched_at = Some(outcome.timestamp);

        if outcome.success {
            stats.successes += 1;
            stats.consecutive_failures = 0;
            stats.last_success_at = Some(outcome.timestamp);
        } else {
            stats.failures += 1;
            stats.consecutive_failures += 1;
        }

        if outcome.autonomous {
            stats.autonomous_attempts += 1;
            if outcome.success {
                stats.autonomous_successes += 1;
            }
        }

        let n = stats.total_matches as f64;
        stats.avg_resolution_seconds += (outcome.execution_seconds - stats.avg_resolution_seconds) / n;

        let action_key = format!("{}:{}", outcome.action_category, outcome.action_type);
        let prev_rate = *stats.per_action_rate.get(&action_key).unwrap_or(&0.5);
        let observed = if outcome.success { 1.0 } else { 0.0 };
        let new_rate = self.config.ema_alpha * observed + (1.0 - self.config.ema_alpha) * prev_rate;
        stats.per_action_rate.insert(action_key, new_rate);

        let adjustment = if outcome.success {
            self.positive_adjustment(&outcome, &stats)
        } else {
            self.negative_adjustment(&outcome)
        };
        stats.confidence_adjustment = (stats.confidence_adjustment + adjustment).clamp(self.config.negative_floor, 100.0);

        if self.demotion_satisfied(&stats) {
            stats.is_demoted = true;
            stats.is_promoted = false;
            if stats.consecutive_failures >= 2 {
                warn!("pattern {} flagged for immediate review after {} consecutive failures", stats.pattern_id, stats.consecutive_failures);
            }
        } else if self.promotion_satisfied(&stats).is_empty() {
            stats.is_promoted = true;
        }

        stats.seen_outcome_ids.push(outcome.outcome_id.clone());

        self.store_stats(&stats).await?;

        let log_key = format!("{PATTERN_LOG_KEY_PREFIX}{}", stats.pattern_id);
        let bytes = serde_json::to_vec(&outcome)?;
        self.store.lpush(&log_key, bytes.clone()).await?;
        self.store.ltrim(&log_key, 0, PATTERN_LOG_CAP - 1).await?;

        self.store.lpush(TIMELINE_KEY, bytes).await?;
        self.store.ltrim(TIMELINE_KEY, 0, TIMELINE_CAP - 1).await?;

        info!(
            pattern_id = %stats.pattern_id,
            success = outcome.success,
            promoted = stats.is_promoted,
            demoted = stats.is_demoted,
            "recorded learning outcome"
        );

        Ok(stats)
    }

    async fn get_stats(&self, pattern_id: &str) -> Result<PatternStats> {
        self.load_stats(pattern_id).await
    }

    async fn adjusted_confidence(&self, pattern_id: &str, base: f64) -> Result<f64> {
        let stats = self.load_stats(pattern_id).await?;
        let mut effective = base + stats.confidence_adjustment;
        if stats.total_matches > self.config.adjusted_confidence_blend_threshold {
            effective = 0.7 * effective + 0.3 * (stats.success_rate() * 100.0);
        }
        Ok(effective.clamp(0.0, 100.0))
    }

    async fn action_success_rate(&self, action_category: &str, action_type: &str) -> Result<f64> {
        let keys = self.store.keys(STATS_KEY_PREFIX).await?;
        let action_key = format!("{action_category}:{action_type}");
        for key in keys {
            if let Some(bytes) = self.store.get(&key).await? {
                if let Ok(stats) = serde_json::from_slice::<PatternStats>(&bytes) {
                    if let Some(rate) = stats.per_action_rate.get(&action_key) {
                        return Ok(*rate);
                    }
                }
            }
        }
        Ok(0.5)
    }

    async fn autonomy_verdict(&self, pattern_id: &str) -> Result<AutonomySafetyVerdict> {
        let stats = self.load_stats(pattern_id).await?;
        if stats.is_demoted {
            return Ok(AutonomySafetyVerdict {
                safe: false,
                reasons: vec!["pattern has been demoted due to recent failures".to_string()],
            });
        }
        if stats.is_promoted {
            return Ok(AutonomySafetyVerdict { safe: true, reasons: Vec::new() });
        }
        let reasons = self.promotion_satisfied(&stats);
        Ok(AutonomySafetyVerdict { safe: reasons.is_empty(), reasons })
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        self.store.health_check().await
    }
}

/// Construct the standard learning engine over a shared store.
pub async fn create_learning_engine(
    store: Arc<dyn KeyValueStore>,
    config: LearningConfig,
) -> Result<Arc<dyn LearningEngine + Send + Sync>> {
    Ok(Arc::new(StandardLearningEngine::new(store, config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_store::MemoryStore;
    use chrono::Utc;
    use std::collections::HashMap;

    fn config() -> LearningConfig {
        autopilot_common::Config::default().learning
    }

    fn outcome(outcome_id: &str, pattern_id: &str, success: bool) -> LearningOutcome {
        LearningOutcome {
            outcome_id: outcome_id.to_string(),
            incident_id: "inc-1".to_string(),
            pattern_id: pattern_id.to_string(),
            action_type: "restart_pod".to_string(),
            action_category: "kubernetes".to_string(),
            success,
            confidence_at_execution: 80.0,
            execution_seconds: 30.0,
            pre_metrics: HashMap::new(),
            post_metrics: HashMap::new(),
            improvement_score: 60.0,
            timestamp: Utc::now(),
            autonomous: false,
        }
    }

    #[tokio::test]
    async fn record_outcome_is_idempotent_on_outcome_id() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let engine = StandardLearningEngine::new(store, config());

        let first = engine.record_outcome(outcome("o1", "p1", true)).await.unwrap();
        let second = engine.record_outcome(outcome("o1", "p1", true)).await.unwrap();
        assert_eq!(first.total_matches, second.total_matches);
        assert_eq!(second.total_matches, 1);
    }

    #[tokio::test]
    async fn promotes_after_enough_successes() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let engine = StandardLearningEngine::new(store, config());

        let mut stats = PatternStats::new("p1");
        for i in 0..10 {
            stats = engine.record_outcome(outcome(&format!("o{i}"), "p1", true)).await.unwrap();
        }
        assert!(stats.is_promoted);
        let verdict = engine.autonomy_verdict("p1").await.unwrap();
        assert!(verdict.safe);
    }

    #[tokio::test]
    async fn demotes_after_repeated_failures() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let engine = StandardLearningEngine::new(store, config());

        let mut stats = PatternStats::new("p1");
        for i in 0..5 {
            stats = engine.record_outcome(outcome(&format!("o{i}"), "p1", false)).await.unwrap();
        }
        assert!(stats.is_demoted);
        let verdict = engine.autonomy_verdict("p1").await.unwrap();
        assert!(!verdict.safe);
    }

    #[tokio::test]
    async fn adjusted_confidence_clamped_to_valid_range() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let engine = StandardLearningEngine::new(store, config());

        for i in 0..3 {
            engine.record_outcome(outcome(&format!("o{i}"), "p1", true)).await.unwrap();
        }
        let confidence = engine.adjusted_confidence("p1", 95.0).await.unwrap();
        assert!((0.0..=100.0).contains(&confidence));
    }
}
