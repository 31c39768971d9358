//! C3: the compiled-in failure-pattern catalogue and its match-scoring algorithm.
//!
//! Grounded on `original_source/src/training/devops_knowledge_base.py`'s `IncidentPattern.match_score`:
//! per-symptom weighted scoring, a signal-keyword bonus over the concatenated lowercase log
//! buffer, and a normalized-confidence cutoff.

mod catalog;

use async_trait::async_trait;
use autopilot_common::config::KnowledgeConfig;
use autopilot_common::{Anomaly, ComponentHealth, Condition, IncidentPattern, PatternMatch, Result, SymptomType};
use autopilot_store::KeyValueStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const CUSTOM_PATTERNS_KEY_PREFIX: &str = "knowledge:custom:";

/// The C3 collaborator contract.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Score every catalogued pattern against `anomalies`/`logs`, returning matches with
    /// `confidence >= min_confidence`, sorted by confidence descending.
    async fn match_patterns(&self, anomalies: &[Anomaly], logs: &[String]) -> Result<Vec<PatternMatch>>;

    async fn get_pattern(&self, pattern_id: &str) -> Result<Option<IncidentPattern>>;

    async fn all_patterns(&self) -> Result<Vec<IncidentPattern>>;

    /// Hydrate a user-supplied pattern, persisted through C1 so it survives restarts.
    async fn add_pattern(&self, pattern: IncidentPattern) -> Result<()>;

    async fn health_check(&self) -> Result<ComponentHealth>;
}

pub struct StandardKnowledgeBase {
    store: Arc<dyn KeyValueStore>,
    config: KnowledgeConfig,
    patterns: RwLock<HashMap<String, IncidentPattern>>,
}

impl StandardKnowledgeBase {
    async fn new(store: Arc<dyn KeyValueStore>, config: KnowledgeConfig) -> Result<Self> {
        let mut patterns = HashMap::new();
        for pattern in catalog::seed_patterns() {
            patterns.insert(pattern.pattern_id.clone(), pattern);
        }
        debug!("loaded {} built-in patterns", patterns.len());

        let kb = Self {
            store,
            config,
            patterns: RwLock::new(patterns),
        };
        kb.hydrate_custom_patterns().await?;
        Ok(kb)
    }

    async fn hydrate_custom_patterns(&self) -> Result<()> {
        let keys = self.store.keys(CUSTOM_PATTERNS_KEY_PREFIX).await?;
        let mut patterns = self.patterns.write().await;
        for key in keys {
            match self.store.get(&key).await? {
                Some(bytes) => match serde_json::from_slice::<IncidentPattern>(&bytes) {
                    Ok(pattern) => {
                        patterns.insert(pattern.pattern_id.clone(), pattern);
                    }
                    Err(e) => warn!("skipping malformed custom pattern at {key}: {e}"),
                },
                None => continue,
            }
        }
        Ok(())
    }

    fn symptom_matches(symptom: &autopilot_common::Symptom, anomalies: &[Anomaly], logs: &[String]) -> bool {
        match symptom.symptom_type {
            SymptomType::Metric => anomalies.iter().any(|a| symptom.matches_metric(a)),
            SymptomType::Event | SymptomType::Status => anomalies.iter().any(|a| symptom.matches_text(&a.as_text())),
            SymptomType::Log => logs.iter().any(|l| symptom.matches_text(&l.to_lowercase())),
        }
    }

    fn score_pattern(&self, pattern: &IncidentPattern, anomalies: &[Anomaly], logs: &[String], log_buffer: &str) -> f64 {
        let max_score: f64 = pattern.symptoms.iter().map(|s| s.weight).sum();
        if max_score <= 0.0 {
            return 0.0;
        }

        let mut raw: f64 = pattern
            .symptoms
            .iter()
            .filter(|s| Self::symptom_matches(s, anomalies, logs))
            .map(|s| s.weight)
            .sum();

        for signal in &pattern.signals {
            if log_buffer.contains(&signal.to_lowercase()) {
                raw += self.config.signal_match_bonus;
            }
        }

        (raw / max_score * 100.0).min(100.0)
    }
}

#[async_trait]
impl KnowledgeBase for StandardKnowledgeBase {
    async fn match_patterns(&self, anomalies: &[Anomaly], logs: &[String]) -> Result<Vec<PatternMatch>> {
        let log_buffer = logs.join(" ").to_lowercase();
        let patterns = self.patterns.read().await;

        let mut matches: Vec<PatternMatch> = patterns
            .values()
            .map(|pattern| PatternMatch {
                pattern_id: pattern.pattern_id.clone(),
                confidence: self.score_pattern(pattern, anomalies, logs, &log_buffer),
            })
            .filter(|m| m.confidence >= self.config.min_confidence)
            .collect();

        matches.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        Ok(matches)
    }

    async fn get_pattern(&self, pattern_id: &str) -> Result<Option<IncidentPattern>> {
        Ok(self.patterns.read().await.get(pattern_id).cloned())
    }

    async fn all_patterns(&self) -> Result<Vec<IncidentPattern>> {
        Ok(self.patterns.read().await.values().cloned().collect())
    }

    async fn add_pattern(&self, pattern: IncidentPattern) -> Result<()> {
        let key = format!("{CUSTOM_PATTERNS_KEY_PREFIX}{}", pattern.pattern_id);
        let bytes = serde_json::to_vec(&pattern)?;
        self.store.set(&key, bytes, None).await?;
        self.patterns.write().await.insert(pattern.pattern_id.clone(), pattern);
        Ok(())
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        let count = self.patterns.read().await.len();
        let mut health = ComponentHealth::healthy(format!("{count} patterns loaded"));
        health.metrics.insert("pattern_count".to_string(), count as f64);
        Ok(health)
    }
}

/// Construct the standard knowledge base, loading the built-in catalogue plus any custom
/// patterns previously hydrated through C1.
pub async fn create_knowledge_base(
    store: Arc<dyn KeyValueStore>,
    config: KnowledgeConfig,
) -> Result<Arc<dyn KnowledgeBase + Send + Sync>> {
    Ok(Arc::new(StandardKnowledgeBase::new(store, config).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_store::MemoryStore;
    use chrono::Utc;

    fn config() -> KnowledgeConfig {
        autopilot_common::Config::default().knowledge
    }

    fn anomaly(service: &str, metric: &str, value: f64) -> Anomaly {
        Anomaly {
            service: service.to_string(),
            metric: metric.to_string(),
            value,
            mean: 10.0,
            stddev: 1.0,
            z_score: 5.0,
            deviation_pct: 50.0,
            severity: autopilot_common::Severity::High,
            detected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn matches_oom_pattern_above_min_confidence() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let kb = StandardKnowledgeBase::new(store, config()).await.unwrap();

        let anomalies = vec![anomaly("api", "memory_usage_percent", 97.0), anomaly("api", "container_restarts", 4.0)];
        let logs = vec!["Pod api-5f6 OOMKilled by kubelet".to_string()];

        let matches = kb.match_patterns(&anomalies, &logs).await.unwrap();
        assert!(matches.iter().any(|m| m.pattern_id == "k8s_oom_killed_001"));
        let top = matches.iter().find(|m| m.pattern_id == "k8s_oom_killed_001").unwrap();
        assert!(top.confidence >= 50.0);
    }

    #[tokio::test]
    async fn unrelated_anomalies_fall_below_threshold() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let kb = StandardKnowledgeBase::new(store, config()).await.unwrap();

        let anomalies = vec![anomaly("api", "some_unrelated_metric", 3.0)];
        let matches = kb.match_patterns(&anomalies, &[]).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn add_pattern_is_matchable_and_persisted() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let kb = StandardKnowledgeBase::new(store.clone(), config()).await.unwrap();

        let pattern = IncidentPattern {
            pattern_id: "custom_disk_full".to_string(),
            name: "Custom Disk Full".to_string(),
            category: autopilot_common::PatternCategory::Cloud,
            subcategory: "storage".to_string(),
            severity: autopilot_common::Severity::High,
            symptoms: vec![autopilot_common::Symptom {
                symptom_type: SymptomType::Metric,
                name: "disk_usage_percent".to_string(),
                condition: Condition::Above,
                value: "90".to_string(),
                weight: 1.0,
            }],
            signals: vec![],
            root_causes: vec![],
            actions: vec![],
            autonomous_safe: true,
            blast_radius: autopilot_common::BlastRadius::Low,
            avg_resolution_seconds: 60,
            tags: vec![],
            related_patterns: vec![],
        };
        kb.add_pattern(pattern).await.unwrap();

        assert!(kb.get_pattern("custom_disk_full").await.unwrap().is_some());
        assert!(store.get("knowledge:custom:custom_disk_full").await.unwrap().is_some());
    }
}
