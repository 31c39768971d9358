//! C8: recurring-incident fingerprinting, automatic preventive application, and escalation.
//!
//! Grounded on `original_source/src/prevention/repeat_eliminator.py` for the occurrence
//! tracking, preventive-selection, and escalation algorithms.

pub mod catalog;
pub mod fingerprint;

use async_trait::async_trait;
use autopilot_common::config::RepeatConfig;
use autopilot_common::{ComponentHealth, Error, Incident, Result, Risk};
use autopilot_executor::ActionExecutor;
use autopilot_store::KeyValueStore;
use catalog::{preventive_measures, PreventiveMeasure, SymptomType};
use chrono::Utc;
use fingerprint::{fingerprint, root_cause_hash, SymptomFlags};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One fix attempt (successful or failed) folded into a `RepeatPattern`'s history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixAttempt {
    pub incident_id: String,
    pub action_types: Vec<String>,
    pub timestamp: chrono::DateTime<Utc>,
}

/// An entry in the permanent-fix registry, one per pattern that stopped recurring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermanentFixRecord {
    pub pattern_id: String,
    pub service: String,
    pub action_type: String,
    pub applied_at: chrono::DateTime<Utc>,
    pub after_occurrences: u32,
    pub confidence: f64,
}

/// Outcome of attempting to apply a preventive measure for a recurring pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreventionOutcome {
    pub applied: bool,
    pub pattern_id: String,
    pub occurrence_count: u32,
    pub action_type: Option<String>,
    pub message: String,
    pub escalated: bool,
}

/// The C8 collaborator contract.
#[async_trait]
pub trait RepeatEliminator: Send + Sync {
    /// Record one resolved-or-failed incident occurrence against its pattern, returning the
    /// updated occurrence count and whether a preventive measure should now be applied.
    async fn record_occurrence(&self, incident: &Incident, action_types_taken: &[String], was_successful: bool) -> Result<(String, u32, bool)>;

    /// Apply the best preventive measure for a pattern, auto-approving and executing via C7.
    async fn apply_preventive(&self, incident: &Incident) -> Result<PreventionOutcome>;

    async fn patterns_for_service(&self, service: &str) -> Result<Vec<autopilot_common::RepeatPattern>>;

    async fn permanent_fixes(&self, service: Option<&str>) -> Result<Vec<PermanentFixRecord>>;

    async fn health_check(&self) -> Result<ComponentHealth>;
}

pub struct StandardRepeatEliminator {
    store: Arc<dyn KeyValueStore>,
    action_executor: Arc<dyn ActionExecutor>,
    config: RepeatConfig,
}

impl StandardRepeatEliminator {
    pub fn new(store: Arc<dyn KeyValueStore>, action_executor: Arc<dyn ActionExecutor>, config: RepeatConfig) -> Self {
        Self { store, action_executor, config }
    }

    fn pattern_key(pattern_id: &str) -> String {
        format!("repeat_pattern:{pattern_id}")
    }

    fn service_index_key(service: &str) -> String {
        format!("repeat_patterns:{service}")
    }

    async fn load_pattern(&self, pattern_id: &str) -> Result<Option<autopilot_common::RepeatPattern>> {
        match self.store.get(&Self::pattern_key(pattern_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save_pattern(&self, pattern: &autopilot_common::RepeatPattern) -> Result<()> {
        let bytes = serde_json::to_vec(pattern)?;
        let ttl = Duration::from_secs(self.config.repeat_pattern_ttl_days as u64 * 86_400);
        self.store.set(&Self::pattern_key(&pattern.pattern_id), bytes, Some(ttl)).await
    }

    fn select_best_preventive(pattern: &autopilot_common::RepeatPattern, symptom: SymptomType) -> Option<PreventiveMeasure> {
        let candidates = preventive_measures(symptom);
        if candidates.is_empty() {
            return None;
        }

        let successful_types: std::collections::HashSet<String> = pattern
            .successful_fixes
            .iter()
            .filter_map(|raw| serde_json::from_str::<FixAttempt>(raw).ok())
            .flat_map(|fix| fix.action_types)
            .collect();

        for measure in candidates {
            if successful_types.contains(measure.action_type) {
                let mut bumped = measure.clone();
                bumped.base_confidence = (bumped.base_confidence + 10.0).min(100.0);
                return Some(bumped);
            }
        }
        candidates.first().cloned()
    }

    async fn escalate(&self, pattern: &autopilot_common::RepeatPattern) -> Result<()> {
        #[derive(Serialize)]
        struct Escalation<'a> {
            r#type: &'static str,
            service: &'a str,
            pattern_id: &'a str,
            occurrence_count: u32,
            first_seen: chrono::DateTime<Utc>,
            last_seen: chrono::DateTime<Utc>,
            failed_fixes: usize,
            successful_fixes: usize,
            escalated_at: chrono::DateTime<Utc>,
            message: String,
        }
        let record = Escalation {
            r#type: "repeat_incident_escalation",
            service: &pattern.service,
            pattern_id: &pattern.pattern_id,
            occurrence_count: pattern.occurrence_count,
            first_seen: pattern.first_seen,
            last_seen: pattern.last_seen,
            failed_fixes: pattern.failed_fixes.len(),
            successful_fixes: pattern.successful_fixes.len(),
            escalated_at: Utc::now(),
            message: format!(
                "Recurring incident on {} after {} occurrences - manual intervention required",
                pattern.service, pattern.occurrence_count
            ),
        };
        let bytes = serde_json::to_vec(&record)?;
        self.store.lpush("escalations", bytes.clone()).await?;
        self.store.lpush(&format!("escalations:{}", pattern.service), bytes).await?;
        warn!(pattern_id = %pattern.pattern_id, service = %pattern.service, occurrences = pattern.occurrence_count, "repeat incident escalated");
        Ok(())
    }

    async fn record_permanent_fix(&self, pattern: &autopilot_common::RepeatPattern, measure: &PreventiveMeasure) -> Result<()> {
        let record = PermanentFixRecord {
            pattern_id: pattern.pattern_id.clone(),
            service: pattern.service.clone(),
            action_type: measure.action_type.to_string(),
            applied_at: Utc::now(),
            after_occurrences: pattern.occurrence_count,
            confidence: measure.base_confidence,
        };
        let bytes = serde_json::to_vec(&record)?;
        self.store.lpush("permanent_fixes", bytes.clone()).await?;
        self.store.lpush(&format!("permanent_fixes:{}", pattern.service), bytes).await?;
        self.store.ltrim("permanent_fixes", 0, self.config.permanent_fixes_global_cap as i64 - 1).await?;
        self.store
            .ltrim(&format!("permanent_fixes:{}", pattern.service), 0, self.config.permanent_fixes_per_service_cap as i64 - 1)
            .await?;
        info!(pattern_id = %pattern.pattern_id, action_type = measure.action_type, "permanent fix recorded");
        Ok(())
    }
}

#[async_trait]
impl RepeatEliminator for StandardRepeatEliminator {
    async fn record_occurrence(&self, incident: &Incident, action_types_taken: &[String], was_successful: bool) -> Result<(String, u32, bool)> {
        let flags = SymptomFlags::from_text(&incident.symptoms, &incident.root_cause);
        let pattern_id = fingerprint(&incident.service, &incident.root_cause, flags);
        let now = Utc::now();

        let fix = FixAttempt {
            incident_id: incident.incident_id.clone(),
            action_types: action_types_taken.to_vec(),
            timestamp: now,
        };
        let fix_json = serde_json::to_string(&fix)?;

        let mut pattern = match self.load_pattern(&pattern_id).await? {
            Some(mut existing) => {
                existing.occurrence_count += 1;
                existing.last_seen = now;
                if was_successful {
                    existing.successful_fixes.push(fix_json);
                } else {
                    existing.failed_fixes.push(fix_json);
                }
                existing
            }
            None => {
                self.store.lpush(&Self::service_index_key(&incident.service), pattern_id.clone().into_bytes()).await?;
                autopilot_common::RepeatPattern {
                    pattern_id: pattern_id.clone(),
                    service: incident.service.clone(),
                    root_cause_hash: root_cause_hash(&incident.root_cause),
                    symptom_signature: flags.signature(),
                    occurrence_count: 1,
                    first_seen: now,
                    last_seen: now,
                    successful_fixes: if was_successful { vec![fix_json] } else { vec![] },
                    failed_fixes: if was_successful { vec![] } else { vec![fix_json] },
                    permanent_fix_applied: false,
                    permanent_fix_details: None,
                    escalated: false,
                }
            }
        };

        let should_prevent = pattern.occurrence_count >= self.config.prevention_occurrence_threshold && !pattern.permanent_fix_applied;

        if !was_successful && pattern.occurrence_count >= self.config.escalation_occurrence_threshold && !pattern.escalated && !pattern.permanent_fix_applied {
            self.escalate(&pattern).await?;
            pattern.escalated = true;
        }

        self.save_pattern(&pattern).await?;

        info!(
            pattern_id = %pattern_id,
            service = %incident.service,
            occurrence_count = pattern.occurrence_count,
            should_prevent,
            "recorded repeat-incident occurrence"
        );

        Ok((pattern_id, pattern.occurrence_count, should_prevent))
    }

    async fn apply_preventive(&self, incident: &Incident) -> Result<PreventionOutcome> {
        let flags = SymptomFlags::from_text(&incident.symptoms, &incident.root_cause);
        let pattern_id = fingerprint(&incident.service, &incident.root_cause, flags);

        let mut pattern = self
            .load_pattern(&pattern_id)
            .await?
            .ok_or_else(|| Error::InvalidState(format!("no repeat pattern {pattern_id} on record")))?;

        if pattern.permanent_fix_applied {
            return Ok(PreventionOutcome {
                applied: true,
                pattern_id,
                occurrence_count: pattern.occurrence_count,
                action_type: pattern.permanent_fix_details.clone(),
                message: "permanent fix already applied".to_string(),
                escalated: pattern.escalated,
            });
        }

        let symptom_text = format!("{} {}", incident.symptoms.join(" "), incident.root_cause);
        let symptom = SymptomType::identify(&symptom_text);
        let Some(measure) = Self::select_best_preventive(&pattern, symptom) else {
            return Ok(PreventionOutcome {
                applied: false,
                pattern_id,
                occurrence_count: pattern.occurrence_count,
                action_type: None,
                message: format!("no preventive measure available for {}", symptom.as_str()),
                escalated: pattern.escalated,
            });
        };

        let mut params = HashMap::new();
        for (k, v) in measure.params {
            params.insert(k.to_string(), serde_json::Value::String(v.to_string()));
        }

        let action = self
            .action_executor
            .propose(
                &incident.incident_id,
                measure.action_type,
                &incident.service,
                params,
                &format!("preventive measure for recurring incident (confidence {}%)", measure.base_confidence),
                Risk::Low,
                "repeat_eliminator",
            )
            .await?;
        self.action_executor.approve(&action.id, "repeat_eliminator").await?;
        let executed = self.action_executor.execute(&action.id).await?;
        let succeeded = executed.status == autopilot_common::ActionStatus::Success;

        if succeeded {
            pattern.permanent_fix_applied = true;
            pattern.permanent_fix_details = Some(measure.action_type.to_string());
            self.save_pattern(&pattern).await?;
            self.record_permanent_fix(&pattern, &measure).await?;
            info!(pattern_id = %pattern_id, action_type = measure.action_type, "permanent fix applied");
        } else if pattern.occurrence_count >= self.config.escalation_occurrence_threshold && !pattern.escalated {
            self.escalate(&pattern).await?;
            pattern.escalated = true;
            self.save_pattern(&pattern).await?;
        }

        Ok(PreventionOutcome {
            applied: succeeded,
            pattern_id,
            occurrence_count: pattern.occurrence_count,
            action_type: Some(measure.action_type.to_string()),
            message: format!("applied {} via repeat eliminator", measure.action_type),
            escalated: pattern.escalated,
        })
    }

    async fn patterns_for_service(&self, service: &str) -> Result<Vec<autopilot_common::RepeatPattern>> {
        let ids = self.store.lrange(&Self::service_index_key(service), 0, -1).await?;
        let mut patterns = Vec::new();
        for id_bytes in ids {
            let id = String::from_utf8_lossy(&id_bytes).to_string();
            if let Some(pattern) = self.load_pattern(&id).await? {
                patterns.push(pattern);
            }
        }
        patterns.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));
        Ok(patterns)
    }

    async fn permanent_fixes(&self, service: Option<&str>) -> Result<Vec<PermanentFixRecord>> {
        let key = match service {
            Some(s) => format!("permanent_fixes:{s}"),
            None => "permanent_fixes".to_string(),
        };
        let raw = self.store.lrange(&key, 0, 99).await?;
        raw.iter().map(|bytes| serde_json::from_slice(bytes).map_err(Error::MalformedInput)).collect()
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        self.store.health_check().await
    }
}

pub async fn create_repeat_eliminator(
    store: Arc<dyn KeyValueStore>,
    action_executor: Arc<dyn ActionExecutor>,
    config: RepeatConfig,
) -> Result<Arc<dyn RepeatEliminator + Send + Sync>> {
    Ok(Arc::new(StandardRepeatEliminator::new(store, action_executor, config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_common::Severity;
    use autopilot_executor::{create_action_executor, default_providers};
    use autopilot_store::MemoryStore;

    fn incident(service: &str, symptom: &str, root_cause: &str) -> Incident {
        Incident {
            incident_id: "inc-1".to_string(),
            fingerprint: "abc123abc123abc123abc123".to_string(),
            service: service.to_string(),
            category: "kubernetes".to_string(),
            subcategory: "pod_crash".to_string(),
            severity: Severity::High,
            symptoms: vec![symptom.to_string()],
            signals: vec![],
            matched_patterns: vec![],
            best_pattern_id: None,
            pattern_confidence: 0.0,
            root_cause: root_cause.to_string(),
            root_cause_confidence: 80.0,
            contributing_factors: vec![],
            similar_incident_count: 0,
            historical_success_rate: 0.0,
            avg_resolution_seconds: 120.0,
            recommended_actions: vec![],
            autonomous_safe: false,
            autonomous_reason: String::new(),
            blast_radius: autopilot_common::BlastRadius::Low,
            affected_services: vec![service.to_string()],
            predicted_resolution_seconds: 120.0,
            recurrence_probability: 0.2,
            timestamp: Utc::now(),
        }
    }

    async fn build() -> StandardRepeatEliminator {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let executor_config = autopilot_common::Config::default().executor;
        let action_executor = create_action_executor(store.clone(), default_providers(), executor_config).await.unwrap();
        StandardRepeatEliminator::new(store, action_executor, autopilot_common::Config::default().repeat)
    }

    #[tokio::test]
    async fn occurrence_count_increments_and_triggers_prevention_at_threshold() {
        let eliminator = build().await;
        let inc = incident("api", "High memory_usage_percent: 95", "Pod OOMKilled");

        let (_, c1, p1) = eliminator.record_occurrence(&inc, &["restart_service".to_string()], false).await.unwrap();
        assert_eq!(c1, 1);
        assert!(!p1);

        let (_, c2, p2) = eliminator.record_occurrence(&inc, &["restart_service".to_string()], false).await.unwrap();
        assert_eq!(c2, 2);
        assert!(!p2);

        let (_, c3, p3) = eliminator.record_occurrence(&inc, &["restart_service".to_string()], false).await.unwrap();
        assert_eq!(c3, 3);
        assert!(p3);
    }

    #[tokio::test]
    async fn apply_preventive_marks_permanent_fix_on_success() {
        let eliminator = build().await;
        let inc = incident("api", "High memory_usage_percent: 95", "Pod OOMKilled");
        for _ in 0..3 {
            eliminator.record_occurrence(&inc, &[], false).await.unwrap();
        }

        let outcome = eliminator.apply_preventive(&inc).await.unwrap();
        assert!(outcome.applied);

        let patterns = eliminator.patterns_for_service("api").await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].permanent_fix_applied);

        let fixes = eliminator.permanent_fixes(Some("api")).await.unwrap();
        assert_eq!(fixes.len(), 1);
    }

    #[tokio::test]
    async fn escalates_after_repeated_failures_without_fix() {
        let eliminator = build().await;
        let inc = incident("api", "High memory_usage_percent: 95", "Pod OOMKilled");
        for _ in 0..5 {
            eliminator.record_occurrence(&inc, &[], false).await.unwrap();
        }
        let patterns = eliminator.patterns_for_service("api").await.unwrap();
        assert!(patterns[0].escalated);
    }
}
