//! C5: compose a complete `Incident` record from raw signals, plus the optional AI root-cause
//! seam.
//!
//! Grounded on `original_source/src/analysis/incident_analyzer.py` for the composition steps
//! (fingerprint, symptom/signal extraction, category rules, root-cause heuristics, action
//! ranking, blast-radius and recurrence-probability formulas).

mod ai;
mod fingerprint;

pub use ai::{AiAnalysis, AiAnalyzer, AiRecommendedAction, NullAiAnalyzer};

use async_trait::async_trait;
use autopilot_common::config::AnalyzerConfig;
use autopilot_common::{
    Anomaly, BlastRadius, ComponentHealth, Error, Incident, PatternMatch, Result, ScoredAction, Severity,
};
use autopilot_knowledge::KnowledgeBase;
use autopilot_learning::LearningEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const SIGNAL_KEYWORDS: &[&str] = &[
    "oomkilled",
    "crashloopbackoff",
    "timeout",
    "connection refused",
    "out of memory",
    "disk full",
    "cpu throttling",
    "deadlock",
    "replication lag",
    "certificate expired",
    "authentication failed",
    "rate limit",
    "quota exceeded",
    "health check failed",
];

const SENSITIVE_SERVICE_MARKERS: &[&str] = &["auth", "payment", "database", "gateway"];

/// Extra signals beyond the raw anomalies the analyzer needs to fill out contributing factors
/// and the deployment-correlated root cause. All optional because most are best-effort.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub service: String,
    pub anomalies: Vec<Anomaly>,
    pub logs: Vec<String>,
    pub recent_deployment_minutes_ago: Option<i64>,
    pub pre_incident_cpu_pct: Option<f64>,
    pub pre_incident_mem_pct: Option<f64>,
    pub traffic_ratio_to_average: Option<f64>,
}

/// The C5 collaborator contract.
#[async_trait]
pub trait IncidentAnalyzer: Send + Sync {
    async fn analyze(&self, ctx: AnalysisContext) -> Result<Incident>;
    async fn get_incident(&self, incident_id: &str) -> Result<Option<Incident>>;
    async fn similar_incidents(&self, service: &str, fingerprint: &str) -> Result<Vec<Incident>>;
    async fn health_check(&self) -> Result<ComponentHealth>;
}

pub struct StandardIncidentAnalyzer {
    store: Arc<dyn autopilot_store::KeyValueStore>,
    knowledge: Arc<dyn KnowledgeBase>,
    learning: Arc<dyn LearningEngine>,
    ai: Arc<dyn AiAnalyzer>,
    config: AnalyzerConfig,
}

impl StandardIncidentAnalyzer {
    pub fn new(
        store: Arc<dyn autopilot_store::KeyValueStore>,
        knowledge: Arc<dyn KnowledgeBase>,
        learning: Arc<dyn LearningEngine>,
        ai: Arc<dyn AiAnalyzer>,
        config: AnalyzerConfig,
    ) -> Self {
        Self { store, knowledge, learning, ai, config }
    }

    fn extract_symptoms(anomalies: &[Anomaly]) -> Vec<String> {
        anomalies
            .iter()
            .map(|a| format!("High {}: {:.2} (threshold: {:.2})", a.metric, a.value, a.mean))
            .collect()
    }

    fn extract_signals(anomalies: &[Anomaly], logs: &[String]) -> Vec<String> {
        let mut corpus = logs.join(" ").to_lowercase();
        corpus.push(' ');
        corpus.push_str(&anomalies.iter().map(|a| a.as_text()).collect::<Vec<_>>().join(" "));

        SIGNAL_KEYWORDS
            .iter()
            .filter(|kw| corpus.contains(*kw))
            .map(|kw| kw.to_string())
            .collect()
    }

    fn max_severity(anomalies: &[Anomaly]) -> Severity {
        anomalies.iter().map(|a| a.severity).max().unwrap_or(Severity::Low)
    }

    fn categorize(anomalies: &[Anomaly], logs: &[String]) -> (String, String) {
        let mut corpus = logs.join(" ").to_lowercase();
        corpus.push(' ');
        corpus.push_str(&anomalies.iter().map(|a| a.metric.to_lowercase()).collect::<Vec<_>>().join(" "));

        let contains_any = |needles: &[&str]| needles.iter().any(|n| corpus.contains(n));

        if contains_any(&["pod", "container", "kubelet", "node"]) {
            ("kubernetes".to_string(), "pod_or_node".to_string())
        } else if contains_any(&["mysql", "postgres", "mongodb", "redis", "connection pool"]) {
            ("database".to_string(), "connectivity".to_string())
        } else if contains_any(&["latency", "packet_loss", "timeout"]) {
            ("network".to_string(), "latency_or_loss".to_string())
        } else if contains_any(&["error_rate", "5xx", "exception"]) {
            ("application".to_string(), "errors".to_string())
        } else if contains_any(&["cpu", "memory"]) {
            ("application".to_string(), "resource_pressure".to_string())
        } else {
            ("unknown".to_string(), "unknown".to_string())
        }
    }

    async fn load_incident(&self, key: &str) -> Result<Option<Incident>> {
        match self.store.get(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(Error::MalformedInput),
            None => Ok(None),
        }
    }

    async fn fingerprint_matches(&self, fp: &str) -> Result<Vec<Incident>> {
        let key = format!("incidents:by_fingerprint:{fp}");
        let ids = self.store.lrange(&key, 0, 9).await?;
        let mut out = Vec::new();
        for id in ids {
            if let Ok(id) = String::from_utf8(id) {
                if let Some(incident) = self.load_incident(&format!("incident_analysis:{id}")).await? {
                    out.push(incident);
                }
            }
        }
        Ok(out)
    }

    async fn service_history(&self, service: &str) -> Result<Vec<Incident>> {
        let key = format!("incidents:by_service:{service}");
        let ids = self.store.lrange(&key, 0, 49).await?;
        let mut out = Vec::new();
        for id in ids {
            if let Ok(id) = String::from_utf8(id) {
                if let Some(incident) = self.load_incident(&format!("incident_analysis:{id}")).await? {
                    out.push(incident);
                }
            }
        }
        Ok(out)
    }

    fn symptom_overlap(a: &[String], b: &[String]) -> usize {
        a.iter().filter(|s| b.contains(s)).count()
    }

    async fn rank_actions(&self, matches: &[PatternMatch]) -> Result<Vec<ScoredAction>> {
        let mut scored = Vec::new();
        for m in matches {
            let Some(pattern) = self.knowledge.get_pattern(&m.pattern_id).await? else { continue };
            for action in &pattern.actions {
                let historical_rate = self
                    .learning
                    .action_success_rate(&action.action_category, &action.action_type)
                    .await?;
                let combined = 0.6 * action.base_confidence + 0.4 * 100.0 * historical_rate;
                scored.push(ScoredAction {
                    action_type: action.action_type.clone(),
                    action_category: action.action_category.clone(),
                    confidence: combined,
                    params: action.params.clone(),
                    requires_approval: action.requires_approval,
                });
            }
        }
        scored.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        scored.truncate(self.config.top_actions);
        Ok(scored)
    }

    fn blast_radius(&self, service: &str, affected: &[String]) -> BlastRadius {
        let mut radius = match affected.len() {
            0 | 1 => BlastRadius::Low,
            2..=3 => BlastRadius::Medium,
            _ => BlastRadius::High,
        };
        let sensitive = SENSITIVE_SERVICE_MARKERS.iter().any(|m| service.to_lowercase().contains(m));
        if sensitive {
            radius = match radius {
                BlastRadius::Low => BlastRadius::Medium,
                BlastRadius::Medium => BlastRadius::High,
                BlastRadius::High | BlastRadius::Critical => BlastRadius::Critical,
            };
        }
        radius
    }

    fn recurrence_probability(prior_occurrences: usize) -> f64 {
        if prior_occurrences >= 5 {
            0.9
        } else if prior_occurrences >= 3 {
            0.7
        } else if prior_occurrences >= 1 {
            0.5
        } else {
            0.2
        }
    }
}

#[async_trait]
impl IncidentAnalyzer for StandardIncidentAnalyzer {
    async fn analyze(&self, ctx: AnalysisContext) -> Result<Incident> {
        let fp = fingerprint::fingerprint(&ctx.service, &ctx.anomalies);
        let symptoms = Self::extract_symptoms(&ctx.anomalies);
        let signals = Self::extract_signals(&ctx.anomalies, &ctx.logs);
        let severity = Self::max_severity(&ctx.anomalies);
        let (category, subcategory) = Self::categorize(&ctx.anomalies, &ctx.logs);

        let matches = self.knowledge.match_patterns(&ctx.anomalies, &ctx.logs).await?;
        let top_matches: Vec<PatternMatch> = matches.into_iter().take(self.config.top_actions).collect();
        let best = top_matches.first().cloned();

        let pattern_confidence = match &best {
            Some(m) => self.learning.adjusted_confidence(&m.pattern_id, m.confidence).await?,
            None => 0.0,
        };

        let exact_matches = self.fingerprint_matches(&fp).await?;
        let prior_occurrences = exact_matches.len();
        let similar = if !exact_matches.is_empty() {
            exact_matches
        } else {
            let mut history = self.service_history(&ctx.service).await?;
            history.sort_by(|a, b| Self::symptom_overlap(&b.symptoms, &symptoms).cmp(&Self::symptom_overlap(&a.symptoms, &symptoms)));
            history.into_iter().take(10).collect()
        };

        let resolved_count = similar.iter().filter(|i| i.historical_success_rate > 0.0).count();
        let historical_success_rate = if similar.is_empty() { 0.0 } else { resolved_count as f64 / similar.len() as f64 };
        let resolution_samples: Vec<f64> = similar.iter().map(|i| i.avg_resolution_seconds).filter(|&v| v > 0.0).collect();
        let historical_avg_resolution =
            if resolution_samples.is_empty() { None } else { Some(resolution_samples.iter().sum::<f64>() / resolution_samples.len() as f64) };

        let best_pattern = match &best {
            Some(m) => self.knowledge.get_pattern(&m.pattern_id).await?,
            None => None,
        };

        // §4.4: the heuristic chain is the fallback path. Consult the AI seam first and prefer
        // its root cause when the call succeeds; only fall through to the heuristic chain on
        // `AnalyzerUnavailable`.
        let corpus = format!("{} {}", ctx.logs.join(" "), signals.join(" ")).to_lowercase();
        let (root_cause, root_cause_confidence, ai_analysis) = match self.ai.analyze(&ctx.service, &ctx.anomalies, &ctx.logs).await {
            Ok(analysis) => (analysis.root_cause_description.clone(), analysis.root_cause_confidence, Some(analysis)),
            Err(Error::AnalyzerUnavailable(reason)) => {
                debug!("AI analyzer unavailable ({reason}), falling back to the heuristic root-cause chain");
                let (cause, confidence) = if ctx.recent_deployment_minutes_ago.map(|m| m < 60).unwrap_or(false) {
                    ("Recent deployment change".to_string(), 85.0)
                } else if let Some(pattern) = &best_pattern {
                    (pattern.name.clone(), pattern_confidence)
                } else if corpus.contains("oomkilled") || corpus.contains("out of memory") {
                    ("Likely out-of-memory condition".to_string(), 90.0)
                } else if corpus.contains("connection") && corpus.contains("timeout") {
                    ("Likely connection timeout".to_string(), 75.0)
                } else {
                    ("Unknown — requires investigation".to_string(), 30.0)
                };
                (cause, confidence, None)
            }
            Err(e) => return Err(e),
        };

        let mut contributing_factors = Vec::new();
        if ctx.pre_incident_cpu_pct.map(|v| v > 80.0).unwrap_or(false) {
            contributing_factors.push("high pre-incident CPU utilization".to_string());
        }
        if ctx.pre_incident_mem_pct.map(|v| v > 85.0).unwrap_or(false) {
            contributing_factors.push("high pre-incident memory utilization".to_string());
        }
        if ctx.traffic_ratio_to_average.map(|v| v >= 1.5).unwrap_or(false) {
            contributing_factors.push("traffic at or above 1.5x average".to_string());
        }
        if ctx.recent_deployment_minutes_ago.is_some() {
            contributing_factors.push("recent deployment".to_string());
        }
        if ctx.anomalies.len() >= 4 {
            contributing_factors.push("multiple concurrent anomalies".to_string());
        }

        let recommended_actions = self.rank_actions(&top_matches).await?;

        let autonomous_safe_base = best.is_some() && pattern_confidence >= 70.0;
        let (autonomous_safe, autonomous_reason) = if !autonomous_safe_base {
            (false, "no sufficiently confident pattern match".to_string())
        } else {
            let verdict = self.learning.autonomy_verdict(&best.as_ref().unwrap().pattern_id).await?;
            let reason = if verdict.safe { "pattern promoted as autonomous-safe".to_string() } else { verdict.reasons.join("; ") };
            (verdict.safe, reason)
        };

        let affected_services = vec![ctx.service.clone()];
        let blast_radius = self.blast_radius(&ctx.service, &affected_services);

        let predicted_resolution_seconds = historical_avg_resolution
            .or_else(|| best_pattern.as_ref().map(|p| p.avg_resolution_seconds as f64))
            .unwrap_or(self.config.default_resolution_seconds);

        let recurrence_probability = if prior_occurrences == 0 && similar.is_empty() {
            0.1
        } else {
            Self::recurrence_probability(prior_occurrences)
        };

        if let Some(analysis) = ai_analysis {
            for factor in analysis.contributing_factors {
                if !contributing_factors.contains(&factor) {
                    contributing_factors.push(factor);
                }
            }
        }

        let incident = Incident {
            incident_id: Uuid::new_v4().to_string(),
            fingerprint: fp.clone(),
            service: ctx.service.clone(),
            category,
            subcategory,
            severity,
            symptoms,
            signals,
            matched_patterns: top_matches,
            best_pattern_id: best.map(|m| m.pattern_id),
            pattern_confidence,
            root_cause,
            root_cause_confidence,
            contributing_factors,
            similar_incident_count: similar.len() as u32,
            historical_success_rate,
            avg_resolution_seconds: predicted_resolution_seconds,
            recommended_actions,
            autonomous_safe,
            autonomous_reason,
            blast_radius,
            affected_services,
            predicted_resolution_seconds,
            recurrence_probability,
            timestamp: chrono::Utc::now(),
        };

        self.persist(&incident).await?;
        debug!(incident_id = %incident.incident_id, fingerprint = %fp, "composed incident analysis");
        Ok(incident)
    }

    async fn get_incident(&self, incident_id: &str) -> Result<Option<Incident>> {
        self.load_incident(&format!("incident_analysis:{incident_id}")).await
    }

    async fn similar_incidents(&self, service: &str, fp: &str) -> Result<Vec<Incident>> {
        let exact = self.fingerprint_matches(fp).await?;
        if !exact.is_empty() {
            return Ok(exact);
        }
        self.service_history(service).await
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        self.store.health_check().await
    }
}

impl StandardIncidentAnalyzer {
    async fn persist(&self, incident: &Incident) -> Result<()> {
        let bytes = serde_json::to_vec(incident)?;
        let ttl = Duration::from_secs(self.config.incident_ttl_days as u64 * 86_400);
        self.store.set(&format!("incident_analysis:{}", incident.incident_id), bytes, Some(ttl)).await?;

        let by_fp = format!("incidents:by_fingerprint:{}", incident.fingerprint);
        self.store.lpush(&by_fp, incident.incident_id.clone().into_bytes()).await?;
        self.store.ltrim(&by_fp, 0, self.config.incidents_by_key_cap as i64 - 1).await?;

        let by_svc = format!("incidents:by_service:{}", incident.service);
        self.store.lpush(&by_svc, incident.incident_id.clone().into_bytes()).await?;
        self.store.ltrim(&by_svc, 0, self.config.incidents_by_key_cap as i64 - 1).await?;

        Ok(())
    }
}

/// Construct the standard analyzer with a `NullAiAnalyzer` fallback.
pub async fn create_analyzer(
    store: Arc<dyn autopilot_store::KeyValueStore>,
    knowledge: Arc<dyn KnowledgeBase>,
    learning: Arc<dyn LearningEngine>,
    config: AnalyzerConfig,
) -> Result<Arc<dyn IncidentAnalyzer + Send + Sync>> {
    Ok(Arc::new(StandardIncidentAnalyzer::new(store, knowledge, learning, Arc::new(NullAiAnalyzer), config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_knowledge::create_knowledge_base;
    use autopilot_learning::create_learning_engine;
    use autopilot_store::MemoryStore;
    use chrono::Utc;

    fn anomaly(metric: &str, value: f64, mean: f64, severity: Severity) -> Anomaly {
        Anomaly {
            service: "api".to_string(),
            metric: metric.to_string(),
            value,
            mean,
            stddev: 1.0,
            z_score: 4.0,
            deviation_pct: 20.0,
            severity,
            detected_at: Utc::now(),
        }
    }

    async fn build_analyzer() -> StandardIncidentAnalyzer {
        let store: Arc<dyn autopilot_store::KeyValueStore> = Arc::new(MemoryStore::new());
        let knowledge = create_knowledge_base(store.clone(), autopilot_common::Config::default().knowledge).await.unwrap();
        let learning = create_learning_engine(store.clone(), autopilot_common::Config::default().learning).await.unwrap();
        StandardIncidentAnalyzer::new(store, knowledge, learning, Arc::new(NullAiAnalyzer), autopilot_common::Config::default().analyzer)
    }

    #[tokio::test]
    async fn composes_incident_from_oom_signals() {
        let analyzer = build_analyzer().await;
        let ctx = AnalysisContext {
            service: "api".to_string(),
            anomalies: vec![
                anomaly("memory_usage_percent", 97.0, 40.0, Severity::Critical),
                anomaly("container_restarts", 4.0, 0.0, Severity::High),
            ],
            logs: vec!["Pod api-5f6 OOMKilled by kubelet".to_string()],
            ..Default::default()
        };

        let incident = analyzer.analyze(ctx).await.unwrap();
        assert_eq!(incident.fingerprint.len(), 24);
        assert!(incident.signals.contains(&"oomkilled".to_string()));
        assert_eq!(incident.best_pattern_id.as_deref(), Some("k8s_oom_killed_001"));
        assert_eq!(incident.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn recent_deployment_dominates_root_cause() {
        let analyzer = build_analyzer().await;
        let ctx = AnalysisContext {
            service: "api".to_string(),
            anomalies: vec![anomaly("error_rate", 12.0, 1.0, Severity::High)],
            logs: vec!["unhandled exception in request handler".to_string()],
            recent_deployment_minutes_ago: Some(5),
            ..Default::default()
        };

        let incident = analyzer.analyze(ctx).await.unwrap();
        assert_eq!(incident.root_cause, "Recent deployment change");
        assert_eq!(incident.root_cause_confidence, 85.0);
    }

    #[tokio::test]
    async fn blast_radius_bumped_for_sensitive_service() {
        let analyzer = build_analyzer().await;
        let ctx = AnalysisContext {
            service: "payment-gateway".to_string(),
            anomalies: vec![anomaly("latency", 5.0, 1.0, Severity::Medium)],
            logs: vec![],
            ..Default::default()
        };
        let incident = analyzer.analyze(ctx).await.unwrap();
        assert_eq!(incident.blast_radius, BlastRadius::Medium);
    }

    struct FixedAiAnalyzer(AiAnalysis);

    #[async_trait]
    impl AiAnalyzer for FixedAiAnalyzer {
        async fn analyze(&self, _service: &str, _anomalies: &[Anomaly], _logs: &[String]) -> Result<AiAnalysis> {
            Ok(self.0.clone())
        }
    }

    struct FailingAiAnalyzer;

    #[async_trait]
    impl AiAnalyzer for FailingAiAnalyzer {
        async fn analyze(&self, _service: &str, _anomalies: &[Anomaly], _logs: &[String]) -> Result<AiAnalysis> {
            Err(Error::Generic(anyhow::anyhow!("model endpoint unreachable")))
        }
    }

    #[tokio::test]
    async fn ai_root_cause_wins_when_ai_seam_succeeds() {
        let store: Arc<dyn autopilot_store::KeyValueStore> = Arc::new(MemoryStore::new());
        let knowledge = create_knowledge_base(store.clone(), autopilot_common::Config::default().knowledge).await.unwrap();
        let learning = create_learning_engine(store.clone(), autopilot_common::Config::default().learning).await.unwrap();
        let ai = FixedAiAnalyzer(AiAnalysis {
            root_cause_description: "Upstream dependency degraded".to_string(),
            root_cause_confidence: 95.0,
            contributing_factors: vec!["ai-flagged dependency latency".to_string()],
            recommended_actions: Vec::new(),
            preventive_measures: Vec::new(),
        });
        let analyzer = StandardIncidentAnalyzer::new(store, knowledge, learning, Arc::new(ai), autopilot_common::Config::default().analyzer);

        let ctx = AnalysisContext {
            service: "api".to_string(),
            anomalies: vec![anomaly("memory_usage_percent", 97.0, 40.0, Severity::Critical)],
            logs: vec!["Pod api-5f6 OOMKilled by kubelet".to_string()],
            ..Default::default()
        };

        let incident = analyzer.analyze(ctx).await.unwrap();
        assert_eq!(incident.root_cause, "Upstream dependency degraded");
        assert_eq!(incident.root_cause_confidence, 95.0);
        assert!(incident.contributing_factors.contains(&"ai-flagged dependency latency".to_string()));
    }

    #[tokio::test]
    async fn ai_failure_other_than_unavailable_propagates() {
        let store: Arc<dyn autopilot_store::KeyValueStore> = Arc::new(MemoryStore::new());
        let knowledge = create_knowledge_base(store.clone(), autopilot_common::Config::default().knowledge).await.unwrap();
        let learning = create_learning_engine(store.clone(), autopilot_common::Config::default().learning).await.unwrap();
        let analyzer =
            StandardIncidentAnalyzer::new(store, knowledge, learning, Arc::new(FailingAiAnalyzer), autopilot_common::Config::default().analyzer);

        let ctx = AnalysisContext {
            service: "api".to_string(),
            anomalies: vec![anomaly("memory_usage_percent", 97.0, 40.0, Severity::Critical)],
            logs: vec!["Pod api-5f6 OOMKilled by kubelet".to_string()],
            ..Default::default()
        };

        assert!(analyzer.analyze(ctx).await.is_err());
    }

    #[tokio::test]
    async fn unknown_category_when_nothing_matches() {
        let analyzer = build_analyzer().await;
        let ctx = AnalysisContext {
            service: "widget".to_string(),
            anomalies: vec![anomaly("widget_spin_rate", 5.0, 1.0, Severity::Low)],
            logs: vec![],
            ..Default::default()
        };
        let incident = analyzer.analyze(ctx).await.unwrap();
        assert_eq!(incident.category, "unknown");
        assert_eq!(incident.root_cause_confidence, 30.0);
    }
}
