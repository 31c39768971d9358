//! C9: pre-deployment multi-factor risk scoring and the post-deploy rollback trigger policy.
//!
//! Grounded on `original_source/src/deployment/risk_analyzer.py` for the seven weighted factors
//! and `crates/mcp-common/src/autonomous_deployment.rs`'s `RiskAssessor` for the collaborator
//! shape (a scoring engine sitting in front of C1, consulted before and after a deploy).

pub mod criticality;

use async_trait::async_trait;
use autopilot_common::config::RiskConfig;
use autopilot_common::{Anomaly, ComponentHealth, DeploymentRiskAssessment, Error, Result, RiskFactor, RiskLevel, Severity};
use autopilot_store::KeyValueStore;
use chrono::{Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const CRITICAL_DEPENDENCIES: &[&str] = &["database-primary", "redis-cluster", "kafka-brokers", "api-gateway", "auth-service"];

/// Details about the change being deployed, beyond the bare version strings.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetails {
    pub database_migration: bool,
    pub config_change: bool,
    pub files_changed: u32,
}

/// One deployment outcome, recorded after the fact to build the historical-failure factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    pub version: String,
    pub failed: bool,
    pub rolled_back: bool,
    pub recorded_at: chrono::DateTime<Utc>,
}

/// The C9 collaborator contract.
#[async_trait]
pub trait DeploymentRiskAnalyzer: Send + Sync {
    async fn assess(
        &self,
        service: &str,
        new_version: &str,
        previous_version: Option<&str>,
        change_details: Option<&ChangeDetails>,
    ) -> Result<DeploymentRiskAssessment>;

    /// Post-deploy: should this deployment be rolled back given the current error rate?
    async fn should_auto_rollback(&self, deployment_id: &str, current_error_rate: f64) -> Result<(bool, String)>;

    /// Feed a deployment's outcome back into the historical-failure factor.
    async fn record_deployment_outcome(&self, service: &str, version: &str, failed: bool, rolled_back: bool) -> Result<()>;

    async fn assessments_for_service(&self, service: &str) -> Result<Vec<DeploymentRiskAssessment>>;

    async fn health_check(&self) -> Result<ComponentHealth>;
}

pub struct StandardDeploymentRiskAnalyzer {
    store: Arc<dyn KeyValueStore>,
    config: RiskConfig,
}

impl StandardDeploymentRiskAnalyzer {
    pub fn new(store: Arc<dyn KeyValueStore>, config: RiskConfig) -> Self {
        Self { store, config }
    }

    fn history_key(service: &str) -> String {
        format!("deployment_history:{service}")
    }

    fn assessment_key(deployment_id: &str) -> String {
        format!("risk_assessment:{deployment_id}")
    }

    fn service_assessments_key(service: &str) -> String {
        format!("risk_assessments:{service}")
    }

    async fn assess_historical_failures(&self, service: &str) -> Result<RiskFactor> {
        let raw = self.store.lrange(&Self::history_key(service), 0, 19).await?;
        if raw.is_empty() {
            return Ok(RiskFactor {
                name: "historical_failures".to_string(),
                score: 30.0,
                weight: self.config.weight_historical,
                details: "no deployment history available".to_string(),
                mitigations: vec!["build deployment history for better risk assessment".to_string()],
            });
        }

        let total = raw.len();
        let failures = raw
            .iter()
            .filter_map(|b| serde_json::from_slice::<DeploymentOutcome>(b).ok())
            .filter(|o| o.failed || o.rolled_back)
            .count();
        let failure_rate = failures as f64 / total as f64 * 100.0;

        let score = if failure_rate == 0.0 {
            10.0
        } else if failure_rate < 10.0 {
            25.0
        } else if failure_rate < 20.0 {
            45.0
        } else if failure_rate < 30.0 {
            65.0
        } else {
            85.0
        };

        let mitigations = if score > 40.0 {
            vec![
                "review past failure root causes".to_string(),
                "add more comprehensive testing".to_string(),
                "consider canary deployment".to_string(),
            ]
        } else {
            vec![]
        };

        Ok(RiskFactor {
            name: "historical_failures".to_string(),
            score,
            weight: self.config.weight_historical,
            details: format!("failure rate {failure_rate:.1}% ({failures}/{total} deployments)"),
            mitigations,
        })
    }

    fn assess_criticality(&self, service: &str) -> RiskFactor {
        let tier = criticality::identify_tier(service);
        let score = criticality::tier_score(tier);
        let mitigations = match tier {
            autopilot_common::Tier::Tier1 => vec![
                "consider deploying during a low-traffic window".to_string(),
                "ensure rollback procedure is tested".to_string(),
                "have incident response on standby".to_string(),
            ],
            autopilot_common::Tier::Tier2 => vec!["monitor closely after deployment".to_string(), "prepare rollback if needed".to_string()],
            _ => vec![],
        };
        RiskFactor {
            name: "service_criticality".to_string(),
            score,
            weight: self.config.weight_criticality,
            details: format!("service tier: {tier:?}"),
            mitigations,
        }
    }

    async fn assess_current_health(&self, service: &str) -> Result<RiskFactor> {
        let raw = self.store.lrange(&format!("recent_anomalies:{service}"), 0, 9).await?;
        let count = raw.len();
        let (score, details) = match count {
            0 => (15.0, "service is healthy - no recent anomalies".to_string()),
            1..=2 => (35.0, format!("minor issues: {count} recent anomalies")),
            3..=5 => (60.0, format!("degraded health: {count} recent anomalies")),
            _ => (85.0, format!("poor health: {count} recent anomalies")),
        };
        let mitigations = if score > 50.0 {
            vec![
                "wait for current issues to stabilize".to_string(),
                "address existing anomalies first".to_string(),
                "consider postponing deployment".to_string(),
            ]
        } else {
            vec![]
        };
        Ok(RiskFactor { name: "current_health".to_string(), score, weight: self.config.weight_current_health, details, mitigations })
    }

    fn assess_change_magnitude(previous_version: Option<&str>, new_version: &str, change: Option<&ChangeDetails>, weight: f64) -> RiskFactor {
        let (mut score, mut details) = match version_delta(previous_version, new_version) {
            VersionDelta::Major => (75.0, format!("major version change: {} -> {new_version}", previous_version.unwrap_or("?"))),
            VersionDelta::Minor => (45.0, format!("minor version change: {} -> {new_version}", previous_version.unwrap_or("?"))),
            VersionDelta::Patch => (20.0, format!("patch version change: {} -> {new_version}", previous_version.unwrap_or("?"))),
            VersionDelta::Unknown => (50.0, format!("version change: {} -> {new_version}", previous_version.unwrap_or("unknown"))),
        };

        if let Some(change) = change {
            if change.database_migration {
                score += 20.0;
                details.push_str(" (includes database migration)");
            }
            if change.config_change {
                score += 10.0;
                details.push_str(" (includes config changes)");
            }
            if change.files_changed > 100 {
                score += 15.0;
                details.push_str(&format!(" (large changeset: {} files)", change.files_changed));
            }
        }
        score = score.min(100.0);

        let mitigations = if score > 50.0 {
            vec![
                "consider breaking into smaller deployments".to_string(),
                "test thoroughly in staging first".to_string(),
                "plan for extended monitoring period".to_string(),
            ]
        } else {
            vec![]
        };

        RiskFactor { name: "change_magnitude".to_string(), score, weight, details, mitigations }
    }

    fn assess_timing(weight: f64) -> RiskFactor {
        let now = Utc::now();
        let hour = now.hour();
        let weekday = now.weekday().num_days_from_monday();
        let is_friday = weekday == 4;
        let is_weekend = weekday >= 5;
        let is_late_night = hour >= 22 || hour < 6;
        let is_peak = (9..=18).contains(&hour) && weekday < 5;

        let (score, details) = if is_friday && hour >= 14 {
            (85.0, "Friday afternoon - high risk deployment window".to_string())
        } else if is_weekend {
            (70.0, "weekend deployment - reduced support availability".to_string())
        } else if is_late_night {
            (60.0, "late night deployment - reduced monitoring".to_string())
        } else if is_peak {
            (45.0, "peak hours - higher user impact potential".to_string())
        } else {
            (20.0, "good deployment window".to_string())
        };

        let mitigations = if score > 50.0 {
            vec![
                "consider deploying during business hours".to_string(),
                "avoid Friday deployments when possible".to_string(),
                "ensure on-call coverage is available".to_string(),
            ]
        } else {
            vec![]
        };

        RiskFactor { name: "deployment_timing".to_string(), score, weight, details, mitigations }
    }

    async fn assess_dependencies(&self, service: &str, weight: f64) -> Result<RiskFactor> {
        let mut unhealthy = Vec::new();
        for dep in CRITICAL_DEPENDENCIES {
            if *dep == service {
                continue;
            }
            let anomalies = self.store.lrange(&format!("recent_anomalies:{dep}"), 0, 4).await?;
            if anomalies.len() >= 3 {
                unhealthy.push(dep.to_string());
            }
        }

        let (score, details) = match unhealthy.len() {
            0 => (15.0, "all dependencies healthy".to_string()),
            1 => (45.0, format!("1 dependency has issues: {}", unhealthy[0])),
            2 => (65.0, format!("multiple dependencies have issues: {}", unhealthy.join(", "))),
            _ => (85.0, format!("critical: {} dependencies unhealthy", unhealthy.len())),
        };

        let mitigations = unhealthy.iter().map(|dep| format!("wait for {dep} to stabilize")).collect();

        Ok(RiskFactor { name: "dependencies_health".to_string(), score, weight, details, mitigations })
    }

    async fn assess_recent_incidents(&self, service: &str, weight: f64) -> Result<RiskFactor> {
        let raw = self.store.lrange(&format!("incidents:by_service:{service}"), 0, 9).await?;
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let recent_count = raw
            .iter()
            .filter_map(|b| serde_json::from_slice::<autopilot_common::Incident>(b).ok())
            .filter(|i| i.timestamp > cutoff)
            .count();

        let (score, details) = match recent_count {
            0 => (10.0, "no incidents in last 24 hours".to_string()),
            1 => (35.0, "1 incident in last 24 hours".to_string()),
            2..=3 => (60.0, format!("{recent_count} incidents in last 24 hours")),
            _ => (85.0, format!("high incident rate: {recent_count} in last 24 hours")),
        };

        let mitigations = if score > 40.0 {
            vec!["review recent incidents before deploying".to_string(), "ensure recent fixes are validated".to_string()]
        } else {
            vec![]
        };

        Ok(RiskFactor { name: "recent_incidents".to_string(), score, weight, details, mitigations })
    }

    fn recommendations(factors: &[RiskFactor], risk_level: RiskLevel) -> Vec<String> {
        let mut recs = Vec::new();
        match risk_level {
            RiskLevel::Critical => {
                recs.push("BLOCK: risk score too high - deployment not recommended".to_string());
                recs.push("address high-risk factors before proceeding".to_string());
            }
            RiskLevel::High => {
                recs.push("requires manual approval from a senior engineer".to_string());
                recs.push("enable intensive monitoring for 30 minutes post-deploy".to_string());
            }
            RiskLevel::Medium => {
                recs.push("deploy with enhanced monitoring".to_string());
                recs.push("keep rollback ready for 15 minutes".to_string());
            }
            RiskLevel::Low | RiskLevel::Minimal => {
                recs.push("low risk - safe to deploy".to_string());
            }
        }

        let mut sorted: Vec<&RiskFactor> = factors.iter().collect();
        sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        for factor in sorted {
            if factor.score >= 50.0 {
                recs.extend(factor.mitigations.iter().take(2).cloned());
            }
        }

        let mut seen = std::collections::HashSet::new();
        recs.retain(|r| seen.insert(r.clone()));
        recs.truncate(8);
        recs
    }
}

enum VersionDelta {
    Major,
    Minor,
    Patch,
    Unknown,
}

fn version_delta(previous: Option<&str>, new: &str) -> VersionDelta {
    let Some(previous) = previous else {
        return VersionDelta::Unknown;
    };
    let prev_parts: Vec<&str> = previous.split('.').collect();
    let new_parts: Vec<&str> = new.split('.').collect();
    if prev_parts.is_empty() || new_parts.is_empty() {
        return VersionDelta::Unknown;
    }
    if prev_parts[0] != new_parts[0] {
        return VersionDelta::Major;
    }
    if prev_parts.len() > 1 && new_parts.len() > 1 {
        if prev_parts[1] != new_parts[1] {
            return VersionDelta::Minor;
        }
        return VersionDelta::Patch;
    }
    VersionDelta::Unknown
}

fn risk_level(score: f64) -> RiskLevel {
    if score >= 80.0 {
        RiskLevel::Critical
    } else if score >= 60.0 {
        RiskLevel::High
    } else if score >= 40.0 {
        RiskLevel::Medium
    } else if score >= 20.0 {
        RiskLevel::Low
    } else {
        RiskLevel::Minimal
    }
}

fn rollback_threshold(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::Critical => 20.0,
        RiskLevel::High => 30.0,
        RiskLevel::Medium => 50.0,
        RiskLevel::Low => 70.0,
        RiskLevel::Minimal => 90.0,
    }
}

#[async_trait]
impl DeploymentRiskAnalyzer for StandardDeploymentRiskAnalyzer {
    async fn assess(
        &self,
        service: &str,
        new_version: &str,
        previous_version: Option<&str>,
        change_details: Option<&ChangeDetails>,
    ) -> Result<DeploymentRiskAssessment> {
        let historical = self.assess_historical_failures(service).await?;
        let criticality = self.assess_criticality(service);
        let health = self.assess_current_health(service).await?;
        let magnitude = Self::assess_change_magnitude(previous_version, new_version, change_details, self.config.weight_change_magnitude);
        let timing = Self::assess_timing(self.config.weight_timing);
        let dependencies = self.assess_dependencies(service, self.config.weight_dependencies).await?;
        let incidents = self.assess_recent_incidents(service, self.config.weight_recent).await?;

        let overall_score: f64 =
            [&historical, &criticality, &health, &magnitude, &timing, &dependencies, &incidents].iter().map(|f| f.score * f.weight).sum();
        let level = risk_level(overall_score);

        let should_proceed = overall_score < 80.0;
        let requires_approval = overall_score >= 60.0;
        let auto_rollback_enabled = overall_score >= 50.0;
        let rollback_confidence = (50.0 + historical.score * 0.3 + criticality.score * 0.2).min(90.0);

        let factors = vec![historical, criticality, health, magnitude, timing, dependencies, incidents];
        let recommendations = Self::recommendations(&factors, level);

        let deployment_id = format!("deploy_{service}_{}", Utc::now().timestamp());
        let assessment = DeploymentRiskAssessment {
            deployment_id: deployment_id.clone(),
            service: service.to_string(),
            version: new_version.to_string(),
            previous_version: previous_version.map(str::to_string),
            overall_score: (overall_score * 10.0).round() / 10.0,
            risk_level: level,
            factors,
            should_proceed,
            requires_approval,
            auto_rollback_enabled,
            rollback_threshold_minutes: 15,
            rollback_confidence: (rollback_confidence * 10.0).round() / 10.0,
            recommendations,
            assessed_at: Utc::now(),
            historical_context: format!("tier {:?}", criticality::identify_tier(service)),
        };

        let bytes = serde_json::to_vec(&assessment)?;
        self.store.set(&Self::assessment_key(&deployment_id), bytes.clone(), Some(Duration::from_secs(self.config.assessment_ttl_days as u64 * 86_400))).await?;
        self.store.lpush(&Self::service_assessments_key(service), bytes).await?;
        self.store.ltrim(&Self::service_assessments_key(service), 0, 99).await?;

        info!(service, version = new_version, score = assessment.overall_score, level = %level, "deployment risk assessed");
        Ok(assessment)
    }

    async fn should_auto_rollback(&self, deployment_id: &str, current_error_rate: f64) -> Result<(bool, String)> {
        let Some(bytes) = self.store.get(&Self::assessment_key(deployment_id)).await? else {
            let threshold = self.config.default_rollback_threshold_pct;
            return Ok(if current_error_rate >= threshold {
                (true, format!("error rate {current_error_rate:.1}% exceeds default threshold {threshold:.0}%"))
            } else {
                (false, "within acceptable limits".to_string())
            });
        };

        let assessment: DeploymentRiskAssessment = serde_json::from_slice(&bytes).map_err(Error::MalformedInput)?;
        if !assessment.auto_rollback_enabled {
            return Ok((false, "auto-rollback not enabled for this deployment".to_string()));
        }

        let threshold = rollback_threshold(assessment.risk_level);
        if current_error_rate >= threshold {
            Ok((true, format!("error rate {current_error_rate:.1}% exceeds threshold {threshold:.0}% for {:?} risk deployment", assessment.risk_level)))
        } else {
            Ok((false, format!("error rate {current_error_rate:.1}% within acceptable range")))
        }
    }

    async fn record_deployment_outcome(&self, service: &str, version: &str, failed: bool, rolled_back: bool) -> Result<()> {
        let record = DeploymentOutcome { version: version.to_string(), failed, rolled_back, recorded_at: Utc::now() };
        let bytes = serde_json::to_vec(&record)?;
        self.store.lpush(&Self::history_key(service), bytes).await?;
        self.store.ltrim(&Self::history_key(service), 0, 19).await
    }

    async fn assessments_for_service(&self, service: &str) -> Result<Vec<DeploymentRiskAssessment>> {
        let raw = self.store.lrange(&Self::service_assessments_key(service), 0, 19).await?;
        raw.iter().map(|b| serde_json::from_slice(b).map_err(Error::MalformedInput)).collect()
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        self.store.health_check().await
    }
}

pub async fn create_risk_analyzer(store: Arc<dyn KeyValueStore>, config: RiskConfig) -> Result<Arc<dyn DeploymentRiskAnalyzer + Send + Sync>> {
    Ok(Arc::new(StandardDeploymentRiskAnalyzer::new(store, config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_store::MemoryStore;

    fn config() -> RiskConfig {
        autopilot_common::Config::default().risk
    }

    #[tokio::test]
    async fn no_history_gives_moderate_default_score() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let analyzer = StandardDeploymentRiskAnalyzer::new(store, config());
        let assessment = analyzer.assess("checkout", "2.0.0", Some("1.5.0"), None).await.unwrap();
        assert!(assessment.overall_score > 0.0);
        assert_eq!(assessment.service, "checkout");
    }

    #[tokio::test]
    async fn tier1_service_scores_higher_than_tier4() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let analyzer = StandardDeploymentRiskAnalyzer::new(store, config());
        let critical = analyzer.assess("payment", "1.0.1", Some("1.0.0"), None).await.unwrap();

        let store2: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let analyzer2 = StandardDeploymentRiskAnalyzer::new(store2, config());
        let low = analyzer2.assess("dev-sandbox", "1.0.1", Some("1.0.0"), None).await.unwrap();

        assert!(critical.overall_score > low.overall_score);
    }

    #[tokio::test]
    async fn should_auto_rollback_uses_risk_adjusted_threshold() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let analyzer = StandardDeploymentRiskAnalyzer::new(store, config());
        let assessment = analyzer.assess("payment", "3.0.0", Some("1.0.0"), None).await.unwrap();

        let (rollback, _) = analyzer.should_auto_rollback(&assessment.deployment_id, 25.0).await.unwrap();
        assert!(rollback || !assessment.auto_rollback_enabled);
    }

    #[tokio::test]
    async fn missing_assessment_falls_back_to_default_threshold() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let analyzer = StandardDeploymentRiskAnalyzer::new(store, config());
        let (rollback, reason) = analyzer.should_auto_rollback("unknown-deploy", 90.0).await.unwrap();
        assert!(rollback);
        assert!(reason.contains("default threshold"));
    }
}
