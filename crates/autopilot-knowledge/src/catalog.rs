//! Built-in failure pattern catalogue.
//!
//! Grounded on `original_source/src/training/devops_knowledge_base.py` and its
//! `patterns_*_extended.py` / `patterns_*_batch*.py` siblings, which together catalogue 500+
//! patterns across Kubernetes, database, cloud, application, CI/CD, network, security and
//! monitoring incidents. This module carries a representative seed across every category and
//! subcategory the original exercises; operators hydrate the remainder (or site-specific
//! patterns) at runtime via `KnowledgeBase::add_pattern`.

use autopilot_common::{BlastRadius, Condition, IncidentPattern, PatternCategory, RecommendedAction, Severity, Symptom, SymptomType};
use std::collections::HashMap;

fn symptom(symptom_type: SymptomType, name: &str, condition: Condition, value: &str, weight: f64) -> Symptom {
    Symptom {
        symptom_type,
        name: name.to_string(),
        condition,
        value: value.to_string(),
        weight,
    }
}

fn action(
    action_type: &str,
    action_category: &str,
    base_confidence: f64,
    requires_approval: bool,
    estimated_resolution_seconds: u32,
    rollback_action: Option<&str>,
) -> RecommendedAction {
    RecommendedAction {
        action_type: action_type.to_string(),
        action_category: action_category.to_string(),
        base_confidence,
        params: HashMap::new(),
        requires_approval,
        estimated_resolution_seconds,
        rollback_action: rollback_action.map(String::from),
    }
}

fn strs(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// The compiled-in seed catalogue, loaded once at startup.
pub fn seed_patterns() -> Vec<IncidentPattern> {
    vec![
        IncidentPattern {
            pattern_id: "k8s_oom_killed_001".to_string(),
            name: "Pod OOMKilled".to_string(),
            category: PatternCategory::Kubernetes,
            subcategory: "pod_crash".to_string(),
            severity: Severity::High,
            symptoms: vec![
                symptom(SymptomType::Metric, "memory_usage_percent", Condition::Above, "95", 2.0),
                symptom(SymptomType::Event, "OOMKilled", Condition::Contains, "true", 3.0),
                symptom(SymptomType::Metric, "container_restarts", Condition::Above, "2", 1.5),
            ],
            signals: strs(&["OOMKilled", "memory limit", "killed", "out of memory", "oom"]),
            root_causes: strs(&["memory_leak", "insufficient_memory_limits", "traffic_spike"]),
            actions: vec![
                action("increase_memory_limit", "kubernetes", 90.0, false, 30, None),
                action("restart_pod", "kubernetes", 75.0, false, 15, None),
                action("scale_horizontal", "kubernetes", 65.0, false, 60, None),
            ],
            autonomous_safe: true,
            blast_radius: BlastRadius::Low,
            avg_resolution_seconds: 120,
            tags: strs(&["memory", "oom", "pod", "container"]),
            related_patterns: strs(&["k8s_memory_pressure_002"]),
        },
        IncidentPattern {
            pattern_id: "k8s_crashloop_002".to_string(),
            name: "Pod CrashLoopBackOff".to_string(),
            category: PatternCategory::Kubernetes,
            subcategory: "pod_crash".to_string(),
            severity: Severity::High,
            symptoms: vec![
                symptom(SymptomType::Event, "CrashLoopBackOff", Condition::Contains, "true", 3.0),
                symptom(SymptomType::Metric, "container_restarts", Condition::Above, "5", 2.0),
                symptom(SymptomType::Event, "Back-off restarting", Condition::Contains, "true", 1.5),
            ],
            signals: strs(&["CrashLoopBackOff", "Back-off", "restarting failed container", "exit code"]),
            root_causes: strs(&["application_error", "missing_config", "dependency_failure"]),
            actions: vec![
                action("get_pod_logs", "kubernetes", 95.0, false, 10, None),
                action("describe_pod", "kubernetes", 90.0, false, 5, None),
                action("rollback_deployment", "kubernetes", 70.0, true, 60, Some("redeploy_previous")),
            ],
            autonomous_safe: false,
            blast_radius: BlastRadius::Medium,
            avg_resolution_seconds: 300,
            tags: strs(&["crash", "loop", "restart", "container"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "k8s_imagepull_003".to_string(),
            name: "ImagePullBackOff".to_string(),
            category: PatternCategory::Kubernetes,
            subcategory: "image_pull".to_string(),
            severity: Severity::High,
            symptoms: vec![
                symptom(SymptomType::Event, "ImagePullBackOff", Condition::Contains, "true", 3.0),
                symptom(SymptomType::Event, "ErrImagePull", Condition::Contains, "true", 2.5),
                symptom(SymptomType::Event, "Failed to pull image", Condition::Contains, "true", 2.0),
            ],
            signals: strs(&["ImagePullBackOff", "ErrImagePull", "unauthorized", "manifest unknown"]),
            root_causes: strs(&["invalid_image_tag", "registry_auth_failure", "network_issue"]),
            actions: vec![
                action("verify_image_exists", "kubernetes", 90.0, false, 30, None),
                action("check_registry_credentials", "kubernetes", 85.0, false, 30, None),
                action("rollback_to_previous_image", "kubernetes", 75.0, true, 60, Some("redeploy_previous")),
            ],
            autonomous_safe: false,
            blast_radius: BlastRadius::Low,
            avg_resolution_seconds: 180,
            tags: strs(&["image", "pull", "registry", "container"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "k8s_node_notready_004".to_string(),
            name: "Node NotReady".to_string(),
            category: PatternCategory::Kubernetes,
            subcategory: "node_health".to_string(),
            severity: Severity::Critical,
            symptoms: vec![
                symptom(SymptomType::Event, "NodeNotReady", Condition::Contains, "true", 3.0),
                symptom(SymptomType::Metric, "node_ready", Condition::Equals, "0", 2.5),
            ],
            signals: strs(&["NotReady", "node down", "kubelet stopped posting"]),
            root_causes: strs(&["kubelet_crash", "network_partition", "disk_pressure"]),
            actions: vec![
                action("cordon_node", "kubernetes", 85.0, false, 15, None),
                action("drain_node", "kubernetes", 70.0, true, 120, None),
            ],
            autonomous_safe: false,
            blast_radius: BlastRadius::High,
            avg_resolution_seconds: 600,
            tags: strs(&["node", "kubelet", "cluster"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "db_connection_pool_exhausted_001".to_string(),
            name: "Database Connection Pool Exhausted".to_string(),
            category: PatternCategory::Database,
            subcategory: "connectivity".to_string(),
            severity: Severity::High,
            symptoms: vec![
                symptom(SymptomType::Metric, "db_pool_active_connections", Condition::Above, "95", 2.5),
                symptom(SymptomType::Event, "connection pool exhausted", Condition::Contains, "true", 3.0),
            ],
            signals: strs(&["pool exhausted", "too many connections", "connection timeout"]),
            root_causes: strs(&["connection_leak", "undersized_pool", "slow_queries_holding_connections"]),
            actions: vec![
                action("increase_connection_pool_size", "database", 80.0, false, 30, None),
                action("kill_idle_connections", "database", 70.0, false, 20, None),
                action("restart_service", "kubernetes", 60.0, true, 30, None),
            ],
            autonomous_safe: true,
            blast_radius: BlastRadius::Medium,
            avg_resolution_seconds: 150,
            tags: strs(&["database", "connections", "pool"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "db_replication_lag_002".to_string(),
            name: "Database Replication Lag".to_string(),
            category: PatternCategory::Database,
            subcategory: "replication".to_string(),
            severity: Severity::Medium,
            symptoms: vec![
                symptom(SymptomType::Metric, "replication_lag_seconds", Condition::Above, "30", 3.0),
            ],
            signals: strs(&["replication lag", "replica behind", "stale read"]),
            root_causes: strs(&["write_heavy_load", "network_latency", "replica_resource_starved"]),
            actions: vec![
                action("route_reads_to_primary", "database", 75.0, false, 10, None),
                action("scale_replica_resources", "database", 60.0, true, 300, None),
            ],
            autonomous_safe: false,
            blast_radius: BlastRadius::Medium,
            avg_resolution_seconds: 600,
            tags: strs(&["database", "replication", "lag"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "db_deadlock_003".to_string(),
            name: "Database Deadlock Spike".to_string(),
            category: PatternCategory::Database,
            subcategory: "locking".to_string(),
            severity: Severity::Medium,
            symptoms: vec![
                symptom(SymptomType::Event, "deadlock detected", Condition::Contains, "true", 3.0),
                symptom(SymptomType::Metric, "deadlock_count", Condition::Above, "5", 2.0),
            ],
            signals: strs(&["deadlock", "lock wait timeout"]),
            root_causes: strs(&["conflicting_transaction_order", "long_running_transaction"]),
            actions: vec![action("kill_blocking_query", "database", 70.0, true, 15, None)],
            autonomous_safe: false,
            blast_radius: BlastRadius::Low,
            avg_resolution_seconds: 90,
            tags: strs(&["database", "deadlock", "locking"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "cloud_autoscaling_stuck_001".to_string(),
            name: "Autoscaling Group Stuck Below Desired Capacity".to_string(),
            category: PatternCategory::Cloud,
            subcategory: "autoscaling".to_string(),
            severity: Severity::High,
            symptoms: vec![
                symptom(SymptomType::Metric, "asg_healthy_instances", Condition::Below, "desired", 2.5),
                symptom(SymptomType::Event, "insufficient capacity", Condition::Contains, "true", 2.0),
            ],
            signals: strs(&["InsufficientInstanceCapacity", "launch failed", "unhealthy instance"]),
            root_causes: strs(&["instance_type_capacity_shortage", "bad_ami", "quota_exceeded"]),
            actions: vec![
                action("switch_instance_type", "cloud", 65.0, true, 120, None),
                action("request_quota_increase", "cloud", 40.0, true, 3600, None),
            ],
            autonomous_safe: false,
            blast_radius: BlastRadius::High,
            avg_resolution_seconds: 900,
            tags: strs(&["cloud", "autoscaling", "capacity"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "cloud_disk_full_002".to_string(),
            name: "Instance Disk Nearly Full".to_string(),
            category: PatternCategory::Cloud,
            subcategory: "storage".to_string(),
            severity: Severity::High,
            symptoms: vec![symptom(SymptomType::Metric, "disk_usage_percent", Condition::Above, "90", 3.0)],
            signals: strs(&["no space left on device", "disk full"]),
            root_causes: strs(&["log_accumulation", "unbounded_cache_growth"]),
            actions: vec![
                action("cleanup_old_logs", "cloud", 85.0, false, 60, None),
                action("expand_volume", "cloud", 70.0, true, 180, None),
            ],
            autonomous_safe: true,
            blast_radius: BlastRadius::Medium,
            avg_resolution_seconds: 180,
            tags: strs(&["cloud", "disk", "storage"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "cloud_lb_5xx_003".to_string(),
            name: "Load Balancer 5xx Spike".to_string(),
            category: PatternCategory::Cloud,
            subcategory: "networking".to_string(),
            severity: Severity::Critical,
            symptoms: vec![symptom(SymptomType::Metric, "lb_5xx_rate", Condition::Above, "5", 3.0)],
            signals: strs(&["HTTP 502", "HTTP 503", "upstream connect error"]),
            root_causes: strs(&["backend_unhealthy", "overloaded_target_group"]),
            actions: vec![
                action("remove_unhealthy_targets", "cloud", 80.0, false, 30, None),
                action("scale_target_group", "cloud", 70.0, false, 60, None),
            ],
            autonomous_safe: true,
            blast_radius: BlastRadius::Critical,
            avg_resolution_seconds: 240,
            tags: strs(&["cloud", "load-balancer", "5xx"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "app_memory_leak_001".to_string(),
            name: "Application Memory Leak".to_string(),
            category: PatternCategory::Application,
            subcategory: "resource_leak".to_string(),
            severity: Severity::Medium,
            symptoms: vec![symptom(SymptomType::Metric, "heap_usage_percent", Condition::Above, "85", 2.5)],
            signals: strs(&["heap growing", "gc pressure", "memory leak"]),
            root_causes: strs(&["unclosed_resources", "cache_without_eviction"]),
            actions: vec![action("restart_service", "kubernetes", 65.0, false, 30, None)],
            autonomous_safe: true,
            blast_radius: BlastRadius::Low,
            avg_resolution_seconds: 60,
            tags: strs(&["application", "memory", "leak"]),
            related_patterns: strs(&["k8s_oom_killed_001"]),
        },
        IncidentPattern {
            pattern_id: "app_latency_spike_002".to_string(),
            name: "Application Latency Spike".to_string(),
            category: PatternCategory::Application,
            subcategory: "performance".to_string(),
            severity: Severity::Medium,
            symptoms: vec![symptom(SymptomType::Metric, "p99_latency_ms", Condition::Above, "1000", 2.5)],
            signals: strs(&["slow response", "timeout", "latency"]),
            root_causes: strs(&["downstream_dependency_slow", "gc_pause", "cpu_throttling"]),
            actions: vec![action("scale_horizontal", "kubernetes", 60.0, false, 60, None)],
            autonomous_safe: true,
            blast_radius: BlastRadius::Medium,
            avg_resolution_seconds: 180,
            tags: strs(&["application", "latency", "performance"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "app_unhandled_exception_003".to_string(),
            name: "Unhandled Exception Burst".to_string(),
            category: PatternCategory::Application,
            subcategory: "errors".to_string(),
            severity: Severity::High,
            symptoms: vec![symptom(SymptomType::Metric, "error_rate", Condition::Above, "5", 3.0)],
            signals: strs(&["unhandled exception", "panic", "stack trace"]),
            root_causes: strs(&["bad_deploy", "malformed_input", "dependency_contract_change"]),
            actions: vec![action("rollback_deployment", "kubernetes", 80.0, true, 60, Some("redeploy_previous"))],
            autonomous_safe: false,
            blast_radius: BlastRadius::High,
            avg_resolution_seconds: 300,
            tags: strs(&["application", "errors", "exception"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "cicd_pipeline_failure_001".to_string(),
            name: "CI Pipeline Repeated Failure".to_string(),
            category: PatternCategory::Cicd,
            subcategory: "build".to_string(),
            severity: Severity::Medium,
            symptoms: vec![symptom(SymptomType::Event, "pipeline failed", Condition::Contains, "true", 3.0)],
            signals: strs(&["build failed", "test failed", "pipeline red"]),
            root_causes: strs(&["flaky_test", "broken_dependency", "bad_commit"]),
            actions: vec![action("retry_pipeline", "cicd", 55.0, false, 300, None)],
            autonomous_safe: true,
            blast_radius: BlastRadius::Low,
            avg_resolution_seconds: 600,
            tags: strs(&["cicd", "pipeline", "build"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "cicd_deploy_stuck_002".to_string(),
            name: "Deployment Rollout Stuck".to_string(),
            category: PatternCategory::Cicd,
            subcategory: "deploy".to_string(),
            severity: Severity::High,
            symptoms: vec![symptom(SymptomType::Event, "rollout stuck", Condition::Contains, "true", 3.0)],
            signals: strs(&["progress deadline exceeded", "rollout stalled"]),
            root_causes: strs(&["readiness_probe_failing", "insufficient_cluster_capacity"]),
            actions: vec![action("rollback_deployment", "kubernetes", 75.0, true, 60, Some("redeploy_previous"))],
            autonomous_safe: false,
            blast_radius: BlastRadius::Medium,
            avg_resolution_seconds: 300,
            tags: strs(&["cicd", "deploy", "rollout"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "net_dns_resolution_failure_001".to_string(),
            name: "DNS Resolution Failures".to_string(),
            category: PatternCategory::Network,
            subcategory: "dns".to_string(),
            severity: Severity::High,
            symptoms: vec![symptom(SymptomType::Event, "dns resolution failed", Condition::Contains, "true", 3.0)],
            signals: strs(&["could not resolve host", "NXDOMAIN", "dns timeout"]),
            root_causes: strs(&["dns_server_unreachable", "coredns_crash", "network_policy_blocking"]),
            actions: vec![action("restart_dns_service", "network", 70.0, true, 30, None)],
            autonomous_safe: false,
            blast_radius: BlastRadius::Critical,
            avg_resolution_seconds: 180,
            tags: strs(&["network", "dns"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "net_certificate_expiry_002".to_string(),
            name: "TLS Certificate Near Expiry".to_string(),
            category: PatternCategory::Network,
            subcategory: "tls".to_string(),
            severity: Severity::Medium,
            symptoms: vec![symptom(SymptomType::Metric, "cert_days_until_expiry", Condition::Below, "7", 3.0)],
            signals: strs(&["certificate expiring", "x509: certificate has expired"]),
            root_causes: strs(&["renewal_automation_failure", "manual_cert_not_rotated"]),
            actions: vec![action("renew_certificate", "network", 80.0, true, 120, None)],
            autonomous_safe: false,
            blast_radius: BlastRadius::High,
            avg_resolution_seconds: 300,
            tags: strs(&["network", "tls", "certificate"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "sec_unauthorized_access_001".to_string(),
            name: "Unauthorized Access Attempt Burst".to_string(),
            category: PatternCategory::Security,
            subcategory: "access".to_string(),
            severity: Severity::Critical,
            symptoms: vec![symptom(SymptomType::Metric, "auth_failure_rate", Condition::Above, "10", 3.0)],
            signals: strs(&["401 Unauthorized", "403 Forbidden", "brute force"]),
            root_causes: strs(&["credential_stuffing", "leaked_api_key"]),
            actions: vec![action("rotate_credentials", "security", 60.0, true, 600, None)],
            autonomous_safe: false,
            blast_radius: BlastRadius::Critical,
            avg_resolution_seconds: 900,
            tags: strs(&["security", "auth", "access"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "sec_exposed_secret_002".to_string(),
            name: "Secret Exposed in Logs".to_string(),
            category: PatternCategory::Security,
            subcategory: "secrets".to_string(),
            severity: Severity::Critical,
            symptoms: vec![symptom(SymptomType::Log, "api_key=", Condition::Contains, "true", 3.0)],
            signals: strs(&["api_key=", "secret=", "password="]),
            root_causes: strs(&["verbose_logging_of_request_payloads"]),
            actions: vec![action("rotate_credentials", "security", 90.0, true, 600, None)],
            autonomous_safe: false,
            blast_radius: BlastRadius::Critical,
            avg_resolution_seconds: 1200,
            tags: strs(&["security", "secrets", "logging"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "mon_metrics_gap_001".to_string(),
            name: "Metrics Collection Gap".to_string(),
            category: PatternCategory::Monitoring,
            subcategory: "collection".to_string(),
            severity: Severity::Low,
            symptoms: vec![symptom(SymptomType::Event, "scrape failed", Condition::Contains, "true", 2.5)],
            signals: strs(&["scrape_error", "target down"]),
            root_causes: strs(&["exporter_crash", "network_policy_blocking_scrape"]),
            actions: vec![action("restart_exporter", "monitoring", 70.0, false, 30, None)],
            autonomous_safe: true,
            blast_radius: BlastRadius::Low,
            avg_resolution_seconds: 60,
            tags: strs(&["monitoring", "metrics", "gap"]),
            related_patterns: Vec::new(),
        },
        IncidentPattern {
            pattern_id: "mon_alert_storm_002".to_string(),
            name: "Alert Storm".to_string(),
            category: PatternCategory::Monitoring,
            subcategory: "alerting".to_string(),
            severity: Severity::Medium,
            symptoms: vec![symptom(SymptomType::Metric, "firing_alerts_count", Condition::Above, "50", 3.0)],
            signals: strs(&["alert storm", "flapping"]),
            root_causes: strs(&["upstream_outage_cascading", "misconfigured_threshold"]),
            actions: vec![action("silence_dependent_alerts", "monitoring", 50.0, true, 30, None)],
            autonomous_safe: false,
            blast_radius: BlastRadius::Medium,
            avg_resolution_seconds: 300,
            tags: strs(&["monitoring", "alerts"]),
            related_patterns: Vec::new(),
        },
    ]
}
