//! C7: the `Action` state machine (`pending -> approved -> executing -> {success, failed,
//! cancelled}`) and its provider dispatch.
//!
//! Grounded on `original_source/src/actions/action_executor.py` for the transition table and the
//! per-`(actionType, service)` success-rate hash.

use crate::provider::{ActionProvider, ProviderResult};
use async_trait::async_trait;
use autopilot_common::config::ExecutorConfig;
use autopilot_common::{Action, ActionStatus, ComponentHealth, Error, Result, Risk};
use autopilot_store::KeyValueStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// The C7 collaborator contract.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn propose(
        &self,
        incident_id: &str,
        action_type: &str,
        service: &str,
        params: HashMap<String, serde_json::Value>,
        reasoning: &str,
        risk: Risk,
        proposed_by: &str,
    ) -> Result<Action>;

    async fn approve(&self, id: &str, approver: &str) -> Result<Action>;

    async fn execute(&self, id: &str) -> Result<Action>;

    async fn cancel(&self, id: &str) -> Result<Action>;

    async fn get(&self, id: &str) -> Result<Option<Action>>;

    async fn success_rate(&self, action_type: &str, service: &str) -> Result<(u64, u64)>;

    async fn health_check(&self) -> Result<ComponentHealth>;
}

pub struct StandardActionExecutor {
    store: Arc<dyn KeyValueStore>,
    providers: Vec<Arc<dyn ActionProvider>>,
    config: ExecutorConfig,
}

impl StandardActionExecutor {
    pub fn new(store: Arc<dyn KeyValueStore>, providers: Vec<Arc<dyn ActionProvider>>, config: ExecutorConfig) -> Self {
        Self { store, providers, config }
    }

    fn action_key(id: &str) -> String {
        format!("action:{id}")
    }

    async fn load(&self, id: &str) -> Result<Action> {
        let key = Self::action_key(id);
        match self.store.get(&key).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(Error::MalformedInput),
            None => Err(Error::InvalidState(format!("no action with id {id}"))),
        }
    }

    async fn save(&self, action: &Action) -> Result<()> {
        let bytes = serde_json::to_vec(action)?;
        let ttl = Duration::from_secs(self.config.action_ttl_hours as u64 * 3_600);
        self.store.set(&Self::action_key(&action.id), bytes, Some(ttl)).await
    }

    fn provider_for(&self, action_type: &str) -> &Arc<dyn ActionProvider> {
        self.providers
            .iter()
            .find(|p| p.supports(action_type))
            .expect("GenericProvider supports everything and must be registered")
    }

    async fn record_success_rate(&self, action_type: &str, service: &str, succeeded: bool) -> Result<()> {
        let key = format!("action_success_rate:{action_type}:{service}");
        self.store.hincr_by(&key, "total", 1).await?;
        if succeeded {
            self.store.hincr_by(&key, "success", 1).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ActionExecutor for StandardActionExecutor {
    async fn propose(
        &self,
        incident_id: &str,
        action_type: &str,
        service: &str,
        params: HashMap<String, serde_json::Value>,
        reasoning: &str,
        risk: Risk,
        proposed_by: &str,
    ) -> Result<Action> {
        let action = Action {
            id: Uuid::new_v4().to_string(),
            incident_id: incident_id.to_string(),
            action_type: action_type.to_string(),
            service: service.to_string(),
            params,
            reasoning: reasoning.to_string(),
            risk,
            status: ActionStatus::Pending,
            proposed_at: Utc::now(),
            proposed_by: proposed_by.to_string(),
            approved_by: None,
            approved_at: None,
            executed_at: None,
            completed_at: None,
            result: None,
            error: None,
        };
        self.save(&action).await?;
        self.store.lpush("actions:pending", action.id.clone().into_bytes()).await?;
        self.store.lpush(&format!("actions:by_service:{service}"), action.id.clone().into_bytes()).await?;
        debug!(action_id = %action.id, action_type, service, "proposed action");
        Ok(action)
    }

    async fn approve(&self, id: &str, approver: &str) -> Result<Action> {
        let mut action = self.load(id).await?;
        if action.status != ActionStatus::Pending {
            return Err(Error::InvalidState(format!("cannot approve action {id} from status {:?}", action.status)));
        }
        action.status = ActionStatus::Approved;
        action.approved_by = Some(approver.to_string());
        action.approved_at = Some(Utc::now());
        self.save(&action).await?;
        self.store.lrem("actions:pending", action.id.as_bytes()).await?;
        self.store.lpush("actions:approved", action.id.clone().into_bytes()).await?;
        Ok(action)
    }

    async fn execute(&self, id: &str) -> Result<Action> {
        let mut action = self.load(id).await?;
        if action.status != ActionStatus::Approved {
            return Err(Error::InvalidState(format!("cannot execute action {id} from status {:?}", action.status)));
        }
        action.status = ActionStatus::Executing;
        action.executed_at = Some(Utc::now());
        self.save(&action).await?;
        self.store.lrem("actions:approved", action.id.as_bytes()).await?;

        let provider = self.provider_for(&action.action_type);
        let outcome: Result<ProviderResult> = provider.execute(&action.action_type, &action.params, self.config.dry_run).await;

        match outcome {
            Ok(result) => {
                action.status = ActionStatus::Success;
                action.result = Some(serde_json::to_value(&result)?);
            }
            Err(e) => {
                action.status = ActionStatus::Failed;
                action.error = Some(e.to_string());
            }
        }
        action.completed_at = Some(Utc::now());
        self.save(&action).await?;

        self.record_success_rate(&action.action_type, &action.service, action.status == ActionStatus::Success).await?;
        info!(action_id = %action.id, status = ?action.status, "action execution complete");
        Ok(action)
    }

    async fn cancel(&self, id: &str) -> Result<Action> {
        let mut action = self.load(id).await?;
        if action.status.is_terminal() {
            return Err(Error::InvalidState(format!("action {id} already in terminal status {:?}", action.status)));
        }
        action.status = ActionStatus::Cancelled;
        action.completed_at = Some(Utc::now());
        self.save(&action).await?;
        self.store.lrem("actions:pending", action.id.as_bytes()).await?;
        self.store.lrem("actions:approved", action.id.as_bytes()).await?;
        Ok(action)
    }

    async fn get(&self, id: &str) -> Result<Option<Action>> {
        match self.load(id).await {
            Ok(action) => Ok(Some(action)),
            Err(Error::InvalidState(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn success_rate(&self, action_type: &str, service: &str) -> Result<(u64, u64)> {
        let key = format!("action_success_rate:{action_type}:{service}");
        let total = self.store.hget(&key, "total").await?.and_then(|b| parse_u64(&b)).unwrap_or(0);
        let success = self.store.hget(&key, "success").await?.and_then(|b| parse_u64(&b)).unwrap_or(0);
        Ok((success, total))
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        self.store.health_check().await
    }
}

fn parse_u64(bytes: &[u8]) -> Option<u64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

pub async fn create_action_executor(
    store: Arc<dyn KeyValueStore>,
    providers: Vec<Arc<dyn ActionProvider>>,
    config: ExecutorConfig,
) -> Result<Arc<dyn ActionExecutor + Send + Sync>> {
    Ok(Arc::new(StandardActionExecutor::new(store, providers, config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::default_providers;
    use autopilot_store::MemoryStore;

    fn config() -> ExecutorConfig {
        autopilot_common::Config::default().executor
    }

    #[tokio::test]
    async fn full_lifecycle_succeeds() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let executor = StandardActionExecutor::new(store, default_providers(), config());

        let action = executor
            .propose("inc-1", "restart_pod", "api", HashMap::new(), "oom detected", Risk::Low, "system")
            .await
            .unwrap();
        assert_eq!(action.status, ActionStatus::Pending);

        let approved = executor.approve(&action.id, "operator").await.unwrap();
        assert_eq!(approved.status, ActionStatus::Approved);

        let executed = executor.execute(&action.id).await.unwrap();
        assert_eq!(executed.status, ActionStatus::Success);

        let (success, total) = executor.success_rate("restart_pod", "api").await.unwrap();
        assert_eq!((success, total), (1, 1));
    }

    #[tokio::test]
    async fn invalid_transitions_are_rejected() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let executor = StandardActionExecutor::new(store, default_providers(), config());

        let action = executor
            .propose("inc-1", "restart_pod", "api", HashMap::new(), "oom detected", Risk::Low, "system")
            .await
            .unwrap();

        let err = executor.execute(&action.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn terminal_status_never_overwritten_by_cancel() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let executor = StandardActionExecutor::new(store, default_providers(), config());

        let action = executor
            .propose("inc-1", "restart_pod", "api", HashMap::new(), "oom detected", Risk::Low, "system")
            .await
            .unwrap();
        executor.approve(&action.id, "operator").await.unwrap();
        executor.execute(&action.id).await.unwrap();

        let err = executor.cancel(&action.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
