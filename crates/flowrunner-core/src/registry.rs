//! Agent registry (C2, §4.3 of spec.md).
//!
//! A concurrent map from agent type to adapter, refreshed by a periodic
//! polling loop -- the same shape the teacher gives its own keyed
//! concurrent state (`DashMap<String, Arc<Semaphore>>` in
//! `boternity-core/src/workflow/executor.rs`), here keyed by agent type
//! instead of workflow name.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use flowrunner_schemas::health::{AgentHealthSnapshot, AgentStatus};

use crate::agent::BoxAgentAdapter;
use crate::error::EngineError;

pub struct AgentRegistry {
    adapters: DashMap<String, Arc<BoxAgentAdapter>>,
    health: DashMap<String, AgentHealthSnapshot>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
            health: DashMap::new(),
        }
    }

    /// Register an adapter under `agent_type`. Fails if one is already
    /// registered for that type (§4.3).
    pub fn register(
        &self,
        agent_type: impl Into<String>,
        adapter: BoxAgentAdapter,
    ) -> Result<(), EngineError> {
        let agent_type = agent_type.into();
        if self.adapters.contains_key(&agent_type) {
            return Err(EngineError::AgentAlreadyRegistered(agent_type));
        }
        self.health
            .insert(agent_type.clone(), AgentHealthSnapshot::unknown(&agent_type));
        self.adapters.insert(agent_type, Arc::new(adapter));
        Ok(())
    }

    /// Look up an adapter by type, refreshing its `last_seen` snapshot
    /// (§4.3: "also refreshes the `last_seen` snapshot").
    pub fn get(&self, agent_type: &str) -> Result<Arc<BoxAgentAdapter>, EngineError> {
        let adapter = self
            .adapters
            .get(agent_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::AgentNotFound(agent_type.to_string()))?;
        if let Some(mut snapshot) = self.health.get_mut(agent_type) {
            snapshot.last_seen = Utc::now();
        }
        Ok(adapter)
    }

    pub fn list(&self) -> Vec<String> {
        self.adapters.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn is_available(&self, agent_type: &str) -> bool {
        self.adapters.contains_key(agent_type)
    }

    pub fn health(&self, agent_type: &str) -> Result<AgentHealthSnapshot, EngineError> {
        self.health
            .get(agent_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::AgentNotFound(agent_type.to_string()))
    }

    /// Periodic (≈ 30 s) polling loop that concurrently reads status and
    /// counters across all registered agents and updates their snapshots
    /// (§4.3). Runs until `cancel` fires.
    pub async fn monitor_health(self: &Arc<Self>, interval: Duration, cancel: tokio_util::sync::CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    self.poll_all().await;
                }
            }
        }
    }

    async fn poll_all(self: &Arc<Self>) {
        let types = self.list();
        let polls = types.into_iter().map(|agent_type| {
            let registry = Arc::clone(self);
            async move {
                let Some(adapter) = registry
                    .adapters
                    .get(&agent_type)
                    .map(|entry| Arc::clone(entry.value()))
                else {
                    return;
                };
                let status = adapter.status().await;
                let metrics = adapter.metrics().await;
                let error_rate = if metrics.total == 0 {
                    0.0
                } else {
                    (metrics.failed as f64 / metrics.total as f64) * 100.0
                };
                registry.update_health(&agent_type, status, error_rate, metrics.current_load);
            }
        });
        futures_join_all(polls).await;
    }

    fn update_health(&self, agent_type: &str, status: AgentStatus, error_rate: f64, load: f64) {
        if let Some(mut snapshot) = self.health.get_mut(agent_type) {
            snapshot.status = status;
            snapshot.last_seen = Utc::now();
            snapshot.error_rate = error_rate;
            snapshot.load = load;
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Small local join-all so this module does not need to pull in the whole
/// `futures` crate just for one call site.
async fn futures_join_all<I>(iter: I)
where
    I: IntoIterator,
    I::Item: std::future::Future<Output = ()>,
{
    let mut handles = Vec::new();
    for fut in iter {
        handles.push(tokio::spawn(async move { fut.await }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AdapterError, AdapterMetrics, AgentAdapter};
    use flowrunner_schemas::value::ValueMap;

    struct EchoAdapter;

    impl AgentAdapter for EchoAdapter {
        async fn execute(&self, action: &str, input: ValueMap) -> Result<ValueMap, AdapterError> {
            if action != "echo" {
                return Err(AdapterError::UnsupportedAction(action.to_string()));
            }
            Ok(input)
        }

        fn capabilities(&self) -> Vec<String> {
            vec!["echo".to_string()]
        }

        async fn status(&self) -> AgentStatus {
            AgentStatus::Online
        }

        fn validate(&self, _action: &str, _input: &ValueMap) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn metrics(&self) -> AdapterMetrics {
            AdapterMetrics {
                total: 0,
                succeeded: 0,
                failed: 0,
                average_response_time: Duration::ZERO,
                current_load: 0.0,
                last_updated: Utc::now(),
            }
        }
    }

    #[test]
    fn register_rejects_duplicate_agent_type() {
        let registry = AgentRegistry::new();
        registry
            .register("echo", BoxAgentAdapter::new(EchoAdapter))
            .unwrap();
        let err = registry
            .register("echo", BoxAgentAdapter::new(EchoAdapter))
            .unwrap_err();
        assert!(matches!(err, EngineError::AgentAlreadyRegistered(_)));
    }

    #[test]
    fn get_unregistered_agent_fails() {
        let registry = AgentRegistry::new();
        assert!(matches!(
            registry.get("missing"),
            Err(EngineError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn monitor_health_updates_status_from_adapter() {
        let registry = Arc::new(AgentRegistry::new());
        registry
            .register("echo", BoxAgentAdapter::new(EchoAdapter))
            .unwrap();
        registry.poll_all().await;
        let snapshot = registry.health("echo").unwrap();
        assert_eq!(snapshot.status, AgentStatus::Online);
    }
}
