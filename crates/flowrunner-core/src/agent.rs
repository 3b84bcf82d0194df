//! Agent adapter contract (C1, §4.3 of spec.md).
//!
//! An adapter is a stateless-with-respect-to-business-data façade around a
//! remote worker. The teacher's own remote-execution analogue is its
//! `skill` subsystem (`boternity-infra/src/skill/*`), which sandboxes
//! skills as local WASM components rather than calling out over HTTP, so
//! it does not ground this trait's transport; the concrete
//! `flowrunner-http-agent` crate instead follows the teacher's LLM
//! provider HTTP clients (`boternity-infra/src/llm/anthropic/client.rs`):
//! a `reqwest::Client`, a bearer-style secret, a base URL, and a per-call
//! timeout.

use std::future::Future;
use std::time::Duration;

use flowrunner_schemas::health::AgentStatus;
use flowrunner_schemas::value::ValueMap;

use crate::retry::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("unsupported action {0}")]
    UnsupportedAction(String),
    #[error("validation failed: missing required field {0:?}")]
    Validation(Vec<String>),
    #[error("remote call failed: {0}")]
    RemoteCall(String),
    #[error("status probe failed: {0}")]
    StatusProbe(String),
}

impl Retryable for AdapterError {
    fn is_retryable(&self, _message: &str) -> bool {
        match self {
            AdapterError::RemoteCall(message) | AdapterError::StatusProbe(message) => {
                crate::retry::default_is_retryable(message)
            }
            _ => false,
        }
    }
}

/// Point-in-time counters returned by `Metrics()` (§4.3).
#[derive(Debug, Clone, Copy)]
pub struct AdapterMetrics {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub average_response_time: Duration,
    pub current_load: f64,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

/// Stateless façade around one remote agent worker. All durable state
/// lives behind the remote worker; implementations only track call
/// counters and a moving-average response time locally, guarded by a
/// single mutex per adapter (§4.3, §5).
pub trait AgentAdapter: Send + Sync {
    /// Dispatch `action` against `input`. Unknown actions fail with
    /// `UnsupportedAction`.
    fn execute(
        &self,
        action: &str,
        input: ValueMap,
    ) -> impl Future<Output = Result<ValueMap, AdapterError>> + Send;

    /// The set of actions this adapter supports.
    fn capabilities(&self) -> Vec<String>;

    /// Probe a health endpoint under a short deadline (§4.3: "typically
    /// ... e.g. 5 s").
    fn status(&self) -> impl Future<Output = AgentStatus> + Send;

    /// Validate that `input` carries every field `action` requires,
    /// without performing the call.
    fn validate(&self, action: &str, input: &ValueMap) -> Result<(), AdapterError>;

    /// Current counters and moving-average response time.
    fn metrics(&self) -> impl Future<Output = AdapterMetrics> + Send;
}

// ---------------------------------------------------------------------------
// Dynamic dispatch
// ---------------------------------------------------------------------------
//
// `AgentAdapter` uses RPITIT and so cannot be used as `dyn AgentAdapter`
// directly, but the registry (C2) needs to hold a heterogeneous map from
// agent type to adapter. Same blanket-impl-over-boxed-futures pattern the
// teacher uses for its own RPITIT trait with the same problem
// (`boternity-core/src/llm/box_provider.rs`'s `BoxLlmProvider`): an
// object-safe `AgentAdapterDyn` trait with boxed futures, a blanket impl
// for every `T: AgentAdapter`, and a `BoxAgentAdapter` wrapper that
// delegates.

use std::pin::Pin;

/// Object-safe version of [`AgentAdapter`] with boxed futures.
pub trait AgentAdapterDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        action: &'a str,
        input: ValueMap,
    ) -> Pin<Box<dyn Future<Output = Result<ValueMap, AdapterError>> + Send + 'a>>;

    fn capabilities(&self) -> Vec<String>;

    fn status_boxed(&self) -> Pin<Box<dyn Future<Output = AgentStatus> + Send + '_>>;

    fn validate(&self, action: &str, input: &ValueMap) -> Result<(), AdapterError>;

    fn metrics_boxed(&self) -> Pin<Box<dyn Future<Output = AdapterMetrics> + Send + '_>>;
}

impl<T: AgentAdapter> AgentAdapterDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        action: &'a str,
        input: ValueMap,
    ) -> Pin<Box<dyn Future<Output = Result<ValueMap, AdapterError>> + Send + 'a>> {
        Box::pin(self.execute(action, input))
    }

    fn capabilities(&self) -> Vec<String> {
        AgentAdapter::capabilities(self)
    }

    fn status_boxed(&self) -> Pin<Box<dyn Future<Output = AgentStatus> + Send + '_>> {
        Box::pin(self.status())
    }

    fn validate(&self, action: &str, input: &ValueMap) -> Result<(), AdapterError> {
        AgentAdapter::validate(self, action, input)
    }

    fn metrics_boxed(&self) -> Pin<Box<dyn Future<Output = AdapterMetrics> + Send + '_>> {
        Box::pin(self.metrics())
    }
}

/// Type-erased adapter handle stored in the registry.
pub struct BoxAgentAdapter {
    inner: Box<dyn AgentAdapterDyn>,
}

impl BoxAgentAdapter {
    pub fn new<T: AgentAdapter + 'static>(adapter: T) -> Self {
        Self {
            inner: Box::new(adapter),
        }
    }

    pub async fn execute(&self, action: &str, input: ValueMap) -> Result<ValueMap, AdapterError> {
        self.inner.execute_boxed(action, input).await
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.inner.capabilities()
    }

    pub async fn status(&self) -> AgentStatus {
        self.inner.status_boxed().await
    }

    pub fn validate(&self, action: &str, input: &ValueMap) -> Result<(), AdapterError> {
        self.inner.validate(action, input)
    }

    pub async fn metrics(&self) -> AdapterMetrics {
        self.inner.metrics_boxed().await
    }
}
