//! Workflow orchestration core: the engine (C6), executor (C5), step
//! dispatcher (C4), condition evaluator (C3), agent registry and adapter
//! contract (C1, C2), plus the external traits (C7-ish) everything else
//! plugs into.

pub mod agent;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_sink;
pub mod executor;
pub mod metrics;
pub mod registry;
pub mod repository;
pub mod retry;
pub mod schedule;
pub mod step;
pub mod telemetry;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use agent::{AdapterError, AdapterMetrics, AgentAdapter, BoxAgentAdapter};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::WorkflowEngine;
pub use error::{EngineError, Result};
pub use event_sink::EventSink;
pub use executor::WorkflowExecutor;
pub use metrics::WorkflowMetrics;
pub use registry::AgentRegistry;
pub use repository::{ExecutionRepository, WorkflowRepository};
