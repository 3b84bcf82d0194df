//! Engine configuration (§4.5 of SPEC_FULL.md).

use std::time::Duration;

/// Tunables for the orchestration engine. Every field has a sane default;
/// construct with `EngineConfig::default()` and override individual fields,
/// or use `EngineConfigBuilder` for a fluent call chain.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Size of the global admission semaphore (§4.1).
    pub max_concurrency: usize,
    /// Period of the execution monitor (§4.1 item 1, "period ≈ 30 s").
    pub execution_monitor_interval: Duration,
    /// Period of the scheduled-trigger loop (§4.1 item 2, "period ≈ 1 min").
    pub scheduler_poll_interval: Duration,
    /// Upper bound on executions considered by `GetWorkflowMetrics`
    /// (Open Question (b) in §9 of spec.md: "make the cap a configuration
    /// constant").
    pub metrics_window: u32,
    /// Applied to a step when its own `timeout` field is unset.
    pub default_step_timeout: Duration,
    /// Upper bound `Stop` waits for the live-set to drain before giving up.
    pub graceful_stop_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            execution_monitor_interval: Duration::from_secs(30),
            scheduler_poll_interval: Duration::from_secs(60),
            metrics_window: 1000,
            default_step_timeout: Duration::from_secs(30),
            graceful_stop_timeout: Duration::from_secs(30),
        }
    }
}

/// Fluent builder over `EngineConfig`, mirroring the teacher's own
/// builder-style config structs.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.config.max_concurrency = value;
        self
    }

    pub fn execution_monitor_interval(mut self, value: Duration) -> Self {
        self.config.execution_monitor_interval = value;
        self
    }

    pub fn scheduler_poll_interval(mut self, value: Duration) -> Self {
        self.config.scheduler_poll_interval = value;
        self
    }

    pub fn metrics_window(mut self, value: u32) -> Self {
        self.config.metrics_window = value;
        self
    }

    pub fn default_step_timeout(mut self, value: Duration) -> Self {
        self.config.default_step_timeout = value;
        self
    }

    pub fn graceful_stop_timeout(mut self, value: Duration) -> Self {
        self.config.graceful_stop_timeout = value;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}
