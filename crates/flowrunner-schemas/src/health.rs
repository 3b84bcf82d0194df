// Agent health snapshots (§3, §4.3 of SPEC_FULL.md).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    Busy,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealthSnapshot {
    pub agent_type: String,
    pub status: AgentStatus,
    pub last_seen: DateTime<Utc>,
    pub response_time: Duration,
    pub error_rate: f64,
    pub load: f64,
}

impl AgentHealthSnapshot {
    pub fn unknown(agent_type: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            status: AgentStatus::Offline,
            last_seen: Utc::now(),
            response_time: Duration::ZERO,
            error_rate: 0.0,
            load: 0.0,
        }
    }
}
