//! A concrete [`AgentAdapter`] calling out to a remote agent worker over
//! HTTP. Grounded on the teacher's own LLM provider clients
//! (`boternity-infra/src/llm/anthropic/client.rs`): a `reqwest::Client`, a
//! bearer-style credential wrapped in `secrecy::SecretString` so it never
//! appears in `Debug` output or logs, a configurable base URL, and a
//! per-call timeout. Generalized from "call a chat completion endpoint" to
//! "call a generic `action` endpoint on a remote agent worker."

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use flowrunner_core::agent::{AdapterError, AdapterMetrics, AgentAdapter};
use flowrunner_schemas::health::AgentStatus;
use flowrunner_schemas::value::ValueMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

/// Decay constant for the exponential moving average of response times
/// (spec.md §9 Design Note: the source's `(avg + sample) / 2` overweights
/// recent samples; this uses a named, lower decay instead).
const RESPONSE_TIME_EMA_ALPHA: f64 = 0.2;

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    action: &'a str,
    input: &'a ValueMap,
}

struct MetricsState {
    total: u64,
    succeeded: u64,
    failed: u64,
    average_response_time: Duration,
    last_updated: chrono::DateTime<Utc>,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            average_response_time: Duration::ZERO,
            last_updated: Utc::now(),
        }
    }
}

impl MetricsState {
    fn record(&mut self, elapsed: Duration, succeeded: bool) {
        self.total += 1;
        if succeeded {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.average_response_time = if self.total == 1 {
            elapsed
        } else {
            let prev = self.average_response_time.as_secs_f64();
            let sample = elapsed.as_secs_f64();
            Duration::from_secs_f64(prev + RESPONSE_TIME_EMA_ALPHA * (sample - prev))
        };
        self.last_updated = Utc::now();
    }
}

/// HTTP-backed agent adapter. One instance is registered per `agent_type`
/// in the `AgentRegistry` (§4.3).
pub struct HttpAgentAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    capabilities: Vec<String>,
    metrics: Mutex<MetricsState>,
    current_load: Mutex<f64>,
}

impl HttpAgentAdapter {
    pub fn new(base_url: impl Into<String>, api_key: SecretString, capabilities: Vec<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: base_url.into(),
            api_key,
            capabilities,
            metrics: Mutex::new(MetricsState::default()),
            current_load: Mutex::new(0.0),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl AgentAdapter for HttpAgentAdapter {
    async fn execute(&self, action: &str, input: ValueMap) -> Result<ValueMap, AdapterError> {
        if !self.capabilities.iter().any(|c| c == action) {
            return Err(AdapterError::UnsupportedAction(action.to_string()));
        }

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(self.url("/execute"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&ActionRequest { action, input: &input })
            .send()
            .await;

        let result = match response {
            Ok(resp) if resp.status().is_success() => resp
                .json::<ValueMap>()
                .await
                .map_err(|e| AdapterError::RemoteCall(e.to_string())),
            Ok(resp) => Err(AdapterError::RemoteCall(format!(
                "remote worker returned status {}",
                resp.status()
            ))),
            Err(e) => Err(AdapterError::RemoteCall(e.to_string())),
        };

        self.metrics
            .lock()
            .unwrap()
            .record(started.elapsed(), result.is_ok());

        result
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    /// Probe a health endpoint under a short deadline (§4.3: "typically
    /// e.g. 5 s").
    async fn status(&self) -> AgentStatus {
        let probe = self
            .client
            .get(self.url("/health"))
            .bearer_auth(self.api_key.expose_secret())
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match probe {
            Ok(resp) if resp.status().is_success() => AgentStatus::Online,
            Ok(_) => AgentStatus::Error,
            Err(e) if e.is_timeout() => AgentStatus::Busy,
            Err(_) => AgentStatus::Offline,
        }
    }

    fn validate(&self, action: &str, _input: &ValueMap) -> Result<(), AdapterError> {
        if self.capabilities.iter().any(|c| c == action) {
            Ok(())
        } else {
            Err(AdapterError::UnsupportedAction(action.to_string()))
        }
    }

    async fn metrics(&self) -> AdapterMetrics {
        let state = self.metrics.lock().unwrap();
        AdapterMetrics {
            total: state.total,
            succeeded: state.succeeded,
            failed: state.failed,
            average_response_time: state.average_response_time,
            current_load: *self.current_load.lock().unwrap(),
            last_updated: state.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: String) -> HttpAgentAdapter {
        HttpAgentAdapter::new(
            base_url,
            SecretString::from("test-key".to_string()),
            vec!["greet".to_string()],
        )
    }

    #[tokio::test]
    async fn execute_rejects_unsupported_action() {
        let adapter = adapter("http://localhost".to_string());
        let err = adapter.execute("farewell", ValueMap::new()).await.unwrap_err();
        assert!(matches!(err, AdapterError::UnsupportedAction(_)));
    }

    #[tokio::test]
    async fn execute_posts_action_and_returns_parsed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"reply": "hi"})))
            .mount(&server)
            .await;

        let adapter = adapter(server.uri());
        let result = adapter.execute("greet", ValueMap::new()).await.unwrap();
        assert_eq!(result.get("reply"), Some(&json!("hi")));

        let metrics = adapter.metrics().await;
        assert_eq!(metrics.total, 1);
        assert_eq!(metrics.succeeded, 1);
    }

    #[tokio::test]
    async fn execute_maps_non_success_status_to_remote_call_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let adapter = adapter(server.uri());
        let err = adapter.execute("greet", ValueMap::new()).await.unwrap_err();
        assert!(matches!(err, AdapterError::RemoteCall(_)));

        let metrics = adapter.metrics().await;
        assert_eq!(metrics.failed, 1);
    }

    #[tokio::test]
    async fn status_reports_online_on_healthy_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let adapter = adapter(server.uri());
        assert_eq!(adapter.status().await, AgentStatus::Online);
    }
}
