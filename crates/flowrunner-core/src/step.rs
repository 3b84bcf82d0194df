//! Step execution (C4, §4.4 of spec.md).
//!
//! One dispatch function per step type, following the teacher's
//! `step_runner.rs` shape (a single module dispatching on the step's
//! config variant, each handler returning a uniform output type) but
//! narrowed to exactly the six types §4.4 specifies -- no Skill, Code,
//! Loop, Approval, or SubWorkflow variants, and no template-language
//! resolution against a `WorkflowContext`.

use std::sync::Arc;
use std::time::Duration;

use flowrunner_schemas::value::ValueMap;
use flowrunner_schemas::workflow::{StepDefinition, StepType};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::agent::AdapterError;
use crate::condition;
use crate::registry::AgentRegistry;

/// A step failure, carrying whatever partial result the step produced
/// alongside the error. The validation step needs this: "If any field is
/// missing, the step fails *and* returns the result, so callers can
/// inspect `errors` via error-handling fallback" (§4.4).
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub message: String,
    pub partial_result: Option<ValueMap>,
}

impl StepFailure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            partial_result: None,
        }
    }

    fn with_result(message: impl Into<String>, result: ValueMap) -> Self {
        Self {
            message: message.into(),
            partial_result: Some(result),
        }
    }
}

/// Execute one step. `input` has already been composed per §4.2 step 4.
///
/// `cancel_token` is the owning execution's cancellation token -- steps that
/// block (currently just Wait) race their blocking future against it so a
/// cancel arriving mid-step is observed immediately rather than at the next
/// between-steps checkpoint.
pub async fn execute_step(
    step: &StepDefinition,
    input: ValueMap,
    registry: &Arc<AgentRegistry>,
    cancel_token: &CancellationToken,
) -> Result<ValueMap, StepFailure> {
    match step.step_type {
        StepType::Agent => execute_agent_step(step, input, registry).await,
        StepType::Condition => execute_condition_step(step, &input),
        StepType::Wait => execute_wait_step(&input, cancel_token).await,
        StepType::Transform => execute_transform_step(step, input),
        StepType::Validation => execute_validation_step(step, &input),
        StepType::Notification => execute_notification_step(step, input),
    }
}

async fn execute_agent_step(
    step: &StepDefinition,
    input: ValueMap,
    registry: &Arc<AgentRegistry>,
) -> Result<ValueMap, StepFailure> {
    let agent_type = step
        .agent_type
        .as_deref()
        .ok_or_else(|| StepFailure::new(format!("step {} has no agent_type", step.id)))?;
    let action = step
        .action
        .as_deref()
        .ok_or_else(|| StepFailure::new(format!("step {} has no action", step.id)))?;

    let adapter = registry
        .get(agent_type)
        .map_err(|e| StepFailure::new(e.to_string()))?;

    adapter
        .validate(action, &input)
        .map_err(adapter_error_to_failure)?;

    adapter
        .execute(action, input)
        .await
        .map_err(adapter_error_to_failure)
}

fn adapter_error_to_failure(error: AdapterError) -> StepFailure {
    StepFailure::new(error.to_string())
}

fn execute_condition_step(step: &StepDefinition, input: &ValueMap) -> Result<ValueMap, StepFailure> {
    Ok(condition::evaluate_all(&step.conditions, input))
}

async fn execute_wait_step(
    input: &ValueMap,
    cancel_token: &CancellationToken,
) -> Result<ValueMap, StepFailure> {
    let duration = input
        .get("duration")
        .and_then(Value::as_str)
        .and_then(parse_human_duration)
        .unwrap_or(Duration::from_secs(1));

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = cancel_token.cancelled() => return Err(StepFailure::new("step cancelled during wait")),
    }

    let mut result = ValueMap::new();
    result.insert("waited_duration", Value::String(format!("{}s", duration.as_secs_f64())));
    Ok(result)
}

/// Parse a human-readable duration string like `"500ms"`, `"2s"`, `"1m"`.
/// Returns `None` on parse failure, so callers fall back to the spec's 1 s
/// default (§4.4, boundary behavior in §8).
fn parse_human_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (number_part, unit) = if let Some(stripped) = raw.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = raw.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = raw.strip_suffix('m') {
        (stripped, "m")
    } else {
        (raw, "s")
    };
    let value: f64 = number_part.trim().parse().ok()?;
    let millis = match unit {
        "ms" => value,
        "m" => value * 60_000.0,
        _ => value * 1_000.0,
    };
    Some(Duration::from_millis(millis.max(0.0) as u64))
}

fn execute_transform_step(step: &StepDefinition, input: ValueMap) -> Result<ValueMap, StepFailure> {
    if step.output_mapping.is_empty() {
        Ok(input)
    } else {
        Ok(input.project(&step.output_mapping))
    }
}

fn execute_validation_step(step: &StepDefinition, input: &ValueMap) -> Result<ValueMap, StepFailure> {
    let required_fields: Vec<String> = step
        .parameters
        .get("required_fields")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let errors: Vec<String> = required_fields
        .iter()
        .filter(|field| input.get(field.as_str()).is_none())
        .cloned()
        .collect();

    let valid = errors.is_empty();
    let mut result = ValueMap::new();
    result.insert("valid", Value::Bool(valid));
    result.insert(
        "errors",
        Value::Array(errors.iter().cloned().map(Value::String).collect()),
    );

    if valid {
        Ok(result)
    } else {
        let message = format!("missing required fields: {}", errors.join(", "));
        Err(StepFailure::with_result(message, result))
    }
}

fn execute_notification_step(step: &StepDefinition, _input: ValueMap) -> Result<ValueMap, StepFailure> {
    let message = step
        .parameters
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    tracing::info!(step = %step.id, %message, "notification step fired");

    let mut result = ValueMap::new();
    result.insert("notification_sent", Value::Bool(true));
    result.insert("message", Value::String(message));
    result.insert("timestamp", Value::String(chrono::Utc::now().to_rfc3339()));
    Ok(result)
}
