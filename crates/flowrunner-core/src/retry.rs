//! Advisory retry policy for agent-typed steps (§4.2 "Retries", Design Note
//! in §9 of spec.md).
//!
//! Narrows the teacher's two-strategy `RetryHandler` (Simple,
//! LlmSelfCorrect -- `boternity-core/src/workflow/retry.rs`) down to the
//! Simple strategy: re-run the step with identical inputs. LLM
//! self-correction is agent business logic, out of scope for this core.

use std::time::Duration;

use flowrunner_schemas::workflow::RetryPolicy;

/// Substrings that mark an error as retryable by the default heuristic
/// (§9 Design Note: "Re-specify as a capability on the adapter... the
/// default implementation may still use substring matching").
const RETRYABLE_SUBSTRINGS: [&str; 3] = ["timeout", "connection", "temporary"];

/// Capability trait letting an adapter override whether a given error is
/// retryable, rather than the executor inspecting error text directly.
pub trait Retryable {
    fn is_retryable(&self, message: &str) -> bool {
        default_is_retryable(message)
    }
}

/// Default substring heuristic, exposed standalone for callers that do not
/// have (or need) an adapter-specific override.
pub fn default_is_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

/// Whether attempt number `attempt` (1-based; the first execution is
/// attempt 1) should be followed by another attempt under `policy`.
pub fn should_retry(policy: &RetryPolicy, attempt: u32, error_message: &str) -> bool {
    attempt < policy.max_attempts && default_is_retryable(error_message)
}

/// Backoff to sleep before the next attempt. The spec only says "with
/// backoff per `retry_policy`"; a fixed delay (not exponential) is the
/// simplest policy consistent with that, and matches `RetryPolicy` having
/// a single `backoff: Duration` field rather than a multiplier.
pub fn backoff_for(policy: &RetryPolicy, _attempt: u32) -> Duration {
    policy.backoff
}
