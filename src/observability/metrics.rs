//! Lifecycle metrics.
//!
//! # Metrics
//! - `module_state_transitions_total` (counter): transitions by module, state
//! - `ticker_actions_total` (counter): periodic action runs by module, outcome
//! - `ticker_action_duration_seconds` (histogram): action latency by module
//!
//! Recording goes through the `metrics` facade, so nothing is collected until
//! a recorder is installed (see [`crate::observability::MetricsExporter`]).

use std::time::Duration;

use crate::lifecycle::LifecycleState;

pub const STATE_TRANSITIONS: &str = "module_state_transitions_total";
pub const TICKER_ACTIONS: &str = "ticker_actions_total";
pub const TICKER_ACTION_DURATION: &str = "ticker_action_duration_seconds";

/// Record a lifecycle state transition.
pub fn record_transition(module: &str, state: LifecycleState) {
    metrics::counter!(
        STATE_TRANSITIONS,
        "module" => module.to_string(),
        "state" => state.as_str()
    )
    .increment(1);
}

/// Record one periodic action invocation.
pub fn record_action(module: &str, ok: bool, elapsed: Duration) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!(
        TICKER_ACTIONS,
        "module" => module.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(TICKER_ACTION_DURATION, "module" => module.to_string())
        .record(elapsed.as_secs_f64());
}
