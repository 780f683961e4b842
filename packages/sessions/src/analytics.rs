// ABOUTME: Fire-and-forget analytics sink used by the fragment deployer
// ABOUTME: Sink trait plus tracing-backed and no-op implementations

use serde_json::Value;
use tracing::info;

/// Emitted once per service deployment with `{url, project_id}`.
pub const SANDBOX_CREATED_EVENT: &str = "sandbox_created";

/// Event sink. Implementations must not block and must swallow their own failures.
pub trait AnalyticsSink: Send + Sync {
    fn emit(&self, event: &str, properties: Value);
}

/// Writes events to the log
#[derive(Debug, Default, Clone)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn emit(&self, event: &str, properties: Value) {
        info!(target: "sparkbox::analytics", "{} {}", event, properties);
    }
}

#[derive(Debug, Default, Clone)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn emit(&self, _event: &str, _properties: Value) {}
}
