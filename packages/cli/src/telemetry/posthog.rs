// ABOUTME: PostHog-backed analytics sink for sandbox lifecycle events
// ABOUTME: Formats capture payloads and posts them without blocking the caller

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use sparkbox_sessions::AnalyticsSink;
use std::time::Duration;
use tracing::debug;

const SERVER_DISTINCT_ID: &str = "sparkbox-server";

#[derive(Debug, Serialize)]
pub struct PostHogEvent {
    pub api_key: String,
    pub event: String,
    pub distinct_id: String,
    pub properties: Value,
    pub timestamp: String,
}

impl PostHogEvent {
    /// Events are keyed by project so one project's sandboxes group together
    pub fn new(api_key: &str, event: &str, properties: Value) -> Self {
        let distinct_id = properties
            .get("project_id")
            .and_then(Value::as_str)
            .unwrap_or(SERVER_DISTINCT_ID)
            .to_string();

        PostHogEvent {
            api_key: api_key.to_string(),
            event: event.to_string(),
            distinct_id,
            properties,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct PostHogAnalytics {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl PostHogAnalytics {
    pub fn new(api_key: impl Into<String>, host: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            endpoint: format!("{}/capture/", host.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl AnalyticsSink for PostHogAnalytics {
    fn emit(&self, event: &str, properties: Value) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, dropping analytics event {}", event);
            return;
        };

        let payload = PostHogEvent::new(&self.api_key, event, properties);
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();

        runtime.spawn(async move {
            let response = client
                .post(&endpoint)
                .json(&payload)
                .timeout(Duration::from_secs(30))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    debug!("Sent {} event to PostHog", payload.event);
                }
                Ok(resp) => debug!("PostHog endpoint returned error: {}", resp.status()),
                // Analytics never fails a request
                Err(e) => debug!("Failed to send analytics to PostHog: {}", e),
            }
        });
    }
}
