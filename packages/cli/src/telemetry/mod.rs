// ABOUTME: Analytics sinks available to the Sparkbox server
// ABOUTME: Picks PostHog when a project key is configured and falls back to logging

pub mod posthog;

pub use posthog::{PostHogAnalytics, PostHogEvent};

use crate::config::Config;
use sparkbox_sessions::{AnalyticsSink, TracingAnalytics};
use std::sync::Arc;
use tracing::info;

pub fn analytics_from_config(config: &Config) -> Arc<dyn AnalyticsSink> {
    match &config.posthog_api_key {
        Some(key) => {
            info!("Sending sandbox analytics to {}", config.posthog_host);
            Arc::new(PostHogAnalytics::new(key.clone(), &config.posthog_host))
        }
        None => Arc::new(TracingAnalytics),
    }
}
