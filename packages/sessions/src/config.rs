// ABOUTME: Session lifecycle settings read from the environment
// ABOUTME: Idle timeout, interpreter template name and default service port

use sparkbox_config::constants::{
    SPARKBOX_DEFAULT_SERVICE_PORT, SPARKBOX_INTERPRETER_TEMPLATE, SPARKBOX_SESSION_TIMEOUT_SECS,
};
use sparkbox_config::{env_in_range, env_string};
use std::time::Duration;

pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_INTERPRETER_TEMPLATE: &str = "code-interpreter-v1";
pub const DEFAULT_SERVICE_PORT: u16 = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Idle window; also the provider-side timeout requested on create/resume.
    pub session_timeout: Duration,
    /// Template whose fragments are executed rather than served.
    pub interpreter_template: String,
    /// Port used for service templates when a fragment names none.
    pub default_port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            interpreter_template: DEFAULT_INTERPRETER_TEMPLATE.to_string(),
            default_port: DEFAULT_SERVICE_PORT,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let timeout_secs = env_in_range(
            SPARKBOX_SESSION_TIMEOUT_SECS,
            10..=86_400,
            DEFAULT_SESSION_TIMEOUT_SECS,
        );

        Self {
            session_timeout: Duration::from_secs(timeout_secs),
            interpreter_template: env_string(SPARKBOX_INTERPRETER_TEMPLATE)
                .unwrap_or_else(|| DEFAULT_INTERPRETER_TEMPLATE.to_string()),
            default_port: env_in_range(SPARKBOX_DEFAULT_SERVICE_PORT, 1..=65_535, DEFAULT_SERVICE_PORT),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn is_interpreter(&self, template: &str) -> bool {
        template == self.interpreter_template
    }
}
