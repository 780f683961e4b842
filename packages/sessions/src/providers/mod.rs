// ABOUTME: Execution provider trait and error types for remote session backends
// ABOUTME: Defines the lifecycle and in-session operations the orchestrator relies on

use crate::types::{CodeOutput, CommandOutput, SessionHandle, SessionMetadata};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod docker;
pub mod templates;

pub use docker::DockerProvider;
pub use templates::{TemplateConfig, TemplateRegistry};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Unknown template: {0}")]
    TemplateNotFound(String),

    #[error("Port {0} is not exposed by this session")]
    PortNotExposed(u16),

    #[error("Container error: {0}")]
    ContainerError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Backend that hosts execution sessions.
///
/// Timeouts passed to `create`, `resume` and `set_timeout` are the provider-side
/// expiry; the orchestrator arms its local timer with the same duration.
#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    /// Start a fresh session from a template.
    async fn create(
        &self,
        template: &str,
        metadata: &SessionMetadata,
        timeout: Duration,
    ) -> Result<SessionHandle>;

    /// Bring a paused session back. The returned handle may differ from the input.
    async fn resume(&self, handle: &SessionHandle, timeout: Duration) -> Result<SessionHandle>;

    async fn is_alive(&self, handle: &SessionHandle) -> Result<bool>;

    /// Push the provider-side expiry out to `timeout` from now.
    async fn set_timeout(&self, handle: &SessionHandle, timeout: Duration) -> Result<()>;

    /// Suspend a session, returning the handle to resume it with later.
    async fn pause(&self, handle: &SessionHandle) -> Result<SessionHandle>;

    async fn kill(&self, handle: &SessionHandle) -> Result<()>;

    async fn write_file(&self, handle: &SessionHandle, path: &str, content: &str) -> Result<()>;

    async fn run_command(&self, handle: &SessionHandle, command: &str) -> Result<CommandOutput>;

    async fn run_code(&self, handle: &SessionHandle, code: &str) -> Result<CodeOutput>;

    /// Externally reachable URL for a service listening on `port` inside the session.
    async fn compute_url(&self, handle: &SessionHandle, port: u16) -> Result<String>;

    /// Port a service template listens on when a fragment names none.
    fn default_port(&self, _template: &str) -> Option<u16> {
        None
    }
}
