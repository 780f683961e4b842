// ABOUTME: Core data types shared by the session orchestrator and fragment deployer
// ABOUTME: Sessions, fragments, execution results, credentials and sandbox operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token issued by the execution provider for one session instance.
/// May change across pause/resume cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Live,
    Paused,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Live => write!(f, "live"),
            SessionState::Paused => write!(f, "paused"),
        }
    }
}

/// A project's execution session as tracked by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub project_id: String,
    pub handle: SessionHandle,
    pub template: String,
    pub state: SessionState,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn live(project_id: &str, handle: SessionHandle, template: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            handle,
            template: template.to_string(),
            state: SessionState::Live,
            last_activity: Utc::now(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.state == SessionState::Live
    }
}

/// Labels attached to a newly created session so it can be traced back to its owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub project_id: String,
    pub template: String,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
}

impl SessionMetadata {
    pub fn new(project_id: &str, template: &str, credentials: &Credentials) -> Self {
        Self {
            project_id: project_id.to_string(),
            template: template.to_string(),
            user_id: credentials.user_id.clone(),
            team_id: credentials.team_id.clone(),
        }
    }
}

/// A generated unit of code plus the metadata needed to deploy it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub template: String,
    pub code: String,
    pub file_path: String,
    #[serde(default)]
    pub has_additional_dependencies: bool,
    #[serde(default)]
    pub install_dependencies_command: String,
    #[serde(default)]
    pub additional_dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Structured fault raised by user code inside the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeError {
    pub name: String,
    pub value: String,
    pub traceback: String,
}

/// Output of a synchronous code run inside a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub structured_results: Vec<serde_json::Value>,
    pub runtime_error: Option<RuntimeError>,
}

/// Output of a shell command run inside a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpreterResult {
    pub sbx_id: SessionHandle,
    pub template: String,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<RuntimeError>,
    pub cell_results: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebResult {
    pub sbx_id: SessionHandle,
    pub template: String,
    pub url: String,
}

/// Result of deploying one fragment: exactly one variant per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecutionResult {
    Interpreter(InterpreterResult),
    Web(WebResult),
}

impl ExecutionResult {
    pub fn handle(&self) -> &SessionHandle {
        match self {
            ExecutionResult::Interpreter(r) => &r.sbx_id,
            ExecutionResult::Web(r) => &r.sbx_id,
        }
    }
}

/// Caller identity forwarded to the project store. Never persisted or logged in full.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub access_token: Option<String>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("team_id", &self.team_id)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Explicit lifecycle operation requested without a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxOperation {
    Execute,
    Pause,
    Resume,
}

impl fmt::Display for SandboxOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxOperation::Execute => write!(f, "execute"),
            SandboxOperation::Pause => write!(f, "pause"),
            SandboxOperation::Resume => write!(f, "resume"),
        }
    }
}

/// Outcome of an explicit pause/resume request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub operation: SandboxOperation,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

/// Per-project result of a batch kill or pause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub project_id: String,
    pub remote_ok: bool,
}
