// ABOUTME: Per-project execution session orchestration for Sparkbox
// ABOUTME: Reuses, resumes or creates sessions, pauses idle ones and deploys code fragments

pub mod analytics;
pub mod config;
pub mod deployer;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod types;

pub use analytics::{AnalyticsSink, NoopAnalytics, TracingAnalytics, SANDBOX_CREATED_EVENT};
pub use config::SessionConfig;
pub use deployer::FragmentDeployer;
pub use error::{Result, SessionError, Subsystem};
pub use orchestrator::{ProjectGuard, SessionOrchestrator, SessionOrchestratorBuilder};
pub use providers::{DockerProvider, ExecutionProvider, ProviderError, TemplateRegistry};
pub use registry::SessionRegistry;
pub use scheduler::TimeoutScheduler;
pub use store::{PersistedSession, ProjectStore, SqliteProjectStore, StoreError};
pub use types::{
    BatchReport, CodeOutput, CommandOutput, Credentials, ExecutionResult, Fragment,
    InterpreterResult, OperationOutcome, RuntimeError, SandboxOperation, Session, SessionHandle,
    SessionMetadata, SessionState, WebResult,
};
