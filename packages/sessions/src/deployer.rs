// ABOUTME: Fragment deployer applying generated code to a project's live session
// ABOUTME: Installs dependencies, writes code, then executes it or exposes its service URL

use crate::analytics::{AnalyticsSink, SANDBOX_CREATED_EVENT};
use crate::error::{Result, SessionError, Subsystem};
use crate::orchestrator::{ProjectGuard, SessionOrchestrator};
use crate::providers::ProviderError;
use crate::store::ProjectStore;
use crate::types::{
    Credentials, ExecutionResult, Fragment, InterpreterResult, OperationOutcome, SandboxOperation,
    Session, WebResult,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct FragmentDeployer {
    orchestrator: Arc<SessionOrchestrator>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl FragmentDeployer {
    pub fn new(orchestrator: Arc<SessionOrchestrator>, analytics: Arc<dyn AnalyticsSink>) -> Self {
        Self {
            orchestrator,
            analytics,
        }
    }

    pub fn orchestrator(&self) -> &Arc<SessionOrchestrator> {
        &self.orchestrator
    }

    /// Deploy `fragment` into the project's session and run or expose it.
    ///
    /// Holds the project lock for the whole deployment so an idle pause can
    /// never land between writing the code and running it.
    pub async fn process_fragment(
        &self,
        project_id: &str,
        fragment: &Fragment,
        credentials: &Credentials,
    ) -> Result<ExecutionResult> {
        validate_fragment(fragment)?;

        let guard = self.orchestrator.lock_project(project_id).await;
        let session = self
            .orchestrator
            .ensure_session_locked(&guard, &fragment.template, credentials)
            .await?;

        let result = self.deploy(&guard, &session, fragment, credentials).await;
        self.orchestrator.refresh_session_locked(&guard).await;
        result
    }

    async fn deploy(
        &self,
        guard: &ProjectGuard,
        session: &Session,
        fragment: &Fragment,
        credentials: &Credentials,
    ) -> Result<ExecutionResult> {
        let project_id = guard.project_id();
        let provider = self.orchestrator.provider();

        if fragment.has_additional_dependencies {
            info!(
                "Installing {} dependencies for project {}",
                fragment.additional_dependencies.len(),
                project_id
            );
            let output = provider
                .run_command(&session.handle, &fragment.install_dependencies_command)
                .await
                .map_err(|e| deploy_error("DEPENDENCY_INSTALL_FAILED", project_id, e))?;

            if !output.success() {
                return Err(SessionError::Unexpected {
                    subsystem: Subsystem::Deployer,
                    code: "DEPENDENCY_INSTALL_FAILED",
                    message: format!(
                        "Dependency install for project {} exited with code {}: {}",
                        project_id,
                        output.exit_code,
                        output.stderr.trim()
                    ),
                    source: None,
                });
            }
        }

        provider
            .write_file(&session.handle, &fragment.file_path, &fragment.code)
            .await
            .map_err(|e| deploy_error("FILE_WRITE_FAILED", project_id, e))?;
        debug!("Wrote {} for project {}", fragment.file_path, project_id);

        self.touch_activity(project_id, credentials).await;

        if self.orchestrator.config().is_interpreter(&fragment.template) {
            let output = provider
                .run_code(&session.handle, &fragment.code)
                .await
                .map_err(|e| deploy_error("CODE_EXECUTION_FAILED", project_id, e))?;

            return Ok(ExecutionResult::Interpreter(InterpreterResult {
                sbx_id: session.handle.clone(),
                template: fragment.template.clone(),
                stdout: output.stdout,
                stderr: output.stderr,
                runtime_error: output.runtime_error,
                cell_results: output.structured_results,
            }));
        }

        let port = fragment
            .port
            .or_else(|| provider.default_port(&fragment.template))
            .unwrap_or(self.orchestrator.config().default_port);
        let url = provider
            .compute_url(&session.handle, port)
            .await
            .map_err(|e| deploy_error("URL_RESOLUTION_FAILED", project_id, e))?;

        self.analytics.emit(
            SANDBOX_CREATED_EVENT,
            json!({ "url": url, "project_id": project_id }),
        );

        Ok(ExecutionResult::Web(WebResult {
            sbx_id: session.handle.clone(),
            template: fragment.template.clone(),
            url,
        }))
    }

    /// Record activity with the caller's scoped client when a token is present.
    async fn touch_activity(&self, project_id: &str, credentials: &Credentials) {
        let default_store = self.orchestrator.store();
        let scoped = if credentials.has_access_token() {
            default_store.scoped(credentials)
        } else {
            None
        };
        let store: &dyn ProjectStore = scoped.as_deref().unwrap_or(&**default_store);

        if let Err(e) = store.touch_activity(project_id).await {
            warn!("Failed to record activity for project {}: {}", project_id, e);
        }
    }

    /// Explicit lifecycle request without a fragment.
    pub async fn execute_sandbox_operation(
        &self,
        project_id: &str,
        operation: SandboxOperation,
        credentials: &Credentials,
    ) -> Result<OperationOutcome> {
        let session = match operation {
            SandboxOperation::Pause => self.orchestrator.pause_project(project_id).await?,
            SandboxOperation::Resume => {
                self.orchestrator
                    .resume_project(project_id, credentials)
                    .await?
            }
            SandboxOperation::Execute => {
                return Err(SessionError::InvalidRequest(
                    "execute requires a fragment".to_string(),
                ))
            }
        };

        info!("Sandbox operation {} on project {} completed", operation, project_id);
        Ok(OperationOutcome {
            success: true,
            operation,
            project_id: project_id.to_string(),
            session,
        })
    }
}

fn deploy_error(code: &'static str, project_id: &str, e: ProviderError) -> SessionError {
    let message = format!("Deployment to project {} failed: {}", project_id, e);
    SessionError::unexpected(Subsystem::Deployer, code, message, e)
}

fn validate_fragment(fragment: &Fragment) -> Result<()> {
    if fragment.template.trim().is_empty() {
        return Err(SessionError::InvalidRequest("template is required".to_string()));
    }
    if fragment.file_path.trim().is_empty() {
        return Err(SessionError::InvalidRequest("file_path is required".to_string()));
    }
    if fragment.has_additional_dependencies && fragment.install_dependencies_command.trim().is_empty() {
        return Err(SessionError::InvalidRequest(
            "install_dependencies_command is required when has_additional_dependencies is set"
                .to_string(),
        ));
    }
    Ok(())
}
