// ABOUTME: HTTP request handlers for fragment execution and sandbox lifecycle operations
// ABOUTME: Translates JSON requests into deployer and orchestrator calls

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use sparkbox_sessions::{Credentials, Fragment, SandboxOperation};
use tracing::info;

use crate::error::AppError;
use crate::response::ApiResponse;
use crate::AppState;

/// Request body for `POST /api/projects/{project_id}/sandbox`
#[derive(Deserialize)]
pub struct SandboxRequest {
    #[serde(default)]
    pub fragment: Option<Fragment>,
    #[serde(default)]
    pub operation: Option<SandboxOperation>,
    #[serde(default, rename = "userID")]
    pub user_id: Option<String>,
    #[serde(default, rename = "teamID")]
    pub team_id: Option<String>,
    #[serde(default, rename = "accessToken")]
    pub access_token: Option<String>,
}

impl SandboxRequest {
    fn credentials(&self) -> Credentials {
        Credentials {
            user_id: self.user_id.clone(),
            team_id: self.team_id.clone(),
            access_token: self.access_token.clone(),
        }
    }
}

/// Deploy a fragment, or pause/resume the project's session
pub async fn handle_sandbox_request(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<SandboxRequest>,
) -> Result<Response, AppError> {
    let credentials = request.credentials();

    match request.operation {
        Some(operation @ (SandboxOperation::Pause | SandboxOperation::Resume)) => {
            info!("Sandbox {} requested for project {}", operation, project_id);
            let outcome = state
                .deployer
                .execute_sandbox_operation(&project_id, operation, &credentials)
                .await?;
            Ok(Json(outcome).into_response())
        }
        Some(SandboxOperation::Execute) | None => {
            let fragment = request
                .fragment
                .ok_or_else(|| AppError::Validation("fragment is required".to_string()))?;

            info!(
                "Executing {} fragment for project {}",
                fragment.template, project_id
            );
            let result = state
                .deployer
                .process_fragment(&project_id, &fragment, &credentials)
                .await?;
            Ok(Json(result).into_response())
        }
    }
}

/// Terminate the project's session and clear its persisted handle
pub async fn kill_project_sandbox(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    info!("Killing sandbox for project {}", project_id);

    let report = state
        .deployer
        .orchestrator()
        .kill_project(&project_id)
        .await;
    Json(ApiResponse::success(report))
}

/// Live sessions known to this process
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.deployer.orchestrator().list_sessions().await;
    Json(ApiResponse::success(sessions))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = state.deployer.orchestrator();
    let live_sessions = orchestrator.registry().len().await;
    let armed_timers = orchestrator.scheduler().armed_count().await;

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "sparkbox",
        "live_sessions": live_sessions,
        "armed_timers": armed_timers,
    }))
}
