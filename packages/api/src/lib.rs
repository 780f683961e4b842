// ABOUTME: HTTP API layer for Sparkbox sandbox orchestration
// ABOUTME: Builds the axum router over a shared fragment deployer

use axum::{
    routing::{get, post},
    Router,
};
use sparkbox_sessions::FragmentDeployer;
use std::sync::Arc;

pub mod error;
pub mod response;
pub mod sandbox_handlers;

pub use error::AppError;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub deployer: Arc<FragmentDeployer>,
}

impl AppState {
    pub fn new(deployer: Arc<FragmentDeployer>) -> Self {
        Self { deployer }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(sandbox_handlers::health_check))
        .route("/api/sessions", get(sandbox_handlers::list_sessions))
        .route(
            "/api/projects/{project_id}/sandbox",
            post(sandbox_handlers::handle_sandbox_request)
                .delete(sandbox_handlers::kill_project_sandbox),
        )
        .with_state(state)
}
