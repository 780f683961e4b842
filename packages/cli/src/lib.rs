// ABOUTME: Server bootstrap for Sparkbox: wires store, provider, orchestrator and router
// ABOUTME: Runs the idle-timeout loop and winds sessions down on shutdown

use sparkbox_api::{create_router, AppState};
use sparkbox_sessions::{
    BatchReport, DockerProvider, FragmentDeployer, SessionConfig, SessionOrchestrator,
    SqliteProjectStore, TemplateRegistry,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod config;
pub mod telemetry;


use config::Config;

/// Built-in templates, or the file at `path` when given
pub fn load_templates(path: Option<&Path>) -> Result<TemplateRegistry, Box<dyn std::error::Error>> {
    let templates = match path {
        Some(path) => TemplateRegistry::from_file(path)?,
        None => TemplateRegistry::new()?,
    };
    Ok(templates)
}

pub async fn build_orchestrator(
    config: &Config,
) -> Result<Arc<SessionOrchestrator>, Box<dyn std::error::Error>> {
    if let Some(dir) = config.database_dir() {
        std::fs::create_dir_all(&dir)?;
    }
    let store = SqliteProjectStore::connect(&config.database_url).await?;

    let templates = load_templates(config.templates_path.as_deref())?;
    let provider = DockerProvider::with_templates(templates, config.public_host.clone())?;
    if !provider.is_available().await {
        warn!("Docker daemon is not reachable, sandbox requests will fail until it is");
    }

    let orchestrator = SessionOrchestrator::builder()
        .provider(Arc::new(provider))
        .store(Arc::new(store))
        .config(SessionConfig::from_env())
        .build()?;

    Ok(Arc::new(orchestrator))
}

pub async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = build_orchestrator(&config).await?;
    let timeout_loop = orchestrator.spawn_timeout_loop();

    let analytics = telemetry::analytics_from_config(&config);
    let deployer = Arc::new(FragmentDeployer::new(Arc::clone(&orchestrator), analytics));

    let app = create_router(AppState::new(deployer))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new());

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Sparkbox API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    timeout_loop.abort();
    let reports = shutdown_sessions(&orchestrator, config.kill_on_shutdown).await;
    let failed = reports.iter().filter(|r| !r.remote_ok).count();
    info!(
        "Shut down {} session(s), {} remote failure(s)",
        reports.len(),
        failed
    );

    Ok(())
}

/// Pause every live session, or kill them all when `kill` is set
pub async fn shutdown_sessions(orchestrator: &SessionOrchestrator, kill: bool) -> Vec<BatchReport> {
    if kill {
        info!("Killing all live sessions");
        orchestrator.kill_all_sessions().await
    } else {
        info!("Pausing all live sessions");
        orchestrator.pause_all_sessions().await
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
}
