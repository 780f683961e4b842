// ABOUTME: Session orchestrator deciding per project whether to reuse, resume or create a session
// ABOUTME: Owns the registry, idle timers and per-project locks; pauses idle sessions

use crate::config::SessionConfig;
use crate::error::{Result, SessionError, Subsystem};
use crate::providers::ExecutionProvider;
use crate::registry::SessionRegistry;
use crate::scheduler::TimeoutScheduler;
use crate::store::ProjectStore;
use crate::types::{BatchReport, Credentials, Session, SessionHandle, SessionMetadata, SessionState};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type LockMap = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Exclusive hold on one project's critical section.
///
/// Every path that reads then mutates a project's session (ensure, pause,
/// kill, idle timeout) runs under this guard.
pub struct ProjectGuard {
    project_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl ProjectGuard {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Prune the entry once nobody else holds or waits on it
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.project_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.project_id);
        }
    }
}

#[derive(Default)]
pub struct SessionOrchestratorBuilder {
    provider: Option<Arc<dyn ExecutionProvider>>,
    store: Option<Arc<dyn ProjectStore>>,
    config: Option<SessionConfig>,
}

impl SessionOrchestratorBuilder {
    pub fn provider(mut self, provider: Arc<dyn ExecutionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn store(mut self, store: Arc<dyn ProjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<SessionOrchestrator> {
        let provider = self.provider.ok_or_else(|| {
            SessionError::Configuration("no execution provider configured".to_string())
        })?;
        let store = self
            .store
            .ok_or_else(|| SessionError::Configuration("no project store configured".to_string()))?;

        Ok(SessionOrchestrator {
            provider,
            store,
            registry: SessionRegistry::new(),
            scheduler: TimeoutScheduler::new(),
            locks: Arc::new(StdMutex::new(HashMap::new())),
            config: self.config.unwrap_or_default(),
        })
    }
}

pub struct SessionOrchestrator {
    provider: Arc<dyn ExecutionProvider>,
    store: Arc<dyn ProjectStore>,
    registry: SessionRegistry,
    scheduler: TimeoutScheduler,
    locks: Arc<LockMap>,
    config: SessionConfig,
}

impl SessionOrchestrator {
    pub fn builder() -> SessionOrchestratorBuilder {
        SessionOrchestratorBuilder::default()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn ExecutionProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<dyn ProjectStore> {
        &self.store
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &TimeoutScheduler {
        &self.scheduler
    }

    /// Wait for exclusive access to `project_id`.
    pub async fn lock_project(&self, project_id: &str) -> ProjectGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                locks
                    .entry(project_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        ProjectGuard {
            project_id: project_id.to_string(),
            guard: Some(lock.lock_owned().await),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Live sessions, ordered by project.
    pub async fn list_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .registry
            .all()
            .await
            .into_iter()
            .map(|(_, session)| session)
            .collect();
        sessions.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        sessions
    }

    pub async fn ensure_session(
        &self,
        project_id: &str,
        template: &str,
        credentials: &Credentials,
    ) -> Result<Session> {
        let guard = self.lock_project(project_id).await;
        self.ensure_session_locked(&guard, template, credentials).await
    }

    /// Reuse the live session, else resume the persisted one, else create.
    pub async fn ensure_session_locked(
        &self,
        guard: &ProjectGuard,
        template: &str,
        credentials: &Credentials,
    ) -> Result<Session> {
        let project_id = guard.project_id();
        let timeout = self.config.session_timeout;

        if let Some(session) = self.registry.get(project_id).await {
            match self.provider.is_alive(&session.handle).await {
                Ok(true) => match self.provider.set_timeout(&session.handle, timeout).await {
                    Ok(()) => {
                        let session = Session {
                            last_activity: Utc::now(),
                            ..session
                        };
                        self.registry.put(project_id, session.clone()).await;
                        self.scheduler.schedule(project_id, timeout).await;
                        debug!("Reusing session {} for project {}", session.handle, project_id);
                        return Ok(session);
                    }
                    Err(e) => {
                        // Still live: keep the entry and its timer
                        let message = format!(
                            "Failed to extend timeout of session {} for project {}",
                            session.handle, project_id
                        );
                        return Err(SessionError::unexpected(
                            Subsystem::Orchestrator,
                            "SESSION_TIMEOUT_EXTEND_FAILED",
                            message,
                            e,
                        ));
                    }
                },
                Ok(false) => info!(
                    "Session {} for project {} is no longer alive",
                    session.handle, project_id
                ),
                Err(e) => warn!(
                    "Liveness check of session {} for project {} failed: {}",
                    session.handle, project_id, e
                ),
            }

            self.registry.remove(project_id).await;
            self.scheduler.cancel(project_id).await;
        }

        let persisted = match self.store.read_handle(project_id).await {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(
                    "Failed to read persisted session for project {}, treating as none: {}",
                    project_id, e
                );
                None
            }
        };

        if let Some(persisted) = persisted {
            match self.provider.resume(&persisted.handle, timeout).await {
                Ok(handle) => {
                    let template = persisted.template.as_deref().unwrap_or(template);
                    if handle != persisted.handle {
                        self.persist(project_id, Some(&handle), Some(template)).await;
                    }

                    let session = Session::live(project_id, handle, template);
                    self.registry.put(project_id, session.clone()).await;
                    self.scheduler.schedule(project_id, timeout).await;
                    info!("Resumed session {} for project {}", session.handle, project_id);
                    return Ok(session);
                }
                Err(e) => warn!(
                    "Resume of session {} for project {} failed, creating a new one: {}",
                    persisted.handle, project_id, e
                ),
            }
        }

        let metadata = SessionMetadata::new(project_id, template, credentials);
        let handle = self
            .provider
            .create(template, &metadata, timeout)
            .await
            .map_err(|e| {
                SessionError::unexpected(
                    Subsystem::Orchestrator,
                    "SESSION_CREATE_FAILED",
                    format!("Failed to create {} session for project {}", template, project_id),
                    e,
                )
            })?;

        self.persist(project_id, Some(&handle), Some(template)).await;

        let session = Session::live(project_id, handle, template);
        self.registry.put(project_id, session.clone()).await;
        self.scheduler.schedule(project_id, timeout).await;
        info!(
            "Created {} session {} for project {}",
            template, session.handle, project_id
        );
        Ok(session)
    }

    /// Push the provider expiry and the idle timer out after a long-running deployment.
    pub async fn refresh_session_locked(&self, guard: &ProjectGuard) {
        let project_id = guard.project_id();
        let Some(session) = self.registry.get(project_id).await else {
            return;
        };

        let timeout = self.config.session_timeout;
        if let Err(e) = self.provider.set_timeout(&session.handle, timeout).await {
            warn!(
                "Failed to extend timeout of session {} for project {}: {}",
                session.handle, project_id, e
            );
        }

        self.registry
            .put(
                project_id,
                Session {
                    last_activity: Utc::now(),
                    ..session
                },
            )
            .await;
        self.scheduler.schedule(project_id, timeout).await;
    }

    /// Pause the live session, returning it with its (possibly rotated) resume handle.
    /// `Ok(None)` when nothing is live.
    pub async fn pause_project(&self, project_id: &str) -> Result<Option<Session>> {
        let guard = self.lock_project(project_id).await;
        self.pause_locked(&guard).await
    }

    async fn pause_locked(&self, guard: &ProjectGuard) -> Result<Option<Session>> {
        let project_id = guard.project_id();
        let Some(session) = self.registry.get(project_id).await else {
            debug!("No live session to pause for project {}", project_id);
            return Ok(None);
        };

        let handle = self.provider.pause(&session.handle).await.map_err(|e| {
            SessionError::unexpected(
                Subsystem::Orchestrator,
                "SESSION_PAUSE_FAILED",
                format!("Failed to pause session {} for project {}", session.handle, project_id),
                e,
            )
        })?;

        self.persist(project_id, Some(&handle), Some(&session.template))
            .await;
        self.registry.remove(project_id).await;
        self.scheduler.cancel(project_id).await;

        info!("Paused session {} for project {}", handle, project_id);
        Ok(Some(Session {
            handle,
            state: SessionState::Paused,
            ..session
        }))
    }

    /// Bring a paused project back using its persisted template.
    /// `Ok(None)` when nothing is persisted to resume from.
    pub async fn resume_project(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<Option<Session>> {
        let guard = self.lock_project(project_id).await;

        let template = match self.registry.get(project_id).await {
            Some(session) => Some(session.template),
            None => match self.store.read_handle(project_id).await {
                Ok(persisted) => persisted.and_then(|p| p.template),
                Err(e) => {
                    warn!(
                        "Failed to read persisted session for project {}: {}",
                        project_id, e
                    );
                    None
                }
            },
        };

        let Some(template) = template else {
            debug!("Nothing to resume for project {}", project_id);
            return Ok(None);
        };

        self.ensure_session_locked(&guard, &template, credentials)
            .await
            .map(Some)
    }

    /// Best-effort remote kill; local and persisted bookkeeping is always cleared.
    pub async fn kill_project(&self, project_id: &str) -> BatchReport {
        let guard = self.lock_project(project_id).await;
        let project_id = guard.project_id();

        let handle = match self.registry.remove(project_id).await {
            Some(session) => Some(session.handle),
            None => match self.store.read_handle(project_id).await {
                Ok(persisted) => persisted.map(|p| p.handle),
                Err(e) => {
                    warn!(
                        "Failed to read persisted session for project {}: {}",
                        project_id, e
                    );
                    None
                }
            },
        };
        self.scheduler.cancel(project_id).await;

        let remote_ok = match &handle {
            Some(handle) => match self.provider.kill(handle).await {
                Ok(()) => {
                    info!("Killed session {} for project {}", handle, project_id);
                    true
                }
                Err(e) => {
                    warn!(
                        "Failed to kill session {} for project {}: {}",
                        handle, project_id, e
                    );
                    false
                }
            },
            None => true,
        };

        self.persist(project_id, None, None).await;

        BatchReport {
            project_id: project_id.to_string(),
            remote_ok,
        }
    }

    /// Kill every live session concurrently; one failure never stops the rest.
    pub async fn kill_all_sessions(&self) -> Vec<BatchReport> {
        let projects = self.live_projects().await;
        info!("Killing {} live session(s)", projects.len());
        join_all(projects.iter().map(|p| self.kill_project(p))).await
    }

    /// Pause every live session concurrently, preserving their resume handles.
    pub async fn pause_all_sessions(&self) -> Vec<BatchReport> {
        let projects = self.live_projects().await;
        info!("Pausing {} live session(s)", projects.len());

        join_all(projects.iter().map(|project_id| async move {
            let remote_ok = match self.pause_project(project_id).await {
                Ok(_) => true,
                Err(e) => {
                    error!("Failed to pause project {}: {}", project_id, e);
                    false
                }
            };
            BatchReport {
                project_id: project_id.clone(),
                remote_ok,
            }
        }))
        .await
    }

    /// Called when a project's idle timer expires. Skips projects that were
    /// used (and so re-armed) while this call waited for the lock.
    pub async fn handle_idle_timeout(&self, project_id: &str) {
        let guard = self.lock_project(project_id).await;

        if self.scheduler.is_armed(project_id).await {
            debug!("Project {} was used before its idle pause ran", project_id);
            return;
        }

        match self.pause_locked(&guard).await {
            Ok(Some(session)) => info!(
                "Paused idle session for project {} (resume handle {})",
                project_id, session.handle
            ),
            Ok(None) => {}
            Err(e) => {
                error!(
                    "Idle pause failed for project {}, retrying in {:?}: {}",
                    project_id, self.config.session_timeout, e
                );
                self.scheduler
                    .schedule(project_id, self.config.session_timeout)
                    .await;
            }
        }
    }

    /// Spawn the background task draining expired idle timers.
    pub fn spawn_timeout_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                "Idle session loop started (timeout {:?})",
                orchestrator.config.session_timeout
            );
            loop {
                let project_id = orchestrator.scheduler.next_expired().await;
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    orchestrator.handle_idle_timeout(&project_id).await;
                });
            }
        })
    }

    async fn live_projects(&self) -> Vec<String> {
        self.registry
            .all()
            .await
            .into_iter()
            .map(|(project_id, _)| project_id)
            .collect()
    }

    async fn persist(&self, project_id: &str, handle: Option<&SessionHandle>, template: Option<&str>) {
        if let Err(e) = self.store.write_handle(project_id, handle, template).await {
            warn!(
                "Failed to persist session handle for project {}: {}",
                project_id, e
            );
        }
    }
}
