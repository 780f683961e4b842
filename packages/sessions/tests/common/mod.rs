// ABOUTME: In-memory provider and project store fakes for orchestrator and deployer tests
// ABOUTME: Record every call so tests can assert counts and ordering

#![allow(dead_code)]

use async_trait::async_trait;
use sparkbox_sessions::providers::Result as ProviderResult;
use sparkbox_sessions::store::Result as StoreResult;
use sparkbox_sessions::{
    CodeOutput, CommandOutput, Credentials, ExecutionProvider, PersistedSession, ProjectStore,
    ProviderError, SessionConfig, SessionHandle, SessionMetadata, SessionOrchestrator, StoreError,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Default)]
pub struct FakeState {
    pub calls: Vec<String>,
    pub alive: HashSet<String>,
    pub paused: HashSet<String>,
    pub files: HashMap<String, String>,
    pub metadata: Vec<SessionMetadata>,
    pub timeouts: Vec<Duration>,
    pub next_id: u32,
    pub fail_create: bool,
    pub fail_resume: bool,
    pub fail_liveness: bool,
    pub fail_set_timeout: bool,
    pub fail_pause: bool,
    pub fail_kill: HashSet<String>,
    pub rotate_on_pause: bool,
    pub command_exit_code: i64,
    pub code_output: CodeOutput,
    /// First exposed port per service template
    pub service_ports: HashMap<String, u16>,
}

#[derive(Default)]
pub struct FakeProvider {
    pub state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: FnOnce(&mut FakeState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls to `op` (the part before the first ':').
    pub fn count(&self, op: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.split(':').next() == Some(op))
            .count()
    }

    /// A paused remote session the provider knows how to resume.
    pub fn seed_paused(&self, handle: &str) {
        self.state.lock().unwrap().paused.insert(handle.to_string());
    }

    /// Simulate the backing resource disappearing.
    pub fn expire(&self, handle: &str) {
        let mut state = self.state.lock().unwrap();
        state.alive.remove(handle);
        state.paused.remove(handle);
    }

    pub fn is_live(&self, handle: &SessionHandle) -> bool {
        self.state.lock().unwrap().alive.contains(handle.as_str())
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn require_alive(&self, handle: &SessionHandle) -> ProviderResult<()> {
        if self.state.lock().unwrap().alive.contains(handle.as_str()) {
            Ok(())
        } else {
            Err(ProviderError::NotFound(handle.to_string()))
        }
    }
}

#[async_trait]
impl ExecutionProvider for FakeProvider {
    async fn create(
        &self,
        template: &str,
        metadata: &SessionMetadata,
        timeout: Duration,
    ) -> ProviderResult<SessionHandle> {
        self.record(format!("create:{}", template));
        // Give concurrent callers a chance to interleave
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(ProviderError::ContainerError("quota exceeded".to_string()));
        }
        state.next_id += 1;
        let handle = format!("sbx-{}", state.next_id);
        state.alive.insert(handle.clone());
        state.metadata.push(metadata.clone());
        state.timeouts.push(timeout);
        Ok(SessionHandle::new(handle))
    }

    async fn resume(&self, handle: &SessionHandle, timeout: Duration) -> ProviderResult<SessionHandle> {
        self.record(format!("resume:{}", handle));
        let mut state = self.state.lock().unwrap();
        if state.fail_resume || !state.paused.remove(handle.as_str()) {
            return Err(ProviderError::NotFound(handle.to_string()));
        }
        state.alive.insert(handle.to_string());
        state.timeouts.push(timeout);
        Ok(handle.clone())
    }

    async fn is_alive(&self, handle: &SessionHandle) -> ProviderResult<bool> {
        self.record(format!("is_alive:{}", handle));
        let state = self.state.lock().unwrap();
        if state.fail_liveness {
            return Err(ProviderError::ConnectionError("liveness check timed out".to_string()));
        }
        Ok(state.alive.contains(handle.as_str()))
    }

    async fn set_timeout(&self, handle: &SessionHandle, timeout: Duration) -> ProviderResult<()> {
        self.record(format!("set_timeout:{}", handle));
        if self.state.lock().unwrap().fail_set_timeout {
            return Err(ProviderError::ConnectionError("timeout update rejected".to_string()));
        }
        self.require_alive(handle)?;
        self.state.lock().unwrap().timeouts.push(timeout);
        Ok(())
    }

    async fn pause(&self, handle: &SessionHandle) -> ProviderResult<SessionHandle> {
        self.record(format!("pause:{}", handle));
        let mut state = self.state.lock().unwrap();
        if state.fail_pause {
            return Err(ProviderError::ContainerError("pause rejected".to_string()));
        }
        if !state.alive.remove(handle.as_str()) {
            return Err(ProviderError::NotFound(handle.to_string()));
        }
        let resumable = if state.rotate_on_pause {
            format!("{}-paused", handle)
        } else {
            handle.to_string()
        };
        state.paused.insert(resumable.clone());
        Ok(SessionHandle::new(resumable))
    }

    async fn kill(&self, handle: &SessionHandle) -> ProviderResult<()> {
        self.record(format!("kill:{}", handle));
        let mut state = self.state.lock().unwrap();
        if state.fail_kill.contains(handle.as_str()) {
            return Err(ProviderError::ConnectionError("kill timed out".to_string()));
        }
        state.alive.remove(handle.as_str());
        state.paused.remove(handle.as_str());
        Ok(())
    }

    async fn write_file(&self, handle: &SessionHandle, path: &str, content: &str) -> ProviderResult<()> {
        self.record(format!("write_file:{}", path));
        self.require_alive(handle)?;
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn run_command(&self, handle: &SessionHandle, command: &str) -> ProviderResult<CommandOutput> {
        self.record(format!("run_command:{}", command));
        self.require_alive(handle)?;
        let exit_code = self.state.lock().unwrap().command_exit_code;
        Ok(CommandOutput {
            exit_code,
            stdout: String::new(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                "ERROR: No matching distribution".to_string()
            },
        })
    }

    async fn run_code(&self, handle: &SessionHandle, _code: &str) -> ProviderResult<CodeOutput> {
        self.record("run_code".to_string());
        self.require_alive(handle)?;
        Ok(self.state.lock().unwrap().code_output.clone())
    }

    async fn compute_url(&self, handle: &SessionHandle, port: u16) -> ProviderResult<String> {
        self.record(format!("compute_url:{}", port));
        self.require_alive(handle)?;
        Ok(format!("https://{}-{}.sandbox.test", port, handle))
    }

    fn default_port(&self, template: &str) -> Option<u16> {
        self.state.lock().unwrap().service_ports.get(template).copied()
    }
}

#[derive(Default)]
pub struct MemoryState {
    pub rows: HashMap<String, PersistedSession>,
    /// `project@user` for scoped touches, `project@service` otherwise
    pub touches: Vec<String>,
    pub writes: usize,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    pub state: Arc<Mutex<MemoryState>>,
    scope: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: FnOnce(&mut MemoryState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn seed(&self, project_id: &str, handle: &str, template: &str) {
        self.state.lock().unwrap().rows.insert(
            project_id.to_string(),
            PersistedSession {
                handle: SessionHandle::new(handle),
                template: Some(template.to_string()),
                last_activity: None,
            },
        );
    }

    pub fn handle(&self, project_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .rows
            .get(project_id)
            .map(|p| p.handle.to_string())
    }

    pub fn touches(&self) -> Vec<String> {
        self.state.lock().unwrap().touches.clone()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn read_handle(&self, project_id: &str) -> StoreResult<Option<PersistedSession>> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(state.rows.get(project_id).cloned())
    }

    async fn write_handle(
        &self,
        project_id: &str,
        handle: Option<&SessionHandle>,
        template: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        state.writes += 1;
        match handle {
            Some(handle) => {
                state.rows.insert(
                    project_id.to_string(),
                    PersistedSession {
                        handle: handle.clone(),
                        template: template.map(String::from),
                        last_activity: None,
                    },
                );
            }
            None => {
                state.rows.remove(project_id);
            }
        }
        Ok(())
    }

    async fn touch_activity(&self, project_id: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let who = self.scope.clone().unwrap_or_else(|| "service".to_string());
        state.touches.push(format!("{}@{}", project_id, who));
        Ok(())
    }

    fn scoped(&self, credentials: &Credentials) -> Option<Arc<dyn ProjectStore>> {
        Some(Arc::new(MemoryStore {
            state: Arc::clone(&self.state),
            scope: Some(credentials.user_id.clone().unwrap_or_else(|| "anonymous".to_string())),
        }))
    }
}

pub struct Harness {
    pub provider: Arc<FakeProvider>,
    pub store: Arc<MemoryStore>,
    pub orchestrator: Arc<SessionOrchestrator>,
}

pub fn harness() -> Harness {
    let provider = Arc::new(FakeProvider::new());
    let store = Arc::new(MemoryStore::new());
    let orchestrator = SessionOrchestrator::builder()
        .provider(provider.clone())
        .store(store.clone())
        .config(SessionConfig::default().with_timeout(TIMEOUT))
        .build()
        .unwrap();

    Harness {
        provider,
        store,
        orchestrator: Arc::new(orchestrator),
    }
}

pub fn creds() -> Credentials {
    Credentials {
        user_id: Some("user-1".to_string()),
        team_id: Some("team-1".to_string()),
        access_token: None,
    }
}
