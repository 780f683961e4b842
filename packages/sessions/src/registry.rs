// ABOUTME: In-process registry of live sessions keyed by project
// ABOUTME: Pure bookkeeping; callers serialize check-then-act per project

use crate::types::Session;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, project_id: &str) -> Option<Session> {
        self.sessions.read().await.get(project_id).cloned()
    }

    /// Insert or replace the session for `project_id`
    pub async fn put(&self, project_id: &str, session: Session) {
        self.sessions
            .write()
            .await
            .insert(project_id.to_string(), session);
    }

    pub async fn remove(&self, project_id: &str) -> Option<Session> {
        self.sessions.write().await.remove(project_id)
    }

    pub async fn all(&self) -> Vec<(String, Session)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, session)| (id.clone(), session.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
