// ABOUTME: Durable project store holding each project's last known session handle
// ABOUTME: Store trait plus a SQLite implementation with credentials-scoped clients

use crate::types::{Credentials, SessionHandle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not authorized to modify project {0}")]
    Unauthorized(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// What the store remembers about a project's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub handle: SessionHandle,
    pub template: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Current handle for the project, or `None` when nothing is persisted.
    async fn read_handle(&self, project_id: &str) -> Result<Option<PersistedSession>>;

    /// Upsert the handle. `None` clears it.
    async fn write_handle(
        &self,
        project_id: &str,
        handle: Option<&SessionHandle>,
        template: Option<&str>,
    ) -> Result<()>;

    async fn touch_activity(&self, project_id: &str) -> Result<()>;

    /// Client whose writes are authorized against `credentials`.
    /// Stores without row-level authorization return `None`.
    fn scoped(&self, _credentials: &Credentials) -> Option<Arc<dyn ProjectStore>> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Scope {
    user_id: Option<String>,
    team_id: Option<String>,
}

#[derive(Clone)]
pub struct SqliteProjectStore {
    pool: SqlitePool,
    scope: Option<Scope>,
}

impl SqliteProjectStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, scope: None }
    }

    /// Open (creating if needed) the database at `database_url` and apply migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database on a single connection
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("./migrations").run(pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Reject writes to rows owned by a different user and team.
    async fn authorize(&self, project_id: &str) -> Result<()> {
        let Some(scope) = &self.scope else {
            return Ok(());
        };

        let row = sqlx::query(
            "SELECT owner_user_id, owner_team_id FROM project_sessions WHERE project_id = ?1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(());
        };

        let owner_user: Option<String> = row.get("owner_user_id");
        let owner_team: Option<String> = row.get("owner_team_id");

        if owner_user.is_none() && owner_team.is_none() {
            return Ok(());
        }

        let user_match = owner_user.is_some() && owner_user == scope.user_id;
        let team_match = owner_team.is_some() && owner_team == scope.team_id;

        if user_match || team_match {
            Ok(())
        } else {
            Err(StoreError::Unauthorized(project_id.to_string()))
        }
    }

    fn owners(&self) -> (Option<&str>, Option<&str>) {
        match &self.scope {
            Some(scope) => (scope.user_id.as_deref(), scope.team_id.as_deref()),
            None => (None, None),
        }
    }
}

#[async_trait]
impl ProjectStore for SqliteProjectStore {
    async fn read_handle(&self, project_id: &str) -> Result<Option<PersistedSession>> {
        let row = sqlx::query(
            r#"
            SELECT session_handle, template, last_activity_at
            FROM project_sessions
            WHERE project_id = ?1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let handle: Option<String> = row.get("session_handle");
        Ok(handle.map(|handle| PersistedSession {
            handle: SessionHandle::new(handle),
            template: row.get("template"),
            last_activity: row.get("last_activity_at"),
        }))
    }

    async fn write_handle(
        &self,
        project_id: &str,
        handle: Option<&SessionHandle>,
        template: Option<&str>,
    ) -> Result<()> {
        self.authorize(project_id).await?;
        let (owner_user, owner_team) = self.owners();

        sqlx::query(
            r#"
            INSERT INTO project_sessions
                (project_id, session_handle, template, owner_user_id, owner_team_id, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(project_id) DO UPDATE SET
                session_handle = excluded.session_handle,
                template = excluded.template,
                owner_user_id = COALESCE(project_sessions.owner_user_id, excluded.owner_user_id),
                owner_team_id = COALESCE(project_sessions.owner_team_id, excluded.owner_team_id),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(project_id)
        .bind(handle.map(SessionHandle::as_str))
        .bind(template)
        .bind(owner_user)
        .bind(owner_team)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(
            "Persisted session handle for project {}: {}",
            project_id,
            handle.map(SessionHandle::as_str).unwrap_or("<cleared>")
        );
        Ok(())
    }

    async fn touch_activity(&self, project_id: &str) -> Result<()> {
        self.authorize(project_id).await?;
        let (owner_user, owner_team) = self.owners();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO project_sessions
                (project_id, last_activity_at, owner_user_id, owner_team_id, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?2)
            ON CONFLICT(project_id) DO UPDATE SET
                last_activity_at = excluded.last_activity_at,
                owner_user_id = COALESCE(project_sessions.owner_user_id, excluded.owner_user_id),
                owner_team_id = COALESCE(project_sessions.owner_team_id, excluded.owner_team_id),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(project_id)
        .bind(now)
        .bind(owner_user)
        .bind(owner_team)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn scoped(&self, credentials: &Credentials) -> Option<Arc<dyn ProjectStore>> {
        Some(Arc::new(SqliteProjectStore {
            pool: self.pool.clone(),
            scope: Some(Scope {
                user_id: credentials.user_id.clone(),
                team_id: credentials.team_id.clone(),
            }),
        }))
    }
}
