use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::RunState;
use crate::utils::error::Result;
use crate::utils::metrics::PERSIST_FAILURES_TOTAL;

/// Durable home of the single run record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn persist(&self, state: &RunState) -> Result<()>;

    async fn restore(&self) -> Result<Option<RunState>>;
}

/// Keeps the run record as JSON in a one-row sqlite table.
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        ensure_parent_dir(url)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS run_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn ensure_parent_dir(url: &str) -> Result<()> {
    let Some(rest) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn persist(&self, state: &RunState) -> Result<()> {
        let payload = serde_json::to_string(state)?;
        sqlx::query(
            r#"
            INSERT INTO run_state (id, payload, updated_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at
            "#,
        )
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn restore(&self) -> Result<Option<RunState>> {
        let payload: Option<String> = sqlx::query_scalar("SELECT payload FROM run_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

/// In-process store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RwLock<Option<RunState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: RunState) -> Self {
        Self {
            state: RwLock::new(Some(state)),
        }
    }

    pub async fn snapshot(&self) -> Option<RunState> {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn persist(&self, state: &RunState) -> Result<()> {
        *self.state.write().await = Some(state.clone());
        Ok(())
    }

    async fn restore(&self) -> Result<Option<RunState>> {
        Ok(self.state.read().await.clone())
    }
}

/// Writes every published snapshot to `store` until the sender goes away.
/// Snapshots published faster than the store accepts them are coalesced;
/// the most recent one is always written.
pub fn spawn_persister(store: Arc<dyn StateStore>, mut rx: watch::Receiver<Arc<RunState>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            match store.persist(&state).await {
                Ok(()) => debug!("Persisted run state at cursor {}", state.cursor),
                Err(e) => {
                    metrics::counter!(PERSIST_FAILURES_TOTAL).increment(1);
                    warn!("Failed to persist run state: {}", e);
                }
            }
        }
        debug!("Persister stopped");
    })
}
