/// Session-scoped durable state: key/value slots plus an event log.
///
/// The sqlite backend exists so a suspended interrupt and the triage run
/// snapshot survive process restarts; the memory backend covers tests and
/// throwaway sessions.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use crate::cli::SessionBackend;
use crate::config::RuntimeConfig;

/// State key holding a pending approval interrupt.
pub const PENDING_INTERRUPT_KEY: &str = "pending_interrupt";
/// State key holding the resumable triage run snapshot.
pub const TRIAGE_RUN_KEY: &str = "triage_run";
/// State keys filled by the memory loader.
pub const USER_MEMORY_KEY: &str = "user_memory";
pub const PROJECT_MEMORY_KEY: &str = "project_memory";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub payload: Value,
}

impl SessionEvent {
    pub fn now(author: &str, kind: &str, payload: Value) -> Self {
        Self {
            author: author.to_string(),
            timestamp: Utc::now(),
            kind: kind.to_string(),
            payload,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub event_count: usize,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn ensure_session(&self, session_id: &str) -> Result<()>;
    async fn get_state(&self, session_id: &str, key: &str) -> Result<Option<Value>>;
    async fn put_state(&self, session_id: &str, key: &str, value: &Value) -> Result<()>;
    async fn clear_state(&self, session_id: &str, key: &str) -> Result<()>;
    async fn append_event(&self, session_id: &str, event: SessionEvent) -> Result<()>;
    async fn events(&self, session_id: &str, recent: Option<usize>) -> Result<Vec<SessionEvent>>;
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

pub async fn build_session_store(cfg: &RuntimeConfig) -> Result<Arc<dyn SessionStore>> {
    match cfg.session_backend {
        SessionBackend::Memory => Ok(Arc::new(InMemorySessionStore::new())),
        SessionBackend::Sqlite => {
            let store = SqliteSessionStore::open(&cfg.session_db_url).await?;
            Ok(Arc::new(store))
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SessionData {
    state: HashMap<String, Value>,
    events: Vec<SessionEvent>,
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: std::sync::Mutex<HashMap<String, SessionData>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn ensure_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.entry(session_id.to_string()).or_default();
        Ok(())
    }

    async fn get_state(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(sessions
            .get(session_id)
            .and_then(|data| data.state.get(key))
            .cloned())
    }

    async fn put_state(&self, session_id: &str, key: &str, value: &Value) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(session_id.to_string())
            .or_default()
            .state
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn clear_state(&self, session_id: &str, key: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(data) = sessions.get_mut(session_id) {
            data.state.remove(key);
        }
        Ok(())
    }

    async fn append_event(&self, session_id: &str, event: SessionEvent) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(session_id.to_string())
            .or_default()
            .events
            .push(event);
        Ok(())
    }

    async fn events(&self, session_id: &str, recent: Option<usize>) -> Result<Vec<SessionEvent>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let events = sessions
            .get(session_id)
            .map(|data| data.events.clone())
            .unwrap_or_default();
        Ok(tail_events(events, recent))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let mut summaries = sessions
            .iter()
            .map(|(session_id, data)| SessionSummary {
                session_id: session_id.clone(),
                event_count: data.events.len(),
            })
            .collect::<Vec<_>>();
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(summaries)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id);
        Ok(())
    }
}

fn tail_events(events: Vec<SessionEvent>, recent: Option<usize>) -> Vec<SessionEvent> {
    match recent {
        Some(count) if events.len() > count => events[events.len() - count..].to_vec(),
        _ => events,
    }
}

// ---------------------------------------------------------------------------
// Sqlite backend
// ---------------------------------------------------------------------------

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub async fn open(db_url: &str) -> Result<Self> {
        ensure_parent_dir_for_sqlite_url(db_url)?;
        let pool = SqlitePool::connect(db_url)
            .await
            .context("failed to open sqlite session database")?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                 session_id TEXT PRIMARY KEY,
                 created_at TEXT NOT NULL
             )",
        )
        .execute(&self.pool)
        .await
        .context("failed to run sqlite session migrations")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_state (
                 session_id TEXT NOT NULL,
                 key TEXT NOT NULL,
                 value TEXT NOT NULL,
                 PRIMARY KEY (session_id, key)
             )",
        )
        .execute(&self.pool)
        .await
        .context("failed to run sqlite session migrations")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_events (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 session_id TEXT NOT NULL,
                 author TEXT NOT NULL,
                 ts TEXT NOT NULL,
                 kind TEXT NOT NULL,
                 payload TEXT NOT NULL
             )",
        )
        .execute(&self.pool)
        .await
        .context("failed to run sqlite session migrations")?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn ensure_session(&self, session_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (session_id, created_at) VALUES (?, ?)
             ON CONFLICT(session_id) DO NOTHING",
        )
        .bind(session_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to create session '{session_id}'"))?;
        Ok(())
    }

    async fn get_state(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT value FROM session_state WHERE session_id = ? AND key = ?")
            .bind(session_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("failed to read session state")?;

        row.map(|row| {
            let raw: String = row.get("value");
            serde_json::from_str(&raw).context("invalid JSON in session state")
        })
        .transpose()
    }

    async fn put_state(&self, session_id: &str, key: &str, value: &Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO session_state (session_id, key, value) VALUES (?, ?, ?)
             ON CONFLICT(session_id, key) DO UPDATE SET value = excluded.value",
        )
        .bind(session_id)
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .execute(&self.pool)
        .await
        .context("failed to write session state")?;
        Ok(())
    }

    async fn clear_state(&self, session_id: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_state WHERE session_id = ? AND key = ?")
            .bind(session_id)
            .bind(key)
            .execute(&self.pool)
            .await
            .context("failed to clear session state")?;
        Ok(())
    }

    async fn append_event(&self, session_id: &str, event: SessionEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO session_events (session_id, author, ts, kind, payload)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(&event.author)
        .bind(event.timestamp.to_rfc3339())
        .bind(&event.kind)
        .bind(serde_json::to_string(&event.payload)?)
        .execute(&self.pool)
        .await
        .context("failed to append session event")?;
        Ok(())
    }

    async fn events(&self, session_id: &str, recent: Option<usize>) -> Result<Vec<SessionEvent>> {
        let rows = sqlx::query(
            "SELECT author, ts, kind, payload FROM session_events
             WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to read session events")?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let ts: String = row.get("ts");
            let payload: String = row.get("payload");
            events.push(SessionEvent {
                author: row.get("author"),
                timestamp: DateTime::parse_from_rfc3339(&ts)
                    .context("invalid timestamp in session event")?
                    .with_timezone(&Utc),
                kind: row.get("kind"),
                payload: serde_json::from_str(&payload)
                    .context("invalid JSON in session event")?,
            });
        }
        Ok(tail_events(events, recent))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT s.session_id AS session_id, COUNT(e.id) AS event_count
             FROM sessions s LEFT JOIN session_events e ON e.session_id = s.session_id
             GROUP BY s.session_id ORDER BY s.session_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list sessions")?;

        Ok(rows
            .into_iter()
            .map(|row| SessionSummary {
                session_id: row.get("session_id"),
                event_count: row.get::<i64, _>("event_count") as usize,
            })
            .collect())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_events WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("failed to delete session events")?;
        sqlx::query("DELETE FROM session_state WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("failed to delete session state")?;
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("failed to delete session")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sqlite URL helpers
// ---------------------------------------------------------------------------

pub fn ensure_parent_dir_for_sqlite_url(db_url: &str) -> Result<()> {
    let Some(db_path) = sqlite_path_from_url(db_url) else {
        return Ok(());
    };

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create directory for sqlite database: {}",
                parent.display()
            )
        })?;
    }

    if !db_path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&db_path)
            .with_context(|| {
                format!(
                    "failed to initialize sqlite database file: {}",
                    db_path.display()
                )
            })?;
    }

    Ok(())
}

pub fn sqlite_path_from_url(db_url: &str) -> Option<PathBuf> {
    if !db_url.starts_with("sqlite://") {
        return None;
    }

    let path_with_params = db_url.trim_start_matches("sqlite://");
    let path_without_params = path_with_params
        .split_once('?')
        .map(|(path, _)| path)
        .unwrap_or(path_with_params);

    if path_without_params.is_empty() || path_without_params == ":memory:" {
        return None;
    }

    Some(Path::new(path_without_params).to_path_buf())
}
