mod logs;
mod sessions;
pub mod types;
mod users;
mod workflows;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::vault::TokenCipher;
use crate::platform::{NativePlatform, Platform};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    azure_id TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL,
    name TEXT NOT NULL,
    access_token TEXT,
    refresh_token TEXT,
    token_expires_at INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workflows (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    trigger_kind TEXT NOT NULL,
    actions TEXT NOT NULL,
    action_configs TEXT NOT NULL,
    canvas_data TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS execution_logs (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    workflow_id TEXT NOT NULL,
    status TEXT NOT NULL,
    actions_executed TEXT NOT NULL,
    error TEXT,
    executed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workflows_user_created ON workflows(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_execution_logs_user_executed ON execution_logs(user_id, executed_at);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
";

/// SQLite-backed persistence for users, sessions, workflows and execution logs.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Connection>>,
    cipher: TokenCipher,
}

impl Store {
    pub fn open(path: &Path, cipher: TokenCipher) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            NativePlatform::restrict_dir_permissions(parent);
        }
        let db = Connection::open(path)?;
        NativePlatform::restrict_file_permissions(path);
        db.execute_batch(SCHEMA)?;
        info!("Opened database at {}", path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            cipher,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory(cipher: TokenCipher) -> Result<Self> {
        let db = Connection::open_in_memory()?;
        db.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            cipher,
        })
    }
}

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// In-memory store for tests.
#[cfg(test)]
pub fn test_store() -> Store {
    Store::open_in_memory(TokenCipher::new("test-secret")).expect("open in-memory store")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_database_file_and_schema() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("data").join("consultflow.db");
        let store = Store::open(&path, TokenCipher::new("s")).unwrap();
        assert!(path.exists());

        let db = store.db.lock().await;
        let tables: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('users', 'sessions', 'workflows', 'execution_logs')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn reopening_an_existing_database_is_idempotent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("consultflow.db");
        Store::open(&path, TokenCipher::new("s")).unwrap();
        assert!(Store::open(&path, TokenCipher::new("s")).is_ok());
    }

    #[test]
    fn timestamps_are_rfc3339_utc_with_millis() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(at), "2026-03-01T09:30:00.000Z");
    }
}
