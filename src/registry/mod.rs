//! Persisted channel registry.
//!
//! Authoritative for "channels we know about", independent of the
//! provider's live state. Backed by SQLite; the trait seam keeps the
//! reconciler and orchestrator testable in-process.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::error::OrchestratorError;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChannelRecord {
    pub id: i64,
    /// Channel name as the provider knows it.
    pub title: String,
    pub host_uid: String,
    pub created_at: String,
}

#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    async fn list_channels(&self) -> Result<Vec<ChannelRecord>, OrchestratorError>;

    async fn add_channel(&self, title: &str, host_uid: &str)
        -> Result<i64, OrchestratorError>;
}

pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS channels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL UNIQUE,
            host_uid TEXT NOT NULL,
            created_at TEXT NOT NULL
        );",
    )
}

pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    pub fn open(path: &Path) -> Result<Self, OrchestratorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        migrate(&conn)?;
        info!("Channel registry opened at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, OrchestratorError> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl ChannelRegistry for SqliteRegistry {
    async fn list_channels(&self) -> Result<Vec<ChannelRecord>, OrchestratorError> {
        let conn = self.conn.lock().expect("registry lock poisoned");
        let mut stmt =
            conn.prepare("SELECT id, title, host_uid, created_at FROM channels ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(ChannelRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                host_uid: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?);
        }
        Ok(channels)
    }

    async fn add_channel(
        &self,
        title: &str,
        host_uid: &str,
    ) -> Result<i64, OrchestratorError> {
        let created_at = Utc::now().to_rfc3339();
        let conn = self.conn.lock().expect("registry lock poisoned");
        conn.execute(
            "INSERT INTO channels (title, host_uid, created_at) VALUES (?1, ?2, ?3)",
            (title, host_uid, &created_at),
        )?;
        Ok(conn.last_insert_rowid())
    }
}
