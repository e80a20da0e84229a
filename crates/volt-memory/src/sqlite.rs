use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;
use volt_schema::KvEntry;

use crate::backend::KvBackend;

/// Durable key-value backend on a single SQLite table.
#[derive(Clone)]
pub struct SqliteBackend {
    db: Arc<Mutex<Connection>>,
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            metadata   TEXT,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrate(&conn)?;
        tracing::info!("opened sqlite memory backend at {}", path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl KvBackend for SqliteBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| anyhow!("failed to lock sqlite connection"))?;
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?;
            Ok::<Option<String>, anyhow::Error>(value)
        })
        .await?
    }

    async fn set(&self, key: &str, value: &str, metadata: Option<serde_json::Value>) -> Result<()> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        let value = value.to_owned();
        task::spawn_blocking(move || {
            let metadata = metadata.map(|m| m.to_string());
            let conn = db
                .lock()
                .map_err(|_| anyhow!("failed to lock sqlite connection"))?;
            conn.execute(
                r#"
                INSERT INTO kv (key, value, metadata, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    metadata = excluded.metadata,
                    updated_at = excluded.updated_at
                "#,
                params![key, value, metadata, Utc::now().to_rfc3339()],
            )?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<KvEntry>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| anyhow!("failed to lock sqlite connection"))?;
            let mut stmt =
                conn.prepare("SELECT key, length(CAST(value AS BLOB)) FROM kv ORDER BY key")?;
            let rows = stmt.query_map([], |row| {
                Ok(KvEntry {
                    key: row.get(0)?,
                    size: row.get::<_, i64>(1)? as u64,
                })
            })?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok::<Vec<KvEntry>, anyhow::Error>(entries)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_overwrites_existing_key() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.set("context/latest.json", "one", None).await.unwrap();
        backend
            .set(
                "context/latest.json",
                "two",
                Some(serde_json::json!({"type": "context"})),
            )
            .await
            .unwrap();

        assert_eq!(
            backend.get("context/latest.json").await.unwrap().as_deref(),
            Some("two")
        );
        assert_eq!(backend.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_reports_byte_sizes_in_key_order() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.set("z.json", "é", None).await.unwrap();
        backend.set("a.json", "abc", None).await.unwrap();

        let entries = backend.list().await.unwrap();
        assert_eq!(entries[0].key, "a.json");
        assert_eq!(entries[0].size, 3);
        assert_eq!(entries[1].key, "z.json");
        assert_eq!(entries[1].size, 2);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        assert!(backend.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("memory.db");
        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.set("k", "v", None).await.unwrap();
        }
        let reopened = SqliteBackend::open(&path).unwrap();
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
