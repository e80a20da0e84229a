use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use volt_schema::KvEntry;

/// Key-value service the memory facade writes through.
///
/// Implementations must give read-after-write consistency for a single key.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, metadata: Option<serde_json::Value>) -> Result<()>;
    /// All stored keys, ordered by key.
    async fn list(&self) -> Result<Vec<KvEntry>>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    metadata: Option<serde_json::Value>,
}

/// Non-durable backend living in process memory.
///
/// Everything is lost when the process restarts.
#[derive(Debug, Default)]
pub struct NullBackend {
    entries: RwLock<BTreeMap<String, StoredValue>>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata attached by the last `set` on `key`.
    pub async fn metadata(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        entries.get(key).and_then(|v| v.metadata.clone())
    }
}

#[async_trait]
impl KvBackend for NullBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).map(|v| v.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, metadata: Option<serde_json::Value>) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                metadata,
            },
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<KvEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .map(|(key, stored)| KvEntry {
                key: key.clone(),
                size: stored.value.len() as u64,
            })
            .collect())
    }
}
