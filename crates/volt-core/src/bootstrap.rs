use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use volt_memory::{KvBackend, MemoryStore, NullBackend, SqliteBackend};
use volt_provider::create_provider;

use crate::config::{MemoryBackendKind, MemoryConfig, VoltConfig};
use crate::relay::ChatRelay;
use crate::source::ConversationSource;

/// Everything the HTTP surface and CLI need, built from one config.
#[derive(Clone)]
pub struct Services {
    pub relay: ChatRelay,
    pub memory: MemoryStore,
    pub conversations: ConversationSource,
}

pub fn build_services(root: &Path, config: &VoltConfig) -> Result<Services> {
    Ok(Services {
        relay: build_relay(root, config)?,
        memory: build_memory(root, &config.memory)?,
        conversations: ConversationSource::from_setting(
            config.conversations.source.as_deref(),
            root,
        ),
    })
}

pub fn build_relay(root: &Path, config: &VoltConfig) -> Result<ChatRelay> {
    let provider_config = config.chat.provider_config();
    let provider = if provider_config.has_credential() {
        Some(create_provider(&provider_config)?)
    } else {
        tracing::warn!("no chat api_key configured, relay will answer in echo mode");
        None
    };

    Ok(ChatRelay::new(provider, config.chat.model.clone())
        .with_system_prompt(config.chat.resolve_system_prompt(root)?)
        .with_max_tokens(config.chat.max_tokens))
}

pub fn build_memory(root: &Path, config: &MemoryConfig) -> Result<MemoryStore> {
    let backend: Arc<dyn KvBackend> = match config.backend {
        MemoryBackendKind::Memory => {
            tracing::warn!("memory backend is in-process only; saved data is lost on restart");
            Arc::new(NullBackend::new())
        }
        MemoryBackendKind::Sqlite => {
            let path = config
                .resolve_path(root)
                .ok_or_else(|| anyhow!("memory.path is required for the sqlite backend"))?;
            Arc::new(SqliteBackend::open(path)?)
        }
    };
    Ok(MemoryStore::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_builds_echo_relay() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = VoltConfig::default();
        config.chat.api_key = Some(String::new());
        config.memory.backend = MemoryBackendKind::Memory;

        let services = build_services(dir.path(), &config).unwrap();
        assert!(services.relay.is_echo());
        assert_eq!(services.conversations, ConversationSource::None);
    }

    #[test]
    fn configured_key_builds_provider_relay() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = VoltConfig::default();
        config.chat.api_key = Some("sk-test".into());

        let services = build_services(dir.path(), &config).unwrap();
        assert!(!services.relay.is_echo());
        assert!(dir.path().join("data/memory.db").exists());
    }
}
