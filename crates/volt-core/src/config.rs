use std::{fs, path::Path, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use volt_provider::{ProviderConfig, ProviderType};

use crate::relay::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};

pub const MAIN_CONFIG_FILE: &str = "main.yaml";

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_memory_path() -> Option<String> {
    Some("data/memory.db".to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub provider: ProviderType,
    /// Blank or missing puts the relay in echo mode.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Relative to the config root.
    #[serde(default)]
    pub system_prompt_file: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::default(),
            api_key: None,
            api_base: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: None,
            system_prompt: None,
            system_prompt_file: None,
        }
    }
}

impl ChatConfig {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider_type: self.provider,
            api_key: self.api_key.clone(),
            base_url: self.api_base.clone().filter(|b| !b.trim().is_empty()),
            timeout_secs: self.timeout_secs,
        }
    }

    /// Inline prompt wins over the prompt file.
    pub fn resolve_system_prompt(&self, root: &Path) -> Result<Option<String>> {
        if let Some(prompt) = self.system_prompt.as_ref().filter(|p| !p.trim().is_empty()) {
            return Ok(Some(prompt.clone()));
        }
        match self.system_prompt_file.as_ref().filter(|p| !p.trim().is_empty()) {
            Some(file) => {
                let path = root.join(file);
                let prompt = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read system prompt: {}", path.display()))?;
                Ok(Some(prompt))
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackendKind {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub backend: MemoryBackendKind,
    /// Relative to the config root unless absolute.
    #[serde(default = "default_memory_path")]
    pub path: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackendKind::default(),
            path: default_memory_path(),
        }
    }
}

impl MemoryConfig {
    pub fn resolve_path(&self, root: &Path) -> Option<PathBuf> {
        self.path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| root.join(p))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationsConfig {
    /// File path relative to the config root, or an http(s) URL.
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoltConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub conversations: ConversationsConfig,
}

pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

fn resolve_opt(value: &mut Option<String>) {
    if let Some(v) = value.as_mut() {
        *v = resolve_env_var(v);
    }
}

fn resolve_config_env(config: &mut VoltConfig) {
    config.server.bind = resolve_env_var(&config.server.bind);
    resolve_opt(&mut config.chat.api_key);
    resolve_opt(&mut config.chat.api_base);
    config.chat.model = resolve_env_var(&config.chat.model);
    resolve_opt(&mut config.chat.system_prompt);
    resolve_opt(&mut config.chat.system_prompt_file);
    resolve_opt(&mut config.memory.path);
    resolve_opt(&mut config.conversations.source);
}

/// Load `main.yaml` from `config_dir` with `${VAR}` placeholders resolved.
pub fn load_config(config_dir: &Path) -> Result<VoltConfig> {
    let mut config: VoltConfig = read_yaml_file(&config_dir.join(MAIN_CONFIG_FILE))?;
    resolve_config_env(&mut config);
    Ok(config)
}

pub fn validate_config(config: &VoltConfig) -> Result<()> {
    if config.server.port == 0 {
        return Err(anyhow!("server.port must be non-zero"));
    }
    if config.chat.max_tokens == 0 {
        return Err(anyhow!("chat.max_tokens must be greater than zero"));
    }
    if config.chat.model.trim().is_empty() {
        return Err(anyhow!("chat.model must not be empty"));
    }
    if config.memory.backend == MemoryBackendKind::Sqlite
        && config
            .memory
            .path
            .as_deref()
            .map(|p| p.trim().is_empty())
            .unwrap_or(true)
    {
        return Err(anyhow!("memory.path is required for the sqlite backend"));
    }
    Ok(())
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

/// Write a starter `config/main.yaml` under `root` if none exists.
/// Returns `true` when a file was written.
pub fn ensure_skeleton_config(root: &Path, port: u16) -> Result<bool> {
    let config_dir = root.join("config");
    let main_yaml = config_dir.join(MAIN_CONFIG_FILE);

    if main_yaml.exists() {
        return Ok(false);
    }

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(root.join("data"))?;
    fs::write(
        &main_yaml,
        format!(
            "server:\n  bind: 127.0.0.1\n  port: {port}\n\nchat:\n  provider: anthropic\n  api_key: ${{ANTHROPIC_API_KEY}}\n  model: {DEFAULT_MODEL}\n  max_tokens: {DEFAULT_MAX_TOKENS}\n  system_prompt: \"You are Volt, a warm and reliable assistant. Give simple, working solutions.\"\n\nmemory:\n  backend: sqlite\n  path: data/memory.db\n\nconversations:\n  source: null\n"
        ),
    )?;
    tracing::info!("wrote starter config to {}", main_yaml.display());
    Ok(true)
}
