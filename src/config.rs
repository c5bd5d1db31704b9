//! Configuration management for sidechat.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::OutputMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Index into `backends` the fallback chain starts from.
    #[serde(default)]
    pub default_backend: usize,
    /// Ranked backends; on failure the next one (wrapping) is tried.
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Display name used in the latency footer.
    pub name: String,
    pub model: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Overrides `llm.api_base` for this backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Overrides `llm.api_key_env` for this backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_provider() -> String {
    "openai_compatible".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Append replies to a markdown file instead of the live display.
    #[serde(default)]
    pub write_to_file: bool,
    #[serde(default = "default_file_name")]
    pub file_name: String,
}

fn default_file_name() -> String {
    "output".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_to_file: false,
            file_name: default_file_name(),
        }
    }
}

impl OutputConfig {
    pub fn mode(&self) -> OutputMode {
        if self.write_to_file {
            OutputMode::File {
                name: self.file_name.clone(),
            }
        } else {
            OutputMode::Live
        }
    }
}

/// Which workspace files are offered for `@name.ext` mentions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    #[serde(default = "default_exclude_extensions")]
    pub exclude_extensions: Vec<String>,
    /// File names containing any of these are skipped.
    #[serde(default = "default_exclude_name_fragments")]
    pub exclude_name_fragments: Vec<String>,
}

fn default_exclude_dirs() -> Vec<String> {
    ["node_modules", ".next", "images", "public", ".git", "target"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_extensions() -> Vec<String> {
    ["png", "jpg", "svg", "mjs", "lock", "woff"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_name_fragments() -> Vec<String> {
    ["config", "_", ".git", ".eslint"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: default_exclude_dirs(),
            exclude_extensions: default_exclude_extensions(),
            exclude_name_fragments: default_exclude_name_fragments(),
        }
    }
}

fn default_backends() -> Vec<BackendConfig> {
    [
        ("Llama 3.1 Nemotron", "nvidia/llama-3.1-nemotron-ultra-253b-v1:free"),
        ("Llama 4 Maverick", "meta-llama/llama-4-maverick:free"),
        ("Qwen3", "qwen/qwen3-235b-a22b:free"),
        ("Deepseek V3", "deepseek/deepseek-chat:free"),
        ("Gemma 2.0 Flash", "google/gemini-2.0-flash-exp:free"),
        ("Gemma 3.0 (27b)", "google/gemma-3-27b-it:free"),
    ]
    .iter()
    .map(|(name, model)| BackendConfig {
        name: name.to_string(),
        model: model.to_string(),
        provider: default_provider(),
        api_base: None,
        api_key_env: None,
    })
    .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_base: Some("https://openrouter.ai/api/v1".to_string()),
                api_key: None,
                api_key_env: default_api_key_env(),
                max_tokens: default_max_tokens(),
                system_prompt: None,
                default_backend: 0,
                backends: default_backends(),
            },
            output: OutputConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".sidechat").join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };

        if let Ok(api_base) = std::env::var("SIDECHAT_API_BASE") {
            config.llm.api_base = Some(api_base);
        }
        if let Ok(backend) = std::env::var("SIDECHAT_BACKEND") {
            config.llm.default_backend = backend
                .parse()
                .with_context(|| format!("SIDECHAT_BACKEND is not an index: {}", backend))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.llm.backends.is_empty() {
            bail!("At least one [[llm.backends]] entry is required");
        }
        if self.llm.default_backend >= self.llm.backends.len() {
            bail!(
                "default_backend {} is out of range (have {} backends)",
                self.llm.default_backend,
                self.llm.backends.len()
            );
        }
        Ok(())
    }

    pub fn api_key(&self) -> Result<String> {
        if let Some(key) = &self.llm.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }
        std::env::var(&self.llm.api_key_env).with_context(|| {
            format!(
                "API key not found. Either:\n  \
                 1. Set api_key in config file: {}\n  \
                 2. Set environment variable: export {}=your-key",
                Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                self.llm.api_key_env
            )
        })
    }

    /// API key for one backend: its own env var if it names one, else the
    /// shared key.
    pub fn api_key_for(&self, backend: &BackendConfig) -> Result<String> {
        match &backend.api_key_env {
            Some(var) => std::env::var(var)
                .with_context(|| format!("API key for {} not found: export {}", backend.name, var)),
            None => self.api_key(),
        }
    }

    /// Endpoint for one backend. The shared `llm.api_base` only applies to
    /// OpenAI-compatible backends; other providers use their own default.
    pub fn api_base_for(&self, backend: &BackendConfig) -> Option<String> {
        backend.api_base.clone().or_else(|| {
            if backend.provider == default_provider() {
                self.llm.api_base.clone()
            } else {
                None
            }
        })
    }

    pub fn save_default() -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let default = Self::default();
        let content = toml::to_string_pretty(&default).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        Ok(config_path)
    }
}
