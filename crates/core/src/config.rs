use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::Platform;

/// Default per-request timeout for registry calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings for talking to container registries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Platform picked out of multi-platform indexes.
    pub platform: Platform,
    /// Registry hosts (`host[:port]`) reached over plain HTTP.
    pub insecure_registries: Vec<String>,
    /// Per-request timeout in seconds; `0` disables the timeout.
    pub timeout_secs: u64,
    /// Explicit Docker `config.json` for credentials. When unset, the usual
    /// `$DOCKER_CONFIG` / `~/.docker` lookup applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_config: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            insecure_registries: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            docker_config: None,
            user_agent: format!("unbake/{}", crate::version()),
        }
    }
}

impl RegistrySettings {
    /// Whether `host` was configured as a plain-HTTP registry.
    pub fn is_insecure(&self, host: &str) -> bool {
        self.insecure_registries.iter().any(|h| h.eq_ignore_ascii_case(host))
    }

    /// Timeout applied to registry requests and credential helpers, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Serializable decompiler configuration.
///
/// Typically loaded from a JSON file passed on the command line; every field
/// is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompilerConfig {
    /// Schema/config version. This is about the config format, not the tool.
    pub config_version: String,
    pub registry: RegistrySettings,
}

impl Default for DecompilerConfig {
    fn default() -> Self {
        Self { config_version: "0.1.0".to_string(), registry: RegistrySettings::default() }
    }
}

/// Load a decompiler config JSON file.
pub fn load_config(path: impl AsRef<Path>) -> Result<DecompilerConfig> {
    let path = path.as_ref();
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let config: DecompilerConfig = serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse config JSON at {}", path.display()))?;
    Ok(config)
}

/// Load `path` when given, otherwise fall back to defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<DecompilerConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(DecompilerConfig::default()),
    }
}
