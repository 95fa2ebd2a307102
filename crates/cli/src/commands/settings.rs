use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use unbake_core::config::{load_config_or_default, DecompilerConfig};
use unbake_core::model::Platform;

/// Registry options shared by commands that talk to a registry.
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// JSON config file; flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Platform to pick from multi-platform images (os/arch[/variant]).
    #[arg(long)]
    pub platform: Option<Platform>,

    /// Docker config.json to read registry credentials from.
    #[arg(long)]
    pub docker_config: Option<PathBuf>,

    /// Registry host (host[:port]) to reach over plain HTTP. Repeatable.
    #[arg(long = "insecure-registry", value_name = "HOST")]
    pub insecure_registries: Vec<String>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl RegistryArgs {
    /// Config file values (or defaults) with command-line overrides applied.
    pub fn effective_config(&self) -> Result<DecompilerConfig> {
        let mut config = load_config_or_default(self.config.as_deref())?;
        let registry = &mut config.registry;
        if let Some(platform) = &self.platform {
            registry.platform = platform.clone();
        }
        if let Some(path) = &self.docker_config {
            registry.docker_config = Some(path.clone());
        }
        if let Some(timeout) = self.timeout_secs {
            registry.timeout_secs = timeout;
        }
        for host in &self.insecure_registries {
            if !registry.is_insecure(host) {
                registry.insecure_registries.push(host.clone());
            }
        }
        Ok(config)
    }
}

/// Print the effective configuration as JSON.
pub fn show_config_command(args: &RegistryArgs) -> Result<()> {
    let config = args.effective_config()?;
    let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
    println!("{json}");
    Ok(())
}

/// Write a default config file to `path`, refusing to overwrite unless forced.
pub fn init_config_command(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("Config file already exists at {} (use --force to overwrite)", path.display());
    }
    let json = serde_json::to_string_pretty(&DecompilerConfig::default())
        .context("Failed to serialize config")?;
    std::fs::write(path, format!("{json}\n"))
        .with_context(|| format!("Failed to write config at {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
