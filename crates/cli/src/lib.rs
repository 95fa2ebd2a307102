use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use unbake_core::model::ImageConfig;

pub mod commands;

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbosity` picks the level
/// (0 = warn, 1 = info, 2+ = debug). Stdout is left for command output.
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

/// Read an image configuration JSON file (the config blob of an image).
pub fn read_image_config(path: &Path) -> Result<ImageConfig> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("Failed to read image config at {}", path.display()))?;
    serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse image config JSON at {}", path.display()))
}
