use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use unbake_core::decompile::Decompilation;
use unbake_core::registry::RegistryClient;
use unbake_core::{decompile_config, Decompiler};

use crate::commands::RegistryArgs;
use crate::read_image_config;

/// Decompile an image pulled from its registry.
pub fn decompile_command(image: &str, args: &RegistryArgs, json: bool) -> Result<()> {
    let config = args.effective_config()?;
    info!(platform = %config.registry.platform, "Decompiling {image}");
    let client = RegistryClient::new(config.registry).context("Failed to set up registry client")?;
    let decompilation = Decompiler::new(client).decompile(image)?;
    print_decompilation(&decompilation, json)
}

/// Decompile a local image config JSON file.
pub fn from_config_command(path: &Path, json: bool) -> Result<()> {
    let config = read_image_config(path)?;
    let decompilation = decompile_config(&config);
    print_decompilation(&decompilation, json)
}

/// Script text on stdout, or the tree plus report as JSON.
pub fn print_decompilation(decompilation: &Decompilation, json: bool) -> Result<()> {
    let report = &decompilation.report;
    for skipped in &report.skipped {
        warn!(line = %skipped.line, reason = %skipped.reason, "Dropped history line");
    }
    if !report.unrecognized.is_empty() {
        info!(count = report.unrecognized.len(), "History records without a recognizable instruction");
    }

    if json {
        let serialized = serde_json::to_string_pretty(decompilation)
            .context("Failed to serialize decompilation to JSON")?;
        println!("{serialized}");
    } else {
        print!("{}", decompilation.root.render());
    }
    Ok(())
}
