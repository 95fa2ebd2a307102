use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use unbake::commands::{
    decompile_command, extract_command, from_config_command, init_config_command,
    show_config_command, RegistryArgs,
};
use unbake::init_tracing;

/// Reconstruct a Containerfile from the history recorded in a container image.
///
/// This CLI is a thin wrapper around `unbake-core`; all substantive logic
/// lives in the library so it can be tested thoroughly and reused from other
/// frontends.
#[derive(Parser, Debug)]
#[command(
    name = "unbake",
    version,
    about = "Reconstruct a Containerfile from container image history",
    long_about = None
)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch an image's configuration from its registry and decompile it.
    ///
    /// IMAGE is a reference such as `nginx`, `ghcr.io/org/app:1.2` or
    /// `alpine@sha256:...`; Docker Hub names are normalized.
    Decompile {
        image: String,

        #[command(flatten)]
        registry: RegistryArgs,

        /// Emit the instruction tree and report as JSON instead of script text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Decompile a local image configuration JSON file.
    FromConfig {
        path: PathBuf,

        /// Emit the instruction tree and report as JSON instead of script text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the instruction recovered from a single `created_by` value.
    Extract {
        #[arg(allow_hyphen_values = true)]
        created_by: String,
    },

    /// Print the effective configuration (config file plus flags) as JSON.
    ShowConfig {
        #[command(flatten)]
        registry: RegistryArgs,
    },

    /// Write a config file with default values.
    InitConfig {
        #[arg(default_value = "unbake.json")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Decompile { image, registry, json } => decompile_command(&image, &registry, json)?,
        Command::FromConfig { path, json } => from_config_command(&path, json)?,
        Command::Extract { created_by } => extract_command(&created_by),
        Command::ShowConfig { registry } => show_config_command(&registry)?,
        Command::InitConfig { path, force } => init_config_command(&path, force)?,
    }

    Ok(())
}
