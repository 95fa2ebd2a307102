//! unbake-core
//!
//! Core library that reconstructs a Containerfile from the history recorded
//! in a container image's configuration.
//!
//! This crate defines the image model, the instruction tokenizer, the
//! decompiling heuristics, and the registry client used to fetch image
//! configurations.
//!
//! The goal is to keep all substantive logic here so it is fully testable and
//! reusable from multiple frontends (CLI, services, etc.).

pub mod config;
pub mod decompile;
pub mod instructions;
pub mod model;
pub mod parser;
pub mod registry;

pub use decompile::{decompile, decompile_config, DecompileError, Decompiler};
pub use parser::{InstructionNode, RootNode};

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
