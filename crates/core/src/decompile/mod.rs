//! Decompiling pipeline: image history to instruction tree.
//!
//! The pipeline is a sequential fold over the ordered history:
//! - `history::order_history` puts records in build order
//! - `extract::extract_cmd` recovers one instruction line per record
//! - `append_line` tokenizes the line and appends the nodes to the root
//!
//! Only reference resolution and the image fetch can fail a decompilation.
//! Records that yield nothing, and lines the tokenizer rejects, are counted in
//! the [`DecompileReport`] and otherwise dropped.

mod extract;
mod history;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::RegistrySettings;
use crate::model::ImageConfig;
use crate::parser::{self, RootNode, SyntaxError};
use crate::registry::{ImageSource, Reference, RegistryClient, RegistryError};

pub use extract::{extract_cmd, NOP_MARKER, SHELL_WRAPPER};
pub use history::order_history;

/// Comments starting with this carry the base image declaration.
const FROM_PREFIX: &str = "FROM ";

/// Fatal decompilation failures. Everything else is absorbed.
#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("Failed to resolve image reference: {0}")]
    InvalidReference(#[source] RegistryError),

    #[error("Failed to fetch image {reference}: {source}")]
    Fetch {
        reference: String,
        #[source]
        source: RegistryError,
    },
}

/// What happened to one canonical line handed to [`append_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// The line produced this many top-level nodes.
    Recovered(usize),
    /// The tokenizer rejected the line; nothing was appended.
    Skipped(SyntaxError),
}

/// Tokenize `line` and append its nodes to `root`.
///
/// Syntax errors are not propagated: some image producers record instruction
/// text that is not valid on its own (multi-word LABEL values, for one), and
/// losing one line is preferable to losing the whole script.
pub fn append_line(line: &str, root: &mut RootNode) -> LineOutcome {
    match parser::parse(line) {
        Ok(tree) => {
            let nodes = tree.into_nodes();
            let count = nodes.len();
            root.extend(nodes);
            LineOutcome::Recovered(count)
        }
        Err(err) => {
            debug!(%err, line, "Skipping line rejected by the tokenizer");
            LineOutcome::Skipped(err)
        }
    }
}

/// A line the tokenizer rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    pub line: String,
    pub reason: String,
}

/// Bookkeeping for one decompilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecompileReport {
    /// History records examined.
    pub records: usize,
    /// Top-level instructions appended to the root.
    pub recovered: usize,
    /// `created_by` values no heuristic recognized.
    pub unrecognized: Vec<String>,
    /// Lines the tokenizer rejected.
    pub skipped: Vec<SkippedLine>,
    /// Whether a trailing `USER` line was synthesized from the runtime user.
    pub synthesized_user: bool,
}

impl DecompileReport {
    fn record(&mut self, line: &str, outcome: &LineOutcome) {
        match outcome {
            LineOutcome::Recovered(count) => self.recovered += count,
            LineOutcome::Skipped(err) => {
                self.skipped.push(SkippedLine { line: line.to_string(), reason: err.to_string() })
            }
        }
    }
}

/// Result of a successful decompilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decompilation {
    pub root: RootNode,
    pub report: DecompileReport,
}

/// Decompile an already fetched image configuration.
///
/// History is replayed in creation order. When the configuration names a
/// runtime user, `USER <user>` is appended after the replay unless the last
/// recovered top-level USER already sets that user, so the rendered script
/// always ends up running as the configured user.
pub fn decompile_config(config: &ImageConfig) -> Decompilation {
    let mut history = config.history.clone();
    order_history(&mut history);

    let mut root = RootNode::new();
    let mut report = DecompileReport { records: history.len(), ..DecompileReport::default() };

    for record in &history {
        // The comment is only ever a source for FROM; created_by for the rest.
        if let Some(comment) = record.comment.as_deref().filter(|c| c.starts_with(FROM_PREFIX)) {
            let outcome = append_line(comment, &mut root);
            report.record(comment, &outcome);
        }
        let Some(created_by) = record.created_by.as_deref().filter(|c| !c.is_empty()) else {
            continue;
        };
        let line = extract_cmd(created_by);
        if line.is_empty() {
            debug!(created_by, "No instruction recoverable from history record");
            report.unrecognized.push(created_by.to_string());
            continue;
        }
        let outcome = append_line(&line, &mut root);
        report.record(&line, &outcome);
    }

    let user = config.runtime_user();
    if !user.is_empty() && effective_user(&root) != Some(user) {
        let line = format!("USER {user}");
        let outcome = append_line(&line, &mut root);
        report.synthesized_user = matches!(outcome, LineOutcome::Recovered(_));
        report.record(&line, &outcome);
    }

    Decompilation { root, report }
}

/// User set by the last top-level USER instruction.
fn effective_user(root: &RootNode) -> Option<&str> {
    root.children().iter().rev().find_map(|node| node.user())
}

/// Ties an [`ImageSource`] to the decompiling pipeline.
pub struct Decompiler<S: ImageSource> {
    source: S,
}

impl<S: ImageSource> Decompiler<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Resolve `reference`, fetch its configuration and decompile it.
    pub fn decompile(&self, reference: &str) -> Result<Decompilation, DecompileError> {
        let reference = Reference::parse(reference).map_err(DecompileError::InvalidReference)?;
        info!(%reference, "Fetching image configuration");
        let config = self.source.fetch_config(&reference).map_err(|source| {
            DecompileError::Fetch { reference: reference.to_string(), source }
        })?;

        let decompilation = decompile_config(&config);
        info!(
            records = decompilation.report.records,
            recovered = decompilation.report.recovered,
            skipped = decompilation.report.skipped.len(),
            "Decompiled image history"
        );
        Ok(decompilation)
    }
}

/// Decompile `reference` with a registry client using default settings.
pub fn decompile(reference: &str) -> Result<RootNode, DecompileError> {
    let client = RegistryClient::new(RegistrySettings::default())
        .map_err(|source| DecompileError::Fetch { reference: reference.to_string(), source })?;
    Decompiler::new(client).decompile(reference).map(|decompilation| decompilation.root)
}
