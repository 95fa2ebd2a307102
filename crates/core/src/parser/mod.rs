//! Instruction tokenizer.
//!
//! Turns Containerfile text into [`InstructionNode`]s. The grammar is the
//! forgiving line grammar of Dockerfiles:
//! - blank lines and `#` comment lines are skipped
//! - a trailing backslash continues the instruction on the next line
//! - leading `--name=value` words are instruction flags
//! - RUN/COPY/ADD may open here-documents (`<<EOF`) whose bodies follow
//!
//! Anything the grammar cannot read is a [`SyntaxError`]; the caller decides
//! whether that is fatal.

mod node;

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::instructions::Keyword;

pub use node::{Arguments, HealthTest, Heredoc, InstructionNode, KeyValue, RootNode};

const ESCAPE: char = '\\';

/// Error reported when text cannot be tokenized into instructions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("file with no instructions")]
    Empty,

    #[error("unknown instruction: {0}")]
    UnknownInstruction(String),

    #[error("{0} requires at least one argument")]
    MissingArguments(Keyword),

    /// A `name=value` list contains a bare word (typical of LABEL values
    /// that were written unquoted across several words).
    #[error("Syntax error - can't find = in {word:?}. Must be of the form: name=value")]
    MissingEquals { word: String },

    #[error("{0} must have two arguments")]
    MissingValue(Keyword),

    #[error("unterminated heredoc: expected terminator {0:?}")]
    UnterminatedHeredoc(String),

    #[error("Unknown type {0:?} in HEALTHCHECK (try CMD)")]
    UnknownHealthcheckType(String),

    #[error("HEALTHCHECK NONE takes no arguments")]
    HealthcheckNoneWithArguments,

    #[error("{0} isn't allowed as an ONBUILD trigger")]
    InvalidTrigger(Keyword),
}

/// Result of tokenizing a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    pub nodes: Vec<InstructionNode>,
}

impl SyntaxTree {
    pub fn into_nodes(self) -> Vec<InstructionNode> {
        self.nodes
    }
}

/// Tokenize `text` into top-level instruction nodes.
pub fn parse(text: &str) -> Result<SyntaxTree, SyntaxError> {
    let mut cursor = LineCursor::new(text);
    let mut nodes = Vec::new();
    while let Some(line) = cursor.next_logical_line() {
        nodes.push(parse_instruction(&line, &mut cursor)?);
    }
    if nodes.is_empty() {
        return Err(SyntaxError::Empty);
    }
    Ok(SyntaxTree { nodes })
}

struct LineCursor<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { lines: text.lines().collect(), pos: 0 }
    }

    fn next_raw(&mut self) -> Option<&'a str> {
        let line = self.lines.get(self.pos).copied()?;
        self.pos += 1;
        Some(line)
    }

    /// Next instruction line with continuations joined.
    fn next_logical_line(&mut self) -> Option<String> {
        let mut logical = String::new();
        let mut continued = false;
        while let Some(raw) = self.next_raw() {
            let trimmed = raw.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (body, continues) = strip_continuation(raw);
            logical.push_str(body);
            continued = continues;
            if !continues {
                return Some(logical);
            }
        }
        // Input ended on a continuation: keep what was collected.
        (continued && !logical.trim().is_empty()).then_some(logical)
    }
}

fn strip_continuation(line: &str) -> (&str, bool) {
    let trimmed = line.trim_end();
    match trimmed.strip_suffix(ESCAPE) {
        Some(body) => (body, true),
        None => (line, false),
    }
}

fn parse_instruction(
    line: &str,
    cursor: &mut LineCursor<'_>,
) -> Result<InstructionNode, SyntaxError> {
    let original = line.trim().to_string();
    let (word, rest) = split_first_word(line.trim_start());
    let keyword =
        Keyword::parse(word).ok_or_else(|| SyntaxError::UnknownInstruction(word.to_string()))?;
    let (flags, rest) = extract_flags(rest);
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(SyntaxError::MissingArguments(keyword));
    }

    if keyword == Keyword::Onbuild {
        // Trigger keyword is validated before the trigger itself is parsed.
        let (trigger_word, _) = split_first_word(rest);
        let trigger_keyword = Keyword::parse(trigger_word)
            .ok_or_else(|| SyntaxError::UnknownInstruction(trigger_word.to_string()))?;
        if matches!(trigger_keyword, Keyword::Onbuild | Keyword::From | Keyword::Maintainer) {
            return Err(SyntaxError::InvalidTrigger(trigger_keyword));
        }
        let trigger = parse_instruction(rest, cursor)?;
        return Ok(InstructionNode {
            keyword,
            flags,
            args: Arguments::Trigger,
            heredocs: Vec::new(),
            children: vec![trigger],
            original,
        });
    }

    let args = parse_arguments(keyword, rest)?;
    let heredocs = match &args {
        Arguments::Shell(_) | Arguments::Words(_) if keyword.allows_heredoc() => {
            read_heredocs(rest, cursor)?
        }
        _ => Vec::new(),
    };

    Ok(InstructionNode { keyword, flags, args, heredocs, children: Vec::new(), original })
}

fn split_first_word(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(idx) => (&text[..idx], &text[idx..]),
        None => (text, ""),
    }
}

/// Split leading `--flag[=value]` words off the argument text.
fn extract_flags(rest: &str) -> (Vec<String>, &str) {
    let mut flags = Vec::new();
    let mut rest = rest.trim_start();
    while rest.starts_with("--") {
        let (flag, tail) = split_first_word(rest);
        if flag == "--" {
            break;
        }
        flags.push(flag.to_string());
        rest = tail.trim_start();
    }
    (flags, rest)
}

fn parse_arguments(keyword: Keyword, rest: &str) -> Result<Arguments, SyntaxError> {
    let args = match keyword {
        Keyword::Run | Keyword::Cmd | Keyword::Entrypoint | Keyword::Shell => {
            json_array(rest).map(Arguments::Json).unwrap_or_else(|| Arguments::Shell(rest.into()))
        }
        Keyword::Add | Keyword::Copy | Keyword::Volume => json_array(rest)
            .map(Arguments::Json)
            .unwrap_or_else(|| Arguments::Words(split_words(rest))),
        Keyword::From | Keyword::Expose | Keyword::Arg => Arguments::Words(split_words(rest)),
        Keyword::User | Keyword::Workdir | Keyword::Stopsignal | Keyword::Maintainer => {
            Arguments::Text(rest.to_string())
        }
        Keyword::Env | Keyword::Label => parse_pairs(keyword, rest)?,
        Keyword::Healthcheck => Arguments::Health(parse_health(rest)?),
        Keyword::Onbuild => Arguments::Trigger,
    };
    Ok(args)
}

/// `Some` when `text` is a JSON array of strings.
fn json_array(text: &str) -> Option<Vec<String>> {
    if !text.starts_with('[') {
        return None;
    }
    serde_json::from_str::<Vec<String>>(text).ok()
}

/// Split on unquoted whitespace. Quotes and escapes stay in the words.
fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        match quote {
            None if ch.is_whitespace() => {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
                continue;
            }
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            Some(q) if ch == q => quote = None,
            _ => {}
        }
        word.push(ch);
        if ch == ESCAPE && quote != Some('\'') {
            if let Some(next) = chars.next() {
                word.push(next);
            }
        }
    }
    if !word.is_empty() {
        words.push(word);
    }
    words
}

fn parse_pairs(keyword: Keyword, rest: &str) -> Result<Arguments, SyntaxError> {
    let words = split_words(rest);
    let Some(first) = words.first() else {
        return Err(SyntaxError::MissingArguments(keyword));
    };

    if !first.contains('=') {
        let (key, value) = split_first_word(rest);
        let value = value.trim_start();
        if value.is_empty() {
            return Err(SyntaxError::MissingValue(keyword));
        }
        let pairs = vec![KeyValue { key: key.to_string(), value: value.to_string() }];
        return Ok(Arguments::Pairs { pairs, legacy: true });
    }

    let pairs = words
        .into_iter()
        .map(|word| match word.split_once('=') {
            Some((key, value)) => Ok(KeyValue { key: key.to_string(), value: value.to_string() }),
            None => Err(SyntaxError::MissingEquals { word }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Arguments::Pairs { pairs, legacy: false })
}

fn parse_health(rest: &str) -> Result<HealthTest, SyntaxError> {
    let (kind, command) = split_first_word(rest);
    let command = command.trim();
    match kind.to_ascii_uppercase().as_str() {
        "NONE" if command.is_empty() => Ok(HealthTest::Disabled),
        "NONE" => Err(SyntaxError::HealthcheckNoneWithArguments),
        "CMD" if command.is_empty() => Err(SyntaxError::MissingArguments(Keyword::Healthcheck)),
        "CMD" => Ok(json_array(command)
            .map(HealthTest::Exec)
            .unwrap_or_else(|| HealthTest::Shell(command.to_string()))),
        _ => Err(SyntaxError::UnknownHealthcheckType(kind.to_string())),
    }
}

fn heredoc_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^<<(-?)(["']?)([A-Za-z_][A-Za-z0-9_]*)(["']?)$"#)
            .expect("Invalid heredoc Regex")
    })
}

/// Read the bodies of every heredoc opened in `args` from the following lines.
///
/// Only whole shell words starting with `<<` open a heredoc; `<<` inside a
/// quoted word is plain text.
fn read_heredocs(args: &str, cursor: &mut LineCursor<'_>) -> Result<Vec<Heredoc>, SyntaxError> {
    let mut heredocs = Vec::new();
    let words = split_words(args);
    for caps in words.iter().filter_map(|word| heredoc_pattern().captures(word)) {
        let (open, close) = (&caps[2], &caps[4]);
        if open != close {
            continue;
        }
        let strip_tabs = &caps[1] == "-";
        let name = caps[3].to_string();
        let mut body = String::new();
        loop {
            let Some(raw) = cursor.next_raw() else {
                return Err(SyntaxError::UnterminatedHeredoc(name));
            };
            let line = if strip_tabs { raw.trim_start_matches('\t') } else { raw };
            if line == name {
                break;
            }
            body.push_str(line);
            body.push('\n');
        }
        heredocs.push(Heredoc { name, strip_tabs, quoted: !open.is_empty(), body });
    }
    Ok(heredocs)
}
