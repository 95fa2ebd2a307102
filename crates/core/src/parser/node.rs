use std::fmt;

use serde::{Deserialize, Serialize};

use crate::instructions::Keyword;

/// `name=value` (or legacy `name value`) pair from ENV/LABEL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Test command of a HEALTHCHECK instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", content = "value", rename_all = "snake_case")]
pub enum HealthTest {
    /// `HEALTHCHECK NONE`
    Disabled,
    Shell(String),
    Exec(Vec<String>),
}

/// Arguments of one instruction, typed by how the keyword reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", content = "value", rename_all = "snake_case")]
pub enum Arguments {
    /// Free text handed to the shell (RUN/CMD/ENTRYPOINT shell form).
    Shell(String),
    /// JSON string array (exec form, or JSON form of ADD/COPY/VOLUME).
    Json(Vec<String>),
    /// Whitespace separated words, quotes preserved.
    Words(Vec<String>),
    /// Single opaque value (USER, WORKDIR, STOPSIGNAL, MAINTAINER).
    Text(String),
    /// ENV/LABEL pairs; `legacy` marks the `KEY name value` spelling.
    Pairs { pairs: Vec<KeyValue>, legacy: bool },
    Health(HealthTest),
    /// ONBUILD: the trigger instruction is the node's only child.
    Trigger,
}

/// Here-document attached to a RUN/COPY/ADD instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heredoc {
    /// Terminator word.
    pub name: String,
    /// `<<-` form: leading tabs are stripped from body and terminator.
    pub strip_tabs: bool,
    /// Delimiter was quoted, so the body is not expanded.
    pub quoted: bool,
    /// Body lines, each terminated by `\n`, terminator excluded.
    pub body: String,
}

/// One instruction recovered from a line of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionNode {
    pub keyword: Keyword,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    pub args: Arguments,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub heredocs: Vec<Heredoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<InstructionNode>,
    /// Logical line the node was parsed from.
    pub original: String,
}

impl InstructionNode {
    /// Argument text as it is rendered after the keyword and flags.
    pub fn argument_text(&self) -> String {
        match &self.args {
            Arguments::Shell(text) | Arguments::Text(text) => text.clone(),
            Arguments::Json(items) => json_array(items),
            Arguments::Words(words) => words.join(" "),
            Arguments::Pairs { pairs, legacy: true } => pairs
                .iter()
                .map(|kv| format!("{} {}", kv.key, kv.value))
                .collect::<Vec<_>>()
                .join(" "),
            Arguments::Pairs { pairs, legacy: false } => pairs
                .iter()
                .map(|kv| format!("{}={}", kv.key, kv.value))
                .collect::<Vec<_>>()
                .join(" "),
            Arguments::Health(HealthTest::Disabled) => "NONE".to_string(),
            Arguments::Health(HealthTest::Shell(text)) => format!("CMD {text}"),
            Arguments::Health(HealthTest::Exec(items)) => format!("CMD {}", json_array(items)),
            Arguments::Trigger => {
                self.children.first().map(InstructionNode::render_line).unwrap_or_default()
            }
        }
    }

    /// The instruction line without heredoc bodies.
    pub fn render_line(&self) -> String {
        let mut line = self.keyword.as_str().to_string();
        for flag in &self.flags {
            line.push(' ');
            line.push_str(flag);
        }
        let args = self.argument_text();
        if !args.is_empty() {
            line.push(' ');
            line.push_str(&args);
        }
        line
    }

    /// Full rendering: the instruction line followed by any heredoc bodies.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(&self.render_line());
        out.push('\n');
        self.write_heredocs(out);
    }

    fn write_heredocs(&self, out: &mut String) {
        for doc in &self.heredocs {
            out.push_str(&doc.body);
            out.push_str(&doc.name);
            out.push('\n');
        }
        for child in &self.children {
            child.write_heredocs(out);
        }
    }

    /// Value of a USER instruction, if this is one.
    pub fn user(&self) -> Option<&str> {
        match (&self.keyword, &self.args) {
            (Keyword::User, Arguments::Text(user)) => Some(user.as_str()),
            _ => None,
        }
    }
}

fn json_array(items: &[String]) -> String {
    let quoted: Vec<String> =
        items.iter().map(|item| serde_json::Value::from(item.as_str()).to_string()).collect();
    format!("[{}]", quoted.join(", "))
}

/// Root of a decompiled script.
///
/// Has no keyword of its own; its children are the top-level instructions in
/// the order they were recovered. Sibling order is the build order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootNode {
    children: Vec<InstructionNode>,
}

impl RootNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn children(&self) -> &[InstructionNode] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn last(&self) -> Option<&InstructionNode> {
        self.children.last()
    }

    pub(crate) fn extend(&mut self, nodes: impl IntoIterator<Item = InstructionNode>) {
        self.children.extend(nodes);
    }

    /// Render back to script text, one instruction per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.render_into(&mut out);
        }
        out
    }
}

impl fmt::Display for RootNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
