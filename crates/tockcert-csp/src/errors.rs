#![allow(unused_assignments)]

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while compiling a package. The first error aborts the unit.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum CompileError {
    #[error("Unsupported {construct} at {node}")]
    #[diagnostic(
        code(tockcert::compile::unsupported),
        help("no compilation rule exists for this construct; rewrite the contract without it")
    )]
    Unsupported { node: String, construct: String },

    #[error("No actor rule for {topic} topic at {node}")]
    #[diagnostic(
        code(tockcert::compile::no_topic_rule),
        help("give the message an explicit or directional edge")
    )]
    NoTopicRule { node: String, topic: String },

    #[error("Ambiguous target at {node}: {reason}")]
    #[diagnostic(
        code(tockcert::compile::ambiguous_target),
        help("exactly one end of an edge must be the target or one of its components")
    )]
    AmbiguousTarget { node: String, reason: String },

    #[error("Missing {what} at {node}")]
    #[diagnostic(code(tockcert::compile::missing_data))]
    MissingData { node: String, what: String },

    #[error("Dangling {kind} reference #{index} at {node}")]
    #[diagnostic(code(tockcert::compile::dangling_reference))]
    DanglingReference {
        node: String,
        kind: &'static str,
        index: usize,
    },

    #[error(
        "Constant '{constant}' in group '{group}' has both an initial value and an instantiation"
    )]
    #[diagnostic(
        code(tockcert::compile::conflicting_instantiation),
        help("remove either the initial value in the model or the assignment in the group")
    )]
    ConflictingInstantiation { group: String, constant: String },

    #[error("Constant '{constant}' is assigned more than once in group '{group}'")]
    #[diagnostic(code(tockcert::compile::duplicate_instantiation))]
    DuplicateInstantiation { group: String, constant: String },

    #[error("Ill-formed guards at {node}: {reason}")]
    #[diagnostic(
        code(tockcert::compile::ill_formed_guards),
        help("a branch may hold at most one `else` operand, next to at least one guarded operand")
    )]
    IllFormedGuards { node: String, reason: String },
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Human-readable path to a contract node, used as the `node` of errors.
///
/// Renders as `group G / interaction S / fragment #3 (until)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Site {
    group: String,
    interaction: Option<String>,
    fragment: Option<(usize, &'static str)>,
    detail: Option<String>,
}

impl Site {
    pub fn group(name: &str) -> Self {
        Self {
            group: name.to_string(),
            ..Self::default()
        }
    }

    pub fn interaction(&self, name: &str) -> Self {
        Self {
            group: self.group.clone(),
            interaction: Some(name.to_string()),
            fragment: None,
            detail: None,
        }
    }

    pub fn fragment(&self, index: usize, kind: &'static str) -> Self {
        Self {
            fragment: Some((index, kind)),
            detail: None,
            ..self.clone()
        }
    }

    /// Append a free-form trailing segment, e.g. `message set #4`.
    pub fn detail(&self, what: impl Into<String>) -> Self {
        Self {
            detail: Some(what.into()),
            ..self.clone()
        }
    }

    pub fn dangling(&self, kind: &'static str, index: usize) -> CompileError {
        CompileError::DanglingReference {
            node: self.to_string(),
            kind,
            index,
        }
    }

    pub fn missing(&self, what: impl Into<String>) -> CompileError {
        CompileError::MissingData {
            node: self.to_string(),
            what: what.into(),
        }
    }

    pub fn unsupported(&self, construct: impl Into<String>) -> CompileError {
        CompileError::Unsupported {
            node: self.to_string(),
            construct: construct.into(),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {}", self.group)?;
        if let Some(name) = &self.interaction {
            write!(f, " / interaction {name}")?;
        }
        if let Some((index, kind)) = self.fragment {
            write!(f, " / fragment #{index} ({kind})")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " / {detail}")?;
        }
        Ok(())
    }
}
