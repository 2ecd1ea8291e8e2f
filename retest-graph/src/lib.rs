pub mod edges;
pub mod graph;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use edges::{EdgeFilter, format_edge, parse_edge_line, parse_edges};
pub use graph::{Closures, DependencyGraph, reaches_wildcard};

/// Error type for the graph engine.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("Malformed edge at line {line}: {content}")]
    MalformedEdge { line: usize, content: String },

    #[error("Invalid class name: {0:?}")]
    InvalidClassName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;

// ── Class names ────────────────────────────────────────────────────

/// Canonical fully-qualified name of a compiled class (`com.acme.Foo$Inner`).
///
/// The reserved name `*` is the wildcard node: an edge `X -> *` means the
/// extractor found a dependency of `X` it could not resolve statically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassName(String);

impl ClassName {
    pub const WILDCARD: &'static str = "*";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Parse a name, rejecting empty strings and embedded whitespace, which the
    /// line-oriented persistence formats cannot represent.
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(GraphError::InvalidClassName(name.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn wildcard() -> Self {
        Self(Self::WILDCARD.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }

    /// Name without package, e.g. `Foo$Inner` for `com.acme.Foo$Inner`.
    pub fn simple_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Nested/anonymous classes carry a `$` in their binary name.
    pub fn is_nested(&self) -> bool {
        self.simple_name().contains('$')
    }

    pub fn starts_with_any(&self, prefixes: &[String]) -> bool {
        prefixes.iter().any(|p| self.0.starts_with(p.as_str()))
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ClassName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for ClassName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Edges ──────────────────────────────────────────────────────────

/// `from` cannot be loaded or executed without `to` being present and correct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: ClassName,
    pub to: ClassName,
}

impl DependencyEdge {
    pub fn new(from: impl Into<ClassName>, to: impl Into<ClassName>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}
