// Edge text codec and edge filtering.
//
// Edge files are line oriented: `from -> to`, or `from to`. Anything after the
// target token is ignored, which also accepts jdeps-style `-verbose:class`
// output (`a.Foo -> b.Bar  lib.jar`). Blank lines and `#` comments are skipped.

use std::collections::HashSet;

use crate::{ClassName, DependencyEdge, GraphError, Result};

/// Parse one edge line. Returns `Ok(None)` for blank lines and comments.
pub fn parse_edge_line(line: &str, line_no: usize) -> Result<Option<DependencyEdge>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let malformed = || GraphError::MalformedEdge {
        line: line_no,
        content: trimmed.to_string(),
    };

    let (from, to) = if let Some((lhs, rhs)) = trimmed.split_once("->") {
        let from = lhs.split_whitespace().last().ok_or_else(malformed)?;
        let to = rhs.split_whitespace().next().ok_or_else(malformed)?;
        (from, to)
    } else {
        let mut tokens = trimmed.split_whitespace();
        let from = tokens.next().ok_or_else(malformed)?;
        let to = tokens.next().ok_or_else(malformed)?;
        (from, to)
    };

    Ok(Some(DependencyEdge::new(from, to)))
}

/// Parse a whole edge file. Line numbers in errors are 1-based.
pub fn parse_edges(text: &str) -> Result<Vec<DependencyEdge>> {
    let mut edges = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if let Some(edge) = parse_edge_line(line, idx + 1)? {
            edges.push(edge);
        }
    }
    Ok(edges)
}

pub fn format_edge(edge: &DependencyEdge) -> String {
    format!("{} -> {}", edge.from, edge.to)
}

// ── Filtering ──────────────────────────────────────────────────────

/// Decides which raw edges make it into the graph.
///
/// - Self loops never contribute to reachability and are dropped.
/// - Edges touching a library prefix (`java.`, `sun.`) are dropped when
///   library filtering is on.
/// - With a project restriction, only edges between project classes survive,
///   plus edges into the wildcard node.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    library_prefixes: Vec<String>,
    project_classes: Option<HashSet<ClassName>>,
}

impl EdgeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_library_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.library_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn restrict_to(mut self, project_classes: HashSet<ClassName>) -> Self {
        self.project_classes = Some(project_classes);
        self
    }

    pub fn keeps(&self, edge: &DependencyEdge) -> bool {
        if edge.is_self_loop() || edge.from.is_wildcard() {
            return false;
        }
        if edge.from.starts_with_any(&self.library_prefixes)
            || edge.to.starts_with_any(&self.library_prefixes)
        {
            return false;
        }
        match &self.project_classes {
            Some(project) => {
                project.contains(&edge.from) && (edge.to.is_wildcard() || project.contains(&edge.to))
            }
            None => true,
        }
    }

    pub fn apply(&self, edges: impl IntoIterator<Item = DependencyEdge>) -> Vec<DependencyEdge> {
        edges.into_iter().filter(|e| self.keeps(e)).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
