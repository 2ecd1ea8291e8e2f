// Human-readable diagnostic artifacts next to the snapshot. Write failures are
// logged and never change a selection.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::write_atomic;
use crate::config::{DiagnosticsSection, GraphSection, Verbosity};

pub const ALL_TESTS: &str = "all-tests";
pub const SELECTED_TESTS: &str = "selected-tests";
pub const CHANGED_CLASSES: &str = "changed-classes";
pub const NON_AFFECTED_TESTS: &str = "non-affected-tests";
pub const IMPACTED_CLASSES: &str = "impacted-classes";
pub const NEW_CLASSES: &str = "new-classes";
pub const NON_IMPACTED_CLASSES: &str = "non-impacted-classes";
pub const GRAPH: &str = "graph";

/// Which artifacts a run should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct DiagnosticsPolicy {
    pub test_lists: bool,
    pub changed_classes: bool,
    pub non_affected: bool,
    pub new_classes: bool,
    pub non_impacted: bool,
    pub graph: bool,
}

impl DiagnosticsPolicy {
    pub fn from_config(diagnostics: &DiagnosticsSection, graph: &GraphSection) -> Self {
        let debug = diagnostics.verbosity >= Verbosity::Debug;
        let trace = diagnostics.verbosity >= Verbosity::Trace;
        Self {
            test_lists: debug,
            changed_classes: trace || diagnostics.write_changed_classes,
            non_affected: trace || diagnostics.write_non_affected,
            new_classes: diagnostics.track_new_classes,
            non_impacted: diagnostics.track_non_impacted,
            graph: trace && graph.print_graph,
        }
    }
}

/// Writes one artifact per file, one sorted entry per line.
#[derive(Debug, Clone)]
pub struct DiagnosticsWriter {
    dir: PathBuf,
}

impl DiagnosticsWriter {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf() }
    }

    pub fn write_list<T: Display>(&self, name: &str, entries: impl IntoIterator<Item = T>) {
        let mut lines: Vec<String> = entries.into_iter().map(|e| e.to_string()).collect();
        lines.sort();
        lines.dedup();
        let mut text = lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        self.write_text(name, &text);
    }

    pub fn write_text(&self, name: &str, text: &str) {
        let path = self.dir.join(name);
        match write_atomic(&path, text) {
            Ok(()) => debug!(artifact = name, "Wrote diagnostic artifact"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write diagnostic artifact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_follows_verbosity() {
        let graph = GraphSection::default();
        let mut diagnostics = DiagnosticsSection::default();
        assert_eq!(DiagnosticsPolicy::from_config(&diagnostics, &graph), DiagnosticsPolicy::default());

        diagnostics.verbosity = Verbosity::Debug;
        let policy = DiagnosticsPolicy::from_config(&diagnostics, &graph);
        assert!(policy.test_lists);
        assert!(!policy.changed_classes);

        diagnostics.verbosity = Verbosity::Trace;
        let policy = DiagnosticsPolicy::from_config(&diagnostics, &graph);
        assert!(policy.changed_classes && policy.non_affected && policy.graph);
    }

    #[test]
    fn explicit_flags_enable_artifacts() {
        let diagnostics = DiagnosticsSection {
            write_changed_classes: true,
            write_non_affected: true,
            track_new_classes: true,
            track_non_impacted: true,
            ..DiagnosticsSection::default()
        };
        let policy = DiagnosticsPolicy::from_config(&diagnostics, &GraphSection::default());
        assert!(policy.changed_classes && policy.non_affected && policy.new_classes && policy.non_impacted);
        assert!(!policy.test_lists);
    }

    #[test]
    fn lists_are_sorted_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DiagnosticsWriter::new(dir.path());
        writer.write_list(SELECTED_TESTS, ["t.B", "t.A", "t.B"]);
        let text = std::fs::read_to_string(dir.path().join(SELECTED_TESTS)).unwrap();
        assert_eq!(text, "t.A\nt.B\n");
    }

    #[test]
    fn write_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // Parent is a regular file, so the write fails and is only logged.
        DiagnosticsWriter::new(&blocker).write_list(ALL_TESTS, ["t.A"]);
    }
}
