// The selection engine: one explicit type that owns the configuration and the
// injected collaborators and exposes the two entry points a build tool needs,
// plus impact analysis, status and clean.
//
// Soundness rule: every internal failure degrades to selecting more tests,
// never fewer. Only configuration errors surface to the caller.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use retest_graph::{Closures, DependencyGraph, EdgeFilter, reaches_wildcard};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::change::{ChangeDetection, ChangeSet, detect_changes};
use crate::checksum::{BytecodeNormalizer, ChecksumStore};
use crate::config::{ChecksumMode, DependencyFormat, RetestConfig};
use crate::error::{Result, SourceError};
use crate::progress::{NoopReporter, ProgressReporter};
use crate::resolve::resolve;
use crate::source::{ClassSource, EdgeProvider};
use crate::store::diagnostics::{
    ALL_TESTS, CHANGED_CLASSES, GRAPH, IMPACTED_CLASSES, NEW_CLASSES, NON_AFFECTED_TESTS, NON_IMPACTED_CLASSES,
    SELECTED_TESTS,
};
use crate::store::{DiagnosticsPolicy, DiagnosticsWriter, EdgeCache, History, StateStore};
use crate::types::{
    ChecksumSnapshot, ClassName, Classpath, ClzSnapshot, DependencyEdge, RunSnapshot, TestDependencyRecord, TestId,
    ZlcSnapshot,
};

// ── Reports ────────────────────────────────────────────────────────

/// Why the previous run's state was or was not used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Available,
    Missing,
    Corrupt,
    /// The library path shape differs from the recorded one.
    ClasspathChanged,
}

impl HistoryStatus {
    pub fn is_available(self) -> bool {
        self == Self::Available
    }
}

/// Result of [`RtsEngine::compute_non_affected`].
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub all_tests: BTreeSet<TestId>,
    pub non_affected: BTreeSet<TestId>,
    pub changed_classes: BTreeSet<ClassName>,
    pub history: HistoryStatus,
    pub retest_all: bool,
}

impl Selection {
    fn select_all(all_tests: BTreeSet<TestId>, history: HistoryStatus, retest_all: bool) -> Self {
        Self {
            all_tests,
            non_affected: BTreeSet::new(),
            changed_classes: BTreeSet::new(),
            history,
            retest_all,
        }
    }

    /// Tests that must run.
    pub fn affected(&self) -> BTreeSet<TestId> {
        self.all_tests.difference(&self.non_affected).cloned().collect()
    }
}

/// Result of [`RtsEngine::update_snapshot`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateReport {
    /// Whether the new snapshot and fingerprint reached disk.
    pub persisted: bool,
    pub generation: Option<Uuid>,
    pub tests: usize,
    pub classes: usize,
    pub unreached: usize,
    pub wildcard_tests: usize,
    pub duration: Duration,
}

/// Result of [`RtsEngine::impacted_classes`].
#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub history: HistoryStatus,
    pub changed: BTreeSet<ClassName>,
    pub impacted: BTreeSet<ClassName>,
    /// Only filled when new-class tracking is on.
    pub new_classes: BTreeSet<ClassName>,
    /// Project classes outside `impacted`; only filled when tracked.
    pub non_impacted: BTreeSet<ClassName>,
}

/// Result of [`RtsEngine::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub format: DependencyFormat,
    pub history: HistoryStatus,
    pub reason: Option<String>,
    pub generation: Option<Uuid>,
    pub created: Option<DateTime<Utc>>,
    pub tests: usize,
    pub classes: usize,
}

// ── Engine ─────────────────────────────────────────────────────────

/// Checksum-driven regression test selection engine.
pub struct RtsEngine {
    config: RetestConfig,
    classes: Arc<dyn ClassSource>,
    edges: Arc<dyn EdgeProvider>,
    checksums: ChecksumStore,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for RtsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtsEngine")
            .field("config", &self.config)
            .field("checksums", &self.checksums)
            .finish_non_exhaustive()
    }
}

impl RtsEngine {
    /// Validate `config` and wire the collaborators. The checksum mode comes
    /// from the config.
    pub fn new(
        config: RetestConfig,
        classes: Arc<dyn ClassSource>,
        edges: Arc<dyn EdgeProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let checksums = ChecksumStore::new(config.checksum.mode);
        Ok(Self {
            config,
            classes,
            edges,
            checksums,
            reporter: Arc::new(NoopReporter),
        })
    }

    /// Replace the default smart-mode normalizer. Raw mode hashes bytes as-is
    /// and ignores it.
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Arc<dyn BytecodeNormalizer>) -> Self {
        match self.config.checksum.mode {
            ChecksumMode::Smart => self.checksums = ChecksumStore::with_normalizer(normalizer),
            ChecksumMode::Raw => debug!("Raw checksum mode, custom normalizer not used"),
        }
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &RetestConfig {
        &self.config
    }

    /// Tests that can be skipped for the current build. Never fails: missing
    /// or unusable state means every test is affected.
    #[instrument(skip_all, name = "compute_non_affected")]
    pub fn compute_non_affected(&self, artifacts_dir: &Path, classpath: &Classpath, all_tests: &[TestId]) -> Selection {
        let store = StateStore::new(artifacts_dir);
        let policy = self.diagnostics_policy();
        let tests: BTreeSet<TestId> = all_tests.iter().cloned().collect();
        let retest_all = self.config.selection.retest_all;

        let selection = match self.load_history(&store, classpath) {
            (Some(snapshot), _) => self.select(artifacts_dir, classpath, &snapshot, all_tests, tests.clone()),
            (None, history) => {
                info!(history = ?history, tests = tests.len(), "No usable history, selecting every test");
                Selection::select_all(tests.clone(), history, retest_all)
            }
        };

        let writer = DiagnosticsWriter::new(artifacts_dir);
        if policy.test_lists {
            writer.write_list(ALL_TESTS, &selection.all_tests);
            writer.write_list(SELECTED_TESTS, &selection.affected());
        }
        if policy.changed_classes {
            writer.write_list(CHANGED_CLASSES, &selection.changed_classes);
        }
        if policy.non_affected {
            writer.write_list(NON_AFFECTED_TESTS, &selection.non_affected);
        }

        info!(
            tests = selection.all_tests.len(),
            selected = selection.all_tests.len() - selection.non_affected.len(),
            skipped = selection.non_affected.len(),
            changed = selection.changed_classes.len(),
            "Selection complete"
        );
        selection
    }

    fn select(
        &self,
        artifacts_dir: &Path,
        classpath: &Classpath,
        snapshot: &RunSnapshot,
        all_tests: &[TestId],
        tests: BTreeSet<TestId>,
    ) -> Selection {
        let retest_all = self.config.selection.retest_all;
        let universe = match self.classes.list_classes() {
            Ok(universe) => universe,
            Err(e) => {
                error!(error = %e, "Failed to list project classes, selecting every test");
                return Selection::select_all(tests, HistoryStatus::Available, retest_all);
            }
        };

        let changes = self.changes_since(&snapshot.checksums(), &universe);
        debug!(
            modified = changes.modified.len(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            "Detected class changes"
        );

        let closures = match snapshot {
            RunSnapshot::Zlc(_) => None,
            RunSnapshot::Clz(_) => match self.build_graph(artifacts_dir, classpath, &universe) {
                Ok(graph) => Some(self.closures(&graph, all_tests)),
                Err(e) => {
                    error!(error = %e, "Edge provider failed, every test is affected");
                    None
                }
            },
        };

        let mut resolution = resolve(snapshot, &changes, all_tests, closures.as_ref());
        if retest_all {
            resolution.non_affected.clear();
        }
        Selection {
            all_tests: tests,
            non_affected: resolution.non_affected,
            changed_classes: resolution.changed_classes,
            history: HistoryStatus::Available,
            retest_all,
        }
    }

    /// Rebuild closures for every test and persist a new snapshot. Failures
    /// leave the previous snapshot untouched and report `persisted = false`.
    #[instrument(skip_all, name = "update_snapshot")]
    pub fn update_snapshot(&self, artifacts_dir: &Path, classpath: &Classpath, all_tests: &[TestId]) -> UpdateReport {
        let start = Instant::now();
        let mut report = UpdateReport::default();

        let universe = match self.classes.list_classes() {
            Ok(universe) => universe,
            Err(e) => {
                error!(error = %e, "Failed to list project classes, keeping previous snapshot");
                report.duration = start.elapsed();
                return report;
            }
        };
        let graph = match self.build_graph(artifacts_dir, classpath, &universe) {
            Ok(graph) => graph,
            Err(e) => {
                error!(error = %e, "Edge provider failed, keeping previous snapshot");
                report.duration = start.elapsed();
                return report;
            }
        };

        let closures = self.closures(&graph, all_tests);
        let unreached = graph.unreached(&closures, &universe);
        let snapshot = match self.config.selection.dep_format {
            DependencyFormat::Zlc => RunSnapshot::Zlc(self.zlc_snapshot(all_tests, &closures, &unreached)),
            DependencyFormat::Clz => RunSnapshot::Clz(self.clz_snapshot(all_tests, &closures, &graph, &universe)),
        };

        report.tests = all_tests.len();
        report.classes = universe.len();
        report.unreached = unreached.len();
        report.wildcard_tests = closures.values().filter(|c| reaches_wildcard(c)).count();

        let store = StateStore::new(artifacts_dir);
        match store.save(&snapshot, self.config.storage.test_ids) {
            Ok(stored) => match store.save_fingerprint(classpath) {
                Ok(()) => {
                    report.persisted = true;
                    report.generation = Some(stored.generation);
                }
                Err(e) => error!(error = %e, "Failed to save classpath fingerprint"),
            },
            Err(e) => error!(error = %e, "Failed to save snapshot"),
        }

        if self.diagnostics_policy().graph {
            DiagnosticsWriter::new(artifacts_dir).write_text(GRAPH, &graph.dump());
        }

        report.duration = start.elapsed();
        info!(
            tests = report.tests,
            classes = report.classes,
            unreached = report.unreached,
            wildcard_tests = report.wildcard_tests,
            persisted = report.persisted,
            duration = ?report.duration,
            "Snapshot updated"
        );
        report
    }

    /// Changed classes plus every project class that transitively depends on
    /// one. Without history every project class is impacted.
    #[instrument(skip_all, name = "impacted_classes")]
    pub fn impacted_classes(&self, artifacts_dir: &Path, classpath: &Classpath) -> Result<ImpactReport> {
        let universe = self.classes.list_classes()?;
        let project: BTreeSet<ClassName> = universe.iter().cloned().collect();
        let policy = self.diagnostics_policy();
        let store = StateStore::new(artifacts_dir);

        let report = match self.load_history(&store, classpath) {
            (None, history) => ImpactReport {
                history,
                changed: BTreeSet::new(),
                new_classes: if policy.new_classes { project.clone() } else { BTreeSet::new() },
                non_impacted: BTreeSet::new(),
                impacted: project,
            },
            (Some(snapshot), history) => {
                let changes = self.changes_since(&snapshot.checksums(), &universe);
                let changed = changes.all();

                let impacted = match self.build_graph(artifacts_dir, classpath, &universe) {
                    Ok(graph) => {
                        let mut impacted: BTreeSet<ClassName> = graph
                            .dependents_of(&changed)
                            .into_iter()
                            .filter(|c| project.contains(c))
                            .collect();
                        impacted.extend(changed.iter().cloned());
                        impacted
                    }
                    Err(e) => {
                        error!(error = %e, "Edge provider failed, every project class is impacted");
                        project.iter().chain(&changed).cloned().collect()
                    }
                };
                let non_impacted = if policy.non_impacted {
                    project.difference(&impacted).cloned().collect()
                } else {
                    BTreeSet::new()
                };
                ImpactReport {
                    history,
                    new_classes: if policy.new_classes { changes.added.clone() } else { BTreeSet::new() },
                    non_impacted,
                    changed,
                    impacted,
                }
            }
        };

        let writer = DiagnosticsWriter::new(artifacts_dir);
        writer.write_list(IMPACTED_CLASSES, &report.impacted);
        if policy.new_classes {
            writer.write_list(NEW_CLASSES, &report.new_classes);
        }
        if policy.non_impacted {
            writer.write_list(NON_IMPACTED_CLASSES, &report.non_impacted);
        }
        if policy.changed_classes {
            writer.write_list(CHANGED_CLASSES, &report.changed);
        }
        info!(
            changed = report.changed.len(),
            impacted = report.impacted.len(),
            new = report.new_classes.len(),
            non_impacted = report.non_impacted.len(),
            "Impact analysis complete"
        );
        Ok(report)
    }

    /// What the artifacts directory currently holds for the configured format.
    pub fn status(&self, artifacts_dir: &Path, classpath: &Classpath) -> StatusReport {
        let format = self.config.selection.dep_format;
        let store = StateStore::new(artifacts_dir);
        let mut report = StatusReport {
            format,
            history: HistoryStatus::Missing,
            reason: None,
            generation: None,
            created: None,
            tests: 0,
            classes: 0,
        };
        match store.load(format) {
            History::Missing => {}
            History::Corrupt { reason } => {
                report.history = HistoryStatus::Corrupt;
                report.reason = Some(reason);
            }
            History::Snapshot(stored) => {
                report.history = Self::fingerprint_status(&store, classpath);
                report.generation = Some(stored.generation);
                report.created = Some(stored.created);
                report.tests = stored.snapshot.tests().len();
                report.classes = stored.snapshot.checksums().len();
            }
        }
        report
    }

    /// Remove all persisted state under `artifacts_dir`.
    pub fn clean(&self, artifacts_dir: &Path) -> Result<bool> {
        Ok(StateStore::new(artifacts_dir).clean()?)
    }

    // ── Internals ──────────────────────────────────────────────────

    fn diagnostics_policy(&self) -> DiagnosticsPolicy {
        DiagnosticsPolicy::from_config(&self.config.diagnostics, &self.config.graph)
    }

    /// The previous snapshot, if it is trustworthy for this classpath.
    fn load_history(&self, store: &StateStore, classpath: &Classpath) -> (Option<RunSnapshot>, HistoryStatus) {
        match store.load(self.config.selection.dep_format) {
            History::Missing => (None, HistoryStatus::Missing),
            History::Corrupt { .. } => (None, HistoryStatus::Corrupt),
            History::Snapshot(stored) => match Self::fingerprint_status(store, classpath) {
                HistoryStatus::Available => (Some(stored.snapshot), HistoryStatus::Available),
                other => (None, other),
            },
        }
    }

    fn fingerprint_status(store: &StateStore, classpath: &Classpath) -> HistoryStatus {
        match store.load_fingerprint() {
            Ok(Some(recorded)) if recorded == classpath.fingerprint() => HistoryStatus::Available,
            Ok(Some(_)) => {
                info!("Classpath changed since the last snapshot, re-baselining");
                HistoryStatus::ClasspathChanged
            }
            Ok(None) => {
                warn!("Snapshot has no classpath fingerprint, re-baselining");
                HistoryStatus::ClasspathChanged
            }
            Err(e) => {
                warn!(error = %e, "Unusable classpath fingerprint, re-baselining");
                HistoryStatus::Corrupt
            }
        }
    }

    /// Classes that changed since `previous`. A listed class whose bytes
    /// cannot be read is dropped from the current checksums; when the previous
    /// run did not know it either, it counts as added.
    fn changes_since(&self, previous: &ChecksumSnapshot, universe: &[ClassName]) -> ChangeSet {
        let current = self.current_checksums(previous, universe);
        let mut changes = match detect_changes(Some(previous), &current) {
            ChangeDetection::Changes(changes) => changes,
            ChangeDetection::NoHistory => ChangeSet::default(),
        };
        for class in universe {
            let known = previous.get(class).is_some_and(|c| !c.is_absent());
            if !known && !current.contains_key(class) && !class.is_wildcard() {
                warn!(class = %class, "New class is unreadable, treating it as added");
                changes.added.insert(class.clone());
            }
        }
        changes
    }

    /// Current checksums over every class the previous run knew plus every
    /// class the project lists now.
    fn current_checksums(&self, previous: &ChecksumSnapshot, universe: &[ClassName]) -> ChecksumSnapshot {
        let classes: BTreeSet<&ClassName> = previous.keys().chain(universe).collect();
        self.reporter.start("Checksumming classes", Some(classes.len() as u64));
        let current = self.checksums.snapshot(self.classes.as_ref(), classes.iter().copied());
        self.reporter.advance(classes.len() as u64);
        self.reporter.finish();
        current
    }

    fn closures(&self, graph: &DependencyGraph, all_tests: &[TestId]) -> Closures {
        let entries: Vec<ClassName> = all_tests.iter().map(TestId::entry_point).collect();
        self.reporter.start("Computing test closures", Some(entries.len() as u64));
        let closures = graph.closures(&entries);
        self.reporter.advance(entries.len() as u64);
        self.reporter.finish();
        closures
    }

    /// Project edges, plus cached library edges when third-party edges are on,
    /// filtered and merged into one graph.
    fn build_graph(
        &self,
        artifacts_dir: &Path,
        classpath: &Classpath,
        universe: &[ClassName],
    ) -> std::result::Result<DependencyGraph, SourceError> {
        let graph_config = &self.config.graph;
        let project_edges = self.edges.project_edges(classpath)?;

        let mut filter = EdgeFilter::new().with_library_prefixes(graph_config.effective_library_prefixes());
        let library_edges: Vec<DependencyEdge> = if graph_config.include_third_party {
            let cache = EdgeCache::new(graph_config.cache_dir_for(artifacts_dir));
            let fingerprint = classpath.fingerprint();
            if let Some(edges) = cache.load(&fingerprint) {
                edges.into_iter().collect()
            } else {
                let edges: BTreeSet<_> = self.edges.library_edges(&classpath.libraries)?.into_iter().collect();
                if let Err(e) = cache.store(&fingerprint, &edges) {
                    warn!(dir = %cache.dir().display(), error = %e, "Failed to store library edges");
                }
                edges.into_iter().collect()
            }
        } else {
            let project: HashSet<ClassName> = universe.iter().cloned().collect();
            filter = filter.restrict_to(project);
            Vec::new()
        };

        Ok(DependencyGraph::build(
            filter.apply(project_edges),
            filter.apply(library_edges),
        ))
    }

    fn zlc_snapshot(
        &self,
        all_tests: &[TestId],
        closures: &Closures,
        unreached: &BTreeSet<ClassName>,
    ) -> ZlcSnapshot {
        let reached: BTreeSet<&ClassName> = closures.values().flatten().collect();
        let recorded = self
            .checksums
            .record_checksums(self.classes.as_ref(), reached.into_iter().chain(unreached));

        let mut snapshot = ZlcSnapshot::default();
        for test in all_tests {
            let Some(closure) = closures.get(&test.entry_point()) else {
                continue;
            };
            let classes = closure
                .iter()
                .filter_map(|c| recorded.get(c).map(|k| (c.clone(), k.clone())))
                .collect();
            snapshot.records.insert(
                test.clone(),
                TestDependencyRecord {
                    reaches_wildcard: reaches_wildcard(closure),
                    classes,
                },
            );
        }
        snapshot.unreached = unreached
            .iter()
            .filter_map(|c| recorded.get(c).map(|k| (c.clone(), k.clone())))
            .collect();
        snapshot
    }

    fn clz_snapshot(
        &self,
        all_tests: &[TestId],
        closures: &Closures,
        graph: &DependencyGraph,
        universe: &[ClassName],
    ) -> ClzSnapshot {
        let known: BTreeSet<&ClassName> = graph.classes().chain(universe).collect();
        let checksums = self.checksums.record_checksums(self.classes.as_ref(), known);
        let tests = all_tests
            .iter()
            .filter_map(|test| {
                closures
                    .get(&test.entry_point())
                    .map(|closure| (test.clone(), closure.clone()))
            })
            .collect();
        ClzSnapshot { checksums, tests }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::TestIdEncoding;
    use crate::error::ChecksumError;
    use crate::source::{MemoryClassSource, StaticEdges};
    use crate::types::Checksum;

    fn engine(config: RetestConfig, source: MemoryClassSource, edges: Vec<DependencyEdge>) -> RtsEngine {
        RtsEngine::new(config, Arc::new(source), Arc::new(StaticEdges::new(edges))).unwrap()
    }

    fn project() -> MemoryClassSource {
        MemoryClassSource::new()
            .with_class("app.A", b"A1".to_vec())
            .with_class("app.B", b"B1".to_vec())
            .with_class("app.C", b"C1".to_vec())
            .with_class("app.ATest", b"AT".to_vec())
            .with_class("app.BTest", b"BT".to_vec())
    }

    fn project_edges() -> Vec<DependencyEdge> {
        vec![
            DependencyEdge::new("app.ATest", "app.A"),
            DependencyEdge::new("app.A", "app.B"),
            DependencyEdge::new("app.BTest", "app.B"),
            DependencyEdge::new("app.A", "java.lang.Object"),
        ]
    }

    fn tests() -> Vec<TestId> {
        vec![TestId::from("app.ATest"), TestId::from("app.BTest")]
    }

    fn raw_config(format: DependencyFormat) -> RetestConfig {
        let mut config = RetestConfig::default();
        config.selection.dep_format = format;
        config.checksum.mode = crate::config::ChecksumMode::Raw;
        config
    }

    #[test]
    fn first_run_selects_everything_then_nothing() {
        for format in [DependencyFormat::Zlc, DependencyFormat::Clz] {
            let dir = tempfile::tempdir().unwrap();
            let classpath = Classpath::default();
            let rts = engine(raw_config(format), project(), project_edges());

            let first = rts.compute_non_affected(dir.path(), &classpath, &tests());
            assert_eq!(first.history, HistoryStatus::Missing);
            assert_eq!(first.affected().len(), 2);

            let report = rts.update_snapshot(dir.path(), &classpath, &tests());
            assert!(report.persisted);
            assert_eq!(report.unreached, 1, "app.C is reached by no test");

            let second = rts.compute_non_affected(dir.path(), &classpath, &tests());
            assert_eq!(second.history, HistoryStatus::Available);
            assert_eq!(second.non_affected.len(), 2, "{format:?}: unchanged build skips everything");
            assert!(second.changed_classes.is_empty());
        }
    }

    #[test]
    fn change_selects_only_dependents() {
        for format in [DependencyFormat::Zlc, DependencyFormat::Clz] {
            let dir = tempfile::tempdir().unwrap();
            let classpath = Classpath::default();
            engine(raw_config(format), project(), project_edges()).update_snapshot(dir.path(), &classpath, &tests());

            let changed = project().with_class("app.A", b"A2".to_vec());
            let selection =
                engine(raw_config(format), changed, project_edges()).compute_non_affected(dir.path(), &classpath, &tests());
            assert_eq!(selection.affected(), BTreeSet::from([TestId::from("app.ATest")]));
            assert_eq!(selection.changed_classes, BTreeSet::from([ClassName::from("app.A")]));
        }
    }

    #[test]
    fn retest_all_reports_changes_but_skips_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let classpath = Classpath::default();
        let mut config = raw_config(DependencyFormat::Zlc);
        engine(config.clone(), project(), project_edges()).update_snapshot(dir.path(), &classpath, &tests());

        config.selection.retest_all = true;
        let changed = project().with_class("app.A", b"A2".to_vec());
        let selection = engine(config, changed, project_edges()).compute_non_affected(dir.path(), &classpath, &tests());
        assert!(selection.retest_all);
        assert!(selection.non_affected.is_empty());
        assert_eq!(selection.changed_classes.len(), 1);
    }

    #[test]
    fn classpath_change_rebaselines() {
        let dir = tempfile::tempdir().unwrap();
        let rts = engine(raw_config(DependencyFormat::Zlc), project(), project_edges());
        let before = Classpath::new(vec![], vec!["/m2/lib-1.0.jar".into()]);
        let after = Classpath::new(vec![], vec!["/m2/lib-1.1.jar".into()]);
        rts.update_snapshot(dir.path(), &before, &tests());

        let selection = rts.compute_non_affected(dir.path(), &after, &tests());
        assert_eq!(selection.history, HistoryStatus::ClasspathChanged);
        assert_eq!(selection.affected().len(), 2);
    }

    #[test]
    fn missing_fingerprint_rebaselines() {
        let dir = tempfile::tempdir().unwrap();
        let classpath = Classpath::default();
        let rts = engine(raw_config(DependencyFormat::Zlc), project(), project_edges());
        rts.update_snapshot(dir.path(), &classpath, &tests());
        std::fs::remove_file(dir.path().join(crate::store::CLASSPATH_FILE)).unwrap();
        let selection = rts.compute_non_affected(dir.path(), &classpath, &tests());
        assert_eq!(selection.history, HistoryStatus::ClasspathChanged);
        assert!(selection.non_affected.is_empty());
    }

    struct FailingEdges;

    impl EdgeProvider for FailingEdges {
        fn project_edges(&self, _classpath: &Classpath) -> std::result::Result<Vec<DependencyEdge>, SourceError> {
            Err(SourceError::Edges("extractor crashed".into()))
        }

        fn library_edges(&self, _libraries: &[std::path::PathBuf]) -> std::result::Result<Vec<DependencyEdge>, SourceError> {
            Err(SourceError::Edges("extractor crashed".into()))
        }
    }

    #[test]
    fn edge_failure_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let classpath = Classpath::default();
        let config = raw_config(DependencyFormat::Zlc);
        let saved = engine(config.clone(), project(), project_edges()).update_snapshot(dir.path(), &classpath, &tests());

        let failing = RtsEngine::new(config, Arc::new(project()), Arc::new(FailingEdges)).unwrap();
        let report = failing.update_snapshot(dir.path(), &classpath, &tests());
        assert!(!report.persisted);
        let status = failing.status(dir.path(), &classpath);
        assert_eq!(status.generation, saved.generation);
    }

    #[test]
    fn clz_edge_failure_selects_everything() {
        let dir = tempfile::tempdir().unwrap();
        let classpath = Classpath::default();
        let config = raw_config(DependencyFormat::Clz);
        engine(config.clone(), project(), project_edges()).update_snapshot(dir.path(), &classpath, &tests());

        let failing = RtsEngine::new(config, Arc::new(project()), Arc::new(FailingEdges)).unwrap();
        let selection = failing.compute_non_affected(dir.path(), &classpath, &tests());
        assert!(selection.non_affected.is_empty());
    }

    #[test]
    fn save_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("artifacts");
        std::fs::write(&blocker, "not a directory").unwrap();
        let rts = engine(raw_config(DependencyFormat::Zlc), project(), project_edges());
        let report = rts.update_snapshot(&blocker, &Classpath::default(), &tests());
        assert!(!report.persisted);
        assert_eq!(report.tests, 2);
    }

    #[test]
    fn impact_follows_reverse_edges() {
        let dir = tempfile::tempdir().unwrap();
        let classpath = Classpath::default();
        let mut config = raw_config(DependencyFormat::Zlc);
        config.diagnostics.track_new_classes = true;

        let none = engine(config.clone(), project(), project_edges())
            .impacted_classes(dir.path(), &classpath)
            .unwrap();
        assert_eq!(none.history, HistoryStatus::Missing);
        assert_eq!(none.impacted.len(), 5);

        engine(config.clone(), project(), project_edges()).update_snapshot(dir.path(), &classpath, &tests());
        let changed = project()
            .with_class("app.B", b"B2".to_vec())
            .with_class("app.D", b"D1".to_vec());
        let report = engine(config, changed, project_edges())
            .impacted_classes(dir.path(), &classpath)
            .unwrap();
        assert_eq!(
            report.impacted,
            ["app.A", "app.ATest", "app.B", "app.BTest", "app.D"]
                .into_iter()
                .map(ClassName::from)
                .collect()
        );
        assert_eq!(report.new_classes, BTreeSet::from([ClassName::from("app.D")]));
        assert!(dir.path().join(IMPACTED_CLASSES).exists());
        assert!(dir.path().join(NEW_CLASSES).exists());
    }

    #[test]
    fn non_impacted_classes_are_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let classpath = Classpath::default();
        let mut config = raw_config(DependencyFormat::Zlc);
        config.diagnostics.track_non_impacted = true;
        engine(config.clone(), project(), project_edges()).update_snapshot(dir.path(), &classpath, &tests());

        let changed = project().with_class("app.A", b"A2".to_vec());
        let report = engine(config, changed, project_edges())
            .impacted_classes(dir.path(), &classpath)
            .unwrap();
        let expected: BTreeSet<ClassName> = ["app.B", "app.BTest", "app.C"].into_iter().map(ClassName::from).collect();
        assert_eq!(report.non_impacted, expected);
        let text = std::fs::read_to_string(dir.path().join(NON_IMPACTED_CLASSES)).unwrap();
        assert_eq!(text, "app.B\napp.BTest\napp.C\n");
        // New-class tracking is off.
        assert!(report.new_classes.is_empty());
        assert!(!dir.path().join(NEW_CLASSES).exists());
    }

    // ── Unreadable and malformed classes ───────────────────────────

    fn wildcard_project() -> MemoryClassSource {
        MemoryClassSource::new()
            .with_class("t.TestW", b"TW".to_vec())
            .with_class("t.TestP", b"TP".to_vec())
            .with_class("a.R", b"R1".to_vec())
            .with_class("a.P", b"P1".to_vec())
    }

    fn wildcard_edges() -> Vec<DependencyEdge> {
        vec![
            DependencyEdge::new("t.TestW", "a.R"),
            DependencyEdge::new("a.R", "*"),
            DependencyEdge::new("t.TestP", "a.P"),
        ]
    }

    #[test]
    fn new_unreadable_class_selects_wildcard_tests() {
        let tests = vec![TestId::from("t.TestP"), TestId::from("t.TestW")];
        for format in [DependencyFormat::Zlc, DependencyFormat::Clz] {
            let dir = tempfile::tempdir().unwrap();
            let classpath = Classpath::default();
            engine(raw_config(format), wildcard_project(), wildcard_edges()).update_snapshot(dir.path(), &classpath, &tests);

            let plugged = wildcard_project().with_unreadable("a.Plugin");
            let selection =
                engine(raw_config(format), plugged, wildcard_edges()).compute_non_affected(dir.path(), &classpath, &tests);
            assert_eq!(selection.affected(), BTreeSet::from([TestId::from("t.TestW")]), "{format:?}");
            assert_eq!(selection.changed_classes, BTreeSet::from([ClassName::from("a.Plugin")]), "{format:?}");
        }
    }

    #[test]
    fn class_unreadable_at_selection_is_a_change() {
        for format in [DependencyFormat::Zlc, DependencyFormat::Clz] {
            let dir = tempfile::tempdir().unwrap();
            let classpath = Classpath::default();
            engine(raw_config(format), project(), project_edges()).update_snapshot(dir.path(), &classpath, &tests());

            let broken = project().with_unreadable("app.B");
            let selection =
                engine(raw_config(format), broken, project_edges()).compute_non_affected(dir.path(), &classpath, &tests());
            assert_eq!(selection.affected().len(), 2, "{format:?}: both tests reach app.B");
            assert!(selection.changed_classes.contains(&ClassName::from("app.B")));
        }
    }

    #[test]
    fn class_unreadable_at_update_selects_its_tests() {
        for format in [DependencyFormat::Zlc, DependencyFormat::Clz] {
            let dir = tempfile::tempdir().unwrap();
            let classpath = Classpath::default();
            let report = engine(raw_config(format), project().with_unreadable("app.A"), project_edges())
                .update_snapshot(dir.path(), &classpath, &tests());
            assert!(report.persisted);

            let History::Snapshot(stored) = StateStore::new(dir.path()).load(format) else {
                panic!("expected snapshot");
            };
            assert_eq!(stored.snapshot.checksums()[&ClassName::from("app.A")], Checksum::unreadable());

            let expected = BTreeSet::from([TestId::from("app.ATest")]);
            let readable =
                engine(raw_config(format), project(), project_edges()).compute_non_affected(dir.path(), &classpath, &tests());
            assert_eq!(readable.affected(), expected, "{format:?}: readable again");

            let still_broken = engine(raw_config(format), project().with_unreadable("app.A"), project_edges())
                .compute_non_affected(dir.path(), &classpath, &tests());
            assert_eq!(still_broken.affected(), expected, "{format:?}: still unreadable");
        }
    }

    #[test]
    fn truncated_class_falls_back_to_raw_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let classpath = Classpath::default();
        let config = RetestConfig::default();
        assert_eq!(config.checksum.mode, ChecksumMode::Smart);

        let truncated = project().with_class("app.ATest", vec![0xCA, 0xFE, 0xBA, 0xBE]);
        let report = engine(config.clone(), truncated.clone(), project_edges()).update_snapshot(dir.path(), &classpath, &tests());
        assert!(report.persisted);
        let unchanged = engine(config.clone(), truncated, project_edges()).compute_non_affected(dir.path(), &classpath, &tests());
        assert_eq!(unchanged.non_affected.len(), 2);

        let longer = project().with_class("app.ATest", vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00]);
        let selection = engine(config, longer, project_edges()).compute_non_affected(dir.path(), &classpath, &tests());
        assert_eq!(selection.affected(), BTreeSet::from([TestId::from("app.ATest")]));
    }

    #[test]
    fn raw_mode_ignores_custom_normalizer() {
        struct Constant;

        impl BytecodeNormalizer for Constant {
            fn normalize(&self, _bytes: &[u8]) -> std::result::Result<Vec<u8>, ChecksumError> {
                Ok(vec![0])
            }
        }

        let mut smart = raw_config(DependencyFormat::Zlc);
        smart.checksum.mode = ChecksumMode::Smart;
        for (config, skipped) in [(raw_config(DependencyFormat::Zlc), 1), (smart, 2)] {
            let dir = tempfile::tempdir().unwrap();
            let classpath = Classpath::default();
            let with_constant =
                |source: MemoryClassSource| engine(config.clone(), source, project_edges()).with_normalizer(Arc::new(Constant));
            with_constant(project()).update_snapshot(dir.path(), &classpath, &tests());

            let changed = project().with_class("app.A", b"A2".to_vec());
            let selection = with_constant(changed).compute_non_affected(dir.path(), &classpath, &tests());
            assert_eq!(selection.non_affected.len(), skipped, "{:?}", config.checksum.mode);
        }
    }

    #[test]
    fn third_party_edges_are_cached() {
        #[derive(Default)]
        struct CountingEdges {
            library_calls: Mutex<usize>,
        }

        impl EdgeProvider for CountingEdges {
            fn project_edges(&self, _classpath: &Classpath) -> std::result::Result<Vec<DependencyEdge>, SourceError> {
                Ok(vec![
                    DependencyEdge::new("app.ATest", "app.A"),
                    DependencyEdge::new("app.A", "lib.Util"),
                ])
            }

            fn library_edges(&self, _libraries: &[std::path::PathBuf]) -> std::result::Result<Vec<DependencyEdge>, SourceError> {
                *self.library_calls.lock().unwrap() += 1;
                Ok(vec![DependencyEdge::new("lib.Util", "lib.Helper")])
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut config = raw_config(DependencyFormat::Zlc);
        config.graph.include_third_party = true;
        let edges = Arc::new(CountingEdges::default());
        let rts = RtsEngine::new(config, Arc::new(project()), edges.clone()).unwrap();
        let classpath = Classpath::new(vec![], vec!["/m2/lib.jar".into()]);
        let tests = vec![TestId::from("app.ATest")];

        rts.update_snapshot(dir.path(), &classpath, &tests);
        rts.update_snapshot(dir.path(), &classpath, &tests);
        assert_eq!(*edges.library_calls.lock().unwrap(), 1);

        let History::Snapshot(stored) = StateStore::new(dir.path()).load(DependencyFormat::Zlc) else {
            panic!("expected snapshot");
        };
        let RunSnapshot::Zlc(zlc) = stored.snapshot else {
            panic!("expected ZLC");
        };
        let record = &zlc.records[&TestId::from("app.ATest")];
        assert!(record.classes[&ClassName::from("lib.Helper")].is_absent());
    }

    #[test]
    fn indexed_ids_and_diagnostics_at_trace() {
        let dir = tempfile::tempdir().unwrap();
        let classpath = Classpath::default();
        let mut config = raw_config(DependencyFormat::Zlc);
        config.storage.test_ids = TestIdEncoding::Indexed;
        config.diagnostics.verbosity = crate::config::Verbosity::Trace;
        let rts = engine(config, project(), project_edges());

        rts.update_snapshot(dir.path(), &classpath, &tests());
        let selection = rts.compute_non_affected(dir.path(), &classpath, &tests());
        assert_eq!(selection.non_affected.len(), 2);
        for artifact in [ALL_TESTS, SELECTED_TESTS, CHANGED_CLASSES, NON_AFFECTED_TESTS, GRAPH] {
            assert!(dir.path().join(artifact).exists(), "{artifact} missing");
        }
        let graph = std::fs::read_to_string(dir.path().join(GRAPH)).unwrap();
        assert!(graph.contains("app.A -> app.B\n"));
        assert!(!graph.contains("java.lang.Object"));
    }

    #[test]
    fn clean_then_everything_is_selected() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = dir.path().join(".retest");
        let classpath = Classpath::default();
        let rts = engine(raw_config(DependencyFormat::Zlc), project(), project_edges());
        rts.update_snapshot(&artifacts, &classpath, &tests());
        assert!(rts.clean(&artifacts).unwrap());
        let selection = rts.compute_non_affected(&artifacts, &classpath, &tests());
        assert_eq!(selection.history, HistoryStatus::Missing);
        assert_eq!(selection.affected().len(), 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = RetestConfig::default();
        config.graph.library_prefixes = vec![String::new()];
        let result = RtsEngine::new(config, Arc::new(project()), Arc::new(StaticEdges::default()));
        assert!(result.is_err());
    }
}
