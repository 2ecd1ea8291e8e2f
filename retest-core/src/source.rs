// Collaborators consumed by the engine: class bytes and dependency edges.
//
// Both are interfaces so the engine can run against a real build output, a
// test fixture, or an embedding host's in-memory view.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SourceError;
use crate::types::{ClassName, Classpath, DependencyEdge};

// ── Class source ───────────────────────────────────────────────────

/// Serves compiled class bytes by class name.
pub trait ClassSource: Send + Sync {
    /// Every class the project itself compiles: the checksum universe.
    fn list_classes(&self) -> Result<Vec<ClassName>, SourceError>;

    /// Bytes of `class`, or `None` when this source does not provide it
    /// (JDK and library classes).
    fn read_class(&self, class: &ClassName) -> io::Result<Option<Vec<u8>>>;
}

/// Class files laid out by package under one or more output directories.
#[derive(Debug, Clone)]
pub struct DirectoryClassSource {
    dirs: Vec<PathBuf>,
}

impl DirectoryClassSource {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn from_classpath(classpath: &Classpath) -> Self {
        Self::new(classpath.class_dirs.clone())
    }

    fn class_path(dir: &Path, class: &ClassName) -> PathBuf {
        let mut path = dir.to_path_buf();
        for part in class.as_str().split('.') {
            path.push(part);
        }
        path.set_extension("class");
        path
    }
}

/// `com/acme/Foo$Inner.class` relative to its output dir → `com.acme.Foo$Inner`.
fn class_name_for(relative: &Path) -> Option<ClassName> {
    let stem = relative.with_extension("");
    let parts: Vec<String> = stem
        .components()
        .map(|c| c.as_os_str().to_str().map(str::to_string))
        .collect::<Option<_>>()?;
    let name = parts.join(".");
    ClassName::parse(&name).ok()
}

impl ClassSource for DirectoryClassSource {
    fn list_classes(&self) -> Result<Vec<ClassName>, SourceError> {
        let mut classes = BTreeSet::new();
        for dir in &self.dirs {
            if !dir.is_dir() {
                debug!(dir = %dir.display(), "Class directory does not exist, skipping");
                continue;
            }
            let pattern = format!("{}/**/*.class", glob::Pattern::escape(&dir.to_string_lossy()));
            let entries = glob::glob(&pattern).map_err(|e| SourceError::Pattern(e.to_string()))?;
            for entry in entries {
                let path = entry.map_err(|e| SourceError::Io {
                    path: e.path().display().to_string(),
                    source: e.into_error(),
                })?;
                let Ok(relative) = path.strip_prefix(dir) else {
                    continue;
                };
                // module-info and package-info describe no dependencies of their own
                if relative.file_stem().is_some_and(|s| s == "module-info" || s == "package-info") {
                    continue;
                }
                if let Some(class) = class_name_for(relative) {
                    classes.insert(class);
                }
            }
        }
        debug!(dirs = self.dirs.len(), classes = classes.len(), "Scanned class directories");
        Ok(classes.into_iter().collect())
    }

    fn read_class(&self, class: &ClassName) -> io::Result<Option<Vec<u8>>> {
        for dir in &self.dirs {
            let path = Self::class_path(dir, class);
            match std::fs::read(&path) {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// In-memory class table, for embedding hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryClassSource {
    classes: BTreeMap<ClassName, Vec<u8>>,
    unreadable: BTreeSet<ClassName>,
}

impl MemoryClassSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_class(mut self, name: impl Into<ClassName>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }

    /// A class that is listed but whose reads fail.
    #[must_use]
    pub fn with_unreadable(mut self, name: impl Into<ClassName>) -> Self {
        self.unreadable.insert(name.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<ClassName>, bytes: Vec<u8>) {
        self.classes.insert(name.into(), bytes);
    }

    pub fn remove(&mut self, name: &ClassName) {
        self.classes.remove(name);
    }
}

impl ClassSource for MemoryClassSource {
    fn list_classes(&self) -> Result<Vec<ClassName>, SourceError> {
        let all: BTreeSet<&ClassName> = self.classes.keys().chain(self.unreadable.iter()).collect();
        Ok(all.into_iter().cloned().collect())
    }

    fn read_class(&self, class: &ClassName) -> io::Result<Option<Vec<u8>>> {
        if self.unreadable.contains(class) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{class} is unreadable"),
            ));
        }
        Ok(self.classes.get(class).cloned())
    }
}

// ── Edge provider ──────────────────────────────────────────────────

/// Produces raw dependency edges. The extraction itself happens outside the
/// engine; an edge `X -> *` marks a dependency the extractor could not
/// resolve statically.
pub trait EdgeProvider: Send + Sync {
    /// Edges among project classes (and from them to anything).
    fn project_edges(&self, classpath: &Classpath) -> Result<Vec<DependencyEdge>, SourceError>;

    /// Edges inside third-party libraries. Only asked for when third-party
    /// edges are enabled and the edge cache misses.
    fn library_edges(&self, libraries: &[PathBuf]) -> Result<Vec<DependencyEdge>, SourceError>;
}

/// Reads edges from text files, one `from -> to` per line.
#[derive(Debug, Clone, Default)]
pub struct EdgeFileProvider {
    project_files: Vec<PathBuf>,
    library_files: Vec<PathBuf>,
}

impl EdgeFileProvider {
    pub fn new(project_files: Vec<PathBuf>) -> Self {
        Self {
            project_files,
            library_files: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_library_files(mut self, files: Vec<PathBuf>) -> Self {
        self.library_files = files;
        self
    }

    fn read_all(files: &[PathBuf]) -> Result<Vec<DependencyEdge>, SourceError> {
        let mut edges = Vec::new();
        for file in files {
            let text = std::fs::read_to_string(file).map_err(|e| SourceError::Io {
                path: file.display().to_string(),
                source: e,
            })?;
            let parsed = retest_graph::parse_edges(&text)
                .map_err(|e| SourceError::Edges(format!("{}: {e}", file.display())))?;
            debug!(file = %file.display(), edges = parsed.len(), "Read edge file");
            edges.extend(parsed);
        }
        Ok(edges)
    }
}

impl EdgeProvider for EdgeFileProvider {
    fn project_edges(&self, _classpath: &Classpath) -> Result<Vec<DependencyEdge>, SourceError> {
        Self::read_all(&self.project_files)
    }

    fn library_edges(&self, _libraries: &[PathBuf]) -> Result<Vec<DependencyEdge>, SourceError> {
        Self::read_all(&self.library_files)
    }
}

/// Fixed edge lists.
#[derive(Debug, Clone, Default)]
pub struct StaticEdges {
    pub project: Vec<DependencyEdge>,
    pub library: Vec<DependencyEdge>,
}

impl StaticEdges {
    pub fn new(project: Vec<DependencyEdge>) -> Self {
        Self {
            project,
            library: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_library(mut self, library: Vec<DependencyEdge>) -> Self {
        self.library = library;
        self
    }
}

impl EdgeProvider for StaticEdges {
    fn project_edges(&self, _classpath: &Classpath) -> Result<Vec<DependencyEdge>, SourceError> {
        Ok(self.project.clone())
    }

    fn library_edges(&self, _libraries: &[PathBuf]) -> Result<Vec<DependencyEdge>, SourceError> {
        Ok(self.library.clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
