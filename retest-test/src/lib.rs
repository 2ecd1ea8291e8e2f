// Integration test utilities and fixture management for retest.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use retest_core::config::RetestConfig;
use retest_core::{Classpath, DirectoryClassSource, EdgeFileProvider, RtsEngine, TestId};

pub const ARTIFACTS: &str = ".retest";
pub const EDGES_FILE: &str = "deps.edges";
pub const LIBRARY_EDGES_FILE: &str = "library.edges";

/// Where a class is compiled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Main,
    Test,
}

impl Output {
    fn dir(self) -> &'static str {
        match self {
            Self::Main => "target/classes",
            Self::Test => "target/test-classes",
        }
    }
}

/// A temporary project: compiled classes on disk, an edge file standing in
/// for the bytecode dependency extractor, and an artifacts directory.
#[derive(Debug)]
pub struct TestProject {
    pub dir: tempfile::TempDir,
    libraries: Vec<PathBuf>,
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        for output in [Output::Main, Output::Test] {
            std::fs::create_dir_all(dir.path().join(output.dir())).unwrap();
        }
        std::fs::write(dir.path().join(EDGES_FILE), "").unwrap();
        Self {
            dir,
            libraries: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn artifacts(&self) -> PathBuf {
        self.path().join(ARTIFACTS)
    }

    pub fn class_dirs(&self) -> Vec<PathBuf> {
        [Output::Main, Output::Test]
            .into_iter()
            .map(|o| self.path().join(o.dir()))
            .collect()
    }

    pub fn class_path(&self, output: Output, class: &str) -> PathBuf {
        let mut path = self.path().join(output.dir());
        for part in class.split('.') {
            path.push(part);
        }
        path.set_extension("class");
        path
    }

    /// Write a compiled class. `version` goes into the method body, so two
    /// versions always differ in bytecode.
    pub fn compile(&self, output: Output, class: &str, version: u8) {
        self.write_class(output, class, &ClassFile::named(class).code(&[0x10, version, 0x57, 0xB1]).build());
    }

    pub fn write_class(&self, output: Output, class: &str, bytes: &[u8]) {
        let path = self.class_path(output, class);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    pub fn delete_class(&self, output: Output, class: &str) {
        std::fs::remove_file(self.class_path(output, class)).unwrap();
    }

    /// Replace the project edge file.
    pub fn edges(&self, edges: &[(&str, &str)]) {
        write_edges(&self.path().join(EDGES_FILE), edges);
    }

    /// Write the library edge file and put one library on the classpath.
    pub fn library(&mut self, jar: &str, edges: &[(&str, &str)]) {
        write_edges(&self.path().join(LIBRARY_EDGES_FILE), edges);
        self.libraries = vec![self.path().join(jar)];
    }

    pub fn set_libraries(&mut self, jars: &[&str]) {
        self.libraries = jars.iter().map(|j| self.path().join(j)).collect();
    }

    pub fn classpath(&self) -> Classpath {
        Classpath::new(self.class_dirs(), self.libraries.clone())
    }

    pub fn engine(&self, config: RetestConfig) -> RtsEngine {
        let classes = Arc::new(DirectoryClassSource::new(self.class_dirs()));
        let edges = Arc::new(
            EdgeFileProvider::new(vec![self.path().join(EDGES_FILE)])
                .with_library_files(vec![self.path().join(LIBRARY_EDGES_FILE)]),
        );
        RtsEngine::new(config, classes, edges).expect("valid config")
    }
}

fn write_edges(path: &Path, edges: &[(&str, &str)]) {
    let text: String = edges.iter().map(|(from, to)| format!("{from} -> {to}\n")).collect();
    std::fs::write(path, text).unwrap();
}

pub fn tests(names: &[&str]) -> Vec<TestId> {
    names.iter().map(|n| TestId::from(*n)).collect()
}

// ── Class files ────────────────────────────────────────────────────

/// Builds a minimal JVM class file: one `run()V` method whose `Code`
/// attribute optionally carries a `LineNumberTable`, and an optional
/// `SourceFile` attribute.
#[derive(Debug, Clone)]
pub struct ClassFile {
    internal_name: String,
    code: Vec<u8>,
    first_line: Option<u16>,
    source_file: Option<String>,
}

impl ClassFile {
    pub fn named(class: &str) -> Self {
        Self {
            internal_name: class.replace('.', "/"),
            code: vec![0xB1],
            first_line: None,
            source_file: None,
        }
    }

    #[must_use]
    pub fn code(mut self, code: &[u8]) -> Self {
        self.code = code.to_vec();
        self
    }

    #[must_use]
    pub fn first_line(mut self, line: u16) -> Self {
        self.first_line = Some(line);
        self
    }

    #[must_use]
    pub fn source_file(mut self, name: &str) -> Self {
        self.source_file = Some(name.to_string());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = Pool::default();
        let this_name = pool.utf8(&self.internal_name);
        let code_attr = pool.utf8("Code");
        let lines_attr = pool.utf8("LineNumberTable");
        let source_attr = pool.utf8("SourceFile");
        let method_name = pool.utf8("run");
        let method_desc = pool.utf8("()V");
        let source_value = self.source_file.as_deref().map(|s| pool.utf8(s));
        let this_class = pool.class(this_name);

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABE_u32.to_be_bytes());
        out.extend_from_slice(&[0, 0, 0, 61]);
        out.extend_from_slice(&(pool.count + 1).to_be_bytes());
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&0x0021_u16.to_be_bytes());
        out.extend_from_slice(&this_class.to_be_bytes());
        out.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // super, interfaces, fields

        let mut code = Vec::new();
        code.extend_from_slice(&[0, 2, 0, 1]);
        code.extend_from_slice(&u32_len(self.code.len()).to_be_bytes());
        code.extend_from_slice(&self.code);
        code.extend_from_slice(&[0, 0]);
        match self.first_line {
            Some(line) => {
                code.extend_from_slice(&1u16.to_be_bytes());
                code.extend_from_slice(&lines_attr.to_be_bytes());
                code.extend_from_slice(&6u32.to_be_bytes());
                code.extend_from_slice(&[0, 1, 0, 0]);
                code.extend_from_slice(&line.to_be_bytes());
            }
            None => code.extend_from_slice(&[0, 0]),
        }

        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&0x0001_u16.to_be_bytes());
        out.extend_from_slice(&method_name.to_be_bytes());
        out.extend_from_slice(&method_desc.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&code_attr.to_be_bytes());
        out.extend_from_slice(&u32_len(code.len()).to_be_bytes());
        out.extend_from_slice(&code);

        match source_value {
            Some(value) => {
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&source_attr.to_be_bytes());
                out.extend_from_slice(&2u32.to_be_bytes());
                out.extend_from_slice(&value.to_be_bytes());
            }
            None => out.extend_from_slice(&[0, 0]),
        }
        out
    }
}

#[derive(Default)]
struct Pool {
    bytes: Vec<u8>,
    count: u16,
}

impl Pool {
    fn utf8(&mut self, s: &str) -> u16 {
        self.bytes.push(1);
        self.bytes.extend_from_slice(&u16::try_from(s.len()).unwrap().to_be_bytes());
        self.bytes.extend_from_slice(s.as_bytes());
        self.next()
    }

    fn class(&mut self, name_index: u16) -> u16 {
        self.bytes.push(7);
        self.bytes.extend_from_slice(&name_index.to_be_bytes());
        self.next()
    }

    fn next(&mut self) -> u16 {
        self.count += 1;
        self.count
    }
}

fn u32_len(len: usize) -> u32 {
    u32::try_from(len).unwrap()
}
