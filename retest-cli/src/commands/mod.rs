pub mod clean;
pub mod diff;
pub mod impacted;
pub mod select;
pub mod status;
pub mod update;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Subcommand};
use tracing::debug;

use retest_core::config::{ChecksumMode, DependencyFormat, RetestConfig, TestIdEncoding};
use retest_core::progress::IndicatifReporter;
use retest_core::{ClassSource, Classpath, DirectoryClassSource, EdgeFileProvider, RtsEngine, TestId};

const DEFAULT_CONFIG: &str = "retest.toml";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the tests affected by changes since the last snapshot
    Select(select::SelectArgs),
    /// Record a new snapshot for the current build
    Update(update::UpdateArgs),
    /// Print the classes that changed since the last snapshot
    Diff(diff::DiffArgs),
    /// Print changed classes and every project class depending on them
    Impacted(impacted::ImpactedArgs),
    /// Show what the artifacts directory holds
    Status(status::StatusArgs),
    /// Remove all persisted state
    Clean(clean::CleanArgs),
}

pub fn run(cmd: Command, quiet: bool) -> anyhow::Result<()> {
    match cmd {
        Command::Select(args) => select::run(&args, quiet),
        Command::Update(args) => update::run(&args, quiet),
        Command::Diff(args) => diff::run(&args, quiet),
        Command::Impacted(args) => impacted::run(&args, quiet),
        Command::Status(args) => status::run(&args),
        Command::Clean(args) => clean::run(&args),
    }
}

// ── Shared arguments ───────────────────────────────────────────────

/// Where the build output, edges and state live.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Directory holding snapshots and diagnostic artifacts
    #[arg(long, default_value = ".retest")]
    pub artifacts: PathBuf,

    /// Compiled class directories (default: target/classes and target/test-classes)
    #[arg(long = "classes", value_name = "DIR", num_args = 1..)]
    pub classes: Vec<PathBuf>,

    /// Third-party library paths on the classpath
    #[arg(long = "lib", value_name = "PATH", num_args = 1..)]
    pub libraries: Vec<PathBuf>,

    /// Project edge files, one `from -> to` per line
    #[arg(long = "edges", value_name = "FILE", num_args = 1..)]
    pub edges: Vec<PathBuf>,

    /// Edge files for third-party libraries
    #[arg(long = "library-edges", value_name = "FILE", num_args = 1..)]
    pub library_edges: Vec<PathBuf>,

    /// Config file (default: retest.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

/// Command-line overrides applied on top of the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Dependency format: zlc or clz
    #[arg(long)]
    pub dep_format: Option<DependencyFormat>,

    /// Merge third-party library edges into the graph
    #[arg(long)]
    pub third_party: bool,

    /// Hash class bytes as-is instead of ignoring debug attributes
    #[arg(long)]
    pub raw_checksums: bool,

    /// Test id encoding on disk: plain or indexed
    #[arg(long)]
    pub test_ids: Option<TestIdEncoding>,

    /// Report changes but select every test
    #[arg(long)]
    pub retest_all: bool,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut RetestConfig) {
        if let Some(format) = self.dep_format {
            config.selection.dep_format = format;
        }
        if self.third_party {
            config.graph.include_third_party = true;
        }
        if self.raw_checksums {
            config.checksum.mode = ChecksumMode::Raw;
        }
        if let Some(encoding) = self.test_ids {
            config.storage.test_ids = encoding;
        }
        if self.retest_all {
            config.selection.retest_all = true;
        }
    }
}

/// Which tests the build knows about.
#[derive(Args, Debug, Clone)]
pub struct TestArgs {
    /// Test class names (default: discovered by naming convention)
    #[arg(long = "test", value_name = "NAME", num_args = 1..)]
    pub tests: Vec<String>,

    /// File listing test class names, one per line
    #[arg(long)]
    pub tests_file: Option<PathBuf>,
}

// ── Wiring ─────────────────────────────────────────────────────────

/// Everything a command needs to call the engine.
#[derive(Debug)]
pub struct Session {
    pub engine: RtsEngine,
    pub classes: Arc<DirectoryClassSource>,
    pub classpath: Classpath,
    pub artifacts: PathBuf,
}

impl Session {
    pub fn open(args: &ProjectArgs, quiet: bool) -> anyhow::Result<Self> {
        let mut config = load_config(args.config.as_deref())?;
        args.overrides.apply(&mut config);

        let class_dirs = if args.classes.is_empty() {
            vec![PathBuf::from("target/classes"), PathBuf::from("target/test-classes")]
        } else {
            args.classes.clone()
        };
        let classpath = Classpath::new(class_dirs, args.libraries.clone());
        let classes = Arc::new(DirectoryClassSource::from_classpath(&classpath));
        let edges =
            Arc::new(EdgeFileProvider::new(args.edges.clone()).with_library_files(args.library_edges.clone()));

        let reporter = if quiet || !std::io::stderr().is_terminal() {
            IndicatifReporter::hidden()
        } else {
            IndicatifReporter::stderr()
        };
        let engine = RtsEngine::new(config, classes.clone(), edges)
            .context("Invalid engine configuration")?
            .with_reporter(Arc::new(reporter));

        Ok(Self {
            engine,
            classes,
            classpath,
            artifacts: args.artifacts.clone(),
        })
    }

    /// Explicit tests, else the tests file, else discovery over the class
    /// directories.
    pub fn tests(&self, args: &TestArgs) -> anyhow::Result<Vec<TestId>> {
        let mut tests: Vec<TestId> = args.tests.iter().map(|t| TestId::new(t.trim())).collect();
        if let Some(path) = &args.tests_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read tests file: {}", path.display()))?;
            tests.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(TestId::new),
            );
        }
        if tests.is_empty() {
            let classes = self
                .classes
                .list_classes()
                .context("Cannot scan class directories for tests")?;
            tests = classes
                .iter()
                .filter(|c| !c.is_nested() && is_test_name(c.simple_name()))
                .map(|c| TestId::new(c.as_str()))
                .collect();
            debug!(tests = tests.len(), "Discovered tests by name");
        }
        tests.sort();
        tests.dedup();
        Ok(tests)
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RetestConfig> {
    match path {
        Some(path) => {
            RetestConfig::load(path).with_context(|| format!("Cannot load config: {}", path.display()))
        }
        None if Path::new(DEFAULT_CONFIG).exists() => RetestConfig::load(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("Cannot load config: {DEFAULT_CONFIG}")),
        None => Ok(RetestConfig::default()),
    }
}

/// Conventional test class names: `Test*`, `*Test`, `*Tests`, `*TestCase`.
pub fn is_test_name(simple: &str) -> bool {
    simple.starts_with("Test")
        || simple.ends_with("Test")
        || simple.ends_with("Tests")
        || simple.ends_with("TestCase")
}

/// One entry per line.
pub fn print_lines<T: std::fmt::Display>(entries: impl IntoIterator<Item = T>) {
    for entry in entries {
        println!("{entry}");
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_patterns() {
        for name in ["TestParser", "ParserTest", "ParserTests", "ParserTestCase"] {
            assert!(is_test_name(name), "{name}");
        }
        for name in ["Parser", "Contest", "ParserTestSupport"] {
            assert!(!is_test_name(name), "{name}");
        }
    }

    #[test]
    fn overrides_win_over_config() {
        let mut config = RetestConfig::default();
        let overrides = ConfigOverrides {
            dep_format: Some(DependencyFormat::Clz),
            third_party: true,
            raw_checksums: true,
            test_ids: Some(TestIdEncoding::Indexed),
            retest_all: false,
        };
        overrides.apply(&mut config);
        assert_eq!(config.selection.dep_format, DependencyFormat::Clz);
        assert!(config.graph.include_third_party);
        assert_eq!(config.checksum.mode, ChecksumMode::Raw);
        assert_eq!(config.storage.test_ids, TestIdEncoding::Indexed);
        assert!(!config.selection.retest_all);
    }
}
