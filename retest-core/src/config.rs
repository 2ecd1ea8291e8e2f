use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Persistence format for test dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyFormat {
    /// One record per test with embedded class checksums. Cheap to evaluate.
    #[default]
    Zlc,
    /// Flat class checksum table plus per-test class lists. Needs the graph
    /// rebuilt to evaluate.
    Clz,
}

/// How class bytes are turned into a checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    /// Hash the unmodified class bytes.
    Raw,
    /// Strip debug-only attributes first, then hash.
    #[default]
    Smart,
}

/// How test identifiers are written in persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestIdEncoding {
    /// Full test names inline.
    #[default]
    Plain,
    /// Integers into a separately stored name table.
    Indexed,
}

/// Diagnostic verbosity. Gates which artifacts land next to the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Info,
    Debug,
    Trace,
}

macro_rules! config_enum_str {
    ($ty:ident, $what:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ConfigError::Invalid(format!(
                        concat!("Unknown ", $what, " '{}'. Expected one of: {}"),
                        other,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }
    };
}

config_enum_str!(DependencyFormat, "dependency format", { Zlc => "zlc", Clz => "clz" });
config_enum_str!(ChecksumMode, "checksum mode", { Raw => "raw", Smart => "smart" });
config_enum_str!(TestIdEncoding, "test id encoding", { Plain => "plain", Indexed => "indexed" });
config_enum_str!(Verbosity, "verbosity", { Info => "info", Debug => "debug", Trace => "trace" });

/// Top-level retest configuration, matching `retest.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetestConfig {
    #[serde(default)]
    pub selection: SelectionSection,
    #[serde(default)]
    pub graph: GraphSection,
    #[serde(default)]
    pub checksum: ChecksumSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub diagnostics: DiagnosticsSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionSection {
    #[serde(default)]
    pub dep_format: DependencyFormat,
    /// Compute and report changes, but select every test.
    #[serde(default)]
    pub retest_all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSection {
    /// Merge cached third-party library edges into the graph.
    #[serde(default)]
    pub include_third_party: bool,
    /// Drop edges touching standard-library classes.
    #[serde(default = "default_true")]
    pub filter_lib: bool,
    #[serde(default = "default_library_prefixes")]
    pub library_prefixes: Vec<String>,
    /// Edge cache location. Defaults to `<artifacts>/edge-cache`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Write the graph as a debug artifact (at trace verbosity).
    #[serde(default = "default_true")]
    pub print_graph: bool,
}

fn default_true() -> bool {
    true
}

fn default_library_prefixes() -> Vec<String> {
    vec!["java.".into(), "sun.".into()]
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            include_third_party: false,
            filter_lib: true,
            library_prefixes: default_library_prefixes(),
            cache_dir: None,
            print_graph: true,
        }
    }
}

impl GraphSection {
    /// Prefixes to filter, or none when library filtering is off.
    pub fn effective_library_prefixes(&self) -> Vec<String> {
        if self.filter_lib {
            self.library_prefixes.clone()
        } else {
            Vec::new()
        }
    }

    pub fn cache_dir_for(&self, artifacts_dir: &Path) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| artifacts_dir.join("edge-cache"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChecksumSection {
    #[serde(default)]
    pub mode: ChecksumMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub test_ids: TestIdEncoding,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct DiagnosticsSection {
    #[serde(default)]
    pub verbosity: Verbosity,
    #[serde(default)]
    pub write_changed_classes: bool,
    #[serde(default)]
    pub write_non_affected: bool,
    #[serde(default)]
    pub track_new_classes: bool,
    /// Also list project classes outside the impacted set.
    #[serde(default)]
    pub track_non_impacted: bool,
}

impl RetestConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self
            .graph
            .library_prefixes
            .iter()
            .find(|p| p.trim().is_empty() || p.chars().any(char::is_whitespace))
        {
            return Err(ConfigError::Invalid(format!(
                "library prefix {bad:?} must be non-empty and contain no whitespace"
            )));
        }
        if self
            .graph
            .cache_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            return Err(ConfigError::Invalid("graph.cache_dir must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RetestConfig::default();
        assert_eq!(config.selection.dep_format, DependencyFormat::Zlc);
        assert!(!config.selection.retest_all);
        assert!(!config.graph.include_third_party);
        assert!(config.graph.filter_lib);
        assert_eq!(config.graph.library_prefixes, vec!["java.", "sun."]);
        assert_eq!(config.checksum.mode, ChecksumMode::Smart);
        assert_eq!(config.storage.test_ids, TestIdEncoding::Plain);
        assert_eq!(config.diagnostics.verbosity, Verbosity::Info);
    }

    #[test]
    fn empty_toml_is_default() {
        let config = RetestConfig::from_toml("").unwrap();
        assert_eq!(config.selection.dep_format, DependencyFormat::Zlc);
        assert!(config.graph.print_graph);
    }

    #[test]
    fn parses_all_sections() {
        let text = r#"
[selection]
dep_format = "clz"
retest_all = true

[graph]
include_third_party = true
filter_lib = false
cache_dir = "/tmp/edges"

[checksum]
mode = "raw"

[storage]
test_ids = "indexed"

[diagnostics]
verbosity = "trace"
write_changed_classes = true
"#;
        let config = RetestConfig::from_toml(text).unwrap();
        assert_eq!(config.selection.dep_format, DependencyFormat::Clz);
        assert!(config.selection.retest_all);
        assert!(config.graph.include_third_party);
        assert!(config.graph.effective_library_prefixes().is_empty());
        assert_eq!(config.graph.cache_dir_for(Path::new("/a")), PathBuf::from("/tmp/edges"));
        assert_eq!(config.checksum.mode, ChecksumMode::Raw);
        assert_eq!(config.storage.test_ids, TestIdEncoding::Indexed);
        assert_eq!(config.diagnostics.verbosity, Verbosity::Trace);
        assert!(config.diagnostics.write_changed_classes);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = RetestConfig::from_toml("[selection]\ndep_format = \"xml\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn blank_library_prefix_is_invalid() {
        let err = RetestConfig::from_toml("[graph]\nlibrary_prefixes = [\"java.\", \" \"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn from_str_accepts_any_case() {
        assert_eq!("ZLC".parse::<DependencyFormat>().unwrap(), DependencyFormat::Zlc);
        assert_eq!("Indexed".parse::<TestIdEncoding>().unwrap(), TestIdEncoding::Indexed);
        assert!("json".parse::<DependencyFormat>().is_err());
        assert!(Verbosity::Trace > Verbosity::Debug);
    }

    #[test]
    fn default_cache_dir_lives_under_artifacts() {
        let graph = GraphSection::default();
        assert_eq!(
            graph.cache_dir_for(Path::new("/proj/.retest")),
            PathBuf::from("/proj/.retest/edge-cache")
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = RetestConfig::load(Path::new("/definitely/not/here/retest.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
