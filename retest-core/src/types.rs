use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::DependencyFormat;

pub use retest_graph::{ClassName, DependencyEdge};

// ── Test identifiers ───────────────────────────────────────────────

/// Identifier of a test entry point, usually the test class name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The class the test's closure starts from.
    pub fn entry_point(&self) -> ClassName {
        ClassName::from(self.0.as_str())
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for TestId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

// ── Checksums ──────────────────────────────────────────────────────

/// Content-derived identity of one compiled class.
///
/// Real checksums are lowercase SHA-256 hex. Three reserved markers never
/// collide with a digest:
/// - `absent`: the class source does not provide the class (JDK, unresolved).
/// - `unreadable`: reading failed when the record was written.
/// - `conflict`: two persisted records disagreed about the class.
///
/// `unreadable` and `conflict` are never produced for a current build, so a
/// persisted one always compares as changed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    pub const ABSENT: &'static str = "absent";
    pub const UNREADABLE: &'static str = "unreadable";
    pub const CONFLICT: &'static str = "conflict";

    /// SHA-256 of `bytes`, hex encoded.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(format!("{digest:x}"))
    }

    pub fn absent() -> Self {
        Self(Self::ABSENT.to_string())
    }

    pub fn unreadable() -> Self {
        Self(Self::UNREADABLE.to_string())
    }

    pub fn conflict() -> Self {
        Self(Self::CONFLICT.to_string())
    }

    /// Parse a persisted checksum token.
    pub fn parse(token: &str) -> Option<Self> {
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_absent(&self) -> bool {
        self.0 == Self::ABSENT
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Class → checksum, one row per class known at a given run.
pub type ChecksumSnapshot = BTreeMap<ClassName, Checksum>;

// ── Classpath ──────────────────────────────────────────────────────

/// What the build tool hands over: project output directories and the
/// ordered library path list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classpath {
    pub class_dirs: Vec<PathBuf>,
    pub libraries: Vec<PathBuf>,
}

impl Classpath {
    pub fn new(class_dirs: Vec<PathBuf>, libraries: Vec<PathBuf>) -> Self {
        Self {
            class_dirs,
            libraries,
        }
    }

    /// Fingerprint of the classpath shape: ordered library paths, not their
    /// content.
    pub fn fingerprint(&self) -> ClasspathFingerprint {
        let mut hasher = Sha256::new();
        for lib in &self.libraries {
            hasher.update(lib.to_string_lossy().as_bytes());
            hasher.update(b"\n");
        }
        ClasspathFingerprint(format!("{:x}", hasher.finalize()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClasspathFingerprint(pub String);

impl ClasspathFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClasspathFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Run snapshots ──────────────────────────────────────────────────

/// ZLC record for one test: every class its closure reached, with the
/// checksum that class had when the record was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDependencyRecord {
    /// The closure passed through the wildcard node; the true dependency set
    /// is unknown.
    pub reaches_wildcard: bool,
    pub classes: ChecksumSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZlcSnapshot {
    pub records: BTreeMap<TestId, TestDependencyRecord>,
    /// Known classes no test closure reached, with their checksums.
    pub unreached: ChecksumSnapshot,
}

impl ZlcSnapshot {
    /// Merge every recorded checksum into one snapshot. A class recorded with
    /// two different checksums becomes `conflict`.
    pub fn checksums(&self) -> ChecksumSnapshot {
        let mut merged = ChecksumSnapshot::new();
        let rows = self
            .records
            .values()
            .flat_map(|r| r.classes.iter())
            .chain(self.unreached.iter());
        for (class, checksum) in rows {
            merged
                .entry(class.clone())
                .and_modify(|existing| {
                    if existing != checksum {
                        *existing = Checksum::conflict();
                    }
                })
                .or_insert_with(|| checksum.clone());
        }
        merged
    }

    /// Classes attributed to at least one test.
    pub fn recorded_classes(&self) -> HashSet<&ClassName> {
        self.records.values().flat_map(|r| r.classes.keys()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClzSnapshot {
    pub checksums: ChecksumSnapshot,
    /// Test → statically known classes. May contain the wildcard `*`.
    pub tests: BTreeMap<TestId, BTreeSet<ClassName>>,
}

/// The persisted unit tying two runs together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunSnapshot {
    Zlc(ZlcSnapshot),
    Clz(ClzSnapshot),
}

impl RunSnapshot {
    pub fn format(&self) -> DependencyFormat {
        match self {
            Self::Zlc(_) => DependencyFormat::Zlc,
            Self::Clz(_) => DependencyFormat::Clz,
        }
    }

    /// The previous run's checksum view of every known class.
    pub fn checksums(&self) -> ChecksumSnapshot {
        match self {
            Self::Zlc(zlc) => zlc.checksums(),
            Self::Clz(clz) => clz.checksums.clone(),
        }
    }

    pub fn tests(&self) -> BTreeSet<&TestId> {
        match self {
            Self::Zlc(zlc) => zlc.records.keys().collect(),
            Self::Clz(clz) => clz.tests.keys().collect(),
        }
    }
}
