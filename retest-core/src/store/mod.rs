//! On-disk run state in the artifacts directory.
//!
//! Every file is plain text with a versioned header and an `end <n>`
//! terminator, written through a temp file and renamed into place. A file
//! that fails any check is corrupt, and a corrupt snapshot is treated exactly
//! like a missing one: no history, every test affected.

mod clz;
pub mod diagnostics;
pub mod edge_cache;
mod fingerprint;
mod format;
pub mod index;
mod zlc;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use diagnostics::{DiagnosticsPolicy, DiagnosticsWriter};
pub use edge_cache::EdgeCache;
pub use index::TestIndex;

use crate::config::{DependencyFormat, TestIdEncoding};
use crate::error::StoreError;
use crate::types::{Classpath, ClasspathFingerprint, ClzSnapshot, RunSnapshot};
use format::LineReader;
use index::IdCodec;

pub const ZLC_FILE: &str = "deps.zlc";
pub const CLZ_CHECKSUMS_FILE: &str = "checksums.clz";
pub const CLZ_TESTS_FILE: &str = "tests.clz";
pub const TEST_INDEX_FILE: &str = "test-names.idx";
pub const CLASSPATH_FILE: &str = "classpath.fingerprint";

/// A snapshot as loaded from disk, with its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub generation: Uuid,
    pub created: DateTime<Utc>,
    pub snapshot: RunSnapshot,
}

/// What the previous run left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum History {
    Snapshot(StoredSnapshot),
    Missing,
    Corrupt { reason: String },
}

impl History {
    pub fn stored(&self) -> Option<&StoredSnapshot> {
        match self {
            Self::Snapshot(stored) => Some(stored),
            Self::Missing | Self::Corrupt { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Snapshot(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "available",
            Self::Missing => "missing",
            Self::Corrupt { .. } => "corrupt",
        }
    }
}

/// Reads and writes run state under one artifacts directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the snapshot for `format`. Never fails: problems become
    /// `Missing` or `Corrupt`.
    pub fn load(&self, format: DependencyFormat) -> History {
        match self.try_load(format) {
            Ok(Some(stored)) => History::Snapshot(stored),
            Ok(None) => History::Missing,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Ignoring unusable snapshot");
                History::Corrupt { reason: e.to_string() }
            }
        }
    }

    pub fn try_load(&self, format: DependencyFormat) -> Result<Option<StoredSnapshot>, StoreError> {
        match format {
            DependencyFormat::Zlc => self.load_zlc(),
            DependencyFormat::Clz => self.load_clz(),
        }
    }

    fn load_zlc(&self) -> Result<Option<StoredSnapshot>, StoreError> {
        let Some(text) = self.read_optional(ZLC_FILE)? else {
            return Ok(None);
        };
        let mut reader = LineReader::new(ZLC_FILE, &text);
        let header = zlc::read_header(&mut reader)?;
        let index = self.index_for(header.encoding, header.generation)?;
        let ids = index.as_ref().map_or(IdCodec::Plain, IdCodec::Indexed);
        let snapshot = zlc::read_body(&mut reader, ids)?;
        debug!(
            tests = snapshot.records.len(),
            unreached = snapshot.unreached.len(),
            generation = %header.generation,
            "Loaded ZLC snapshot"
        );
        Ok(Some(StoredSnapshot {
            generation: header.generation,
            created: header.created,
            snapshot: RunSnapshot::Zlc(snapshot),
        }))
    }

    fn load_clz(&self) -> Result<Option<StoredSnapshot>, StoreError> {
        let checksums = self.read_optional(CLZ_CHECKSUMS_FILE)?;
        let tests = self.read_optional(CLZ_TESTS_FILE)?;
        let (checksums, tests) = match (checksums, tests) {
            (None, None) => return Ok(None),
            (Some(c), Some(t)) => (c, t),
            (Some(_), None) => return Err(StoreError::corrupt(CLZ_TESTS_FILE, "missing")),
            (None, Some(_)) => return Err(StoreError::corrupt(CLZ_CHECKSUMS_FILE, "missing")),
        };

        let table = clz::decode_checksums(&checksums)?;
        let mut reader = LineReader::new(CLZ_TESTS_FILE, &tests);
        let header = clz::read_tests_header(&mut reader)?;
        if header.generation != table.generation {
            return Err(StoreError::corrupt(
                CLZ_TESTS_FILE,
                format!("generation {} does not match {}", header.generation, table.generation),
            ));
        }
        let index = self.index_for(header.encoding, header.generation)?;
        let ids = index.as_ref().map_or(IdCodec::Plain, IdCodec::Indexed);
        let tests = clz::read_tests_body(&mut reader, ids)?;
        debug!(
            tests = tests.len(),
            classes = table.checksums.len(),
            generation = %table.generation,
            "Loaded CLZ snapshot"
        );
        Ok(Some(StoredSnapshot {
            generation: table.generation,
            created: table.created,
            snapshot: RunSnapshot::Clz(ClzSnapshot {
                checksums: table.checksums,
                tests,
            }),
        }))
    }

    /// The test name table, required when records are indexed and bound to
    /// the same generation.
    fn index_for(&self, encoding: TestIdEncoding, generation: Uuid) -> Result<Option<TestIndex>, StoreError> {
        if encoding == TestIdEncoding::Plain {
            return Ok(None);
        }
        let text = self
            .read_optional(TEST_INDEX_FILE)?
            .ok_or_else(|| StoreError::corrupt(TEST_INDEX_FILE, "missing for indexed snapshot"))?;
        let (index_generation, index) = TestIndex::decode(&text)?;
        if index_generation != generation {
            return Err(StoreError::corrupt(
                TEST_INDEX_FILE,
                format!("generation {index_generation} does not match {generation}"),
            ));
        }
        Ok(Some(index))
    }

    /// Persist `snapshot` under a fresh generation. Each file is replaced
    /// atomically; a crash between files leaves mismatched generations, which
    /// the next load reports as corrupt.
    pub fn save(&self, snapshot: &RunSnapshot, encoding: TestIdEncoding) -> Result<StoredSnapshot, StoreError> {
        let generation = Uuid::new_v4();
        let created = Utc::now();
        let index = match encoding {
            TestIdEncoding::Plain => None,
            TestIdEncoding::Indexed => Some(match snapshot {
                RunSnapshot::Zlc(zlc) => TestIndex::build(zlc.records.keys()),
                RunSnapshot::Clz(clz) => TestIndex::build(clz.tests.keys()),
            }),
        };
        if let Some(index) = &index {
            write_atomic(&self.dir.join(TEST_INDEX_FILE), &index.encode(generation))?;
        }
        let ids = index.as_ref().map_or(IdCodec::Plain, IdCodec::Indexed);

        match snapshot {
            RunSnapshot::Zlc(zlc) => {
                let header = zlc::ZlcHeader {
                    generation,
                    encoding,
                    created,
                };
                write_atomic(&self.dir.join(ZLC_FILE), &zlc::encode(zlc, &header, ids))?;
            }
            RunSnapshot::Clz(clz) => {
                write_atomic(
                    &self.dir.join(CLZ_TESTS_FILE),
                    &clz::encode_tests(clz, generation, encoding, ids),
                )?;
                write_atomic(
                    &self.dir.join(CLZ_CHECKSUMS_FILE),
                    &clz::encode_checksums(&clz.checksums, generation, created),
                )?;
            }
        }
        info!(
            format = %snapshot.format(),
            tests = snapshot.tests().len(),
            generation = %generation,
            "Saved snapshot"
        );
        Ok(StoredSnapshot {
            generation,
            created,
            snapshot: snapshot.clone(),
        })
    }

    /// Fingerprint recorded by the last update, if any.
    pub fn load_fingerprint(&self) -> Result<Option<ClasspathFingerprint>, StoreError> {
        self.read_optional(CLASSPATH_FILE)?
            .map(|text| fingerprint::decode(&text))
            .transpose()
    }

    pub fn save_fingerprint(&self, classpath: &Classpath) -> Result<(), StoreError> {
        write_atomic(&self.dir.join(CLASSPATH_FILE), &fingerprint::encode(classpath))
    }

    /// Remove the artifacts directory. Returns whether anything existed.
    pub fn clean(&self) -> Result<bool, StoreError> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                info!(dir = %self.dir.display(), "Removed run state");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read_optional(&self, file: &str) -> Result<Option<String>, StoreError> {
        let path = self.dir.join(file);
        match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StoreError::corrupt(file, "not valid UTF-8")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `contents` to a temp file beside `path`, fsync it, and rename it
/// over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Persist {
        path: path.display().to_string(),
        source: e.error,
    })?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::types::{Checksum, ClassName, TestDependencyRecord, TestId, ZlcSnapshot};

    fn zlc_snapshot() -> RunSnapshot {
        let mut zlc = ZlcSnapshot::default();
        zlc.records.insert(
            TestId::from("t.TestA"),
            TestDependencyRecord {
                reaches_wildcard: false,
                classes: [(ClassName::from("a.A"), Checksum::of_bytes(b"a"))].into(),
            },
        );
        zlc.unreached.insert(ClassName::from("a.Dead"), Checksum::of_bytes(b"d"));
        RunSnapshot::Zlc(zlc)
    }

    fn clz_snapshot() -> RunSnapshot {
        RunSnapshot::Clz(ClzSnapshot {
            checksums: [(ClassName::from("a.A"), Checksum::of_bytes(b"a"))].into(),
            tests: [(
                TestId::from("t.TestA"),
                BTreeSet::from([ClassName::from("t.TestA"), ClassName::from("a.A")]),
            )]
            .into(),
        })
    }

    #[test]
    fn empty_directory_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("artifacts"));
        assert_eq!(store.load(DependencyFormat::Zlc), History::Missing);
        assert_eq!(store.load(DependencyFormat::Clz), History::Missing);
    }

    #[test]
    fn saved_snapshots_load_back_in_every_encoding() {
        for encoding in [TestIdEncoding::Plain, TestIdEncoding::Indexed] {
            for snapshot in [zlc_snapshot(), clz_snapshot()] {
                let dir = tempfile::tempdir().unwrap();
                let store = StateStore::new(dir.path());
                let saved = store.save(&snapshot, encoding).unwrap();
                let History::Snapshot(loaded) = store.load(snapshot.format()) else {
                    panic!("expected a snapshot for {encoding:?}");
                };
                assert_eq!(loaded.generation, saved.generation);
                assert_eq!(loaded.snapshot, snapshot);
            }
        }
    }

    #[test]
    fn other_format_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.save(&zlc_snapshot(), TestIdEncoding::Plain).unwrap();
        assert_eq!(store.load(DependencyFormat::Clz), History::Missing);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.save(&zlc_snapshot(), TestIdEncoding::Plain).unwrap();
        let path = dir.path().join(ZLC_FILE);
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, &text[..text.len() / 2]).unwrap();
        assert!(matches!(store.load(DependencyFormat::Zlc), History::Corrupt { .. }));
    }

    #[test]
    fn non_utf8_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ZLC_FILE), [0xFF, 0xFE, 0x00]).unwrap();
        let store = StateStore::new(dir.path());
        assert!(matches!(store.load(DependencyFormat::Zlc), History::Corrupt { .. }));
    }

    #[test]
    fn generation_mismatch_is_corrupt() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        StateStore::new(first.path()).save(&clz_snapshot(), TestIdEncoding::Plain).unwrap();
        StateStore::new(second.path()).save(&clz_snapshot(), TestIdEncoding::Plain).unwrap();
        // Mix the two generations.
        std::fs::copy(second.path().join(CLZ_TESTS_FILE), first.path().join(CLZ_TESTS_FILE)).unwrap();
        let history = StateStore::new(first.path()).load(DependencyFormat::Clz);
        let History::Corrupt { reason } = history else {
            panic!("expected corrupt history");
        };
        assert!(reason.contains("generation"));
    }

    #[test]
    fn stale_index_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.save(&zlc_snapshot(), TestIdEncoding::Indexed).unwrap();
        let index = TestIndex::build(&[TestId::from("t.TestA")]);
        std::fs::write(dir.path().join(TEST_INDEX_FILE), index.encode(Uuid::new_v4())).unwrap();
        assert!(matches!(store.load(DependencyFormat::Zlc), History::Corrupt { .. }));
    }

    #[test]
    fn missing_half_of_clz_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.save(&clz_snapshot(), TestIdEncoding::Plain).unwrap();
        std::fs::remove_file(dir.path().join(CLZ_CHECKSUMS_FILE)).unwrap();
        assert!(matches!(store.load(DependencyFormat::Clz), History::Corrupt { .. }));
    }

    #[test]
    fn fingerprint_round_trips_and_clean_removes_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("artifacts"));
        assert_eq!(store.load_fingerprint().unwrap(), None);

        let classpath = Classpath::new(vec![], vec!["/m2/a.jar".into()]);
        store.save_fingerprint(&classpath).unwrap();
        assert_eq!(store.load_fingerprint().unwrap(), Some(classpath.fingerprint()));

        assert!(store.clean().unwrap());
        assert!(!store.clean().unwrap());
        assert_eq!(store.load_fingerprint().unwrap(), None);
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file");
        write_atomic(&path, "one").unwrap();
        write_atomic(&path, "two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
