// Class checksums: raw or debug-insensitive SHA-256 over class bytes.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::classfile::DebugInfoStripper;
use crate::config::ChecksumMode;
use crate::error::ChecksumError;
use crate::source::ClassSource;
use crate::types::{Checksum, ChecksumSnapshot, ClassName};

/// Rewrites class bytes into a form that only differs when behavior can.
pub trait BytecodeNormalizer: Send + Sync {
    fn normalize(&self, bytes: &[u8]) -> Result<Vec<u8>, ChecksumError>;
}

/// Computes checksums for classes served by a [`ClassSource`].
#[derive(Clone)]
pub struct ChecksumStore {
    normalizer: Option<Arc<dyn BytecodeNormalizer>>,
}

impl std::fmt::Debug for ChecksumStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumStore")
            .field("smart", &self.normalizer.is_some())
            .finish()
    }
}

impl ChecksumStore {
    pub fn new(mode: ChecksumMode) -> Self {
        match mode {
            ChecksumMode::Raw => Self { normalizer: None },
            ChecksumMode::Smart => Self::with_normalizer(Arc::new(DebugInfoStripper)),
        }
    }

    /// Smart mode with a caller-supplied normalizer.
    pub fn with_normalizer(normalizer: Arc<dyn BytecodeNormalizer>) -> Self {
        Self {
            normalizer: Some(normalizer),
        }
    }

    pub fn is_smart(&self) -> bool {
        self.normalizer.is_some()
    }

    /// Checksum of one class's bytes. A normalizer failure falls back to the
    /// raw bytes.
    pub fn checksum(&self, class: &ClassName, bytes: &[u8]) -> Checksum {
        let Some(normalizer) = &self.normalizer else {
            return Checksum::of_bytes(bytes);
        };
        match normalizer.normalize(bytes) {
            Ok(normalized) => Checksum::of_bytes(&normalized),
            Err(e) => {
                debug!(class = %class, error = %e, "Normalization failed, hashing raw bytes");
                Checksum::of_bytes(bytes)
            }
        }
    }

    /// Current-build view of `classes`. Classes the source does not provide
    /// are `absent`; read errors are logged and the class is left out, so it
    /// compares as removed against any previous snapshot.
    pub fn snapshot<'a>(
        &self,
        source: &dyn ClassSource,
        classes: impl IntoIterator<Item = &'a ClassName>,
    ) -> ChecksumSnapshot {
        self.collect(source, classes, None)
    }

    /// Checksums destined for persistence. Read errors become `unreadable`,
    /// which never matches a later checksum.
    pub fn record_checksums<'a>(
        &self,
        source: &dyn ClassSource,
        classes: impl IntoIterator<Item = &'a ClassName>,
    ) -> ChecksumSnapshot {
        self.collect(source, classes, Some(Checksum::unreadable()))
    }

    fn collect<'a>(
        &self,
        source: &dyn ClassSource,
        classes: impl IntoIterator<Item = &'a ClassName>,
        on_error: Option<Checksum>,
    ) -> ChecksumSnapshot {
        let classes: Vec<&ClassName> = classes.into_iter().filter(|c| !c.is_wildcard()).collect();
        classes
            .par_iter()
            .filter_map(|&class| match source.read_class(class) {
                Ok(Some(bytes)) => Some((class.clone(), self.checksum(class, &bytes))),
                Ok(None) => Some((class.clone(), Checksum::absent())),
                Err(e) => {
                    warn!(class = %class, error = %e, "Failed to read class bytes");
                    on_error.clone().map(|marker| (class.clone(), marker))
                }
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
