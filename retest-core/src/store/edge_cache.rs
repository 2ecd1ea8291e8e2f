// Third-party library edges keyed by classpath fingerprint.
//
//   #retest edge-cache v1
//   <from> -> <to>
//   end <n>

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::format::{self, LineReader};
use super::write_atomic;
use crate::error::StoreError;
use crate::types::{ClasspathFingerprint, DependencyEdge};

const KIND: &str = "edge-cache";
const FILE_LABEL: &str = "edge cache";

/// Directory of `<fingerprint>.edges` files. Unreadable or corrupt entries
/// are misses.
#[derive(Debug, Clone)]
pub struct EdgeCache {
    dir: PathBuf,
}

impl EdgeCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, fingerprint: &ClasspathFingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.edges"))
    }

    pub fn load(&self, fingerprint: &ClasspathFingerprint) -> Option<BTreeSet<DependencyEdge>> {
        let path = self.entry_path(fingerprint);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Edge cache unreadable, treating as miss");
                return None;
            }
        };
        match decode(&text) {
            Ok(edges) => {
                debug!(path = %path.display(), edges = edges.len(), "Edge cache hit");
                Some(edges)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Edge cache corrupt, treating as miss");
                None
            }
        }
    }

    pub fn store(&self, fingerprint: &ClasspathFingerprint, edges: &BTreeSet<DependencyEdge>) -> Result<(), StoreError> {
        write_atomic(&self.entry_path(fingerprint), &encode(edges))
    }
}

fn encode(edges: &BTreeSet<DependencyEdge>) -> String {
    let mut out = format::header(KIND);
    for edge in edges {
        out.push_str(&retest_graph::format_edge(edge));
        out.push('\n');
    }
    format::push_end(&mut out, edges.len());
    out
}

fn decode(text: &str) -> Result<BTreeSet<DependencyEdge>, StoreError> {
    let mut r = LineReader::new(FILE_LABEL, text);
    r.expect_header(KIND)?;
    let mut edges = BTreeSet::new();
    let mut lines = 0usize;
    loop {
        let line = r.next_line()?;
        if let Some(count) = format::split_field(line, "end") {
            if count.parse::<usize>().ok() != Some(lines) {
                return Err(r.corrupt(format!("end count {count:?} does not match {lines} edges")));
            }
            r.expect_eof()?;
            return Ok(edges);
        }
        let edge = retest_graph::parse_edge_line(line, lines + 1)
            .map_err(|e| r.corrupt(e))?
            .ok_or_else(|| r.corrupt("blank edge line"))?;
        edges.insert(edge);
        lines += 1;
    }
}
