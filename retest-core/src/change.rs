// Change detection between the previous run's checksums and the current build.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::types::{Checksum, ChecksumSnapshot, ClassName};

/// Outcome of comparing two runs. `NoHistory` is distinct from an empty
/// change set: it means nothing can be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDetection {
    NoHistory,
    Changes(ChangeSet),
}

impl ChangeDetection {
    pub fn change_set(&self) -> Option<&ChangeSet> {
        match self {
            Self::NoHistory => None,
            Self::Changes(set) => Some(set),
        }
    }
}

/// Classes whose content differs from the previous run. All three kinds count
/// as changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub modified: BTreeSet<ClassName>,
    pub added: BTreeSet<ClassName>,
    pub removed: BTreeSet<ClassName>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modified.len() + self.added.len() + self.removed.len()
    }

    pub fn contains(&self, class: &ClassName) -> bool {
        self.modified.contains(class) || self.added.contains(class) || self.removed.contains(class)
    }

    /// Every changed class, sorted.
    pub fn all(&self) -> BTreeSet<ClassName> {
        self.modified
            .iter()
            .chain(&self.added)
            .chain(&self.removed)
            .cloned()
            .collect()
    }
}

/// `absent` means "not provided", so it counts as missing on either side.
fn present(checksum: Option<&Checksum>) -> Option<&Checksum> {
    checksum.filter(|c| !c.is_absent())
}

/// Compare `current` against `previous`.
///
/// - modified: present on both sides with different checksums
/// - added: present now, missing or `absent` before
/// - removed: present before, missing or `absent` now
pub fn detect_changes(previous: Option<&ChecksumSnapshot>, current: &ChecksumSnapshot) -> ChangeDetection {
    let Some(previous) = previous else {
        return ChangeDetection::NoHistory;
    };

    let mut set = ChangeSet::default();
    let classes: BTreeSet<&ClassName> = previous.keys().chain(current.keys()).collect();
    for class in classes {
        match (present(previous.get(class)), present(current.get(class))) {
            (Some(old), Some(new)) if old != new => {
                set.modified.insert(class.clone());
            }
            (None, Some(_)) => {
                set.added.insert(class.clone());
            }
            (Some(_), None) => {
                set.removed.insert(class.clone());
            }
            _ => {}
        }
    }
    ChangeDetection::Changes(set)
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(rows: &[(&str, &str)]) -> ChecksumSnapshot {
        rows.iter()
            .map(|(c, k)| (ClassName::from(*c), Checksum::parse(k).unwrap()))
            .collect()
    }

    #[test]
    fn no_previous_snapshot_is_no_history() {
        assert_eq!(detect_changes(None, &snap(&[("a.A", "1")])), ChangeDetection::NoHistory);
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let s = snap(&[("a.A", "1"), ("a.B", "2")]);
        let detection = detect_changes(Some(&s), &s);
        assert!(detection.change_set().unwrap().is_empty());
    }

    #[test]
    fn classifies_modified_added_removed() {
        let prev = snap(&[("a.A", "1"), ("a.B", "2"), ("a.Gone", "3")]);
        let curr = snap(&[("a.A", "1"), ("a.B", "9"), ("a.New", "4")]);
        let ChangeDetection::Changes(set) = detect_changes(Some(&prev), &curr) else {
            panic!("expected changes");
        };
        assert_eq!(set.modified, BTreeSet::from([ClassName::from("a.B")]));
        assert_eq!(set.added, BTreeSet::from([ClassName::from("a.New")]));
        assert_eq!(set.removed, BTreeSet::from([ClassName::from("a.Gone")]));
        assert_eq!(set.len(), 3);
        assert!(set.contains(&ClassName::from("a.Gone")));
        assert!(!set.contains(&ClassName::from("a.A")));
    }

    #[test]
    fn absent_counts_as_missing() {
        let prev = snap(&[("java.lang.Object", "absent"), ("a.Lib", "absent"), ("a.Was", "5")]);
        let curr = snap(&[("java.lang.Object", "absent"), ("a.Lib", "7"), ("a.Was", "absent")]);
        let set = detect_changes(Some(&prev), &curr).change_set().cloned().unwrap();
        assert_eq!(set.added, BTreeSet::from([ClassName::from("a.Lib")]));
        assert_eq!(set.removed, BTreeSet::from([ClassName::from("a.Was")]));
        assert!(set.modified.is_empty());
    }

    #[test]
    fn persisted_markers_always_differ() {
        let prev = snap(&[("a.A", Checksum::UNREADABLE), ("a.B", Checksum::CONFLICT)]);
        let curr = snap(&[("a.A", "1"), ("a.B", "2")]);
        let set = detect_changes(Some(&prev), &curr).change_set().cloned().unwrap();
        assert_eq!(set.modified.len(), 2);
    }

    #[test]
    fn unreadable_now_reads_as_removed() {
        let prev = snap(&[("a.A", "1")]);
        let curr = ChecksumSnapshot::new();
        let set = detect_changes(Some(&prev), &curr).change_set().cloned().unwrap();
        assert_eq!(set.all(), BTreeSet::from([ClassName::from("a.A")]));
    }
}
