// Affected-test resolution. Dispatched once on the snapshot variant.

use std::collections::{BTreeSet, HashSet};

use retest_graph::Closures;
use serde::Serialize;
use tracing::debug;

use crate::change::ChangeSet;
use crate::types::{ClassName, ClzSnapshot, RunSnapshot, TestId, ZlcSnapshot};

/// Tests safe to skip, plus the changes that decided it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub non_affected: BTreeSet<TestId>,
    pub changed_classes: BTreeSet<ClassName>,
}

/// Decide which of `all_tests` are non-affected by `changes`.
///
/// `current_closures` are the closures recomputed from this build's graph,
/// keyed by entry point. CLZ needs them; without them every CLZ test is
/// affected. A test with no prior record is never non-affected.
pub fn resolve(
    snapshot: &RunSnapshot,
    changes: &ChangeSet,
    all_tests: &[TestId],
    current_closures: Option<&Closures>,
) -> Resolution {
    let non_affected = match snapshot {
        RunSnapshot::Zlc(zlc) => resolve_zlc(zlc, changes, all_tests),
        RunSnapshot::Clz(clz) => match current_closures {
            Some(closures) => resolve_clz(clz, changes, all_tests, closures),
            None => BTreeSet::new(),
        },
    };
    Resolution {
        non_affected,
        changed_classes: changes.all(),
    }
}

fn resolve_zlc(zlc: &ZlcSnapshot, changes: &ChangeSet, all_tests: &[TestId]) -> BTreeSet<TestId> {
    let recorded = zlc.recorded_classes();
    // Changes no record accounts for: previously unreached classes and new ones.
    let unattributed = changes.all().iter().filter(|c| !recorded.contains(c)).count();
    debug!(
        changed = changes.len(),
        unattributed, "Resolving against ZLC records"
    );

    all_tests
        .iter()
        .filter(|test| {
            zlc.records.get(*test).is_some_and(|record| {
                let touched = record.classes.keys().any(|c| changes.contains(c));
                !touched && (!record.reaches_wildcard || unattributed == 0)
            })
        })
        .cloned()
        .collect()
}

fn resolve_clz(
    clz: &ClzSnapshot,
    changes: &ChangeSet,
    all_tests: &[TestId],
    closures: &Closures,
) -> BTreeSet<TestId> {
    let any_change = !changes.is_empty();
    all_tests
        .iter()
        .filter(|test| {
            let Some(listed) = clz.tests.get(*test) else {
                return false;
            };
            let Some(current) = closures.get(&test.entry_point()) else {
                return false;
            };
            let deps: HashSet<&ClassName> = listed.iter().chain(current).collect();
            if any_change && deps.iter().any(|c| c.is_wildcard()) {
                return false;
            }
            !deps.iter().any(|c| changes.contains(c))
        })
        .cloned()
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────
