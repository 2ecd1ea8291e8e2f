use clap::Args;
use serde::Serialize;
use tracing::warn;

use retest_core::engine::HistoryStatus;
use retest_core::{ClassName, TestId};

use super::{ProjectArgs, Session, TestArgs, print_json, print_lines};

#[derive(Args, Debug)]
pub struct SelectArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(flatten)]
    pub tests: TestArgs,

    /// Record a new snapshot after selecting
    #[arg(long)]
    pub update: bool,

    /// Print the full selection as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct SelectOutput<'a> {
    history: HistoryStatus,
    retest_all: bool,
    selected: Vec<&'a TestId>,
    skipped: Vec<&'a TestId>,
    changed_classes: Vec<&'a ClassName>,
}

pub fn run(args: &SelectArgs, quiet: bool) -> anyhow::Result<()> {
    let session = Session::open(&args.project, quiet)?;
    let tests = session.tests(&args.tests)?;
    let selection = session
        .engine
        .compute_non_affected(&session.artifacts, &session.classpath, &tests);
    let affected = selection.affected();

    if args.json {
        print_json(&SelectOutput {
            history: selection.history,
            retest_all: selection.retest_all,
            selected: affected.iter().collect(),
            skipped: selection.non_affected.iter().collect(),
            changed_classes: selection.changed_classes.iter().collect(),
        })?;
    } else {
        print_lines(&affected);
    }

    if args.update {
        let report = session
            .engine
            .update_snapshot(&session.artifacts, &session.classpath, &tests);
        if !report.persisted {
            warn!("Snapshot was not saved; the next run selects every test");
        }
    }
    Ok(())
}
