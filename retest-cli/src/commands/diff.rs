use clap::Args;
use tracing::warn;

use super::{ProjectArgs, Session, TestArgs, print_json, print_lines};

#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(flatten)]
    pub tests: TestArgs,

    /// Record a new snapshot after diffing
    #[arg(long)]
    pub update: bool,

    /// Print changed classes as a JSON array
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &DiffArgs, quiet: bool) -> anyhow::Result<()> {
    let session = Session::open(&args.project, quiet)?;
    let tests = session.tests(&args.tests)?;
    let selection = session
        .engine
        .compute_non_affected(&session.artifacts, &session.classpath, &tests);

    if !selection.history.is_available() {
        warn!(history = ?selection.history, "No usable snapshot to diff against");
    }
    if args.json {
        print_json(&selection.changed_classes)?;
    } else {
        print_lines(&selection.changed_classes);
    }

    if args.update {
        let report = session
            .engine
            .update_snapshot(&session.artifacts, &session.classpath, &tests);
        if !report.persisted {
            warn!("Snapshot was not saved");
        }
    }
    Ok(())
}
