use anyhow::Context;
use clap::Args;
use tracing::warn;

use super::{ProjectArgs, Session, TestArgs, print_json, print_lines};

#[derive(Args, Debug)]
pub struct ImpactedArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(flatten)]
    pub tests: TestArgs,

    /// Record a new snapshot after the analysis
    #[arg(long)]
    pub update: bool,

    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &ImpactedArgs, quiet: bool) -> anyhow::Result<()> {
    let session = Session::open(&args.project, quiet)?;
    let report = session
        .engine
        .impacted_classes(&session.artifacts, &session.classpath)
        .context("Impact analysis failed")?;

    if args.json {
        print_json(&report)?;
    } else {
        print_lines(&report.impacted);
    }

    if args.update {
        let tests = session.tests(&args.tests)?;
        let update = session
            .engine
            .update_snapshot(&session.artifacts, &session.classpath, &tests);
        if !update.persisted {
            warn!("Snapshot was not saved");
        }
    }
    Ok(())
}
