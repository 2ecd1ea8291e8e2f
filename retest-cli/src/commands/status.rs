use clap::Args;

use retest_core::engine::HistoryStatus;

use super::{ProjectArgs, Session, print_json};

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &StatusArgs) -> anyhow::Result<()> {
    let session = Session::open(&args.project, true)?;
    let status = session.engine.status(&session.artifacts, &session.classpath);

    if args.json {
        return print_json(&status);
    }

    println!("retest status for {}", session.artifacts.display());
    println!();
    println!("  Format:     {}", status.format);
    let history = match status.history {
        HistoryStatus::Available => "available",
        HistoryStatus::Missing => "missing",
        HistoryStatus::Corrupt => "corrupt",
        HistoryStatus::ClasspathChanged => "stale (classpath changed)",
    };
    println!("  Snapshot:   {history}");
    if let Some(reason) = &status.reason {
        println!("  Reason:     {reason}");
    }
    if let Some(generation) = status.generation {
        println!("  Generation: {generation}");
    }
    if let Some(created) = status.created {
        println!("  Created:    {}", created.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if status.generation.is_some() {
        println!("  Tests:      {}", status.tests);
        println!("  Classes:    {}", status.classes);
    }
    Ok(())
}
