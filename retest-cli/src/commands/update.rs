use clap::Args;

use super::{ProjectArgs, Session, TestArgs};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(flatten)]
    pub tests: TestArgs,
}

pub fn run(args: &UpdateArgs, quiet: bool) -> anyhow::Result<()> {
    let session = Session::open(&args.project, quiet)?;
    let tests = session.tests(&args.tests)?;
    let report = session
        .engine
        .update_snapshot(&session.artifacts, &session.classpath, &tests);

    if !report.persisted {
        anyhow::bail!(
            "Snapshot not saved in {}; see the log for the cause",
            session.artifacts.display()
        );
    }
    if quiet {
        return Ok(());
    }

    println!("Snapshot updated in {}", session.artifacts.display());
    println!();
    if let Some(generation) = report.generation {
        println!("  Generation:     {generation}");
    }
    println!("  Format:         {}", session.engine.config().selection.dep_format);
    println!("  Tests:          {}", report.tests);
    println!("  Classes:        {}", report.classes);
    println!("  Unreached:      {}", report.unreached);
    println!("  Wildcard tests: {}", report.wildcard_tests);
    println!("  Duration:       {:.2?}", report.duration);
    Ok(())
}
