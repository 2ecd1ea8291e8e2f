use anyhow::Context;
use clap::Args;

use super::{ProjectArgs, Session};

#[derive(Args, Debug)]
pub struct CleanArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

pub fn run(args: &CleanArgs) -> anyhow::Result<()> {
    let session = Session::open(&args.project, true)?;
    let removed = session
        .engine
        .clean(&session.artifacts)
        .with_context(|| format!("Cannot remove {}", session.artifacts.display()))?;
    if removed {
        println!("Removed {}", session.artifacts.display());
    } else {
        println!("Nothing to clean in {}", session.artifacts.display());
    }
    Ok(())
}
