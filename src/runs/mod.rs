use anyhow::Result;
use clap::{Args, Subcommand};

use crate::archive;
use crate::args::BaseArgs;
use crate::project_command::resolve_project_command_context;

pub mod api;
mod list;

#[derive(Debug, Clone, Args)]
pub struct RunsArgs {
    #[command(subcommand)]
    command: Option<RunsCommands>,
}

#[derive(Debug, Clone, Subcommand)]
enum RunsCommands {
    /// List runs of the project and whether they are backed up
    List,
}

pub async fn run(base: BaseArgs, args: RunsArgs) -> Result<()> {
    let ctx = resolve_project_command_context(&base).await?;
    let store = archive::resolve_store(&base)?;
    let source = api::WandbRunSource::new(ctx.client, api::DEFAULT_HISTORY_SAMPLES);

    match args.command {
        None | Some(RunsCommands::List) => {
            list::run(&source, &store, &ctx.session.entity, &ctx.project, base.json).await
        }
    }
}
