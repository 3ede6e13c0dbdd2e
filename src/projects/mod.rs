use anyhow::{anyhow, bail, Result};
use clap::{Args, Subcommand};

use crate::args::BaseArgs;
use crate::archive;
use crate::http::ApiClient;
use crate::session::{self, project_url};
use crate::ui::{
    is_interactive, print_command_status, select_project_interactive, with_spinner, CommandStatus,
};

pub mod api;
mod list;

#[derive(Debug, Clone, Args)]
pub struct ProjectsArgs {
    #[command(subcommand)]
    command: Option<ProjectsCommands>,
}

#[derive(Debug, Clone, Subcommand)]
enum ProjectsCommands {
    /// List projects of the entity
    List,
    /// Open a project page in the browser
    Open(OpenArgs),
}

#[derive(Debug, Clone, Args)]
struct OpenArgs {
    /// Project name (positional)
    #[arg(value_name = "NAME")]
    name_positional: Option<String>,

    /// Project name (flag)
    #[arg(long = "name", short = 'n')]
    name_flag: Option<String>,
}

impl OpenArgs {
    fn name(&self) -> Option<&str> {
        self.name_positional
            .as_deref()
            .or(self.name_flag.as_deref())
    }
}

pub async fn run(base: BaseArgs, args: ProjectsArgs) -> Result<()> {
    let session = session::resolve(&base).await?;
    let client = ApiClient::new(&session)?;

    match args.command {
        None | Some(ProjectsCommands::List) => {
            let store = archive::resolve_store(&base)?;
            list::run(&client, &store, base.json).await
        }
        Some(ProjectsCommands::Open(o)) => {
            let name = match o.name().or(base.project.as_deref()) {
                Some(n) => with_spinner("Loading project...", api::get_project_by_name(&client, n))
                    .await?
                    .ok_or_else(|| anyhow!("project '{n}' not found in '{}'", session.entity))?
                    .name,
                None if is_interactive() => select_project_interactive(&client).await?,
                None => bail!("project name required. Use: wbackup projects open <name>"),
            };
            let url = project_url(&session.app_url, &session.entity, &name);
            if base.json {
                println!("{}", serde_json::json!({ "project": name, "url": url }));
                return Ok(());
            }
            open::that(&url)?;
            print_command_status(CommandStatus::Success, &format!("Opened {url} in browser"));
            Ok(())
        }
    }
}
