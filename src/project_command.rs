use anyhow::{bail, Result};

use crate::{
    args::BaseArgs,
    config,
    http::ApiClient,
    session::{self, Session},
    ui::{is_interactive, select_project_interactive},
};

pub struct ProjectCommandContext {
    pub session: Session,
    pub client: ApiClient,
    pub project: String,
}

/// Session, client and target project for commands that work on one remote project.
pub async fn resolve_project_command_context(base: &BaseArgs) -> Result<ProjectCommandContext> {
    let session = session::resolve(base).await?;
    let client = ApiClient::new(&session)?;
    let configured = base
        .project
        .clone()
        .or_else(|| config::load().ok().and_then(|cfg| cfg.project))
        .filter(|p| !p.is_empty());

    let project = match configured {
        Some(p) => p,
        None if is_interactive() => select_project_interactive(&client).await?,
        None => bail!("--project required (or set WANDB_PROJECT)"),
    };

    Ok(ProjectCommandContext {
        session,
        client,
        project,
    })
}
