use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;

mod archive;
mod args;
mod auth;
mod backup;
mod config;
mod env;
mod http;
mod logging;
mod project_command;
mod projects;
mod remote;
mod runs;
mod session;
mod sync;
mod ui;
mod utils;

use crate::args::CLIArgs;

const DEFAULT_DEV_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-dev");
const CLI_VERSION: &str = match option_env!("WBACKUP_VERSION_STRING") {
    Some(version) => version,
    None => DEFAULT_DEV_VERSION,
};

#[derive(Debug, Parser)]
#[command(
    name = "wbackup",
    about = "Incremental local backups of Weights & Biases runs",
    version = CLI_VERSION
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Save and verify an API key
    Login(CLIArgs<auth::LoginArgs>),
    /// Remove a saved login profile
    Logout(CLIArgs<auth::LogoutArgs>),
    /// Show the active credentials
    Whoami(CLIArgs<auth::WhoamiArgs>),
    /// Browse projects on the service
    Projects(CLIArgs<projects::ProjectsArgs>),
    /// Browse runs of a project on the service
    Runs(CLIArgs<runs::RunsArgs>),
    /// Back up the runs of a project to local JSON files
    Backup(CLIArgs<backup::BackupArgs>),
    /// Browse local backups
    Archive(CLIArgs<archive::ArchiveArgs>),
    /// View and modify configuration
    Config(CLIArgs<config::ConfigArgs>),
}

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<OsString> = std::env::args_os().collect();
    env::bootstrap_from_args(&argv)?;
    logging::init();
    let cli = Cli::parse_from(argv);

    match cli.command {
        Commands::Login(cmd) => auth::run_login(cmd.base, cmd.args).await?,
        Commands::Logout(cmd) => auth::run_logout(cmd.base, cmd.args)?,
        Commands::Whoami(cmd) => auth::run_whoami(cmd.base, cmd.args).await?,
        Commands::Projects(cmd) => projects::run(cmd.base, cmd.args).await?,
        Commands::Runs(cmd) => runs::run(cmd.base, cmd.args).await?,
        Commands::Backup(cmd) => backup::run(cmd.base, cmd.args).await?,
        Commands::Archive(cmd) => archive::run(cmd.base, cmd.args).await?,
        Commands::Config(cmd) => config::run(cmd.base, cmd.args)?,
    }

    Ok(())
}
