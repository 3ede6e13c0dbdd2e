use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use crate::args::BaseArgs;
use crate::config;
use crate::ui::{fuzzy_select, is_interactive};

mod list;
mod show;
pub mod store;

use store::ArchiveStore;

pub const DEFAULT_ARCHIVE_DIR: &str = "data";

#[derive(Debug, Clone, Args)]
pub struct ArchiveArgs {
    #[command(subcommand)]
    command: Option<ArchiveCommands>,
}

#[derive(Debug, Clone, Subcommand)]
enum ArchiveCommands {
    /// List projects with a local backup
    Projects,
    /// List archived runs of a project
    List,
    /// Show an archived run
    Show(ShowArgs),
    /// Show where the archive lives and what it holds
    Status,
}

#[derive(Debug, Clone, Args)]
struct ShowArgs {
    /// Run id (positional)
    #[arg(value_name = "RUN_ID")]
    run_positional: Option<String>,

    /// Run id (flag)
    #[arg(long = "run", short = 'r')]
    run_flag: Option<String>,

    /// Print only the top-level keys and history size
    #[arg(long)]
    summary: bool,
}

impl ShowArgs {
    fn run_id(&self) -> Option<&str> {
        self.run_positional
            .as_deref()
            .or(self.run_flag.as_deref())
    }
}

/// Archive root: `--archive-dir`/`WBACKUP_ARCHIVE_DIR`, then the `archive_dir`
/// config key, then `./data`.
pub fn resolve_root(base: &BaseArgs) -> Result<PathBuf> {
    if let Some(dir) = base.archive_dir.clone().filter(|d| !d.as_os_str().is_empty()) {
        return Ok(dir);
    }
    let cfg = config::load().unwrap_or_default();
    Ok(cfg
        .archive_dir
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_DIR)))
}

pub fn resolve_store(base: &BaseArgs) -> Result<ArchiveStore> {
    Ok(ArchiveStore::new(resolve_root(base)?))
}

/// Project to browse offline: flag/env, then config, then a pick among local backups.
fn resolve_local_project(base: &BaseArgs, store: &ArchiveStore) -> Result<String> {
    let configured = base
        .project
        .clone()
        .or_else(|| config::load().ok().and_then(|cfg| cfg.project))
        .filter(|p| !p.is_empty());
    if let Some(project) = configured {
        return Ok(project);
    }

    let projects = store.list_projects()?;
    if projects.is_empty() {
        bail!(
            "no backed up projects in {}. Run `wbackup backup` first",
            store.root().display()
        );
    }
    if !is_interactive() {
        bail!("--project required (or set WANDB_PROJECT)");
    }
    let selection = fuzzy_select("Select project", &projects)?;
    Ok(projects[selection].clone())
}

pub async fn run(base: BaseArgs, args: ArchiveArgs) -> Result<()> {
    let store = resolve_store(&base)?;

    match args.command {
        Some(ArchiveCommands::Projects) => list::projects(&store, base.json),
        None | Some(ArchiveCommands::List) => {
            let project = resolve_local_project(&base, &store)?;
            list::runs(&store, &project, base.json)
        }
        Some(ArchiveCommands::Show(s)) => {
            let project = resolve_local_project(&base, &store)?;
            show::run(&store, &project, s.run_id(), s.summary, base.json)
        }
        Some(ArchiveCommands::Status) => list::status(&store, base.json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;
    use tempfile::TempDir;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        base: BaseArgs,
    }

    fn base_args(args: &[&str]) -> BaseArgs {
        let mut argv = vec!["wbackup"];
        argv.extend_from_slice(args);
        TestCli::parse_from(argv).base
    }

    #[test]
    #[serial]
    fn archive_dir_flag_wins() {
        let base = base_args(&["--archive-dir", "/tmp/elsewhere"]);
        assert_eq!(resolve_root(&base).unwrap(), PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    #[serial]
    fn archive_dir_falls_back_to_config_then_default() {
        let tmp = TempDir::new().unwrap();
        std::env::set_var("WBACKUP_CONFIG_DIR", tmp.path());
        std::env::remove_var("WBACKUP_ARCHIVE_DIR");

        let base = base_args(&[]);
        assert_eq!(
            resolve_root(&base).unwrap(),
            PathBuf::from(DEFAULT_ARCHIVE_DIR)
        );

        let cfg = config::Config {
            archive_dir: Some("/srv/backups".into()),
            ..Default::default()
        };
        config::save_file(&tmp.path().join("config.json"), &cfg).unwrap();
        assert_eq!(resolve_root(&base).unwrap(), PathBuf::from("/srv/backups"));

        std::env::remove_var("WBACKUP_CONFIG_DIR");
    }
}
