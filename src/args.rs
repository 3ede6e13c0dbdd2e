use std::path::PathBuf;

use clap::Args;

pub const DEFAULT_BASE_URL: &str = "https://api.wandb.ai";
pub const DEFAULT_APP_URL: &str = "https://wandb.ai";
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, Args)]
pub struct BaseArgs {
    /// Output as JSON
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Use a saved login profile (or via WBACKUP_PROFILE)
    #[arg(long, env = "WBACKUP_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Override active project
    #[arg(
        short = 'p',
        long,
        env = "WANDB_PROJECT",
        hide_env_values = true,
        global = true
    )]
    pub project: Option<String>,

    /// Override the entity (user or team) that owns the projects
    #[arg(
        short = 'e',
        long,
        env = "WANDB_ENTITY",
        hide_env_values = true,
        global = true
    )]
    pub entity: Option<String>,

    /// Override stored API key (or via WANDB_API_KEY)
    #[arg(long, env = "WANDB_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Override API base URL (or via WANDB_BASE_URL)
    #[arg(long, env = "WANDB_BASE_URL", hide_env_values = true, global = true)]
    pub base_url: Option<String>,

    /// Root directory for archived runs (default: ./data)
    #[arg(long, env = "WBACKUP_ARCHIVE_DIR", global = true)]
    pub archive_dir: Option<PathBuf>,

    /// Path to a .env file to load before running commands.
    #[arg(long, env = "WBACKUP_ENV_FILE", hide_env_values = true)]
    pub env_file: Option<PathBuf>,
}

impl BaseArgs {
    pub fn profile_name(&self) -> &str {
        self.profile
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PROFILE)
    }
}

#[derive(Debug, Clone, Args)]
pub struct CLIArgs<T: Args> {
    #[command(flatten)]
    pub base: BaseArgs,

    #[command(flatten)]
    pub args: T,
}
