use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use std::{
    collections::BTreeMap,
    env, fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::args::BaseArgs;
use crate::ui::{print_command_status, CommandStatus};
use crate::utils::write_atomic;

mod get;
mod list;
mod set;

pub const LOCAL_DIR_NAME: &str = ".wbackup";
const CONFIG_FILE: &str = "config.json";

/// Persistent defaults for the global flags. Every field is optional; unset
/// fields fall through to the next layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub entity: Option<String>,
    pub project: Option<String>,
    pub base_url: Option<String>,
    pub archive_dir: Option<String>,
    /// Keys this version does not know, kept so rewriting the file loses nothing.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub const KNOWN_KEYS: &[&str] = &["entity", "project", "base_url", "archive_dir"];

impl Config {
    fn slot(&self, key: &str) -> Option<&Option<String>> {
        Some(match key {
            "entity" => &self.entity,
            "project" => &self.project,
            "base_url" => &self.base_url,
            "archive_dir" => &self.archive_dir,
            _ => return None,
        })
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        Some(match key {
            "entity" => &mut self.entity,
            "project" => &mut self.project,
            "base_url" => &mut self.base_url,
            "archive_dir" => &mut self.archive_dir,
            _ => return None,
        })
    }

    pub fn get_field(&self, key: &str) -> Option<&str> {
        self.slot(key)?.as_deref()
    }

    /// Returns false for unknown keys.
    pub fn set_field(&mut self, key: &str, value: String) -> bool {
        self.slot_mut(key).map(|slot| *slot = Some(value)).is_some()
    }

    pub fn unset_field(&mut self, key: &str) -> bool {
        self.slot_mut(key).map(|slot| *slot = None).is_some()
    }

    pub fn non_empty_fields(&self) -> Vec<(&str, &str)> {
        KNOWN_KEYS
            .iter()
            .filter_map(|&key| self.get_field(key).map(|v| (key, v)))
            .collect()
    }

    /// `other` wins wherever it has a value.
    fn merge(&self, other: &Config) -> Config {
        let mut merged = self.clone();
        for key in KNOWN_KEYS {
            if let Some(value) = other.get_field(key) {
                merged.set_field(key, value.to_string());
            }
        }
        merged.extra.extend(other.extra.clone());
        merged
    }
}

pub fn global_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("WBACKUP_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("wbackup"));
    }
    dirs::home_dir()
        .map(|path| path.join(".config").join("wbackup"))
        .ok_or_else(|| anyhow!("$HOME not configured."))
}

pub fn global_path() -> Result<PathBuf> {
    Ok(global_config_dir()?.join(CONFIG_FILE))
}

fn read_config(path: &Path) -> Result<Option<Config>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("could not read {}", path.display())),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .with_context(|| format!("could not parse {}", path.display()))
}

/// Load one config file. Missing or unreadable files yield an empty config;
/// problems are reported but never fatal.
pub fn load_file(path: &Path) -> Config {
    let config = match read_config(path) {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            print_command_status(CommandStatus::Warning, &format!("Warning: {e:#}"));
            return Config::default();
        }
    };

    for key in config.extra.keys() {
        print_command_status(
            CommandStatus::Warning,
            &format!("Warning: unknown config key {} in {}", key, path.display()),
        );
    }

    tracing::debug!(path = %path.display(), "loaded config");
    config
}

pub fn load_global() -> Result<Config> {
    Ok(load_file(&global_path()?))
}

/// Global config with the nearest local config layered on top.
pub fn load() -> Result<Config> {
    let global = load_global().unwrap_or_default();
    Ok(match local_path() {
        Some(path) => global.merge(&load_file(&path)),
        None => global,
    })
}

/// Serialize `value` as pretty JSON and move it into place with a rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    write_atomic(path, json.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn save_file(path: &Path, config: &Config) -> Result<()> {
    write_json_atomic(path, config)
}

/// Nearest `.wbackup` directory from the working directory upwards. The
/// search stops at a git root or the home directory.
pub fn find_local_config_dir() -> Option<PathBuf> {
    let home = dirs::home_dir();
    let cwd = env::current_dir().ok()?;

    for dir in cwd.ancestors() {
        let candidate = dir.join(LOCAL_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        if dir.join(".git").exists() || home.as_deref() == Some(dir) {
            break;
        }
    }
    None
}

pub fn local_path() -> Option<PathBuf> {
    find_local_config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Config file written by `config set/unset`. Without a flag the nearest
/// local config is used if there is one, otherwise the global one.
pub fn resolve_write_path(global: bool, local: bool) -> Result<PathBuf> {
    if global {
        return global_path();
    }
    if let Some(path) = local_path() {
        return Ok(path);
    }
    if local {
        return Ok(env::current_dir()?.join(LOCAL_DIR_NAME).join(CONFIG_FILE));
    }
    global_path()
}

// --- saved login profiles ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub api_key: String,
    pub entity: String,
    pub base_url: String,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Credentials {
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

pub fn credentials_path() -> Result<PathBuf> {
    Ok(global_config_dir()?.join("credentials.json"))
}

fn load_credentials(path: &Path) -> Result<Credentials> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Credentials::default()),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

pub fn get_profile(name: &str) -> Result<Option<Profile>> {
    let credentials = load_credentials(&credentials_path()?)?;
    Ok(credentials.profiles.get(name).cloned())
}

pub fn save_profile(name: &str, profile: Profile) -> Result<()> {
    let path = credentials_path()?;
    let mut credentials = load_credentials(&path)?;
    credentials.profiles.insert(name.to_string(), profile);
    write_json_atomic(&path, &credentials)
}

/// Returns whether a profile with that name existed.
pub fn delete_profile(name: &str) -> Result<bool> {
    let path = credentials_path()?;
    let mut credentials = load_credentials(&path)?;
    let removed = credentials.profiles.remove(name).is_some();
    if removed {
        write_json_atomic(&path, &credentials)?;
    }
    Ok(removed)
}

// --- CLI commands ---

#[derive(Debug, Clone, Args)]
pub struct ScopeArgs {
    /// Apply to global config (~/.config/wbackup/config.json)
    #[arg(long, short = 'g', conflicts_with = "local")]
    global: bool,

    /// Apply to local config (.wbackup/config.json)
    #[arg(long, short = 'l')]
    local: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommands>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommands {
    /// List config values
    List {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Show config values grouped by source
        #[arg(long)]
        verbose: bool,
    },
    /// Get a config value
    Get {
        /// Config key (entity, project, base_url, archive_dir)
        key: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Set a config value
    Set {
        /// Config key (entity, project, base_url, archive_dir)
        key: String,
        /// Value to set
        value: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Remove a config value
    Unset {
        /// Config key (entity, project, base_url, archive_dir)
        key: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

fn validate_key(key: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        bail!(
            "Unknown config key: {key}\nValid keys: {}",
            KNOWN_KEYS.join(", ")
        );
    }
    Ok(())
}

pub fn run(base: BaseArgs, args: ConfigArgs) -> Result<()> {
    match args.command {
        None => list::run(base, false, false, false),
        Some(ConfigCommands::List { scope, verbose }) => {
            list::run(base, scope.global, scope.local, verbose)
        }
        Some(ConfigCommands::Get { key, scope }) => {
            validate_key(&key)?;
            get::run(base, &key, scope.global, scope.local)
        }
        Some(ConfigCommands::Set { key, value, scope }) => {
            validate_key(&key)?;
            set::run(&key, &value, scope.global, scope.local)
        }
        Some(ConfigCommands::Unset { key, scope }) => {
            validate_key(&key)?;
            set::unset(&key, scope.global, scope.local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn merge_other_takes_precedence() {
        let base = Config {
            entity: Some("base-entity".into()),
            project: Some("base-proj".into()),
            ..Default::default()
        };
        let other = Config {
            entity: Some("other-entity".into()),
            project: Some("other-proj".into()),
            ..Default::default()
        };
        let merged = base.merge(&other);
        assert_eq!(merged.entity, Some("other-entity".into()));
        assert_eq!(merged.project, Some("other-proj".into()));
    }

    #[test]
    fn merge_partial_fill() {
        let base = Config {
            entity: Some("base-entity".into()),
            archive_dir: Some("/backups".into()),
            ..Default::default()
        };
        let other = Config {
            project: Some("other-proj".into()),
            ..Default::default()
        };
        let merged = base.merge(&other);
        assert_eq!(merged.entity, Some("base-entity".into()));
        assert_eq!(merged.project, Some("other-proj".into()));
        assert_eq!(merged.archive_dir, Some("/backups".into()));
    }

    #[test]
    fn load_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_file(&tmp.path().join("nonexistent.json"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_invalid_json_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("invalid.json");
        fs::write(&path, "not valid json {{{").unwrap();
        assert_eq!(load_file(&path).entity, None);
    }

    #[test]
    fn save_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");

        let original = Config {
            entity: Some("diliadis".into()),
            project: Some("mnist".into()),
            base_url: Some("https://wandb.example.com".into()),
            archive_dir: Some("/srv/backups".into()),
            ..Default::default()
        };

        save_file(&path, &original).unwrap();
        assert_eq!(load_file(&path), original);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn unknown_keys_roundtrip_through_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"entity": "me", "color": "blue", "n": 3}"#).unwrap();

        let config = load_file(&path);
        save_file(&path, &config).unwrap();
        let reloaded = load_file(&path);

        assert_eq!(reloaded.entity, Some("me".into()));
        assert!(reloaded.extra.contains_key("color"));
        assert!(reloaded.extra.contains_key("n"));
    }

    #[test]
    fn save_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("dir").join("config.json");
        save_file(&path, &Config::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn set_and_unset_reject_unknown_keys() {
        let mut config = Config::default();
        assert!(!config.set_field("org", "x".into()));
        assert!(config.set_field("archive_dir", "/tmp/a".into()));
        assert_eq!(config.get_field("archive_dir"), Some("/tmp/a"));
        assert!(config.unset_field("archive_dir"));
        assert_eq!(config.get_field("archive_dir"), None);
    }

    #[test]
    #[serial]
    fn profiles_save_get_delete() {
        let tmp = TempDir::new().unwrap();
        std::env::set_var("WBACKUP_CONFIG_DIR", tmp.path());

        let profile = Profile {
            api_key: "a".repeat(40),
            entity: "diliadis".into(),
            base_url: "https://api.wandb.ai".into(),
            verified_at: Some(Utc::now()),
        };
        save_profile("work", profile.clone()).unwrap();

        assert_eq!(get_profile("work").unwrap(), Some(profile));
        assert_eq!(get_profile("other").unwrap(), None);
        assert!(delete_profile("work").unwrap());
        assert!(!delete_profile("work").unwrap());
        assert_eq!(get_profile("work").unwrap(), None);

        std::env::remove_var("WBACKUP_CONFIG_DIR");
    }
}
