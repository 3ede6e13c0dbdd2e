use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub fn bootstrap_from_args(args: &[OsString]) -> Result<()> {
    let explicit_env_file = extract_env_file_arg(args)
        .or_else(|| std::env::var_os("WBACKUP_ENV_FILE").map(PathBuf::from));
    load_env(explicit_env_file.as_ref())
}

pub fn load_env(explicit_env_file: Option<&PathBuf>) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let loaded = collect_env_values(&cwd, explicit_env_file)?;

    let mut envs: Vec<(String, String)> = loaded.into_iter().collect();
    envs.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, value) in envs {
        std::env::set_var(key, value);
    }
    Ok(())
}

/// Values from env files that are not already set in the process environment.
fn collect_env_values(
    cwd: &Path,
    explicit_env_file: Option<&PathBuf>,
) -> Result<HashMap<String, String>> {
    let mut loaded = HashMap::new();

    for env_file in resolve_env_files(cwd, explicit_env_file) {
        if !env_file.exists() && explicit_env_file.is_none() {
            continue;
        }

        let parsed = dotenvy::from_path_iter(&env_file)
            .with_context(|| format!("failed to read env file {}", env_file.display()))?;
        for item in parsed {
            let (key, value) =
                item.with_context(|| format!("failed to parse env file {}", env_file.display()))?;
            if std::env::var_os(&key).is_some() {
                continue;
            }
            // later files override earlier ones
            loaded.insert(key, value);
        }
    }

    Ok(loaded)
}

fn extract_env_file_arg(args: &[OsString]) -> Option<PathBuf> {
    let mut explicit = None;
    let mut idx = 1usize;
    while idx < args.len() {
        let Some(arg) = args[idx].to_str() else {
            idx += 1;
            continue;
        };

        if arg == "--" {
            break;
        }

        if arg == "--env-file" {
            if let Some(next) = args.get(idx + 1) {
                explicit = Some(PathBuf::from(next));
            }
            idx += 2;
            continue;
        }

        if let Some(value) = arg.strip_prefix("--env-file=") {
            explicit = Some(PathBuf::from(value));
        }

        idx += 1;
    }
    explicit
}

fn resolve_env_files(cwd: &Path, explicit_env_file: Option<&PathBuf>) -> Vec<PathBuf> {
    if let Some(path) = explicit_env_file {
        let full_path = if path.is_absolute() {
            path.clone()
        } else {
            cwd.join(path)
        };
        return vec![full_path];
    }

    vec![cwd.join(".env"), cwd.join(".env.local")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn env_file_flag_with_separate_value() {
        let args = os_args(&["wbackup", "backup", "--env-file", "custom.env"]);
        assert_eq!(
            extract_env_file_arg(&args),
            Some(PathBuf::from("custom.env"))
        );
    }

    #[test]
    fn env_file_flag_with_equals() {
        let args = os_args(&["wbackup", "--env-file=prod.env", "runs", "list"]);
        assert_eq!(extract_env_file_arg(&args), Some(PathBuf::from("prod.env")));
    }

    #[test]
    fn env_file_flag_after_double_dash_is_ignored() {
        let args = os_args(&["wbackup", "backup", "--", "--env-file", "x.env"]);
        assert_eq!(extract_env_file_arg(&args), None);
    }

    #[test]
    fn default_env_files_are_dotenv_then_local() {
        let cwd = Path::new("/work");
        let files = resolve_env_files(cwd, None);
        assert_eq!(
            files,
            vec![PathBuf::from("/work/.env"), PathBuf::from("/work/.env.local")]
        );
    }

    #[test]
    fn relative_explicit_env_file_resolves_against_cwd() {
        let cwd = Path::new("/work");
        let files = resolve_env_files(cwd, Some(&PathBuf::from("conf/backup.env")));
        assert_eq!(files, vec![PathBuf::from("/work/conf/backup.env")]);
    }

    #[test]
    fn local_file_overrides_dotenv() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(".env"),
            "WBACKUP_TEST_ENV_ONLY_A=from-env\nWBACKUP_TEST_ENV_SHARED=env\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join(".env.local"),
            "WBACKUP_TEST_ENV_SHARED=local\n",
        )
        .unwrap();

        let loaded = collect_env_values(tmp.path(), None).unwrap();
        assert_eq!(loaded["WBACKUP_TEST_ENV_ONLY_A"], "from-env");
        assert_eq!(loaded["WBACKUP_TEST_ENV_SHARED"], "local");
    }

    #[test]
    fn missing_explicit_env_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.env");
        assert!(collect_env_values(tmp.path(), Some(&missing)).is_err());
    }
}
