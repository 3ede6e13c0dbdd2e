use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const ISOLATED_VARS: &[&str] = &[
    "WANDB_API_KEY",
    "WANDB_PROJECT",
    "WANDB_ENTITY",
    "WANDB_BASE_URL",
    "WBACKUP_ARCHIVE_DIR",
    "WBACKUP_PROFILE",
    "WBACKUP_ENV_FILE",
];

/// Binary running in an empty working dir with its own config dir.
fn wbackup(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("wbackup").unwrap();
    for var in ISOLATED_VARS {
        cmd.env_remove(var);
    }
    cmd.env("WBACKUP_CONFIG_DIR", home.join("config"))
        .env("NO_COLOR", "1")
        .current_dir(home)
        .write_stdin("");
    cmd
}

fn seed_archive(root: &Path) {
    let project = root.join("mnist");
    fs::create_dir_all(&project).unwrap();
    fs::write(
        project.join("a1.json"),
        r#"{"lr": 0.01, "history": [{"_step": 0, "loss": 2.0}]}"#,
    )
    .unwrap();
    fs::write(project.join("b2.json"), r#"{"lr": 0.1, "history": []}"#).unwrap();
    fs::write(project.join("c3.tmp"), "{").unwrap();
    fs::create_dir_all(root.join("empty")).unwrap();
}

#[test]
fn version_flag_names_the_binary() {
    let home = TempDir::new().unwrap();
    wbackup(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("wbackup "));
}

#[test]
fn archive_list_ignores_temporary_files() {
    let home = TempDir::new().unwrap();
    let archive = home.path().join("backups");
    seed_archive(&archive);

    wbackup(home.path())
        .args(["archive", "list", "--json", "-p", "mnist", "--archive-dir"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::diff("[\"a1\",\"b2\"]\n"));
}

#[test]
fn archive_projects_counts_runs() {
    let home = TempDir::new().unwrap();
    let archive = home.path().join("backups");
    seed_archive(&archive);

    wbackup(home.path())
        .args(["archive", "projects", "--json", "--archive-dir"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::diff(
            "[{\"name\":\"empty\",\"runs\":0},{\"name\":\"mnist\",\"runs\":2}]\n",
        ));
}

#[test]
fn archive_show_prints_the_document() {
    let home = TempDir::new().unwrap();
    let archive = home.path().join("backups");
    seed_archive(&archive);

    wbackup(home.path())
        .args(["archive", "show", "a1", "--json", "-p", "mnist", "--archive-dir"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"lr\":0.01"))
        .stdout(predicate::str::contains("\"loss\":2.0"));
}

#[test]
fn archive_show_unknown_run_fails() {
    let home = TempDir::new().unwrap();
    let archive = home.path().join("backups");
    seed_archive(&archive);

    wbackup(home.path())
        .args(["archive", "show", "zz9", "-p", "mnist", "--archive-dir"])
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "no archived run 'zz9' in project 'mnist'",
        ));
}

#[test]
fn archive_show_reports_corrupt_documents() {
    let home = TempDir::new().unwrap();
    let archive = home.path().join("backups");
    seed_archive(&archive);
    fs::write(archive.join("mnist").join("bad.json"), "{\"lr\": ").unwrap();

    wbackup(home.path())
        .args(["archive", "show", "bad", "-p", "mnist", "--archive-dir"])
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid JSON document"));
}

#[test]
fn archive_list_without_project_fails_when_not_interactive() {
    let home = TempDir::new().unwrap();
    let archive = home.path().join("backups");
    seed_archive(&archive);

    wbackup(home.path())
        .args(["archive", "list", "--archive-dir"])
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--project required"));
}

#[test]
fn archive_dir_comes_from_config() {
    let home = TempDir::new().unwrap();
    let archive = home.path().join("backups");
    seed_archive(&archive);

    wbackup(home.path())
        .args(["config", "set", "archive_dir", "--global"])
        .arg(&archive)
        .assert()
        .success();

    wbackup(home.path())
        .args(["archive", "list", "--json", "-p", "mnist"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[\"a1\",\"b2\"]\n"));
}

#[test]
fn config_set_then_get() {
    let home = TempDir::new().unwrap();

    wbackup(home.path())
        .args(["config", "set", "project", "mnist", "--global"])
        .assert()
        .success();

    wbackup(home.path())
        .args(["config", "get", "project", "--global"])
        .assert()
        .success()
        .stdout(predicate::str::diff("mnist\n"));
}

#[test]
fn config_get_unset_key_exits_non_zero() {
    let home = TempDir::new().unwrap();
    wbackup(home.path())
        .args(["config", "get", "entity", "--global"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn config_rejects_unknown_keys() {
    let home = TempDir::new().unwrap();
    wbackup(home.path())
        .args(["config", "set", "org", "acme"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown config key: org"));
}

#[test]
fn backup_without_credentials_asks_to_log_in() {
    let home = TempDir::new().unwrap();
    wbackup(home.path())
        .args(["backup", "-p", "mnist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not logged in"));
    assert!(!home.path().join("data").exists());
}

#[test]
fn login_rejects_short_api_key() {
    let home = TempDir::new().unwrap();
    wbackup(home.path())
        .args(["login", "--api-key", "abcde"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "API key must be 40 characters long, yours was 5",
        ));
}

#[test]
fn logout_without_profile_is_not_an_error() {
    let home = TempDir::new().unwrap();
    wbackup(home.path())
        .arg("logout")
        .assert()
        .success()
        .stderr(predicate::str::contains("already logged out"));
}
