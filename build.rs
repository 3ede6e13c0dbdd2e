use std::env;
use std::process::Command;

const VERSION_ENV: &str = "WBACKUP_VERSION_STRING";

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Release builds set the version explicitly; local builds get `<pkg>-dev[.<sha>]`.
fn version() -> String {
    if let Some(explicit) = env::var(VERSION_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        return explicit;
    }
    let pkg_version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    match git(&["rev-parse", "--short=12", "HEAD"]) {
        Some(sha) => format!("{pkg_version}-dev.{sha}"),
        None => format!("{pkg_version}-dev"),
    }
}

fn main() {
    println!("cargo:rustc-env={VERSION_ENV}={}", version());
    println!("cargo:rerun-if-env-changed={VERSION_ENV}");
    let head = git(&["rev-parse", "--git-path", "HEAD"]).unwrap_or_else(|| ".git/HEAD".to_string());
    println!("cargo:rerun-if-changed={head}");
}
