use anyhow::{bail, Result};
use chrono::Utc;
use clap::Args;
use dialoguer::{Input, Password};
use serde_json::json;

use crate::args::{BaseArgs, DEFAULT_BASE_URL};
use crate::config::{self, Profile};
use crate::http::ApiClient;
use crate::session::{self, app_url_for, validate_api_key, SessionError, SessionSource};
use crate::ui::{is_interactive, print_command_status, with_spinner, CommandStatus};
use crate::utils::mask_secret;

#[derive(Debug, Clone, Args)]
pub struct LoginArgs {}

#[derive(Debug, Clone, Args)]
pub struct LogoutArgs {}

#[derive(Debug, Clone, Args)]
pub struct WhoamiArgs {
    /// Show the full API key (default: masked)
    #[arg(long)]
    pub show: bool,
}

pub async fn run_login(base: BaseArgs, _args: LoginArgs) -> Result<()> {
    let profile_name = base.profile_name().to_string();

    let api_key = match base.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => key.to_string(),
        None if is_interactive() => Password::new()
            .with_prompt("Paste your API key (https://wandb.ai/authorize)")
            .interact()?,
        None => bail!("API key required. Pass --api-key or set WANDB_API_KEY"),
    };
    let api_key = match validate_api_key(&api_key) {
        Ok(key) => key.to_string(),
        Err(err) => {
            print_command_status(CommandStatus::Error, &err.to_string());
            return Err(err.into());
        }
    };

    let base_url = base
        .base_url
        .clone()
        .or_else(|| config::load().ok().and_then(|cfg| cfg.base_url))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string();

    let client = ApiClient::with_credentials(&base_url, &api_key, "")?;
    let viewer = match with_spinner("Verifying API key...", session::fetch_viewer(&client)).await {
        Ok(viewer) => viewer,
        Err(err) => return Err(login_failed(err)),
    };

    let entity = match base.entity.clone().filter(|e| !e.is_empty()) {
        Some(entity) => entity,
        None if is_interactive() => Input::<String>::new()
            .with_prompt("Entity (user or team)")
            .default(viewer.entity.clone())
            .interact_text()?,
        None => viewer.entity.clone(),
    };

    if entity != viewer.entity {
        if let Err(err) = with_spinner("Checking entity...", session::verify(&client, &entity)).await
        {
            return Err(login_failed(err));
        }
    }

    config::save_profile(
        &profile_name,
        Profile {
            api_key,
            entity: entity.clone(),
            base_url: base_url.clone(),
            verified_at: Some(Utc::now()),
        },
    )?;

    let user = viewer.username.as_deref().unwrap_or(&viewer.entity);
    print_command_status(
        CommandStatus::Success,
        &format!("Logged in as {user} (entity '{entity}'), saved to profile '{profile_name}'"),
    );
    eprintln!(
        "Your projects: {}/{}",
        app_url_for(&base_url),
        urlencoding::encode(&entity)
    );
    Ok(())
}

fn login_failed(err: SessionError) -> anyhow::Error {
    print_command_status(CommandStatus::Error, "Login failed");
    err.into()
}

pub fn run_logout(base: BaseArgs, _args: LogoutArgs) -> Result<()> {
    let profile_name = base.profile_name();
    if config::delete_profile(profile_name)? {
        print_command_status(
            CommandStatus::Success,
            &format!("Logged out from profile '{profile_name}'"),
        );
    } else {
        print_command_status(
            CommandStatus::Warning,
            &format!("Profile '{profile_name}' not found (already logged out)"),
        );
    }
    Ok(())
}

pub async fn run_whoami(base: BaseArgs, args: WhoamiArgs) -> Result<()> {
    let session = session::resolve(&base).await?;
    let (source, verified_at) = match &session.source {
        SessionSource::Explicit => ("WANDB_API_KEY".to_string(), None),
        SessionSource::Profile(name) => (
            format!("profile '{name}'"),
            config::get_profile(name)?.and_then(|p| p.verified_at),
        ),
    };
    let key = if args.show {
        session.api_key.clone()
    } else {
        mask_secret(&session.api_key)
    };

    if base.json {
        let output = json!({
            "entity": session.entity,
            "base_url": session.base_url,
            "source": source,
            "api_key": key,
            "verified_at": verified_at,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Entity:   {}", session.entity);
    println!("Server:   {}", session.base_url);
    println!("API key:  {key}");
    println!("Source:   {source}");
    match verified_at {
        Some(at) => println!("Verified: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Verified: -"),
    }
    Ok(())
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

    #[tokio::test]
    #[serial]
    async fn logout_removes_only_the_selected_profile() {
        let tmp = TempDir::new().unwrap();
        std::env::set_var("WBACKUP_CONFIG_DIR", tmp.path());
        let profile = Profile {
            api_key: "k".repeat(40),
            entity: "diliadis".into(),
            base_url: DEFAULT_BASE_URL.into(),
            verified_at: None,
        };
        config::save_profile("default", profile.clone()).unwrap();
        config::save_profile("work", profile).unwrap();

        run_logout(base_args(&["--profile", "work"]), LogoutArgs {}).unwrap();

        assert!(config::get_profile("work").unwrap().is_none());
        assert!(config::get_profile("default").unwrap().is_some());
        std::env::remove_var("WBACKUP_CONFIG_DIR");
    }

    #[tokio::test]
    #[serial]
    async fn login_rejects_malformed_key_before_any_request() {
        let tmp = TempDir::new().unwrap();
        std::env::set_var("WBACKUP_CONFIG_DIR", tmp.path());

        let err = run_login(base_args(&["--api-key", "too-short"]), LoginArgs {})
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "API key must be 40 characters long, yours was 9"
        );
        assert!(config::get_profile("default").unwrap().is_none());
        std::env::remove_var("WBACKUP_CONFIG_DIR");
    }
}
