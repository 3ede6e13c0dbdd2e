use anyhow::Result;
use serde::Deserialize;
use serde_json::json;

use crate::args::{BaseArgs, DEFAULT_APP_URL, DEFAULT_BASE_URL};
use crate::config;
use crate::http::{ApiClient, ApiError};

pub const API_KEY_LEN: usize = 40;

/// Resolved credentials for API calls. Built once per command and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Session {
    pub api_key: String,
    pub entity: String,
    pub base_url: String,
    pub app_url: String,
    pub source: SessionSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSource {
    /// --api-key or WANDB_API_KEY
    Explicit,
    /// Saved profile in the credentials file
    Profile(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("API key must be 40 characters long, yours was {len}")]
    MalformedKey { len: usize },
    #[error("API key or entity are wrong: the service rejected the credentials")]
    AuthenticationFailure,
    #[error("entity '{0}' does not exist or is not visible with this API key")]
    UnknownEntity(String),
    #[error("not logged in (profile '{profile}'). Run `wbackup login{hint}` or set WANDB_API_KEY")]
    NotLoggedIn { profile: String, hint: String },
    #[error("could not verify credentials: {0}")]
    Request(#[source] ApiError),
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized { .. } => SessionError::AuthenticationFailure,
            other => SessionError::Request(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Viewer {
    #[serde(default)]
    pub username: Option<String>,
    pub entity: String,
}

/// Check the shape of an API key. Keys for self-hosted servers carry a
/// `<host>-` prefix; only the part after the last dash is the key proper.
pub fn validate_api_key(key: &str) -> Result<&str, SessionError> {
    let key = key.trim();
    let secret = key.rsplit('-').next().unwrap_or(key);
    if secret.len() != API_KEY_LEN {
        return Err(SessionError::MalformedKey { len: key.len() });
    }
    Ok(key)
}

pub fn app_url_for(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    if base_url == DEFAULT_BASE_URL {
        return DEFAULT_APP_URL.to_string();
    }
    base_url.replace("://api.", "://")
}

/// Project page in the web app.
pub fn project_url(app_url: &str, entity: &str, project: &str) -> String {
    format!(
        "{}/{}/{}",
        app_url.trim_end_matches('/'),
        urlencoding::encode(entity),
        urlencoding::encode(project)
    )
}

/// Ask the service who owns the key. Fails with `AuthenticationFailure` when it is rejected.
pub async fn fetch_viewer(client: &ApiClient) -> Result<Viewer, SessionError> {
    #[derive(Deserialize)]
    struct Data {
        viewer: Option<Viewer>,
    }

    let data: Data = client
        .graphql("query Viewer { viewer { username entity } }", json!({}))
        .await?;
    data.viewer.ok_or(SessionError::AuthenticationFailure)
}

/// Verify that the key is accepted and, when it differs from the key owner's
/// default entity, that `entity` is reachable with it.
pub async fn verify(client: &ApiClient, entity: &str) -> Result<Viewer, SessionError> {
    #[derive(Deserialize)]
    struct Data {
        entity: Option<serde_json::Value>,
    }

    let viewer = fetch_viewer(client).await?;
    if entity.is_empty() || entity == viewer.entity {
        return Ok(viewer);
    }

    let data: Data = client
        .graphql(
            "query Entity($name: String!) { entity(name: $name) { id } }",
            json!({ "name": entity }),
        )
        .await?;
    match data.entity {
        Some(_) => Ok(viewer),
        None => Err(SessionError::UnknownEntity(entity.to_string())),
    }
}

pub async fn resolve(base: &BaseArgs) -> Result<Session> {
    let cfg = config::load().unwrap_or_default();

    // Priority 1: explicit API key (--api-key or WANDB_API_KEY)
    if let Some(api_key) = base.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        let api_key = validate_api_key(api_key)?.to_string();
        let base_url = base
            .base_url
            .clone()
            .or_else(|| cfg.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let entity = match base.entity.clone().or_else(|| cfg.entity.clone()) {
            Some(entity) => entity,
            None => {
                let client = ApiClient::with_credentials(&base_url, &api_key, "")?;
                fetch_viewer(&client).await?.entity
            }
        };

        return Ok(Session {
            app_url: app_url_for(&base_url),
            api_key,
            entity,
            base_url,
            source: SessionSource::Explicit,
        });
    }

    // Priority 2: saved profile
    let profile_name = base.profile_name();
    if let Some(profile) = config::get_profile(profile_name)? {
        let base_url = base.base_url.clone().unwrap_or(profile.base_url);
        let entity = base
            .entity
            .clone()
            .or_else(|| cfg.entity.clone())
            .unwrap_or(profile.entity);

        return Ok(Session {
            app_url: app_url_for(&base_url),
            api_key: profile.api_key,
            entity,
            base_url,
            source: SessionSource::Profile(profile_name.to_string()),
        });
    }

    Err(not_logged_in(profile_name).into())
}

fn not_logged_in(profile: &str) -> SessionError {
    let hint = if profile != crate::args::DEFAULT_PROFILE {
        format!(" --profile {profile}")
    } else {
        String::new()
    };
    SessionError::NotLoggedIn {
        profile: profile.to_string(),
        hint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_of_40_chars_is_accepted() {
        let key = "0123456789abcdef0123456789abcdef01234567";
        assert_eq!(validate_api_key(key).unwrap(), key);
    }

    #[test]
    fn api_key_is_trimmed() {
        let key = format!("  {}\n", "a".repeat(40));
        assert_eq!(validate_api_key(&key).unwrap(), "a".repeat(40));
    }

    #[test]
    fn short_api_key_reports_length() {
        let err = validate_api_key("abc123").unwrap_err();
        assert!(matches!(err, SessionError::MalformedKey { len: 6 }));
        assert_eq!(
            err.to_string(),
            "API key must be 40 characters long, yours was 6"
        );
    }

    #[test]
    fn prefixed_api_key_checks_the_suffix() {
        let key = format!("local-{}", "b".repeat(40));
        assert!(validate_api_key(&key).is_ok());
        let bad = format!("local-{}", "b".repeat(39));
        assert!(validate_api_key(&bad).is_err());
    }

    #[test]
    fn app_url_for_default_cloud() {
        assert_eq!(app_url_for("https://api.wandb.ai/"), "https://wandb.ai");
    }

    #[test]
    fn app_url_for_self_hosted() {
        assert_eq!(
            app_url_for("https://api.wandb.example.com"),
            "https://wandb.example.com"
        );
        assert_eq!(
            app_url_for("http://localhost:8080"),
            "http://localhost:8080"
        );
    }

    #[test]
    fn project_url_encodes_segments() {
        assert_eq!(
            project_url("https://wandb.ai", "my team", "mnist"),
            "https://wandb.ai/my%20team/mnist"
        );
    }

    #[test]
    fn unauthorized_maps_to_authentication_failure() {
        let err: SessionError = ApiError::Unauthorized {
            status: reqwest::StatusCode::UNAUTHORIZED,
        }
        .into();
        assert!(matches!(err, SessionError::AuthenticationFailure));

        let err: SessionError = ApiError::Decode("bad".into()).into();
        assert!(matches!(err, SessionError::Request(_)));
    }

    #[test]
    fn not_logged_in_hints_at_profile() {
        assert_eq!(
            not_logged_in("default").to_string(),
            "not logged in (profile 'default'). Run `wbackup login` or set WANDB_API_KEY"
        );
        assert!(not_logged_in("work")
            .to_string()
            .contains("wbackup login --profile work"));
    }
}
