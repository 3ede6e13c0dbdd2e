use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::future::retry_notify;
use backoff::{Error as BackoffError, ExponentialBackoffBuilder};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::session::Session;

const MAX_ATTEMPTS: usize = 5;
const RETRY_BASE_DELAY_MS: u64 = 300;
const MAX_BACKOFF_SECS: u64 = 8;
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("credentials were rejected ({status})")]
    Unauthorized { status: StatusCode },
    #[error("request failed ({status}) after {attempts} attempt(s): {body}")]
    Status {
        status: StatusCode,
        attempts: usize,
        body: String,
    },
    #[error("network error after {attempts} attempt(s): {source}")]
    Network {
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },
    #[error("query failed: {}", .0.join("; "))]
    GraphQl(Vec<String>),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

/// Relay-style connection returned by list queries.
#[derive(Debug, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(deserialize = "T: Deserialize<'de>")
)]
pub struct Connection<T> {
    #[serde(default)]
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
pub struct Edge<T> {
    pub node: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub end_cursor: Option<String>,
    #[serde(default)]
    pub has_next_page: bool,
}

impl<T> Connection<T> {
    /// Cursor for the next page, if there is one.
    pub fn next_cursor(&self) -> Option<String> {
        if self.page_info.has_next_page {
            self.page_info.end_cursor.clone()
        } else {
            None
        }
    }

    pub fn into_nodes(self) -> impl Iterator<Item = T> {
        self.edges.into_iter().map(|edge| edge.node)
    }
}

/// Authenticated handle to the tracking service's GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    graphql_url: String,
    api_key: String,
    entity: String,
    retry_delay: Duration,
}

impl ApiClient {
    pub fn new(session: &Session) -> Result<Self> {
        Self::with_credentials(&session.base_url, &session.api_key, &session.entity)
    }

    pub fn with_credentials(base_url: &str, api_key: &str, entity: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("wbackup/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            graphql_url: format!("{}/graphql", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            entity: entity.to_string(),
            retry_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Run a GraphQL query, retrying server errors, rate limits and network failures.
    pub async fn graphql<T>(&self, query: &str, variables: Value) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Send,
    {
        let body = json!({
            "query": query,
            "variables": variables,
        });
        let attempt_counter = Arc::new(AtomicUsize::new(0));

        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.2)
            .with_max_interval(Duration::from_secs(MAX_BACKOFF_SECS))
            .with_max_elapsed_time(None)
            .build();

        retry_notify(
            backoff,
            || {
                let attempt_counter = Arc::clone(&attempt_counter);
                let body = &body;

                async move {
                    let attempt = attempt_counter.fetch_add(1, Ordering::Relaxed) + 1;
                    let request = self
                        .http
                        .post(&self.graphql_url)
                        .basic_auth("api", Some(&self.api_key))
                        .json(body);

                    let response = match request.send().await {
                        Ok(response) => response,
                        Err(err) if attempt < MAX_ATTEMPTS => {
                            return Err(BackoffError::transient(ApiError::Network {
                                attempts: attempt,
                                source: err,
                            }));
                        }
                        Err(err) => {
                            return Err(BackoffError::permanent(ApiError::Network {
                                attempts: attempt,
                                source: err,
                            }));
                        }
                    };

                    let status = response.status();
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(BackoffError::permanent(ApiError::Unauthorized { status }));
                    }
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        let error = ApiError::Status {
                            status,
                            attempts: attempt,
                            body,
                        };
                        let should_retry =
                            status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                        return if should_retry && attempt < MAX_ATTEMPTS {
                            Err(BackoffError::transient(error))
                        } else {
                            Err(BackoffError::permanent(error))
                        };
                    }

                    let parsed = response
                        .json::<GraphQlResponse<T>>()
                        .await
                        .map_err(|err| BackoffError::permanent(ApiError::Decode(err.to_string())))?;
                    into_data(parsed).map_err(BackoffError::permanent)
                }
            },
            |err, delay| {
                warn!(error = %err, ?delay, "retrying API request");
            },
        )
        .await
    }
}

fn into_data<T>(response: GraphQlResponse<T>) -> Result<T, ApiError> {
    if !response.errors.is_empty() {
        return Err(ApiError::GraphQl(
            response.errors.into_iter().map(|e| e.message).collect(),
        ));
    }
    response
        .data
        .ok_or_else(|| ApiError::GraphQl(vec!["response contained no data".to_string()]))
}
