use std::borrow::Cow;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::http::{ApiClient, Connection};
use crate::remote::{FetchError, RunDescriptor, RunSource};

pub const DEFAULT_HISTORY_SAMPLES: u32 = 500;
const PAGE_SIZE: usize = 50;

const RUNS_QUERY: &str = "query Runs($project: String!, $entity: String!, $cursor: String, $first: Int) {
    project(name: $project, entityName: $entity) {
        runs(first: $first, after: $cursor) {
            edges { node { name displayName state config createdAt } }
            pageInfo { endCursor hasNextPage }
        }
    }
}";

const HISTORY_QUERY: &str = "query RunHistory($project: String!, $entity: String!, $name: String!, $samples: Int) {
    project(name: $project, entityName: $entity) {
        run(name: $name) { history(samples: $samples) }
    }
}";

/// A run as returned by the runs listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunNode {
    /// Unique id within the project (the service calls it `name`).
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing)]
    config: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct WandbRun {
    client: ApiClient,
    project: String,
    samples: u32,
    node: RunNode,
}

impl WandbRun {
    pub fn node(&self) -> &RunNode {
        &self.node
    }
}

#[async_trait]
impl RunDescriptor for WandbRun {
    fn id(&self) -> &str {
        &self.node.name
    }

    async fn config(&self) -> Result<Map<String, Value>, FetchError> {
        parse_run_config(self.node.config.as_ref())
    }

    async fn history(&self) -> Result<Value, FetchError> {
        #[derive(Deserialize)]
        struct Data {
            project: Option<ProjectRun>,
        }
        #[derive(Deserialize)]
        struct ProjectRun {
            run: Option<RunHistory>,
        }
        #[derive(Deserialize)]
        struct RunHistory {
            #[serde(default)]
            history: Vec<Value>,
        }

        let data: Data = self
            .client
            .graphql(
                HISTORY_QUERY,
                json!({
                    "project": self.project,
                    "entity": self.client.entity(),
                    "name": self.node.name,
                    "samples": self.samples,
                }),
            )
            .await?;
        let run = data
            .project
            .and_then(|p| p.run)
            .ok_or_else(|| FetchError::NotFound(format!("run '{}'", self.node.name)))?;
        parse_history(run.history)
    }
}

/// Lists runs through the GraphQL API and fetches their history on demand.
pub struct WandbRunSource {
    client: ApiClient,
    samples: u32,
}

impl WandbRunSource {
    pub fn new(client: ApiClient, samples: u32) -> Self {
        Self { client, samples }
    }
}

#[async_trait]
impl RunSource for WandbRunSource {
    type Run = WandbRun;

    async fn list_runs(&self, project: &str) -> Result<Vec<WandbRun>, FetchError> {
        #[derive(Deserialize)]
        struct Data {
            project: Option<ProjectRuns>,
        }
        #[derive(Deserialize)]
        struct ProjectRuns {
            runs: Connection<RunNode>,
        }

        let mut runs = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let data: Data = self
                .client
                .graphql(
                    RUNS_QUERY,
                    json!({
                        "project": project,
                        "entity": self.client.entity(),
                        "cursor": cursor,
                        "first": PAGE_SIZE,
                    }),
                )
                .await?;
            let page = data
                .project
                .ok_or_else(|| {
                    FetchError::NotFound(format!(
                        "project '{project}' in '{}'",
                        self.client.entity()
                    ))
                })?
                .runs;

            cursor = page.next_cursor();
            runs.extend(page.into_nodes().map(|node| WandbRun {
                client: self.client.clone(),
                project: project.to_string(),
                samples: self.samples,
                node,
            }));
            if cursor.is_none() {
                break;
            }
        }
        Ok(runs)
    }
}

/// Unwrap the service's `{key: {"value": v, "desc": ...}}` config into
/// `{key: v}`. Keys starting with `_` are internal to the service and dropped.
pub fn parse_run_config(raw: Option<&Value>) -> Result<Map<String, Value>, FetchError> {
    let decoded = match raw {
        None | Some(Value::Null) => return Ok(Map::new()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Map::new()),
        Some(Value::String(s)) => {
            serde_json::from_str::<Value>(s).map_err(|e| FetchError::Decode {
                what: "run config",
                reason: e.to_string(),
            })?
        }
        Some(other) => other.clone(),
    };

    let Value::Object(entries) = decoded else {
        return Err(FetchError::Decode {
            what: "run config",
            reason: "expected a JSON object".to_string(),
        });
    };

    Ok(entries
        .into_iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .map(|(key, entry)| match entry {
            Value::Object(mut wrapped) if wrapped.contains_key("value") => {
                (key, wrapped.remove("value").unwrap_or(Value::Null))
            }
            other => (key, other),
        })
        .collect())
}

/// Decode history rows into an array of objects. Rows normally arrive as
/// JSON-encoded strings, one per logged step. Non-finite numbers (`NaN`,
/// `Infinity`, `-Infinity`) are not JSON and are stored as `null`.
pub fn parse_history(rows: Vec<Value>) -> Result<Value, FetchError> {
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| match row {
            Value::String(encoded) => serde_json::from_str::<Value>(&null_non_finite(&encoded))
                .map_err(|e| FetchError::Decode {
                    what: "history row",
                    reason: format!("row {index}: {e}"),
                }),
            other => Ok(other),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

const NON_FINITE: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

/// Replace bare non-finite number tokens with `null`. Text inside string
/// literals is left alone.
fn null_non_finite(encoded: &str) -> Cow<'_, str> {
    if !NON_FINITE.iter().any(|token| encoded.contains(token)) {
        return Cow::Borrowed(encoded);
    }

    let mut out = String::with_capacity(encoded.len());
    let mut rest = encoded;
    let mut in_string = false;
    while let Some(c) = rest.chars().next() {
        if in_string {
            match c {
                '\\' => {
                    let escaped = rest.chars().nth(1).map_or(1, |e| 1 + e.len_utf8());
                    out.push_str(&rest[..escaped]);
                    rest = &rest[escaped..];
                    continue;
                }
                '"' => in_string = false,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(token) = NON_FINITE.iter().find(|token| rest.starts_with(**token)) {
            out.push_str("null");
            rest = &rest[token.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Cow::Owned(out)
}
