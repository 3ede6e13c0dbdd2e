use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::http::{ApiClient, Connection};
use crate::remote::ProjectDescriptor;

const PAGE_SIZE: usize = 100;

const PROJECT_FIELDS: &str = "id name entityName description createdAt";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ProjectDescriptor for Project {
    fn name(&self) -> &str {
        &self.name
    }
}

pub async fn list_projects(client: &ApiClient) -> Result<Vec<Project>> {
    #[derive(Deserialize)]
    struct Data {
        models: Option<Connection<Project>>,
    }

    let query = format!(
        "query Projects($entity: String, $cursor: String, $first: Int) {{
            models(entityName: $entity, after: $cursor, first: $first) {{
                edges {{ node {{ {PROJECT_FIELDS} }} }}
                pageInfo {{ endCursor hasNextPage }}
            }}
        }}"
    );

    let mut projects = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let data: Data = client
            .graphql(
                &query,
                json!({ "entity": client.entity(), "cursor": cursor, "first": PAGE_SIZE }),
            )
            .await
            .with_context(|| format!("failed to list projects of '{}'", client.entity()))?;
        let Some(page) = data.models else {
            break;
        };
        cursor = page.next_cursor();
        projects.extend(page.into_nodes());
        if cursor.is_none() {
            break;
        }
    }
    Ok(projects)
}

pub async fn get_project_by_name(client: &ApiClient, name: &str) -> Result<Option<Project>> {
    #[derive(Deserialize)]
    struct Data {
        project: Option<Project>,
    }

    let query = format!(
        "query Project($name: String!, $entity: String!) {{
            project(name: $name, entityName: $entity) {{ {PROJECT_FIELDS} }}
        }}"
    );
    let data: Data = client
        .graphql(&query, json!({ "name": name, "entity": client.entity() }))
        .await
        .with_context(|| format!("failed to look up project '{name}'"))?;
    Ok(data.project)
}
