use std::fmt::Write as _;

use anyhow::Result;
use dialoguer::console;

use crate::archive::store::ArchiveStore;
use crate::http::ApiClient;
use crate::remote::ProjectDescriptor;
use crate::ui::{
    apply_column_padding, header, print_with_pager, styled_table, truncate, with_spinner,
};
use crate::utils::pluralize;

use super::api;

pub async fn run(client: &ApiClient, store: &ArchiveStore, json: bool) -> Result<()> {
    let projects = with_spinner("Loading projects...", api::list_projects(client)).await?;

    if json {
        println!("{}", serde_json::to_string(&projects)?);
        return Ok(());
    }

    let mut output = String::new();
    writeln!(
        output,
        "{} {} found in {}\n",
        console::style(projects.len()),
        pluralize(projects.len(), "project", None),
        console::style(client.entity()).bold()
    )?;

    let mut table = styled_table();
    table.set_header(vec![
        header("Name"),
        header("Description"),
        header("Created"),
        header("Backed up"),
    ]);
    apply_column_padding(&mut table, (0, 6));

    for project in &projects {
        let desc = project
            .description
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| truncate(s, 50))
            .unwrap_or_else(|| "-".to_string());
        let created = project
            .created_at
            .as_deref()
            .map(|c| c.split('T').next().unwrap_or(c).to_string())
            .unwrap_or_else(|| "-".to_string());
        let backed_up = backed_up_runs(store, project)
            .map(|count| count.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            project.name(),
            desc.as_str(),
            created.as_str(),
            backed_up.as_str(),
        ]);
    }

    write!(output, "{table}")?;
    print_with_pager(&output)?;
    Ok(())
}

/// Archived run count, or `None` when the project was never backed up.
fn backed_up_runs(store: &ArchiveStore, project: &impl ProjectDescriptor) -> Option<usize> {
    if !store.project_has_backup(project.name()) {
        return None;
    }
    store.list(project.name()).ok().map(|ids| ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tempfile::TempDir;

    use crate::projects::api::Project;

    fn project(name: &str) -> Project {
        Project {
            id: format!("id-{name}"),
            name: name.to_string(),
            entity_name: None,
            description: None,
            created_at: None,
        }
    }

    #[test]
    fn backed_up_runs_counts_archived_documents() {
        let tmp = TempDir::new().unwrap();
        let store = ArchiveStore::new(tmp.path());
        store.put("mnist", "a", &Map::new()).unwrap();
        store.put("mnist", "b", &Map::new()).unwrap();
        store.ensure_project_dir("empty").unwrap();

        assert_eq!(backed_up_runs(&store, &project("mnist")), Some(2));
        assert_eq!(backed_up_runs(&store, &project("empty")), Some(0));
        assert_eq!(backed_up_runs(&store, &project("never")), None);
    }
}
