use std::fmt::Write as _;

use anyhow::Result;
use dialoguer::console;
use serde::Serialize;

use crate::ui::{apply_column_padding, header, print_command_status, print_with_pager, styled_table, CommandStatus};
use crate::utils::pluralize;

use super::store::ArchiveStore;

#[derive(Debug, Serialize)]
struct ProjectSummary {
    name: String,
    runs: usize,
}

fn summarize(store: &ArchiveStore) -> Result<Vec<ProjectSummary>> {
    store
        .list_projects()?
        .into_iter()
        .map(|name| {
            let runs = store.list(&name)?.len();
            Ok::<_, anyhow::Error>(ProjectSummary { name, runs })
        })
        .collect()
}

pub fn projects(store: &ArchiveStore, json: bool) -> Result<()> {
    let projects = summarize(store)?;

    if json {
        println!("{}", serde_json::to_string(&projects)?);
        return Ok(());
    }

    if projects.is_empty() {
        print_command_status(
            CommandStatus::Warning,
            &format!("No backed up projects in {}", store.root().display()),
        );
        return Ok(());
    }

    let mut output = String::new();
    writeln!(
        output,
        "{} {} backed up in {}\n",
        console::style(projects.len()),
        pluralize(projects.len(), "project", None),
        console::style(store.root().display()).bold()
    )?;

    let mut table = styled_table();
    table.set_header(vec![header("Project"), header("Runs")]);
    apply_column_padding(&mut table, (0, 6));
    for project in &projects {
        table.add_row(vec![project.name.clone(), project.runs.to_string()]);
    }

    write!(output, "{table}")?;
    print_with_pager(&output)?;
    Ok(())
}

pub fn runs(store: &ArchiveStore, project: &str, json: bool) -> Result<()> {
    let mut ids = store.list(project)?;
    ids.sort();

    if json {
        println!("{}", serde_json::to_string(&ids)?);
        return Ok(());
    }

    if !store.project_has_backup(project) {
        print_command_status(
            CommandStatus::Warning,
            &format!("Project '{project}' has not been backed up yet"),
        );
        return Ok(());
    }
    if ids.is_empty() {
        print_command_status(
            CommandStatus::Warning,
            &format!("The project '{project}' appears to be empty"),
        );
        return Ok(());
    }

    let mut output = String::new();
    writeln!(
        output,
        "{} {} backed up for {}\n",
        console::style(ids.len()),
        pluralize(ids.len(), "run", None),
        console::style(project).bold()
    )?;

    let mut table = styled_table();
    table.set_header(vec![header("Run"), header("Path")]);
    apply_column_padding(&mut table, (0, 6));
    for id in &ids {
        let path = store.run_path(project, id)?;
        table.add_row(vec![id.clone(), path.display().to_string()]);
    }

    write!(output, "{table}")?;
    print_with_pager(&output)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ArchiveStatus {
    root: String,
    exists: bool,
    projects: Vec<ProjectSummary>,
    total_runs: usize,
}

pub fn status(store: &ArchiveStore, json: bool) -> Result<()> {
    let projects = summarize(store)?;
    let status = ArchiveStatus {
        root: store.root().display().to_string(),
        exists: store.root().is_dir(),
        total_runs: projects.iter().map(|p| p.runs).sum(),
        projects,
    };

    if json {
        println!("{}", serde_json::to_string(&status)?);
        return Ok(());
    }

    println!("{} {}", console::style("Archive:").dim(), status.root);
    if !status.exists {
        println!("{} not created yet", console::style("State:").dim());
        return Ok(());
    }
    println!(
        "{} {} {}, {} {}",
        console::style("Contents:").dim(),
        status.projects.len(),
        pluralize(status.projects.len(), "project", None),
        status.total_runs,
        pluralize(status.total_runs, "run", None)
    );
    Ok(())
}
