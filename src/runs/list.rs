use std::fmt::Write as _;

use anyhow::Result;
use dialoguer::console;

use crate::archive::store::ArchiveStore;
use crate::remote::{RunDescriptor, RunSource};
use crate::ui::{apply_column_padding, header, print_with_pager, styled_table, truncate, with_spinner};
use crate::utils::pluralize;

use super::api::WandbRunSource;

pub async fn run(
    source: &WandbRunSource,
    store: &ArchiveStore,
    entity: &str,
    project: &str,
    json: bool,
) -> Result<()> {
    let runs = with_spinner("Loading runs...", source.list_runs(project)).await?;

    if json {
        let nodes: Vec<_> = runs
            .iter()
            .map(|run| {
                let mut value = serde_json::to_value(run.node())?;
                value["backedUp"] = store.exists(project, run.id()).into();
                Ok::<_, serde_json::Error>(value)
            })
            .collect::<Result<_, _>>()?;
        println!("{}", serde_json::to_string(&nodes)?);
        return Ok(());
    }

    let mut output = String::new();
    let count = format!("{} {}", runs.len(), pluralize(runs.len(), "run", None));
    writeln!(
        output,
        "{} found in {} {} {}\n",
        console::style(count),
        console::style(entity).bold(),
        console::style("/").dim().bold(),
        console::style(project).bold()
    )?;

    let mut table = styled_table();
    table.set_header(vec![
        header("Id"),
        header("Name"),
        header("State"),
        header("Created"),
        header("Backed up"),
    ]);
    apply_column_padding(&mut table, (0, 6));

    for run in &runs {
        let node = run.node();
        let name = node
            .display_name
            .as_deref()
            .map(|n| truncate(n, 40))
            .unwrap_or_else(|| "-".to_string());
        let state = node.state.as_deref().unwrap_or("-");
        let created = node
            .created_at
            .as_deref()
            .map(|c| c.split('T').next().unwrap_or(c))
            .unwrap_or("-");
        let backed_up = if store.exists(project, run.id()) {
            "yes"
        } else {
            "no"
        };
        table.add_row(vec![run.id(), name.as_str(), state, created, backed_up]);
    }

    write!(output, "{table}")?;
    print_with_pager(&output)?;
    Ok(())
}
