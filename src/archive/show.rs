use std::fmt::Write as _;

use anyhow::{bail, Result};
use dialoguer::console;

use crate::sync::HISTORY_KEY;
use crate::ui::{fuzzy_select, is_interactive, print_with_pager};
use crate::utils::pluralize;

use super::store::{ArchiveStore, Document};

pub fn run(
    store: &ArchiveStore,
    project: &str,
    run_id: Option<&str>,
    summary_only: bool,
    json: bool,
) -> Result<()> {
    let run_id = match run_id {
        Some(id) => id.to_string(),
        None => {
            if !is_interactive() {
                bail!("run id required. Use: wbackup archive show <run-id>");
            }
            let mut ids = store.list(project)?;
            if ids.is_empty() {
                bail!("the project '{project}' appears to be empty");
            }
            ids.sort();
            let selection = fuzzy_select("Select run", &ids)?;
            ids.swap_remove(selection)
        }
    };

    let document = store.get(project, &run_id)?;

    if json {
        println!("{}", serde_json::to_string(&document)?);
        return Ok(());
    }

    let mut output = String::new();
    writeln!(
        output,
        "Viewing {} {} {}",
        console::style(project).bold(),
        console::style("/").dim().bold(),
        console::style(&run_id).bold()
    )?;
    write_summary(&mut output, &document)?;

    if !summary_only {
        writeln!(output)?;
        writeln!(output, "{}", serde_json::to_string_pretty(&document)?)?;
    }

    print_with_pager(&output)?;
    Ok(())
}

fn write_summary(output: &mut String, document: &Document) -> Result<()> {
    let config_keys: Vec<&str> = document
        .keys()
        .map(String::as_str)
        .filter(|k| *k != HISTORY_KEY)
        .collect();
    writeln!(
        output,
        "{} {} {}",
        console::style("Config:").dim(),
        config_keys.len(),
        pluralize(config_keys.len(), "key", None)
    )?;
    if !config_keys.is_empty() {
        writeln!(
            output,
            "{} {}",
            console::style("Keys:").dim(),
            config_keys.join(", ")
        )?;
    }

    let rows = document
        .get(HISTORY_KEY)
        .and_then(|h| h.as_array())
        .map(Vec::len)
        .unwrap_or(0);
    writeln!(
        output,
        "{} {} {}",
        console::style("History:").dim(),
        rows,
        pluralize(rows, "row", None)
    )?;
    Ok(())
}
