use std::fmt::Write as _;

use anyhow::{bail, Context, Result};
use clap::Args;
use dialoguer::console;
use indicatif::ProgressBar;

use crate::archive;
use crate::args::BaseArgs;
use crate::project_command::resolve_project_command_context;
use crate::remote::RunSource;
use crate::runs::api::{WandbRunSource, DEFAULT_HISTORY_SAMPLES};
use crate::session::project_url;
use crate::sync::{self, SilentObserver, SyncFailure, SyncObserver, SyncReport};
use crate::ui::{
    apply_column_padding, header, print_command_status, progress_bar, styled_table, truncate,
    with_spinner, CommandStatus,
};
use crate::utils::pluralize;

#[derive(Debug, Clone, Args)]
pub struct BackupArgs {
    /// Re-download runs that are already backed up
    #[arg(long, short = 'o')]
    pub overwrite: bool,

    /// Number of history rows to request per run
    #[arg(long, default_value_t = DEFAULT_HISTORY_SAMPLES, value_parser = clap::value_parser!(u32).range(1..))]
    pub samples: u32,
}

struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn note(&self, message: String) {
        if self.bar.is_hidden() {
            eprintln!("{message}");
        } else {
            self.bar.println(message);
        }
    }
}

impl SyncObserver for ProgressObserver {
    fn started(&mut self, project: &str, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message(format!("Backing up {project}"));
    }

    fn skipped(&mut self, _run_id: &str) {
        self.bar.inc(1);
    }

    fn overwriting(&mut self, run_id: &str) {
        self.note(format!(
            "{} Overwriting run {run_id}",
            console::style("!").yellow()
        ));
    }

    fn written(&mut self, run_id: &str, _overwrote: bool) {
        self.bar.set_message(run_id.to_string());
        self.bar.inc(1);
    }

    fn failed(&mut self, run_id: &str, failure: &SyncFailure) {
        self.note(format!("{} {run_id}: {failure}", console::style("✗").red()));
        self.bar.inc(1);
    }

    fn finished(&mut self, _report: &SyncReport) {
        self.bar.finish_and_clear();
    }
}

pub async fn run(base: BaseArgs, args: BackupArgs) -> Result<()> {
    let ctx = resolve_project_command_context(&base).await?;
    let store = archive::resolve_store(&base)?;
    let source = WandbRunSource::new(ctx.client, args.samples);
    let project = ctx.project;

    let runs = with_spinner("Loading runs...", source.list_runs(&project))
        .await
        .with_context(|| format!("failed to list runs of '{project}'"))?;

    let report = if base.json {
        sync::sync(&store, &project, &runs, args.overwrite, &mut SilentObserver).await?
    } else {
        eprintln!(
            "There {} {} {} in project {}",
            if runs.len() == 1 { "is" } else { "are" },
            runs.len(),
            pluralize(runs.len(), "run", None),
            console::style(&project).bold()
        );
        eprintln!(
            "{}",
            console::style(project_url(&ctx.session.app_url, &ctx.session.entity, &project)).dim()
        );
        let mut observer = ProgressObserver {
            bar: progress_bar(runs.len() as u64),
        };
        sync::sync(&store, &project, &runs, args.overwrite, &mut observer).await?
    };

    if base.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_summary(&report, &store.root().join(&project).display().to_string())?;
    }

    if report.is_systemic_failure() {
        bail!(
            "no runs could be backed up; last error: {}",
            report.last_error().unwrap_or("unknown")
        );
    }
    if !report.is_complete() {
        bail!(
            "{} of {} {} failed to back up",
            report.failed,
            report.total,
            pluralize(report.total, "run", None)
        );
    }
    Ok(())
}

fn print_summary(report: &SyncReport, dir: &str) -> Result<()> {
    let mut parts = vec![format!("{} written", report.written)];
    if report.overwritten > 0 {
        parts.push(format!("{} overwritten", report.overwritten));
    }
    parts.push(format!("{} skipped", report.skipped));
    if report.failed > 0 {
        parts.push(format!("{} failed", report.failed));
    }

    let status = if report.is_complete() {
        CommandStatus::Success
    } else {
        CommandStatus::Error
    };
    print_command_status(status, &format!("{} ({dir})", parts.join(", ")));

    if report.failed == 0 {
        return Ok(());
    }

    let mut output = String::new();
    let mut table = styled_table();
    table.set_header(vec![header("Run"), header("Error")]);
    apply_column_padding(&mut table, (0, 6));
    for (run_id, error) in report.failures() {
        table.add_row(vec![run_id.to_string(), truncate(error, 100)]);
    }
    write!(output, "{table}")?;
    eprintln!("\n{output}");
    Ok(())
}
