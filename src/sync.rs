//! Incremental backup of a project's runs into the archive store.
//!
//! Runs are processed one at a time in listing order. A run whose document
//! already exists is skipped unless `overwrite` is set; skipped runs are
//! never fetched. A failure on one run is recorded and the next run is
//! attempted, so an interrupted or partially failing backup can simply be
//! re-run.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::archive::store::{ArchiveError, ArchiveStore, Document};
use crate::remote::{FetchError, RunDescriptor};

pub const HISTORY_KEY: &str = "history";

/// Why a single run could not be backed up.
#[derive(Debug, thiserror::Error)]
pub enum SyncFailure {
    #[error("fetching {what} failed: {source}")]
    RemoteFetch {
        what: &'static str,
        #[source]
        source: FetchError,
    },
    #[error("run data could not be serialized: {0}")]
    Serialization(String),
    #[error("writing the archive failed: {0}")]
    Write(#[source] ArchiveError),
}

impl SyncFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncFailure::RemoteFetch { .. } => "remote_fetch",
            SyncFailure::Serialization(_) => "serialization",
            SyncFailure::Write(_) => "write",
        }
    }

    fn from_fetch(what: &'static str, err: FetchError) -> Self {
        match err {
            FetchError::Decode { what, reason } => {
                SyncFailure::Serialization(format!("{what}: {reason}"))
            }
            source => SyncFailure::RemoteFetch { what, source },
        }
    }
}

impl From<ArchiveError> for SyncFailure {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Serialize { source, .. } => SyncFailure::Serialization(source.to_string()),
            other => SyncFailure::Write(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Already archived and overwrite was off.
    Skipped,
    Written { overwrote: bool },
    Failed { kind: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub run_id: String,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub project: String,
    pub total: usize,
    pub skipped: usize,
    pub written: usize,
    /// Subset of `written` that replaced an existing document.
    pub overwritten: usize,
    pub failed: usize,
    pub runs: Vec<RunResult>,
}

impl SyncReport {
    fn new(project: &str, total: usize) -> Self {
        Self {
            project: project.to_string(),
            total,
            ..Default::default()
        }
    }

    fn record(&mut self, run_id: &str, outcome: RunOutcome) {
        match &outcome {
            RunOutcome::Skipped => self.skipped += 1,
            RunOutcome::Written { overwrote } => {
                self.written += 1;
                if *overwrote {
                    self.overwritten += 1;
                }
            }
            RunOutcome::Failed { .. } => self.failed += 1,
        }
        self.runs.push(RunResult {
            run_id: run_id.to_string(),
            outcome,
        });
    }

    /// Runs that were fetched (or attempted), i.e. not skipped.
    pub fn attempted(&self) -> usize {
        self.total - self.skipped
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Every attempted run failed, e.g. the disk is full or the key was revoked mid-run.
    pub fn is_systemic_failure(&self) -> bool {
        self.failed > 0 && self.failed == self.attempted()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.runs.iter().filter_map(|r| match &r.outcome {
            RunOutcome::Failed { error, .. } => Some((r.run_id.as_str(), error.as_str())),
            _ => None,
        })
    }

    pub fn last_error(&self) -> Option<&str> {
        self.failures().last().map(|(_, error)| error)
    }
}

/// Receives progress from [`sync`]. All callbacks default to no-ops.
pub trait SyncObserver {
    fn started(&mut self, _project: &str, _total: usize) {}
    fn skipped(&mut self, _run_id: &str) {}
    /// Called before an already archived run is fetched again.
    fn overwriting(&mut self, _run_id: &str) {}
    fn written(&mut self, _run_id: &str, _overwrote: bool) {}
    fn failed(&mut self, _run_id: &str, _failure: &SyncFailure) {}
    fn finished(&mut self, _report: &SyncReport) {}
}

pub struct SilentObserver;

impl SyncObserver for SilentObserver {}

/// Back up `runs` of `project` into `store`.
///
/// Only project-level problems (an unusable project name, an archive
/// directory that cannot be created) are returned as errors. Per-run
/// failures end up in the report.
pub async fn sync<R: RunDescriptor>(
    store: &ArchiveStore,
    project: &str,
    runs: &[R],
    overwrite: bool,
    observer: &mut dyn SyncObserver,
) -> Result<SyncReport, ArchiveError> {
    store.ensure_project_dir(project)?;

    let mut report = SyncReport::new(project, runs.len());
    observer.started(project, runs.len());

    for run in runs {
        let run_id = run.id();
        let existed = store.exists(project, run_id);

        if existed && !overwrite {
            debug!(project, run_id, "already archived, skipping");
            observer.skipped(run_id);
            report.record(run_id, RunOutcome::Skipped);
            continue;
        }

        if existed {
            observer.overwriting(run_id);
        }

        match backup_run(store, project, run).await {
            Ok(()) => {
                debug!(project, run_id, overwrote = existed, "run archived");
                observer.written(run_id, existed);
                report.record(run_id, RunOutcome::Written { overwrote: existed });
            }
            Err(failure) => {
                warn!(project, run_id, error = %failure, "run backup failed");
                observer.failed(run_id, &failure);
                report.record(
                    run_id,
                    RunOutcome::Failed {
                        kind: failure.kind().to_string(),
                        error: failure.to_string(),
                    },
                );
            }
        }
    }

    observer.finished(&report);
    Ok(report)
}

async fn backup_run<R: RunDescriptor>(
    store: &ArchiveStore,
    project: &str,
    run: &R,
) -> Result<(), SyncFailure> {
    store.run_path(project, run.id())?;

    let config = run
        .config()
        .await
        .map_err(|e| SyncFailure::from_fetch("config", e))?;
    let history = run
        .history()
        .await
        .map_err(|e| SyncFailure::from_fetch("history", e))?;

    let document = build_document(config, history);
    store.put(project, run.id(), &document)?;
    Ok(())
}

/// The run's configuration with the history attached under `history`.
/// A config entry of the same name is replaced.
pub fn build_document(mut config: Document, history: Value) -> Document {
    if config.contains_key(HISTORY_KEY) {
        warn!("run config has a '{HISTORY_KEY}' entry; it is replaced by the metric history");
    }
    config.insert(HISTORY_KEY.to_string(), history);
    config
}
