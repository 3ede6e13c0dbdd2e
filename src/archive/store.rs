//! Filesystem-backed store of archived runs.
//!
//! Layout: `<root>/<project>/<run_id>.json`, one JSON object per run. Writes
//! go to a `.tmp` sibling first and are renamed into place, so a document is
//! either absent or complete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::utils::write_atomic;

/// An archived run: the run's configuration plus a top-level `history` key.
pub type Document = Map<String, Value>;

const DOCUMENT_EXT: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("no archived run '{run_id}' in project '{project}'")]
    NotFound { project: String, run_id: String },
    #[error("archived run {} is not a valid JSON document: {source}", .path.display())]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid archive key '{0}'")]
    InvalidKey(String),
    #[error("failed to serialize document for {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_error<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> ArchiveError + 'a {
    move |source| ArchiveError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Project and run ids become path segments, so they must not escape the root.
fn validate_key(key: &str) -> Result<&str, ArchiveError> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ArchiveError::InvalidKey(key.to_string()));
    }
    Ok(key)
}

#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self, project: &str) -> Result<PathBuf, ArchiveError> {
        Ok(self.root.join(validate_key(project)?))
    }

    pub fn run_path(&self, project: &str, run_id: &str) -> Result<PathBuf, ArchiveError> {
        let run_id = validate_key(run_id)?;
        Ok(self
            .project_dir(project)?
            .join(format!("{run_id}.{DOCUMENT_EXT}")))
    }

    /// True iff a document is present. Contents are not validated.
    pub fn exists(&self, project: &str, run_id: &str) -> bool {
        self.run_path(project, run_id)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// True iff the project's archive directory exists, even when it holds no runs.
    pub fn project_has_backup(&self, project: &str) -> bool {
        self.project_dir(project)
            .map(|dir| dir.is_dir())
            .unwrap_or(false)
    }

    pub fn ensure_project_dir(&self, project: &str) -> Result<PathBuf, ArchiveError> {
        let dir = self.project_dir(project)?;
        fs::create_dir_all(&dir).map_err(io_error("create", &dir))?;
        Ok(dir)
    }

    /// Ids of archived runs in filesystem order.
    pub fn list(&self, project: &str) -> Result<Vec<String>, ArchiveError> {
        let dir = self.project_dir(project)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("read", &dir)(e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_error("read", &dir))?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXT)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        Ok(ids)
    }

    /// Names of projects with an archive directory, sorted.
    pub fn list_projects(&self) -> Result<Vec<String>, ArchiveError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("read", &self.root)(e)),
        };

        let mut projects = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_error("read", &self.root))?.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                projects.push(name.to_string());
            }
        }
        projects.sort();
        Ok(projects)
    }

    /// Write `document`, replacing any existing one.
    pub fn put(&self, project: &str, run_id: &str, document: &Document) -> Result<(), ArchiveError> {
        let path = self.run_path(project, run_id)?;
        self.ensure_project_dir(project)?;

        let bytes = serde_json::to_vec_pretty(document).map_err(|source| {
            ArchiveError::Serialize {
                path: path.clone(),
                source,
            }
        })?;

        write_atomic(&path, &bytes).map_err(io_error("write", &path))?;
        Ok(())
    }

    pub fn get(&self, project: &str, run_id: &str) -> Result<Document, ArchiveError> {
        let path = self.run_path(project, run_id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArchiveError::NotFound {
                    project: project.to_string(),
                    run_id: run_id.to_string(),
                })
            }
            Err(e) => return Err(io_error("read", &path)(e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| ArchiveError::CorruptArchive { path, source })
    }
}
