//! Narrow view of the tracking service used by the backup engine.
//!
//! The engine only needs a run's id, its configuration and its metric
//! history. Everything else the service exposes stays behind these traits so
//! the engine can be driven by the live API or by an in-memory fake.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::http::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{what} could not be decoded: {reason}")]
    Decode { what: &'static str, reason: String },
}

/// A project on the service, addressed by name within its entity.
pub trait ProjectDescriptor {
    fn name(&self) -> &str;
}

#[async_trait]
pub trait RunDescriptor: Send + Sync {
    fn id(&self) -> &str;

    /// Configuration mapping of the run.
    async fn config(&self) -> Result<Map<String, Value>, FetchError>;

    /// Metric history, one record per logged step.
    async fn history(&self) -> Result<Value, FetchError>;
}

#[async_trait]
pub trait RunSource: Send + Sync {
    type Run: RunDescriptor;

    /// Runs of `project` in the service's listing order.
    async fn list_runs(&self, project: &str) -> Result<Vec<Self::Run>, FetchError>;
}
