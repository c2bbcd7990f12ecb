//! Galaxy Server Access
//!
//! The executor only talks to Galaxy through the [`GalaxyApi`] trait so the
//! orchestration logic can be exercised against a scripted server in tests.
//!
//! - [`types`]: values exchanged with the server
//! - [`client`]: blocking HTTP implementation over the Galaxy REST API

pub mod client;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

pub use client::GalaxyClient;
pub use types::{
    Artifact, ArtifactKind, ArtifactRef, DatasetInfo, InputBinding, InputMap, Invocation,
    InvocationRequest, JobInfo, ParameterMap, RemoteStep, RemoteWorkflow, Session,
    SessionStatusSnapshot, SourceKind, ToolInfo, ToolShedRepository, WorkflowHandle,
};

/// Failure of a single call to the server.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// True when the server could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        match self {
            ApiError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Operations the executor needs from a Galaxy server.
///
/// All calls are blocking round trips. Nothing here retries.
pub trait GalaxyApi {
    /// Creates a new history.
    fn create_session(&self, name: &str) -> ApiResult<Session>;

    /// Uploads a local file into a history under `label`.
    fn upload(
        &self,
        session_id: &str,
        path: &Path,
        label: &str,
        file_type: &str,
    ) -> ApiResult<ArtifactRef>;

    /// Imports a workflow from its exported JSON document.
    fn import_workflow(&self, definition: &Value) -> ApiResult<WorkflowHandle>;

    fn show_workflow(&self, workflow_id: &str) -> ApiResult<RemoteWorkflow>;

    /// Launches a run; outputs go to a new history named after the request.
    fn invoke(&self, request: &InvocationRequest) -> ApiResult<Invocation>;

    fn get_session_status(&self, session_id: &str) -> ApiResult<SessionStatusSnapshot>;

    fn get_dataset(&self, dataset_id: &str) -> ApiResult<DatasetInfo>;

    fn get_job(&self, job_id: &str) -> ApiResult<JobInfo>;

    fn get_tool(&self, tool_id: &str) -> ApiResult<ToolInfo>;

    /// Visible datasets and collections of a history, collections expanded.
    fn list_session_contents(&self, session_id: &str) -> ApiResult<Vec<Artifact>>;

    /// Downloads a dataset and returns the path written.
    ///
    /// With `use_default_name`, `dest` is a directory and the server picks
    /// the file name; otherwise `dest` is the target file.
    fn download(&self, artifact_id: &str, dest: &Path, use_default_name: bool)
        -> ApiResult<PathBuf>;

    fn delete_session(&self, session_id: &str, purge: bool) -> ApiResult<()>;

    fn delete_workflow(&self, workflow_id: &str) -> ApiResult<()>;
}
