//! Error Types
//!
//! Every failure the executor can report, split by the point at which it
//! can happen:
//!
//! - validation errors (labels, inputs, operator files) are raised before
//!   any remote session exists
//! - remote call failures wrap the client's [`ApiError`]
//! - a hard execution failure is the evaluator reaching a terminal failure
//!
//! [`ExecutorError::CorruptCheckpoint`] is never returned from a public
//! operation; the state store downgrades it to a warning.

use std::path::PathBuf;

use thiserror::Error;

use crate::galaxy::ApiError;

/// Result alias used throughout the library.
pub type Result<T, E = ExecutorError> = std::result::Result<T, E>;

/// Errors raised by the workflow executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("'{label}' parameter step label is not present in the workflow definition")]
    UnknownStepLabel { label: String },

    #[error("Input step {step_id} in workflow has no label set")]
    MissingInputLabel { step_id: String },

    #[error("Input step {step_id} label '{label}' is not present in the inputs file provided")]
    UnboundInput { step_id: String, label: String },

    #[error("Label '{label}' could not be bound: {reason}")]
    UnresolvedInput { label: String, reason: String },

    #[error("Input file {} does not exist for input label '{label}'", path.display())]
    MissingInputFile { label: String, path: PathBuf },

    #[error("Input dataset_id {dataset_id} (label '{label}') does not exist in the Galaxy instance")]
    UnknownDataset { label: String, dataset_id: String },

    #[error("Checkpoint {} could not be used: {reason}", path.display())]
    CorruptCheckpoint { path: PathBuf, reason: String },

    #[error("Remote call '{operation}' failed: {source}")]
    RemoteCallFailure {
        operation: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("Workflow execution failed: {reason}")]
    HardExecutionFailure { reason: String },

    #[error("Unknown Galaxy instance '{name}' in {}", path.display())]
    UnknownInstance { name: String, path: PathBuf },

    #[error("Could not load {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Returns a closure wrapping an [`ApiError`] for the named operation.
    ///
    /// Intended for `map_err`: `client.get_job(id).map_err(ExecutorError::remote("get_job"))`.
    pub fn remote(operation: &'static str) -> impl FnOnce(ApiError) -> ExecutorError {
        move |source| ExecutorError::RemoteCallFailure { operation, source }
    }

    /// True for errors detected before any remote resource was created.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownStepLabel { .. }
                | Self::MissingInputLabel { .. }
                | Self::UnboundInput { .. }
                | Self::UnresolvedInput { .. }
                | Self::MissingInputFile { .. }
                | Self::UnknownDataset { .. }
        )
    }
}
