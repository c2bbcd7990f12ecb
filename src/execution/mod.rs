//! Workflow Execution Module
//!
//! Everything that happens once a workflow is ready to launch: running it,
//! judging when it is finished, and collecting the results.
//!
//! # Architecture
//!
//! - [`engine`]: The runner orchestrating a complete run
//! - [`allowed`]: Steps allowed to fail, mapped to tool ids
//! - [`completion`]: Completion evaluation of a results history
//! - [`state`]: Checkpoint persistence for resumable runs
//! - [`results`]: Download of the results history

pub mod allowed;
pub mod completion;
pub mod engine;
pub mod results;
pub mod state;

pub use allowed::{AllowedErrorRegistry, AllowedErrorsByLabel, ToleranceSpec};
pub use completion::{CompletionEvaluator, CompletionState};
pub use engine::{CleanupStatus, PendingCleanup, RunOptions, RunPlan, RunReport, Runner};
pub use results::download_all;
pub use state::ExecutionState;
