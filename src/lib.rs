//! wfexecutor - Galaxy Workflow Executor
//!
//! Runs a Galaxy workflow export against a Galaxy server from the command
//! line: uploads the inputs, launches the run, waits for it while tolerating
//! failures in steps the operator allows to fail, and downloads the results.
//! Interrupted runs resume from a checkpoint.
//!
//! # Architecture
//!
//! The library is organized into six modules:
//!
//! - [`workflow`]: Workflow definitions, label resolution and input binding
//! - [`execution`]: The runner, completion evaluation and checkpointing
//! - [`galaxy`]: The Galaxy API seam and its HTTP client
//! - [`config`]: Credentials, operator files and polling settings
//! - [`monitoring`]: Run phase timeline
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use wfexecutor::config::{load_instance, read_operator_file, PollingConfig};
//! use wfexecutor::execution::{ExecutionState, RunOptions, RunPlan, Runner};
//! use wfexecutor::galaxy::GalaxyClient;
//! use wfexecutor::load_workflow_definition;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let instance = load_instance(Path::new("~/.parsec/creds.yml"), None)?;
//!     let client = GalaxyClient::new(&instance.url, &instance.key)?;
//!
//!     let plan = RunPlan {
//!         definition: load_workflow_definition(Path::new("clustering.ga"))?,
//!         inputs: read_operator_file(Path::new("inputs.yml"))?,
//!         parameters: read_operator_file(Path::new("params.json"))?,
//!         allowed_errors: Default::default(),
//!     };
//!
//!     let runner = Runner::new(&client, PollingConfig::default(), RunOptions::new("E-MTAB-101", "results"));
//!     let mut state = ExecutionState::load("results/exec_state.json");
//!     runner.run(plan, &mut state)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod galaxy;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use error::{ExecutorError, Result};
pub use execution::engine::Runner;
pub use workflow::model::{load_workflow_definition, WorkflowDefinition, WorkflowStep};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "wfexecutor";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "wfexecutor");
    }

    #[test]
    fn test_module_exports_definition() {
        let definition = WorkflowDefinition::from_steps(Vec::<(String, WorkflowStep)>::new());
        assert!(definition.is_empty());
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
