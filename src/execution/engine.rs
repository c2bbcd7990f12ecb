//! Workflow Run Orchestration
//!
//! The runner that takes a workflow from local files to downloaded results:
//! - Validation of labels, inputs and files before anything is created remotely
//! - Import, upload, binding and invocation, each checkpointed on success
//! - Polling until the run is complete or has failed
//! - Result download and cleanup of remote resources
//!
//! An interrupted run is resumed by loading the same checkpoint: phases whose
//! output is already recorded are skipped.

use std::fs;
use std::path::PathBuf;
use std::thread;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::allowed::{AllowedErrorRegistry, AllowedErrorsByLabel};
use super::completion::{CompletionEvaluator, CompletionState};
use super::results::download_all;
use super::state::ExecutionState;
use crate::config::PollingConfig;
use crate::error::{ExecutorError, Result};
use crate::galaxy::{ApiError, GalaxyApi, Invocation, InvocationRequest, WorkflowHandle};
use crate::monitoring::{EventType, ExecutionTimeline, Phase};
use crate::workflow::{
    bind, bind_parameters, reclassify_scalar_parameters, validate_all_input_labels_present,
    validate_all_parameter_labels_exist, validate_dataset_ids_exist, validate_input_files_exist,
    write_versions_file, InputSpecSet, ParameterSet, WorkflowDefinition,
};

/// Name of the file listing remote resources that could not be deleted.
pub const PENDING_CLEANUP_FILE: &str = "pending_cleanup.yaml";

/// What to run: the workflow and the operator's files.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub definition: WorkflowDefinition,
    pub inputs: InputSpecSet,
    pub parameters: ParameterSet,
    pub allowed_errors: AllowedErrorsByLabel,
}

/// How to run it.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Name given to the histories of this run
    pub session_name: String,
    pub output_dir: PathBuf,
    pub keep_session: bool,
    pub keep_workflow: bool,
    /// Name downloads after the remote datasets
    pub prefer_remote_names: bool,
    /// Where to write the tool versions report, if wanted
    pub versions_file: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(session_name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_name: session_name.into(),
            output_dir: output_dir.into(),
            keep_session: false,
            keep_workflow: false,
            prefer_remote_names: false,
            versions_file: None,
        }
    }
}

/// Remote resources left behind after a failed cleanup.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingCleanup {
    #[serde(default)]
    pub sessions: Vec<String>,
    #[serde(default)]
    pub workflows: Vec<String>,
}

impl PendingCleanup {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.workflows.is_empty()
    }
}

/// Outcome of the cleanup phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStatus {
    /// Everything that was not kept has been deleted
    Complete,
    /// Some deletions failed; the leftovers are listed in the side file
    Pending(PendingCleanup),
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: CompletionState,
    pub invocation: Invocation,
    pub downloaded: Vec<PathBuf>,
    /// Datasets that failed in tools allowed to fail
    pub tolerated_failures: Vec<String>,
    pub cleanup: CleanupStatus,
    pub timeline: ExecutionTimeline,
}

/// Drives a workflow run against a Galaxy server.
///
/// # Example
///
/// ```rust,no_run
/// use wfexecutor::config::PollingConfig;
/// use wfexecutor::execution::{ExecutionState, RunOptions, RunPlan, Runner};
/// use wfexecutor::galaxy::GalaxyClient;
/// use wfexecutor::workflow::load_workflow_definition;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = GalaxyClient::new("https://galaxy.example.org", "api-key")?;
///     let plan = RunPlan {
///         definition: load_workflow_definition(Path::new("clustering.ga"))?,
///         inputs: Default::default(),
///         parameters: Default::default(),
///         allowed_errors: Default::default(),
///     };
///     let runner = Runner::new(&client, PollingConfig::default(), RunOptions::new("E-MTAB-101", "results"));
///     let mut state = ExecutionState::load("results/state.json");
///     let report = runner.run(plan, &mut state)?;
///     println!("{:?}", report.outcome);
///     Ok(())
/// }
/// ```
pub struct Runner<'a, C: GalaxyApi + ?Sized> {
    client: &'a C,
    polling: PollingConfig,
    options: RunOptions,
}

impl<'a, C: GalaxyApi + ?Sized> Runner<'a, C> {
    pub fn new(client: &'a C, polling: PollingConfig, options: RunOptions) -> Self {
        Self {
            client,
            polling,
            options,
        }
    }

    /// Runs the plan, resuming from whatever `state` already records.
    ///
    /// Every phase that creates something remotely saves the checkpoint
    /// before the next one starts. On a hard failure the checkpoint and the
    /// remote resources are left in place for inspection.
    pub fn run(&self, mut plan: RunPlan, state: &mut ExecutionState) -> Result<RunReport> {
        let mut timeline = ExecutionTimeline::new();

        timeline.add_event(Phase::Validate, EventType::Started);
        validate_all_parameter_labels_exist(&plan.definition, &plan.parameters)?;
        let moved = reclassify_scalar_parameters(&mut plan.parameters, &mut plan.inputs);
        if moved > 0 {
            info!("{} scalar parameter(s) treated as workflow inputs", moved);
        }
        let data_inputs = validate_all_input_labels_present(&plan.definition, &plan.inputs)?;
        validate_input_files_exist(&plan.inputs)?;
        validate_dataset_ids_exist(self.client, &plan.inputs)?;
        let mut registry = AllowedErrorRegistry::build(&plan.allowed_errors, &plan.definition);
        timeline.add_event(Phase::Validate, EventType::Completed);

        if state.is_resume() {
            info!("Resuming previous run from {}", state.path().display());
        }

        let workflow = self.import_workflow(&plan, state, &mut timeline)?;

        let input_map = match state.input_map.clone() {
            Some(input_map) => {
                info!("Inputs already bound, skipping upload");
                timeline.add_event(Phase::Upload, EventType::Skipped);
                input_map
            }
            None => {
                timeline.add_event(Phase::Upload, EventType::Started);
                if data_inputs > 0 && state.session.is_none() {
                    let session = self
                        .client
                        .create_session(&self.options.session_name)
                        .map_err(ExecutorError::remote("create_session"))?;
                    info!("Created history '{}' ({})", session.name, session.id);
                    state.session = Some(session);
                    state.save()?;
                }

                let remote = self
                    .client
                    .show_workflow(&workflow.id)
                    .map_err(ExecutorError::remote("show_workflow"))?;
                let input_map = bind(self.client, &remote.inputs, &plan.inputs, state.session.as_ref())?;
                state.input_map = Some(input_map.clone());
                state.save()?;
                timeline.add_event(Phase::Upload, EventType::Completed);
                input_map
            }
        };

        let parameters = match state.parameters.clone() {
            Some(parameters) => {
                timeline.add_event(Phase::Bind, EventType::Skipped);
                parameters
            }
            None => {
                timeline.add_event(Phase::Bind, EventType::Started);
                let parameters = bind_parameters(&plan.definition, &plan.parameters);
                state.parameters = Some(parameters.clone());
                state.save()?;
                timeline.add_event(Phase::Bind, EventType::Completed);
                parameters
            }
        };

        let invocation = match state.invocation.clone() {
            Some(invocation) => {
                info!("Workflow already invoked ({}), resuming wait", invocation.id);
                timeline.add_event(Phase::Invoke, EventType::Skipped);
                invocation
            }
            None => {
                timeline.add_event(Phase::Invoke, EventType::Started);
                let request = InvocationRequest {
                    workflow_id: workflow.id.clone(),
                    inputs: input_map,
                    parameters,
                    session_name: self.options.session_name.clone(),
                };
                let invocation = self
                    .client
                    .invoke(&request)
                    .map_err(ExecutorError::remote("invoke"))?;
                info!(
                    "Invoked workflow {} as {}, results in history {}",
                    workflow.id, invocation.id, invocation.session_id
                );
                state.invocation = Some(invocation.clone());
                state.save()?;
                timeline.add_event(Phase::Invoke, EventType::Completed);

                info!(
                    "Waiting {} sec for the run to settle",
                    self.polling.settle_delay.as_secs()
                );
                thread::sleep(self.polling.settle_delay);
                invocation
            }
        };

        timeline.add_event(Phase::Wait, EventType::Started);
        let evaluator = CompletionEvaluator::new(
            self.client,
            self.polling.resubmission_grace,
            self.polling.wait_for_resubmission,
        );
        let outcome = evaluator.wait_for_terminal(&invocation.session_id, &mut registry, self.polling.poll_interval)?;

        if let CompletionState::Failed { reason } = outcome {
            timeline.add_event(Phase::Wait, EventType::Failed);
            warn!(
                "Keeping checkpoint {} and history {} for inspection",
                state.path().display(),
                invocation.session_id
            );
            return Err(ExecutorError::HardExecutionFailure { reason });
        }
        timeline.add_event(Phase::Wait, EventType::Completed);

        timeline.add_event(Phase::Download, EventType::Started);
        let downloaded = download_all(
            self.client,
            &invocation.session_id,
            &self.options.output_dir,
            &registry,
            self.options.prefer_remote_names,
        )?;
        if let Some(path) = &self.options.versions_file {
            write_versions_file(self.client, &plan.definition, path)?;
        }
        timeline.add_event(Phase::Download, EventType::Completed);

        timeline.add_event(Phase::Cleanup, EventType::Started);
        let cleanup = self.cleanup(state, &invocation);
        ExecutionState::clear(state.path())?;
        timeline.add_event(Phase::Cleanup, EventType::Completed);

        Ok(RunReport {
            outcome,
            invocation,
            downloaded,
            tolerated_failures: registry.tolerated_datasets().map(str::to_string).collect(),
            cleanup,
            timeline,
        })
    }

    fn import_workflow(
        &self,
        plan: &RunPlan,
        state: &mut ExecutionState,
        timeline: &mut ExecutionTimeline,
    ) -> Result<WorkflowHandle> {
        if let Some(workflow) = &state.workflow {
            info!("Workflow already imported ({})", workflow.id);
            timeline.add_event(Phase::Import, EventType::Skipped);
            return Ok(workflow.clone());
        }

        timeline.add_event(Phase::Import, EventType::Started);
        let workflow = self
            .client
            .import_workflow(plan.definition.raw())
            .map_err(ExecutorError::remote("import_workflow"))?;
        info!("Imported workflow as {}", workflow.id);
        state.workflow = Some(workflow.clone());
        state.save()?;
        timeline.add_event(Phase::Import, EventType::Completed);
        Ok(workflow)
    }

    /// Deletes the histories and workflow of the run, unless kept.
    ///
    /// Failures are collected rather than returned; whatever is left is
    /// written to the pending cleanup file in the output directory.
    fn cleanup(&self, state: &ExecutionState, invocation: &Invocation) -> CleanupStatus {
        let mut pending = PendingCleanup::default();

        if self.options.keep_session {
            info!("Keeping histories as requested");
        } else {
            let sessions = state
                .session
                .iter()
                .map(|s| s.id.as_str())
                .chain(std::iter::once(invocation.session_id.as_str()));
            for session_id in sessions {
                match self.client.delete_session(session_id, true) {
                    Ok(()) => info!("Deleted history {}", session_id),
                    Err(e) => {
                        log_cleanup_failure("history", session_id, &e);
                        pending.sessions.push(session_id.to_string());
                    }
                }
            }
        }

        if self.options.keep_workflow {
            info!("Keeping workflow as requested");
        } else if let Some(workflow) = &state.workflow {
            match self.client.delete_workflow(&workflow.id) {
                Ok(()) => info!("Deleted workflow {}", workflow.id),
                Err(e) => {
                    log_cleanup_failure("workflow", &workflow.id, &e);
                    pending.workflows.push(workflow.id.clone());
                }
            }
        }

        if pending.is_empty() {
            return CleanupStatus::Complete;
        }

        let path = self.options.output_dir.join(PENDING_CLEANUP_FILE);
        let written = serde_yaml::to_string(&pending)
            .map_err(|e| e.to_string())
            .and_then(|yaml| fs::write(&path, yaml).map_err(|e| e.to_string()));
        match written {
            Ok(()) => warn!("Remote resources left behind are listed in {}", path.display()),
            Err(e) => warn!("Could not write {}: {}", path.display(), e),
        }
        CleanupStatus::Pending(pending)
    }
}

fn log_cleanup_failure(kind: &str, id: &str, e: &ApiError) {
    if e.is_connectivity() {
        warn!("Galaxy unreachable, could not delete {} {}: {}", kind, id, e);
    } else {
        warn!("Could not delete {} {}: {}", kind, id, e);
    }
}
