//! Completion Evaluation
//!
//! Decides, from a history status snapshot, whether a run is still going,
//! has failed, or has finished, possibly with tolerated failures.
//!
//! The evaluator is called once per poll with a fresh snapshot. Datasets it
//! has already accepted as tolerated failures are remembered in the
//! [`AllowedErrorRegistry`] and never re-examined.

use std::thread;
use std::time::Duration;

use log::{debug, info};

use super::allowed::AllowedErrorRegistry;
use crate::error::{ExecutorError, Result};
use crate::galaxy::{DatasetInfo, GalaxyApi, SessionStatusSnapshot};

/// Dataset states after which a dataset will not change any more.
pub const TERMINAL_STATES: [&str; 4] = ["ok", "error", "paused", "failed_metadata"];

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionState {
    /// Datasets are still queued or running
    Running,
    /// A failure outside the allowed set
    Failed { reason: String },
    /// Everything finished without errors
    CompletedClean,
    /// Everything finished; all errors were tolerated
    CompletedWithToleratedErrors,
}

impl CompletionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CompletionState::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CompletionState::CompletedClean | CompletionState::CompletedWithToleratedErrors
        )
    }
}

/// Evaluates history snapshots against the allowed failures.
pub struct CompletionEvaluator<'a, C: GalaxyApi + ?Sized> {
    client: &'a C,
    resubmission_grace: Duration,
    wait_for_resubmission: bool,
}

impl<'a, C: GalaxyApi + ?Sized> CompletionEvaluator<'a, C> {
    pub fn new(client: &'a C, resubmission_grace: Duration, wait_for_resubmission: bool) -> Self {
        Self {
            client,
            resubmission_grace,
            wait_for_resubmission,
        }
    }

    /// Evaluates one snapshot.
    ///
    /// May sleep for the resubmission grace period once per newly seen
    /// error dataset. Remote failures while inspecting datasets are returned
    /// as errors, not as a failed run.
    pub fn evaluate(
        &self,
        snapshot: &SessionStatusSnapshot,
        registry: &mut AllowedErrorRegistry,
    ) -> Result<CompletionState> {
        if !registry.has_tolerances() && snapshot.has_errors() {
            return Ok(CompletionState::Failed {
                reason: format!(
                    "{} dataset(s) in error and no failures are allowed",
                    snapshot.count("error").max(snapshot.ids("error").len() as u64)
                ),
            });
        }

        for dataset_id in snapshot.ids("error") {
            if registry.is_dataset_confirmed_tolerated(dataset_id) {
                continue;
            }

            let Some(dataset) = self.settled_error(dataset_id)? else {
                continue;
            };

            let Some(tool_id) = self.creating_tool(&dataset)? else {
                return Ok(untraceable(dataset_id));
            };
            if registry.is_tool_tolerated(&tool_id) {
                info!("Dataset {} failed in tool {}, which is allowed to fail", dataset_id, tool_id);
                registry.confirm_tolerated(dataset_id);
                continue;
            }

            info!("Tool {} is not marked as allowed to fail, but has failed.", tool_id);
            return Ok(CompletionState::Failed {
                reason: format!("dataset {} failed in tool {}", dataset_id, tool_id),
            });
        }

        if !is_complete(snapshot) {
            debug!("Run still in progress: {:?}", snapshot.state_counts);
            return Ok(CompletionState::Running);
        }

        for dataset_id in snapshot.ids("paused") {
            if registry.is_dataset_confirmed_tolerated(dataset_id) {
                continue;
            }
            let dataset = self
                .client
                .get_dataset(dataset_id)
                .map_err(ExecutorError::remote("get_dataset"))?;
            let Some(tool_id) = self.creating_tool(&dataset)? else {
                return Ok(untraceable(dataset_id));
            };
            if registry.is_tool_tolerated(&tool_id) {
                registry.confirm_tolerated(dataset_id);
                continue;
            }

            info!(
                "Tool {} is not marked as allowed to fail, but is paused due to a previous tool failure.",
                tool_id
            );
            return Ok(CompletionState::Failed {
                reason: format!("dataset {} of tool {} is paused after an upstream failure", dataset_id, tool_id),
            });
        }

        info!("Workflow run has completed, job counts per states are:");
        for (state, count) in &snapshot.state_counts {
            info!("{}: {}", state, count);
        }

        if registry.tolerated_count() == 0 {
            Ok(CompletionState::CompletedClean)
        } else {
            Ok(CompletionState::CompletedWithToleratedErrors)
        }
    }

    /// Polls the history until the evaluation is terminal.
    pub fn wait_for_terminal(
        &self,
        session_id: &str,
        registry: &mut AllowedErrorRegistry,
        poll_interval: Duration,
    ) -> Result<CompletionState> {
        loop {
            let snapshot = self
                .client
                .get_session_status(session_id)
                .map_err(ExecutorError::remote("get_session_status"))?;

            let state = self.evaluate(&snapshot, registry)?;
            if state.is_terminal() {
                return Ok(state);
            }
            thread::sleep(poll_interval);
        }
    }

    /// Gives an error dataset one chance to come back from a resubmission.
    ///
    /// Returns `None` when the error turned out to be transient, otherwise
    /// the dataset to adjudicate.
    fn settled_error(&self, dataset_id: &str) -> Result<Option<DatasetInfo>> {
        if self.wait_for_resubmission {
            info!(
                "Waiting {} sec to check if the job gets re-submitted",
                self.resubmission_grace.as_secs()
            );
            thread::sleep(self.resubmission_grace);
        }

        let dataset = self
            .client
            .get_dataset(dataset_id)
            .map_err(ExecutorError::remote("get_dataset"))?;

        if !self.wait_for_resubmission {
            return Ok(Some(dataset));
        }

        if !dataset.resubmitted {
            info!("Job was not resubmitted");
            Ok(Some(dataset))
        } else if dataset.state != "error" {
            info!("Job was resubmitted and is not in error any more...");
            Ok(None)
        } else {
            info!("Job was resubmitted at some point, but still shows to be in error state...");
            Ok(Some(dataset))
        }
    }

    /// Tool of the job that produced `dataset`, if the server names one.
    fn creating_tool(&self, dataset: &DatasetInfo) -> Result<Option<String>> {
        let Some(job_id) = dataset.creating_job.as_deref() else {
            return Ok(None);
        };
        let job = self
            .client
            .get_job(job_id)
            .map_err(ExecutorError::remote("get_job"))?;
        Ok(Some(job.tool_id))
    }
}

/// A failed dataset whose tool cannot be determined is never tolerated.
fn untraceable(dataset_id: &str) -> CompletionState {
    info!("Dataset {} has no creating job, treating its failure as fatal", dataset_id);
    CompletionState::Failed {
        reason: format!("dataset {} has no creating job to inspect", dataset_id),
    }
}

/// True when at least one dataset exists and all datasets are terminal.
pub fn is_complete(snapshot: &SessionStatusSnapshot) -> bool {
    let (terminal, pending) = snapshot
        .state_counts
        .iter()
        .fold((0u64, 0u64), |(terminal, pending), (state, count)| {
            if TERMINAL_STATES.contains(&state.as_str()) {
                (terminal + count, pending)
            } else {
                (terminal, pending + count)
            }
        });
    pending == 0 && terminal > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::allowed::{AllowedErrorsByLabel, ToleranceSpec};
    use crate::galaxy::fake::{dataset, snapshot, FakeGalaxy};
    use crate::workflow::{StepKind, WorkflowDefinition, WorkflowStep};
    use serde_json::json;

    fn registry_tolerating(tool_id: &str) -> AllowedErrorRegistry {
        let definition = WorkflowDefinition::from_steps(vec![
            ("1", WorkflowStep::new(StepKind::Tool, Some("Tolerated"), Some(tool_id))),
            ("2", WorkflowStep::new(StepKind::Tool, Some("Strict"), Some("strict_tool"))),
        ]);
        let mut allowed = AllowedErrorsByLabel::new();
        allowed.insert("Tolerated".to_string(), ToleranceSpec(json!("any")));
        AllowedErrorRegistry::build(&allowed, &definition)
    }

    fn evaluator(client: &FakeGalaxy, wait: bool) -> CompletionEvaluator<'_, FakeGalaxy> {
        CompletionEvaluator::new(client, Duration::ZERO, wait)
    }

    #[test]
    fn test_all_ok_is_completed_clean() {
        let client = FakeGalaxy::new();
        let mut registry = AllowedErrorRegistry::new();
        let state = evaluator(&client, true)
            .evaluate(&snapshot(&[("ok", &["d1"]), ("queued", &[])]), &mut registry)
            .unwrap();
        assert_eq!(state, CompletionState::CompletedClean);
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_confirmed_tolerated_error_completes_with_tolerated() {
        let client = FakeGalaxy::new();
        let mut registry = registry_tolerating("hvg");
        registry.confirm_tolerated("d2");

        let state = evaluator(&client, true)
            .evaluate(&snapshot(&[("ok", &["d1"]), ("error", &["d2"])]), &mut registry)
            .unwrap();

        assert_eq!(state, CompletionState::CompletedWithToleratedErrors);
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_error_without_tolerances_fails_fast() {
        let client = FakeGalaxy::new();
        let mut registry = AllowedErrorRegistry::new();

        let state = evaluator(&client, true)
            .evaluate(&snapshot(&[("ok", &["d1"]), ("error", &["d2"])]), &mut registry)
            .unwrap();

        assert!(matches!(state, CompletionState::Failed { .. }));
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_queued_dataset_is_running() {
        let client = FakeGalaxy::new();
        let mut registry = AllowedErrorRegistry::new();

        let state = evaluator(&client, true)
            .evaluate(&snapshot(&[("ok", &["d1", "d2"]), ("queued", &["d3"])]), &mut registry)
            .unwrap();

        assert_eq!(state, CompletionState::Running);
    }

    #[test]
    fn test_empty_history_is_running() {
        let client = FakeGalaxy::new();
        let mut registry = AllowedErrorRegistry::new();
        let state = evaluator(&client, true)
            .evaluate(&SessionStatusSnapshot::default(), &mut registry)
            .unwrap();
        assert_eq!(state, CompletionState::Running);
    }

    #[test]
    fn test_new_error_in_tolerated_tool_is_confirmed() {
        let client = FakeGalaxy::new()
            .with_dataset(dataset("d2", "error", false, "j2"))
            .with_job("j2", "hvg");
        let mut registry = registry_tolerating("hvg");

        let state = evaluator(&client, true)
            .evaluate(&snapshot(&[("ok", &["d1"]), ("error", &["d2"])]), &mut registry)
            .unwrap();

        assert_eq!(state, CompletionState::CompletedWithToleratedErrors);
        assert!(registry.is_dataset_confirmed_tolerated("d2"));
        assert_eq!(client.calls(), vec!["get_dataset:d2", "get_job:j2"]);
    }

    #[test]
    fn test_error_in_strict_tool_fails() {
        let client = FakeGalaxy::new()
            .with_dataset(dataset("d2", "error", true, "j2"))
            .with_job("j2", "strict_tool");
        let mut registry = registry_tolerating("hvg");

        let state = evaluator(&client, true)
            .evaluate(&snapshot(&[("ok", &["d1"]), ("error", &["d2"])]), &mut registry)
            .unwrap();

        match state {
            CompletionState::Failed { reason } => assert!(reason.contains("strict_tool")),
            other => panic!("unexpected state {other:?}"),
        }
        assert!(!registry.is_dataset_confirmed_tolerated("d2"));
    }

    #[test]
    fn test_first_hard_failure_stops_scan() {
        let client = FakeGalaxy::new()
            .with_dataset(dataset("d1", "error", false, "j1"))
            .with_dataset(dataset("d2", "error", false, "j2"))
            .with_job("j1", "strict_tool")
            .with_job("j2", "hvg");
        let mut registry = registry_tolerating("hvg");

        let state = evaluator(&client, true)
            .evaluate(&snapshot(&[("error", &["d1", "d2"])]), &mut registry)
            .unwrap();

        assert!(matches!(state, CompletionState::Failed { .. }));
        assert_eq!(client.count("get_dataset"), 1);
    }

    #[test]
    fn test_error_without_creating_job_fails() {
        let mut orphan = dataset("d2", "error", false, "j2");
        orphan.creating_job = None;
        let client = FakeGalaxy::new().with_dataset(orphan);
        let mut registry = registry_tolerating("hvg");

        let state = evaluator(&client, true)
            .evaluate(&snapshot(&[("ok", &["d1"]), ("error", &["d2"])]), &mut registry)
            .unwrap();

        match state {
            CompletionState::Failed { reason } => assert!(reason.contains("d2")),
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(client.count("get_job"), 0);
        assert!(!registry.is_dataset_confirmed_tolerated("d2"));
    }

    #[test]
    fn test_resubmitted_dataset_is_transient() {
        let client = FakeGalaxy::new().with_dataset(dataset("d2", "running", true, "j2"));
        let mut registry = registry_tolerating("hvg");

        let state = evaluator(&client, true)
            .evaluate(&snapshot(&[("ok", &["d1"]), ("error", &["d2"])]), &mut registry)
            .unwrap();

        assert_eq!(state, CompletionState::CompletedClean);
        assert_eq!(client.count("get_job"), 0);
        assert!(!registry.is_dataset_confirmed_tolerated("d2"));
    }

    #[test]
    fn test_no_resubmission_wait_skips_transient_check() {
        let client = FakeGalaxy::new()
            .with_dataset(dataset("d2", "running", true, "j2"))
            .with_job("j2", "strict_tool");
        let mut registry = registry_tolerating("hvg");

        let state = evaluator(&client, false)
            .evaluate(&snapshot(&[("error", &["d2"])]), &mut registry)
            .unwrap();

        assert!(matches!(state, CompletionState::Failed { .. }));
    }

    #[test]
    fn test_paused_in_strict_tool_fails_on_completion() {
        let client = FakeGalaxy::new()
            .with_dataset(dataset("d2", "error", false, "j2"))
            .with_dataset(dataset("d3", "paused", false, "j3"))
            .with_job("j2", "hvg")
            .with_job("j3", "strict_tool");
        let mut registry = registry_tolerating("hvg");

        let state = evaluator(&client, true)
            .evaluate(
                &snapshot(&[("ok", &["d1"]), ("error", &["d2"]), ("paused", &["d3"])]),
                &mut registry,
            )
            .unwrap();

        assert!(matches!(state, CompletionState::Failed { .. }));
    }

    #[test]
    fn test_paused_in_tolerated_tool_is_confirmed() {
        let client = FakeGalaxy::new()
            .with_dataset(dataset("d3", "paused", false, "j3"))
            .with_job("j3", "hvg");
        let mut registry = registry_tolerating("hvg");

        let state = evaluator(&client, true)
            .evaluate(&snapshot(&[("ok", &["d1"]), ("paused", &["d3"])]), &mut registry)
            .unwrap();

        assert_eq!(state, CompletionState::CompletedWithToleratedErrors);
        assert!(registry.is_dataset_confirmed_tolerated("d3"));
    }

    #[test]
    fn test_paused_not_examined_while_running() {
        let client = FakeGalaxy::new();
        let mut registry = registry_tolerating("hvg");

        let state = evaluator(&client, true)
            .evaluate(&snapshot(&[("paused", &["d3"]), ("running", &["d4"])]), &mut registry)
            .unwrap();

        assert_eq!(state, CompletionState::Running);
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_reevaluation_does_not_readjudicate() {
        let client = FakeGalaxy::new()
            .with_dataset(dataset("d2", "error", false, "j2"))
            .with_job("j2", "hvg");
        let mut registry = registry_tolerating("hvg");
        let evaluator = evaluator(&client, true);
        let running = snapshot(&[("error", &["d2"]), ("running", &["d4"])]);

        assert_eq!(evaluator.evaluate(&running, &mut registry).unwrap(), CompletionState::Running);
        assert_eq!(evaluator.evaluate(&running, &mut registry).unwrap(), CompletionState::Running);

        assert_eq!(client.count("get_dataset"), 1);
        assert_eq!(client.count("get_job"), 1);
    }

    #[test]
    fn test_tolerated_set_never_shrinks() {
        let client = FakeGalaxy::new()
            .with_dataset(dataset("d1", "error", false, "j1"))
            .with_dataset(dataset("d2", "error", false, "j2"))
            .with_job("j1", "hvg")
            .with_job("j2", "hvg");
        let mut registry = registry_tolerating("hvg");
        let evaluator = evaluator(&client, true);
        let cycles = [
            snapshot(&[("error", &["d1"]), ("running", &["d3"])]),
            snapshot(&[("ok", &["d3"]), ("running", &["d4"])]),
            snapshot(&[("error", &["d1", "d2"]), ("running", &["d4"])]),
            snapshot(&[("error", &["d1", "d2"]), ("ok", &["d3", "d4"])]),
        ];

        let mut previous: Vec<String> = Vec::new();
        for cycle in &cycles {
            evaluator.evaluate(cycle, &mut registry).unwrap();
            let current: Vec<String> = registry.tolerated_datasets().map(str::to_string).collect();
            assert!(previous.iter().all(|id| current.contains(id)));
            previous = current;
        }
        assert_eq!(previous, vec!["d1", "d2"]);
    }

    #[test]
    fn test_wait_for_terminal_polls_until_done() {
        let client = FakeGalaxy::new()
            .with_snapshot(snapshot(&[("queued", &["d1"])]))
            .with_snapshot(snapshot(&[("running", &["d1"])]))
            .with_snapshot(snapshot(&[("ok", &["d1"])]));
        let mut registry = AllowedErrorRegistry::new();

        let state = evaluator(&client, true)
            .wait_for_terminal("out1", &mut registry, Duration::ZERO)
            .unwrap();

        assert_eq!(state, CompletionState::CompletedClean);
        assert_eq!(client.count("get_session_status"), 3);
    }

    #[test]
    fn test_wait_for_terminal_surfaces_remote_failure() {
        let client = FakeGalaxy::new().failing("get_session_status");
        let mut registry = AllowedErrorRegistry::new();

        let err = evaluator(&client, true)
            .wait_for_terminal("out1", &mut registry, Duration::ZERO)
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutorError::RemoteCallFailure { operation: "get_session_status", .. }
        ));
    }

    #[test]
    fn test_is_complete_counts() {
        assert!(is_complete(&snapshot(&[("ok", &["a"]), ("failed_metadata", &["b"])])));
        assert!(!is_complete(&snapshot(&[("ok", &["a"]), ("new", &["b"])])));
        assert!(!is_complete(&snapshot(&[("ok", &[]), ("queued", &[])])));
    }
}
