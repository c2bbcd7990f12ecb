//! Scripted in-memory Galaxy used by tests.
//!
//! Every call is appended to a log so tests can assert exactly which remote
//! operations ran, and in which order.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::types::*;
use super::{ApiError, ApiResult, GalaxyApi};

#[derive(Default)]
pub(crate) struct FakeGalaxy {
    calls: RefCell<Vec<String>>,
    snapshots: RefCell<VecDeque<SessionStatusSnapshot>>,
    datasets: RefCell<HashMap<String, VecDeque<DatasetInfo>>>,
    jobs: HashMap<String, JobInfo>,
    tools: HashMap<String, ToolInfo>,
    contents: Vec<Artifact>,
    remote_workflow: Option<RemoteWorkflow>,
    failing: HashSet<&'static str>,
    counter: RefCell<u32>,
}

impl FakeGalaxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a snapshot; the last one is repeated once the queue drains.
    pub fn with_snapshot(self, snapshot: SessionStatusSnapshot) -> Self {
        self.snapshots.borrow_mut().push_back(snapshot);
        self
    }

    /// Registers successive answers for a dataset; the last one repeats.
    pub fn with_dataset(self, info: DatasetInfo) -> Self {
        self.datasets
            .borrow_mut()
            .entry(info.id.clone())
            .or_default()
            .push_back(info);
        self
    }

    pub fn with_job(mut self, job_id: &str, tool_id: &str) -> Self {
        self.jobs.insert(
            job_id.to_string(),
            JobInfo {
                id: job_id.to_string(),
                tool_id: tool_id.to_string(),
                exit_code: Some(1),
            },
        );
        self
    }

    pub fn with_tool(mut self, tool: ToolInfo) -> Self {
        self.tools.insert(tool.id.clone(), tool);
        self
    }

    pub fn with_contents(mut self, contents: Vec<Artifact>) -> Self {
        self.contents = contents;
        self
    }

    pub fn with_remote_workflow(mut self, workflow: RemoteWorkflow) -> Self {
        self.remote_workflow = Some(workflow);
        self
    }

    /// Makes every call to `operation` fail with a server error.
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.split(':').next() == Some(operation))
            .count()
    }

    fn record(&self, operation: &'static str, detail: &str) -> ApiResult<()> {
        self.calls.borrow_mut().push(format!("{}:{}", operation, detail));
        if self.failing.contains(operation) {
            return Err(ApiError::Status {
                status: 500,
                body: format!("{} unavailable", operation),
            });
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut counter = self.counter.borrow_mut();
        *counter += 1;
        format!("{}{}", prefix, counter)
    }
}

impl GalaxyApi for FakeGalaxy {
    fn create_session(&self, name: &str) -> ApiResult<Session> {
        self.record("create_session", name)?;
        Ok(Session {
            id: self.next_id("hist"),
            name: name.to_string(),
        })
    }

    fn upload(&self, session_id: &str, path: &Path, label: &str, _file_type: &str) -> ApiResult<ArtifactRef> {
        self.record("upload", &format!("{}:{}:{}", session_id, label, path.display()))?;
        Ok(ArtifactRef {
            id: self.next_id("upl"),
        })
    }

    fn import_workflow(&self, _definition: &Value) -> ApiResult<WorkflowHandle> {
        self.record("import_workflow", "")?;
        Ok(WorkflowHandle {
            id: self.next_id("wf"),
            name: None,
        })
    }

    fn show_workflow(&self, workflow_id: &str) -> ApiResult<RemoteWorkflow> {
        self.record("show_workflow", workflow_id)?;
        self.remote_workflow
            .clone()
            .map(|mut wf| {
                wf.id = workflow_id.to_string();
                wf
            })
            .ok_or_else(|| ApiError::Decode("no workflow scripted".to_string()))
    }

    fn invoke(&self, request: &InvocationRequest) -> ApiResult<Invocation> {
        self.record("invoke", &request.workflow_id)?;
        Ok(Invocation {
            id: self.next_id("inv"),
            session_id: self.next_id("out"),
            workflow_id: request.workflow_id.clone(),
        })
    }

    fn get_session_status(&self, session_id: &str) -> ApiResult<SessionStatusSnapshot> {
        self.record("get_session_status", session_id)?;
        let mut queue = self.snapshots.borrow_mut();
        let snapshot = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        snapshot.ok_or_else(|| ApiError::Decode("no snapshot scripted".to_string()))
    }

    fn get_dataset(&self, dataset_id: &str) -> ApiResult<DatasetInfo> {
        self.record("get_dataset", dataset_id)?;
        let mut datasets = self.datasets.borrow_mut();
        let queue = datasets
            .get_mut(dataset_id)
            .ok_or_else(|| ApiError::Status {
                status: 404,
                body: format!("dataset {} not found", dataset_id),
            })?;
        let info = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        info.ok_or_else(|| ApiError::Decode("empty dataset script".to_string()))
    }

    fn get_job(&self, job_id: &str) -> ApiResult<JobInfo> {
        self.record("get_job", job_id)?;
        self.jobs.get(job_id).cloned().ok_or_else(|| ApiError::Status {
            status: 404,
            body: format!("job {} not found", job_id),
        })
    }

    fn get_tool(&self, tool_id: &str) -> ApiResult<ToolInfo> {
        self.record("get_tool", tool_id)?;
        self.tools.get(tool_id).cloned().ok_or_else(|| ApiError::Status {
            status: 404,
            body: format!("tool {} not found", tool_id),
        })
    }

    fn list_session_contents(&self, session_id: &str) -> ApiResult<Vec<Artifact>> {
        self.record("list_session_contents", session_id)?;
        Ok(self.contents.clone())
    }

    fn download(&self, artifact_id: &str, dest: &Path, use_default_name: bool) -> ApiResult<PathBuf> {
        self.record("download", artifact_id)?;
        let target = if use_default_name {
            dest.join(format!("Galaxy-{}.dat", artifact_id))
        } else {
            dest.to_path_buf()
        };
        fs::write(&target, artifact_id)?;
        Ok(target)
    }

    fn delete_session(&self, session_id: &str, _purge: bool) -> ApiResult<()> {
        self.record("delete_session", session_id)
    }

    fn delete_workflow(&self, workflow_id: &str) -> ApiResult<()> {
        self.record("delete_workflow", workflow_id)
    }
}

/// Snapshot built from `(state, ids)` pairs; counts follow the id lists.
pub(crate) fn snapshot(states: &[(&str, &[&str])]) -> SessionStatusSnapshot {
    let mut snapshot = SessionStatusSnapshot::default();
    for (state, ids) in states {
        snapshot.state_counts.insert(state.to_string(), ids.len() as u64);
        snapshot
            .state_ids
            .insert(state.to_string(), ids.iter().map(|id| id.to_string()).collect());
    }
    snapshot
}

/// Dataset metadata with the given state, created by `job`.
pub(crate) fn dataset(id: &str, state: &str, resubmitted: bool, job: &str) -> DatasetInfo {
    DatasetInfo {
        id: id.to_string(),
        state: state.to_string(),
        resubmitted,
        creating_job: Some(job.to_string()),
        name: None,
    }
}
