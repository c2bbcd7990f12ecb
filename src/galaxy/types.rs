//! Galaxy Value Types
//!
//! Plain data exchanged with the Galaxy server. These are the shapes the
//! core works with; the HTTP client translates the server's JSON into them.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A remote history holding the datasets of one run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub name: String,
}

/// A workflow imported into (or found on) the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorkflowHandle {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Reference to a dataset created by an upload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub id: String,
}

/// A launched run of a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub id: String,
    /// History receiving the outputs of the run.
    pub session_id: String,
    pub workflow_id: String,
}

/// Where a bound artifact reference comes from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Uploaded,
    ExistingDataset,
    ExistingCollection,
}

impl SourceKind {
    /// The `src` value Galaxy expects in an invocation payload.
    pub fn wire_src(self) -> &'static str {
        match self {
            SourceKind::Uploaded | SourceKind::ExistingDataset => "hda",
            SourceKind::ExistingCollection => "hdca",
        }
    }
}

/// Value bound to one workflow input step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputBinding {
    Artifact { id: String, source: SourceKind },
    Literal { value: Value },
}

impl InputBinding {
    /// Renders the binding the way the invocation endpoint expects it.
    pub fn to_payload(&self) -> Value {
        match self {
            InputBinding::Artifact { id, source } => json!({ "id": id, "src": source.wire_src() }),
            InputBinding::Literal { value } => value.clone(),
        }
    }
}

/// Step id -> bound input.
pub type InputMap = IndexMap<String, InputBinding>;

/// Step id -> tool parameter block.
pub type ParameterMap = IndexMap<String, Value>;

/// Everything needed to launch a workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub workflow_id: String,
    pub inputs: InputMap,
    pub parameters: ParameterMap,
    pub session_name: String,
}

impl InvocationRequest {
    /// Invocation inputs keyed by step id, in wire format.
    pub fn inputs_payload(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .inputs
            .iter()
            .map(|(step, binding)| (step.clone(), binding.to_payload()))
            .collect();
        Value::Object(map)
    }
}

/// Aggregate dataset states of a history at one point in time.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SessionStatusSnapshot {
    /// Overall history state as reported by the server.
    #[serde(default)]
    pub state: Option<String>,
    /// Dataset count per state.
    #[serde(default)]
    pub state_counts: BTreeMap<String, u64>,
    /// Dataset ids per state.
    #[serde(default)]
    pub state_ids: BTreeMap<String, Vec<String>>,
}

impl SessionStatusSnapshot {
    pub fn count(&self, state: &str) -> u64 {
        self.state_counts.get(state).copied().unwrap_or(0)
    }

    pub fn ids(&self, state: &str) -> &[String] {
        self.state_ids.get(state).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when any dataset is reported in `error`, by count or by id.
    pub fn has_errors(&self) -> bool {
        self.count("error") > 0 || !self.ids("error").is_empty()
    }
}

/// Metadata of a single dataset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub resubmitted: bool,
    #[serde(default)]
    pub creating_job: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Metadata of the job that produced a dataset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub id: String,
    pub tool_id: String,
    #[serde(default)]
    pub exit_code: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolShedRepository {
    pub tool_shed: String,
    pub owner: String,
    pub name: String,
    pub changeset_revision: String,
}

/// Tool metadata used for the versions report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub tool_shed_repository: Option<ToolShedRepository>,
}

impl ToolInfo {
    /// Tool shed page for the exact revision, when the tool came from one.
    pub fn citation_url(&self) -> Option<String> {
        self.tool_shed_repository.as_ref().map(|ts| {
            format!(
                "https://{}/view/{}/{}/{}",
                ts.tool_shed, ts.owner, ts.name, ts.changeset_revision
            )
        })
    }
}

/// A step of a workflow as the server sees it after import.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteStep {
    #[serde(default)]
    pub tool_id: Option<String>,
    #[serde(default)]
    pub tool_inputs: Value,
}

/// Server-side view of an imported workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteWorkflow {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Input step id -> label.
    #[serde(default)]
    pub inputs: IndexMap<String, String>,
    #[serde(default)]
    pub steps: IndexMap<String, RemoteStep>,
}

/// Shape of a history item.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactKind {
    Dataset,
    Collection { elements: Vec<Artifact> },
}

/// A dataset or collection visible in a history.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub state: String,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn dataset(id: impl Into<String>, name: Option<&str>, state: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
            state: state.into(),
            kind: ArtifactKind::Dataset,
        }
    }

    pub fn collection(id: impl Into<String>, name: Option<&str>, elements: Vec<Artifact>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
            state: "ok".to_string(),
            kind: ArtifactKind::Collection { elements },
        }
    }
}
