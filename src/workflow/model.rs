//! Workflow Data Model
//!
//! Data structures describing a Galaxy workflow export and the operator
//! files that configure a run.
//!
//! # Example workflow export (abridged)
//!
//! ```json
//! {
//!   "name": "scanpy clustering",
//!   "steps": {
//!     "0": { "label": "matrix", "type": "data_input", "tool_id": null },
//!     "1": { "label": "genes", "type": "data_input", "tool_id": null },
//!     "2": {
//!       "label": "Filter cells",
//!       "type": "tool",
//!       "tool_id": "toolshed.g2.bx.psu.edu/repos/ebi-gxa/scanpy_filter_cells/scanpy_filter_cells/1.8.1"
//!     }
//!   }
//! }
//! ```

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ExecutorError, Result};

/// Step label -> tool parameter block (or bare scalar, see
/// [`reclassify_scalar_parameters`](crate::workflow::binder::reclassify_scalar_parameters)).
pub type ParameterSet = IndexMap<String, Value>;

/// Input label -> input description as written by the operator.
///
/// Recognised shapes are `{path, type}`, `{dataset_id}`, `{collection_id}`
/// or a bare scalar.
pub type InputSpecSet = IndexMap<String, Value>;

/// Kind of a workflow step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    DataInput,
    DataCollectionInput,
    ParameterInput,
    Tool,
    Subworkflow,
    Pause,
    #[serde(other)]
    Other,
}

/// A single step of a workflow export.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    /// Human-readable label; the only handle operators have on a step
    #[serde(default)]
    pub label: Option<String>,

    #[serde(rename = "type")]
    pub kind: StepKind,

    /// Tool run by this step (absent for inputs)
    #[serde(default)]
    pub tool_id: Option<String>,
}

impl WorkflowStep {
    pub fn new(kind: StepKind, label: Option<&str>, tool_id: Option<&str>) -> Self {
        Self {
            label: label.map(str::to_string),
            kind,
            tool_id: tool_id.map(str::to_string),
        }
    }

    /// Label, treating an empty string as no label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref().filter(|l| !l.is_empty())
    }

    pub fn tool_id(&self) -> Option<&str> {
        self.tool_id.as_deref().filter(|t| !t.is_empty())
    }
}

/// A workflow definition as exported from Galaxy.
///
/// Steps keep the order of the export. The raw document is retained so the
/// exact export can be imported on the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub name: Option<String>,

    /// Step id -> step
    pub steps: IndexMap<String, WorkflowStep>,

    #[serde(skip)]
    raw: Value,
}

impl WorkflowDefinition {
    /// Builds a definition from its steps (no raw document).
    pub fn from_steps<I, K>(steps: I) -> Self
    where
        I: IntoIterator<Item = (K, WorkflowStep)>,
        K: Into<String>,
    {
        Self {
            name: None,
            steps: steps.into_iter().map(|(id, step)| (id.into(), step)).collect(),
            raw: Value::Null,
        }
    }

    /// Parses an exported workflow document.
    pub fn from_json(raw: Value) -> std::result::Result<Self, serde_json::Error> {
        let mut definition: WorkflowDefinition = serde_json::from_value(raw.clone())?;
        definition.raw = raw;
        Ok(definition)
    }

    /// The document the definition was parsed from.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Iterates over `(step_id, step)` pairs of a given kind.
    pub fn steps_of_kind<'a>(&'a self, kind: &'a StepKind) -> impl Iterator<Item = (&'a str, &'a WorkflowStep)> {
        self.steps
            .iter()
            .filter(move |(_, step)| &step.kind == kind)
            .map(|(id, step)| (id.as_str(), step))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Loads a workflow export (`.ga` JSON) from disk.
pub fn load_workflow_definition(path: &Path) -> Result<WorkflowDefinition> {
    info!("Loading workflow definition from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| ExecutorError::Config {
        path: path.to_path_buf(),
        message: format!("failed to read workflow file: {}", e),
    })?;
    debug!("Workflow document loaded ({} bytes)", content.len());

    let raw: Value = serde_json::from_str(&content).map_err(|e| ExecutorError::Config {
        path: path.to_path_buf(),
        message: format!("workflow file is not valid JSON: {}", e),
    })?;

    let definition = WorkflowDefinition::from_json(raw).map_err(|e| ExecutorError::Config {
        path: path.to_path_buf(),
        message: format!("not a Galaxy workflow export: {}", e),
    })?;

    info!(
        "Parsed workflow '{}' with {} steps",
        definition.name.as_deref().unwrap_or("unnamed"),
        definition.len()
    );
    Ok(definition)
}
