//! Allowed Failures
//!
//! Operators list the steps that may fail without failing the run. Galaxy
//! reports failures per dataset and job, so the step labels are translated
//! to tool ids up front, and datasets are recorded as tolerated once a
//! failure has been matched to one of those tools.
//!
//! # Allowed errors file
//!
//! ```yaml
//! Find variable genes: any
//! Run t-SNE:
//!   - 137
//! ```

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::WorkflowDefinition;

/// Operator-declared permission for a tool to fail.
///
/// The content (`any`, a list of exit codes, …) is kept verbatim; any
/// entry makes every failure of the tool tolerable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct ToleranceSpec(pub Value);

/// Step label -> tolerance, as read from the allowed errors file.
pub type AllowedErrorsByLabel = IndexMap<String, ToleranceSpec>;

/// Tolerated tools, and the datasets confirmed as tolerated failures.
///
/// The dataset set only ever grows.
#[derive(Debug, Clone, Default)]
pub struct AllowedErrorRegistry {
    tools: HashMap<String, ToleranceSpec>,
    datasets: BTreeSet<String>,
}

impl AllowedErrorRegistry {
    /// A registry tolerating nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Translates label-keyed tolerances into tool-keyed ones.
    ///
    /// Only steps carrying both a label and a tool id participate. When
    /// several labels map to the same tool, the last step wins.
    pub fn build(allowed: &AllowedErrorsByLabel, definition: &WorkflowDefinition) -> Self {
        let mut registry = Self::new();

        for (step_id, step) in &definition.steps {
            let (Some(label), Some(tool_id)) = (step.label(), step.tool_id()) else {
                continue;
            };
            if let Some(spec) = allowed.get(label) {
                debug!("Step {} ('{}') may fail: tool {}", step_id, label, tool_id);
                registry.tools.insert(tool_id.to_string(), spec.clone());
            }
        }

        for label in allowed.keys() {
            let matched = definition
                .steps
                .values()
                .any(|step| step.label() == Some(label.as_str()) && step.tool_id().is_some());
            if !matched {
                warn!(
                    "Allowed error label '{}' does not match any tool step in the workflow",
                    label
                );
            }
        }

        registry
    }

    /// Records a dataset as a tolerated failure. Returns true when newly added.
    pub fn confirm_tolerated(&mut self, dataset_id: &str) -> bool {
        self.datasets.insert(dataset_id.to_string())
    }

    pub fn is_tool_tolerated(&self, tool_id: &str) -> bool {
        self.tools.contains_key(tool_id)
    }

    pub fn is_dataset_confirmed_tolerated(&self, dataset_id: &str) -> bool {
        self.datasets.contains(dataset_id)
    }

    /// True when at least one tool may fail.
    pub fn has_tolerances(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Datasets confirmed as tolerated failures so far, in sorted order.
    pub fn tolerated_datasets(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(String::as_str)
    }

    pub fn tolerated_count(&self) -> usize {
        self.datasets.len()
    }
}
