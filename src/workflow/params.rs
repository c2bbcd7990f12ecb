//! Parameter Template Generation
//!
//! Produces a starting parameters file for a workflow: one block per
//! labeled step, holding the tool inputs the server reports for it.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde_json::{Map, Value};

use super::model::WorkflowDefinition;
use crate::error::{ExecutorError, Result};
use crate::galaxy::RemoteWorkflow;

/// Builds `label -> tool_inputs` for every labeled step.
///
/// Keys come out sorted. Steps the server does not know about get an empty
/// block.
pub fn generate_parameter_template(definition: &WorkflowDefinition, remote: &RemoteWorkflow) -> Value {
    let mut entries: Vec<(String, Value)> = definition
        .steps
        .iter()
        .filter_map(|(step_id, step)| {
            let label = step.label()?;
            let inputs = remote
                .steps
                .get(step_id)
                .map(|s| s.tool_inputs.clone())
                .filter(|v| !v.is_null())
                .unwrap_or_else(|| Value::Object(Map::new()));
            Some((label.to_string(), inputs))
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    Value::Object(entries.into_iter().collect())
}

/// Writes the template as `<dir>/<name>.json` and returns its path.
pub fn write_parameter_template(template: &Value, dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(format!("{}.json", name));
    let json = serde_json::to_string_pretty(template).map_err(|e| ExecutorError::Config {
        path: path.clone(),
        message: e.to_string(),
    })?;
    fs::write(&path, json)?;
    info!("parameter output file: {}", path.display());
    Ok(path)
}
