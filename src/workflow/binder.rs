//! Input and Parameter Binding
//!
//! Turns the operator's label-keyed input and parameter files into the
//! step-id-keyed maps an invocation needs. Uploads happen here; every other
//! input shape is a pure translation.
//!
//! # Inputs file
//!
//! ```yaml
//! matrix:
//!   path: /data/E-MTAB-101/matrix.mtx
//!   type: mtx
//! genes:
//!   dataset_id: f2db41e1fa331b3e
//! cells:
//!   collection_id: 33b43b4e7093c91f
//! n_neighbours: 15
//! ```

use std::path::PathBuf;

use indexmap::IndexMap;
use log::{debug, info, warn};
use serde_json::Value;

use super::labels::resolve_steps_for_label;
use super::model::{InputSpecSet, ParameterSet, WorkflowDefinition};
use crate::error::{ExecutorError, Result};
use crate::galaxy::{ApiError, GalaxyApi, InputBinding, InputMap, ParameterMap, Session, SourceKind};

/// Delimiter Galaxy uses for fields nested in a repeat or section.
const GROUPING_DELIMITER: char = '|';

/// Recognised shape of one inputs-file entry.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSpec {
    /// Local file to upload
    Upload { path: PathBuf, file_type: String },
    /// Dataset already on the server
    Dataset(String),
    /// Collection already on the server
    Collection(String),
    /// Plain value for a parameter input
    Literal(Value),
}

/// Reads an id field, accepting numbers that YAML may have produced.
fn id_field(entry: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Classifies an inputs-file entry.
///
/// Priority: `path` + `type`, then `dataset_id`, then `collection_id`, then
/// any non-mapping value as a literal. `None` when nothing matches (a
/// mapping of some other shape, or an empty value).
pub fn classify_input(value: &Value) -> Option<InputSpec> {
    match value {
        Value::Object(entry) => {
            let path = entry.get("path").and_then(Value::as_str);
            let file_type = entry.get("type").and_then(Value::as_str);
            if let (Some(path), Some(file_type)) = (path, file_type) {
                return Some(InputSpec::Upload {
                    path: PathBuf::from(path),
                    file_type: file_type.to_string(),
                });
            }
            if let Some(id) = id_field(entry, "dataset_id") {
                return Some(InputSpec::Dataset(id));
            }
            id_field(entry, "collection_id").map(InputSpec::Collection)
        }
        Value::Null => None,
        scalar => Some(InputSpec::Literal(scalar.clone())),
    }
}

/// Moves scalar parameter entries into the inputs.
///
/// A parameter value that is not a mapping is a workflow parameter input,
/// not a tool parameter block. An input entry with the same label takes
/// precedence. Returns how many entries were moved.
pub fn reclassify_scalar_parameters(parameters: &mut ParameterSet, inputs: &mut InputSpecSet) -> usize {
    let scalar_labels: Vec<String> = parameters
        .iter()
        .filter(|(_, value)| !value.is_object())
        .map(|(label, _)| label.clone())
        .collect();

    let mut moved = 0;
    for label in &scalar_labels {
        let Some(value) = parameters.shift_remove(label) else {
            continue;
        };
        if inputs.contains_key(label) {
            warn!(
                "'{}' is given both as a simple parameter and as an input; keeping the input entry",
                label
            );
            continue;
        }
        debug!("Treating scalar parameter '{}' as a simple input", label);
        inputs.insert(label.clone(), value);
        moved += 1;
    }
    moved
}

/// Checks that every `path` entry points at an existing file.
pub fn validate_input_files_exist(inputs: &InputSpecSet) -> Result<()> {
    for (label, value) in inputs {
        if let Some(InputSpec::Upload { path, .. }) = classify_input(value) {
            if !path.is_file() {
                return Err(ExecutorError::MissingInputFile {
                    label: label.clone(),
                    path,
                });
            }
        }
    }
    Ok(())
}

/// Checks that every `dataset_id` entry exists on the server.
pub fn validate_dataset_ids_exist<C: GalaxyApi + ?Sized>(client: &C, inputs: &InputSpecSet) -> Result<()> {
    let mut warned = false;
    for (label, value) in inputs {
        let Some(InputSpec::Dataset(dataset_id)) = classify_input(value) else {
            continue;
        };
        if !warned {
            warn!("You are using direct dataset identifiers for inputs, this execution is not portable across instances");
            warned = true;
        }
        match client.get_dataset(&dataset_id) {
            Ok(_) => {}
            Err(ApiError::Status { status, .. }) if (400..500).contains(&status) => {
                return Err(ExecutorError::UnknownDataset {
                    label: label.clone(),
                    dataset_id,
                });
            }
            Err(e) => return Err(ExecutorError::remote("get_dataset")(e)),
        }
    }
    Ok(())
}

/// Binds every declared workflow input to a value.
///
/// `workflow_inputs` maps input step id to label, as reported by the server
/// for the imported workflow. Files are uploaded into `session`.
pub fn bind<C: GalaxyApi + ?Sized>(
    client: &C,
    workflow_inputs: &IndexMap<String, String>,
    inputs: &InputSpecSet,
    session: Option<&Session>,
) -> Result<InputMap> {
    let mut bound = InputMap::new();

    for (step_id, label) in workflow_inputs {
        let unresolved = |reason: &str| ExecutorError::UnresolvedInput {
            label: label.clone(),
            reason: reason.to_string(),
        };

        let entry = inputs
            .get(label)
            .ok_or_else(|| unresolved("label is not present in the inputs file"))?;

        let spec = classify_input(entry).ok_or_else(|| {
            unresolved("entry has none of path+type, dataset_id, collection_id, or a plain value")
        })?;

        let binding = match spec {
            InputSpec::Upload { path, file_type } => {
                let session =
                    session.ok_or_else(|| unresolved("a file upload needs a session, but none was created"))?;
                info!("Uploading {} as '{}' ({})", path.display(), label, file_type);
                let artifact = client
                    .upload(&session.id, &path, label, &file_type)
                    .map_err(ExecutorError::remote("upload"))?;
                InputBinding::Artifact {
                    id: artifact.id,
                    source: SourceKind::Uploaded,
                }
            }
            InputSpec::Dataset(id) => InputBinding::Artifact {
                id,
                source: SourceKind::ExistingDataset,
            },
            InputSpec::Collection(id) => InputBinding::Artifact {
                id,
                source: SourceKind::ExistingCollection,
            },
            InputSpec::Literal(value) => InputBinding::Literal { value },
        };

        debug!("Input step {} ('{}') bound to {:?}", step_id, label, binding);
        bound.insert(step_id.clone(), binding);
    }

    Ok(bound)
}

/// Maps label-keyed parameter blocks onto step ids.
///
/// Labels shared by several steps apply to each of them. Keys that address
/// a repeat element (`name_0|field`) only trigger a warning: the workflow
/// must already declare that many repeat entries.
pub fn bind_parameters(definition: &WorkflowDefinition, parameters: &ParameterSet) -> ParameterMap {
    let mut bound = ParameterMap::new();

    for (label, value) in parameters {
        for step_id in resolve_steps_for_label(definition, label) {
            bound.insert(step_id, value.clone());
        }

        if let Some(block) = value.as_object() {
            if let Some(key) = block.keys().find(|k| k.contains(GROUPING_DELIMITER)) {
                warn!(
                    "Workflow using Galaxy <repeat /> param. type for {} / {}. \
                     Make sure that workflow has as many entities of that repeat \
                     as they are being set in the parameters file.",
                    label, key
                );
            }
        }
    }

    bound
}
