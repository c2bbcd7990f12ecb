//! Step Label Resolution
//!
//! Operators refer to workflow steps by label; Galaxy refers to them by
//! step id. This module maps one to the other and checks that operator
//! files only mention labels the workflow actually has.
//!
//! A label shared by several steps resolves to all of them. The resolver
//! warns when that happens, and callers apply the value to every match.

use std::collections::BTreeSet;

use log::{debug, info, warn};

use super::binder::{classify_input, InputSpec};
use super::model::{InputSpecSet, ParameterSet, StepKind, WorkflowDefinition};
use crate::error::{ExecutorError, Result};

/// Returns the ids of all steps labeled exactly `label`.
///
/// An empty set means no step carries the label; whether that is fatal is
/// up to the caller.
pub fn resolve_steps_for_label(definition: &WorkflowDefinition, label: &str) -> BTreeSet<String> {
    let steps: BTreeSet<String> = definition
        .steps
        .iter()
        .filter(|(_, step)| step.label() == Some(label))
        .map(|(id, _)| id.clone())
        .collect();

    if steps.len() > 1 {
        warn!(
            "Label '{}' is shared by steps {:?}; values will apply to all of them",
            label, steps
        );
    }
    steps
}

/// Checks that every label in the parameter set names a workflow step.
///
/// Unlabeled steps are reported as warnings: they simply cannot receive
/// parameters.
pub fn validate_all_parameter_labels_exist(
    definition: &WorkflowDefinition,
    parameters: &ParameterSet,
) -> Result<()> {
    for (step_id, step) in &definition.steps {
        if step.label().is_none() {
            warn!(
                "Step No {} in workflow does not have a label, parameters are not mappable there",
                step_id
            );
        }
    }

    for label in parameters.keys() {
        if resolve_steps_for_label(definition, label).is_empty() {
            return Err(ExecutorError::UnknownStepLabel {
                label: label.clone(),
            });
        }
        debug!("Parameter label '{}' found in workflow", label);
    }

    info!("Validation of labels: OK");
    Ok(())
}

/// Step kinds that receive a value from the inputs file.
const INPUT_KINDS: [StepKind; 3] = [
    StepKind::DataInput,
    StepKind::DataCollectionInput,
    StepKind::ParameterInput,
];

/// Checks that every input step is labeled and has a usable input entry.
///
/// Data and collection inputs need a file to upload or a server-side id;
/// parameter inputs accept any non-null value. Returns the number of data
/// input steps, so callers can skip uploads entirely when there are none.
pub fn validate_all_input_labels_present(
    definition: &WorkflowDefinition,
    inputs: &InputSpecSet,
) -> Result<usize> {
    let mut count = 0;

    for kind in &INPUT_KINDS {
        for (step_id, step) in definition.steps_of_kind(kind) {
            if *kind == StepKind::DataInput {
                count += 1;
            }

            let label = step.label().ok_or_else(|| ExecutorError::MissingInputLabel {
                step_id: step_id.to_string(),
            })?;

            let entry = inputs.get(label).ok_or_else(|| ExecutorError::UnboundInput {
                step_id: step_id.to_string(),
                label: label.to_string(),
            })?;

            let unresolved = |reason: &str| ExecutorError::UnresolvedInput {
                label: label.to_string(),
                reason: reason.to_string(),
            };
            match (kind, classify_input(entry)) {
                (_, None) => {
                    return Err(unresolved(
                        "entry has none of path+type, dataset_id, collection_id, or a plain value",
                    ))
                }
                (StepKind::ParameterInput, Some(_)) => {}
                (_, Some(InputSpec::Literal(_))) => {
                    return Err(unresolved("a dataset input needs path+type, dataset_id or collection_id"))
                }
                (_, Some(_)) => {}
            }
        }
    }

    info!("Workflow declares {} data input(s), all bound", count);
    Ok(count)
}
