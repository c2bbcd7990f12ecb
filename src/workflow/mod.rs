//! Workflow Definition Module
//!
//! Everything that happens before a workflow is launched: reading the
//! workflow export, resolving step labels, and binding the operator's
//! inputs and parameters.
//!
//! # Structure
//!
//! - [`model`]: Workflow export and operator file types
//! - [`labels`]: Label to step id resolution and label validation
//! - [`binder`]: Input and parameter binding
//! - [`params`]: Parameter template generation
//! - [`versions`]: Tool versions report

pub mod binder;
pub mod labels;
pub mod model;
pub mod params;
pub mod versions;

pub use binder::{
    bind, bind_parameters, classify_input, reclassify_scalar_parameters, validate_dataset_ids_exist,
    validate_input_files_exist, InputSpec,
};
pub use labels::{
    resolve_steps_for_label, validate_all_input_labels_present, validate_all_parameter_labels_exist,
};
pub use model::{load_workflow_definition, InputSpecSet, ParameterSet, StepKind, WorkflowDefinition, WorkflowStep};
pub use params::{generate_parameter_template, write_parameter_template};
pub use versions::write_versions_file;
