//! Tool Versions Report
//!
//! Writes a TSV listing every tool a workflow runs, with its version and
//! tool shed citation, for inclusion alongside the results.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use super::model::WorkflowDefinition;
use crate::error::{ExecutorError, Result};
use crate::galaxy::GalaxyApi;

const HEADER: [&str; 4] = ["Analysis", "Software", "Version", "Citation"];

/// Writes the versions report for `definition` to `path`.
///
/// Each tool appears once. Rows use the step label, or the tool name for
/// unlabeled steps.
pub fn write_versions_file<C: GalaxyApi + ?Sized>(
    client: &C,
    definition: &WorkflowDefinition,
    path: &Path,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", HEADER.join("\t"))?;

    let mut steps: Vec<_> = definition.steps.iter().collect();
    steps.sort_by(|a, b| b.0.cmp(a.0));

    let mut seen: HashSet<&str> = HashSet::new();
    for (_, step) in steps {
        let Some(tool_id) = step.tool_id() else {
            continue;
        };
        if !seen.insert(tool_id) {
            continue;
        }

        let tool = client.get_tool(tool_id).map_err(ExecutorError::remote("get_tool"))?;
        let label = step.label().unwrap_or(&tool.name);
        let citation = tool.citation_url().unwrap_or_default();
        writeln!(out, "{}\t{}\t{}\t{}", label, tool.name, tool.version, citation)?;
    }

    out.flush()?;
    info!("Tool versions written to {}", path.display());
    Ok(())
}
