//! Result Retrieval
//!
//! Downloads every visible dataset of the results history, descending into
//! collections. Failures that were accepted as tolerated are skipped.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::allowed::AllowedErrorRegistry;
use crate::error::{ExecutorError, Result};
use crate::galaxy::{Artifact, ArtifactKind, GalaxyApi};

/// Downloads the contents of `session_id` into `output_dir`.
///
/// With `prefer_remote_names`, files are named after the remote dataset
/// unless the name is missing or was already used by this call; otherwise
/// the server picks the filename.
pub fn download_all<C: GalaxyApi + ?Sized>(
    client: &C,
    session_id: &str,
    output_dir: &Path,
    registry: &AllowedErrorRegistry,
    prefer_remote_names: bool,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;

    let contents = client
        .list_session_contents(session_id)
        .map_err(ExecutorError::remote("list_session_contents"))?;

    let mut retriever = Retriever {
        client,
        output_dir,
        registry,
        prefer_remote_names,
        used_names: HashSet::new(),
        downloaded: Vec::new(),
    };
    for artifact in &contents {
        retriever.fetch(artifact)?;
    }

    info!(
        "Downloaded {} file(s) to {}",
        retriever.downloaded.len(),
        output_dir.display()
    );
    Ok(retriever.downloaded)
}

struct Retriever<'a, C: GalaxyApi + ?Sized> {
    client: &'a C,
    output_dir: &'a Path,
    registry: &'a AllowedErrorRegistry,
    prefer_remote_names: bool,
    used_names: HashSet<String>,
    downloaded: Vec<PathBuf>,
}

impl<C: GalaxyApi + ?Sized> Retriever<'_, C> {
    fn fetch(&mut self, artifact: &Artifact) -> Result<()> {
        match &artifact.kind {
            ArtifactKind::Collection { elements } => {
                debug!("Descending into collection {}", artifact.id);
                for element in elements {
                    self.fetch(element)?;
                }
                Ok(())
            }
            ArtifactKind::Dataset => self.fetch_dataset(artifact),
        }
    }

    fn fetch_dataset(&mut self, artifact: &Artifact) -> Result<()> {
        if artifact.state == "error" && self.registry.is_dataset_confirmed_tolerated(&artifact.id) {
            info!("Skipping download of {} as it is an allowed failure.", artifact.id);
            return Ok(());
        }

        let remote_name = artifact
            .name
            .as_deref()
            .map(sanitize_file_name)
            .filter(|name| self.prefer_remote_names && !name.is_empty());

        let path = match remote_name {
            Some(name) if self.used_names.insert(name.clone()) => self
                .client
                .download(&artifact.id, &self.output_dir.join(&name), false),
            _ => self.client.download(&artifact.id, self.output_dir, true),
        }
        .map_err(ExecutorError::remote("download"))?;

        debug!("Downloaded {} to {}", artifact.id, path.display());
        self.downloaded.push(path);
        Ok(())
    }
}

/// Makes a remote dataset name safe to use as a single path component.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "." | ".." => String::new(),
        _ => cleaned,
    }
}
