//! Execution State Persistence
//!
//! Checkpoints the remote resources a run has created so an interrupted run
//! can resume without re-importing, re-uploading or re-invoking.
//!
//! The checkpoint is a JSON document:
//!
//! ```json
//! {
//!   "format": "wfexecutor-checkpoint",
//!   "version": 1,
//!   "saved_at": "2024-05-02T10:11:12Z",
//!   "workflow": { "id": "f2db41e1fa331b3e" },
//!   "session": { "id": "1cd8e2f6b131e891", "name": "E-MTAB-101" },
//!   "input_map": { "0": { "kind": "artifact", "id": "…", "source": "uploaded" } },
//!   "parameters": { "2": { "min_genes": 200 } },
//!   "invocation": null
//! }
//! ```
//!
//! Every save overwrites the whole document.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, Result};
use crate::galaxy::{InputMap, Invocation, ParameterMap, Session, WorkflowHandle};

/// Value of the `format` tag identifying a checkpoint document.
pub const CHECKPOINT_FORMAT: &str = "wfexecutor-checkpoint";

/// Schema version written by this build.
pub const CHECKPOINT_VERSION: u32 = 1;

/// On-disk form of [`ExecutionState`].
#[derive(Serialize, Deserialize)]
struct Checkpoint {
    format: String,
    version: u32,
    saved_at: DateTime<Utc>,
    #[serde(default)]
    workflow: Option<WorkflowHandle>,
    #[serde(default)]
    session: Option<Session>,
    #[serde(default)]
    input_map: Option<InputMap>,
    #[serde(default)]
    parameters: Option<ParameterMap>,
    #[serde(default)]
    invocation: Option<Invocation>,
}

/// Resume point of a workflow run.
///
/// Each field is filled once, by the phase that produces it, and only read
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionState {
    path: PathBuf,

    /// Workflow imported for this run
    pub workflow: Option<WorkflowHandle>,

    /// History holding the uploaded inputs
    pub session: Option<Session>,

    /// Inputs bound to workflow input steps
    pub input_map: Option<InputMap>,

    /// Parameters bound to tool steps
    pub parameters: Option<ParameterMap>,

    /// The launched run
    pub invocation: Option<Invocation>,
}

impl ExecutionState {
    /// Creates an empty state bound to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            workflow: None,
            session: None,
            input_map: None,
            parameters: None,
            invocation: None,
        }
    }

    /// Loads the checkpoint at `path`, or starts fresh.
    ///
    /// A missing file is a normal fresh start. An unreadable, empty or
    /// foreign file is logged as a warning and also yields a fresh state.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        if !path.exists() {
            info!("No checkpoint at {}, starting fresh", path.display());
            return Self::new(path);
        }

        match Self::read_checkpoint(&path) {
            Ok(state) => {
                info!("Resuming from checkpoint {}", path.display());
                state
            }
            Err(reason) => {
                let err = ExecutorError::CorruptCheckpoint {
                    path: path.clone(),
                    reason,
                };
                warn!("{}. Starting fresh.", err);
                Self::new(path)
            }
        }
    }

    fn read_checkpoint(path: &Path) -> std::result::Result<Self, String> {
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        if content.trim().is_empty() {
            return Err("file is empty".to_string());
        }

        let checkpoint: Checkpoint = serde_json::from_str(&content)
            .map_err(|e| format!("not an execution checkpoint ({})", e))?;

        if checkpoint.format != CHECKPOINT_FORMAT {
            return Err(format!("unexpected format tag '{}'", checkpoint.format));
        }
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(format!(
                "unsupported checkpoint version {} (expected {})",
                checkpoint.version, CHECKPOINT_VERSION
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            workflow: checkpoint.workflow,
            session: checkpoint.session,
            input_map: checkpoint.input_map,
            parameters: checkpoint.parameters,
            invocation: checkpoint.invocation,
        })
    }

    /// Writes the full state to the checkpoint path.
    ///
    /// The document goes to a sibling temporary file first and is then
    /// renamed over the checkpoint, so readers never see a partial write.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let checkpoint = Checkpoint {
            format: CHECKPOINT_FORMAT.to_string(),
            version: CHECKPOINT_VERSION,
            saved_at: Utc::now(),
            workflow: self.workflow.clone(),
            session: self.session.clone(),
            input_map: self.input_map.clone(),
            parameters: self.parameters.clone(),
            invocation: self.invocation.clone(),
        };
        let json = serde_json::to_string_pretty(&checkpoint).map_err(|e| ExecutorError::Config {
            path: self.path.clone(),
            message: format!("could not serialise checkpoint: {}", e),
        })?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        info!("Saved execution state to {}", self.path.display());
        Ok(())
    }

    /// Removes the checkpoint at `path`, if any.
    pub fn clear(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)?;
            info!("Deleted checkpoint: {}", path.display());
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when a previous run already produced something.
    pub fn is_resume(&self) -> bool {
        self.workflow.is_some()
            || self.session.is_some()
            || self.input_map.is_some()
            || self.parameters.is_some()
            || self.invocation.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::galaxy::{InputBinding, SourceKind};
    use serde_json::json;
    use tempfile::tempdir;

    fn populated(path: &Path) -> ExecutionState {
        let mut state = ExecutionState::new(path);
        state.workflow = Some(WorkflowHandle {
            id: "wf1".to_string(),
            name: Some("clustering".to_string()),
        });
        state.session = Some(Session {
            id: "hist1".to_string(),
            name: "E-MTAB-101".to_string(),
        });
        let mut inputs = InputMap::new();
        inputs.insert(
            "0".to_string(),
            InputBinding::Artifact {
                id: "d1".to_string(),
                source: SourceKind::Uploaded,
            },
        );
        inputs.insert(
            "1".to_string(),
            InputBinding::Artifact {
                id: "c1".to_string(),
                source: SourceKind::ExistingCollection,
            },
        );
        inputs.insert("2".to_string(), InputBinding::Literal { value: json!(0.8) });
        state.input_map = Some(inputs);
        let mut parameters = ParameterMap::new();
        parameters.insert(
            "3".to_string(),
            json!({"min_genes": 200, "filter": {"max": [1, 2]}}),
        );
        state.parameters = Some(parameters);
        state.invocation = Some(Invocation {
            id: "inv1".to_string(),
            session_id: "hist2".to_string(),
            workflow_id: "wf1".to_string(),
        });
        state
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = ExecutionState::new("state.json");
        assert!(state.session.is_none());
        assert!(state.input_map.is_none());
        assert!(!state.is_resume());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = populated(&path);

        state.save().unwrap();
        let loaded = ExecutionState::load(&path);

        assert_eq!(loaded, state);
        assert!(loaded.is_resume());
    }

    #[test]
    fn test_partial_state_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = ExecutionState::new(&path);
        state.session = Some(Session {
            id: "hist1".to_string(),
            name: "run".to_string(),
        });

        state.save().unwrap();
        let loaded = ExecutionState::load(&path);

        assert_eq!(loaded.session, state.session);
        assert!(loaded.input_map.is_none());
        assert!(loaded.invocation.is_none());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = populated(&path);
        state.save().unwrap();

        state.invocation = None;
        state.save().unwrap();

        assert!(ExecutionState::load(&path).invocation.is_none());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_save_creates_parent_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        ExecutionState::new(&path).save().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_load_missing_is_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let state = ExecutionState::load(&path);
        assert!(!state.is_resume());
        assert_eq!(state.path(), path.as_path());
    }

    #[test]
    fn test_load_empty_file_is_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "").unwrap();
        assert!(!ExecutionState::load(&path).is_resume());
    }

    #[test]
    fn test_load_malformed_is_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, [0x80u8, 0x04, 0x95, 0x00, 0xff]).unwrap();
        assert!(!ExecutionState::load(&path).is_resume());
    }

    #[test]
    fn test_load_foreign_json_is_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"completed_steps": ["a"], "failed_step": null}"#).unwrap();
        assert!(!ExecutionState::load(&path).is_resume());
    }

    #[test]
    fn test_load_wrong_format_tag_is_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let doc = json!({
            "format": "something-else",
            "version": 1,
            "saved_at": "2024-01-01T00:00:00Z",
            "session": {"id": "h", "name": "n"}
        });
        fs::write(&path, doc.to_string()).unwrap();
        assert!(!ExecutionState::load(&path).is_resume());
    }

    #[test]
    fn test_load_future_version_is_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let doc = json!({
            "format": CHECKPOINT_FORMAT,
            "version": CHECKPOINT_VERSION + 1,
            "saved_at": "2024-01-01T00:00:00Z",
            "session": {"id": "h", "name": "n"}
        });
        fs::write(&path, doc.to_string()).unwrap();
        assert!(!ExecutionState::load(&path).is_resume());
    }

    #[test]
    fn test_clear_removes_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        populated(&path).save().unwrap();

        ExecutionState::clear(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_clear_missing_is_ok() {
        assert!(ExecutionState::clear(Path::new("/nonexistent/state.json")).is_ok());
    }

    #[test]
    fn test_instances_do_not_share_fields() {
        let mut first = ExecutionState::new("a.json");
        let second = ExecutionState::new("b.json");
        first.parameters = Some(ParameterMap::new());
        assert!(second.parameters.is_none());
    }
}
