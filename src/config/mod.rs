//! Configuration Module
//!
//! Operator-supplied files and run settings.
//!
//! - [`credentials`]: Galaxy instance URL and API key lookup
//! - [`read_operator_file`]: inputs, parameters and allowed errors files
//! - [`PollingConfig`]: timing of the wait for a run to finish

pub mod credentials;

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;

use crate::error::{ExecutorError, Result};

pub use credentials::{load_instance, GalaxyInstance, DEFAULT_CREDENTIALS_PATH, DEFAULT_INSTANCE};

/// Timing of the wait for a workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    /// Pause after launching, before the first status check
    pub settle_delay: Duration,
    /// Pause between status checks
    pub poll_interval: Duration,
    /// Wait before re-checking a failed dataset for resubmission
    pub resubmission_grace: Duration,
    pub wait_for_resubmission: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(100),
            poll_interval: Duration::from_secs(10),
            resubmission_grace: Duration::from_secs(20),
            wait_for_resubmission: true,
        }
    }
}

impl PollingConfig {
    /// All waits set to zero.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            resubmission_grace: Duration::ZERO,
            wait_for_resubmission: true,
        }
    }
}

/// Reads an operator file: JSON when the extension is `.json`, YAML otherwise.
///
/// An empty YAML document yields `T::default()`.
pub fn read_operator_file<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let config_error = |message: String| ExecutorError::Config {
        path: path.to_path_buf(),
        message,
    };

    let content = fs::read_to_string(path).map_err(|e| config_error(format!("failed to read file: {}", e)))?;
    debug!("Read {} ({} bytes)", path.display(), content.len());

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).map_err(|e| config_error(format!("invalid JSON: {}", e)))
    } else if content.trim().is_empty() {
        Ok(T::default())
    } else {
        serde_yaml::from_str(&content).map_err(|e| config_error(format!("invalid YAML: {}", e)))
    }
}
