//! Galaxy Credentials
//!
//! Instances are read from a YAML file mapping an instance name to its URL
//! and API key, or to the name of another instance:
//!
//! ```yaml
//! __default: embassy
//! embassy:
//!   url: https://galaxy.example.org
//!   key: 0123456789abcdef
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::{ExecutorError, Result};

/// Instance used when none is named.
pub const DEFAULT_INSTANCE: &str = "__default";

/// Lazily-resolved default credentials location, under the user's home.
pub static DEFAULT_CREDENTIALS_PATH: Lazy<PathBuf> =
    Lazy::new(|| expand_home(Path::new("~/.parsec/creds.yml")));

/// Connection details of one Galaxy instance.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GalaxyInstance {
    pub url: String,
    pub key: String,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum InstanceEntry {
    Alias(String),
    Instance(GalaxyInstance),
}

/// Expands a leading `~` using `HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Loads the named instance (or the default one) from a credentials file.
///
/// An entry may name another instance instead of holding credentials; one
/// level of aliasing is followed.
pub fn load_instance(path: &Path, name: Option<&str>) -> Result<GalaxyInstance> {
    let path = expand_home(path);
    let content = fs::read_to_string(&path).map_err(|e| ExecutorError::Config {
        path: path.clone(),
        message: format!("failed to read credentials: {}", e),
    })?;
    let entries: HashMap<String, InstanceEntry> =
        serde_yaml::from_str(&content).map_err(|e| ExecutorError::Config {
            path: path.clone(),
            message: format!("invalid credentials file: {}", e),
        })?;

    let name = name.unwrap_or(DEFAULT_INSTANCE);
    let unknown = |name: &str| ExecutorError::UnknownInstance {
        name: name.to_string(),
        path: path.clone(),
    };

    let instance = match entries.get(name).ok_or_else(|| unknown(name))? {
        InstanceEntry::Instance(instance) => instance,
        InstanceEntry::Alias(target) => {
            debug!("Instance '{}' is an alias for '{}'", name, target);
            match entries.get(target.as_str()) {
                Some(InstanceEntry::Instance(instance)) => instance,
                _ => return Err(unknown(target.as_str())),
            }
        }
    };

    info!("Using Galaxy instance '{}' at {}", name, instance.url);
    Ok(instance.clone())
}
