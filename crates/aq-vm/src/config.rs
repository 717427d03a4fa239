//! VM configuration

use crate::error::VmError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default call nesting limit
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Default cap on array elements and string bytes a program may allocate
pub const DEFAULT_MAX_OBJECT_LEN: usize = 1 << 24;

/// Settings of one VM instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Directory `~file~class` modules are read from
    pub module_dir: PathBuf,
    /// Deepest allowed call nesting
    pub max_call_depth: usize,
    /// Largest array (elements) or string (bytes) an instruction may build
    pub max_object_len: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            module_dir: PathBuf::from("."),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_object_len: DEFAULT_MAX_OBJECT_LEN,
        }
    }
}

impl VmConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self, VmError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a JSON config file
    pub fn from_file(path: &Path) -> Result<Self, VmError> {
        let text = std::fs::read_to_string(path).map_err(|source| VmError::Io {
            name: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }
}
