//! Output configuration
//!
//! Loaded from TOML, e.g.
//!
//! ```toml
//! max_bytes = 1048576
//! terminate_on_error = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::ConfigError;

/// Construction options for a [`QueuedStream`](crate::QueuedStream)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpliceConfig {
    /// Global forwarding cap across all segments (None or 0 = unbounded)
    pub max_bytes: Option<u64>,
    /// End the output after delivering a source failure. When false the
    /// output goes idle instead and keeps its queue.
    pub terminate_on_error: bool,
}

impl Default for SpliceConfig {
    fn default() -> Self {
        Self {
            max_bytes: None,
            terminate_on_error: true,
        }
    }
}

impl SpliceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_terminate_on_error(mut self, terminate: bool) -> Self {
        self.terminate_on_error = terminate;
        self
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading splice config from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }
}
