//! Library error types
//!
//! Source failures are not wrapped: the output yields the source's own error
//! value unchanged.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to load a [`SpliceConfig`](crate::SpliceConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
