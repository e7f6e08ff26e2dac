use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("malformed TOML in {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// File the error came from, if it came from one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => Some(path.as_path()),
            ConfigError::Invalid(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
