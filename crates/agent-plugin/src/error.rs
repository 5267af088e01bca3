//! Error taxonomy for a reconciliation pass.

use std::path::PathBuf;

/// Fatal failures of a single plugin unit. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(
        "no client config file is defined, so the agent plugin directory cannot be derived; \
         when running standalone (solo) set an explicit `path` for plugin '{name}'"
    )]
    ConfigDirectoryUnresolvable { name: String },

    #[error("source '{reference}' for plugin '{name}' is unavailable: {source}")]
    SourceUnavailable {
        name: String,
        reference: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("agent facts: {0}")]
    Facts(String),

    #[error("invalid plugin declaration: {0}")]
    Declaration(String),
}

/// Discriminant of [`DeployError`], carried by failed units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigDirectoryUnresolvable,
    SourceUnavailable,
    WriteFailure,
    Facts,
    Declaration,
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::ConfigDirectoryUnresolvable { .. } => ErrorKind::ConfigDirectoryUnresolvable,
            DeployError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            DeployError::WriteFailure { .. } => ErrorKind::WriteFailure,
            DeployError::Facts(_) => ErrorKind::Facts,
            DeployError::Declaration(_) => ErrorKind::Declaration,
        }
    }

    pub(crate) fn write_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::WriteFailure {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
