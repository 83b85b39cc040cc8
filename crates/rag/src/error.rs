use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("vector store unavailable at {path:?}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },
    #[error("upstream {service} unavailable: {reason}")]
    UpstreamUnavailable {
        service: &'static str,
        reason: String,
    },
    #[error("query engine misconfigured: {0}")]
    Config(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RagError {
    pub fn storage(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn upstream(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            service,
            reason: format!("{err:#}"),
        }
    }
}
