use std::time::Duration;

use isaac_rag::RagError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("input incomplete: {0}")]
    InputIncomplete(String),
    #[error("vector store unavailable: {0}")]
    StorageUnavailable(String),
    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("compliance check returned no usable text")]
    MalformedCompliance,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("query cancelled by reset")]
    Cancelled,
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<RagError> for WorkflowError {
    fn from(value: RagError) -> Self {
        match value {
            RagError::StorageUnavailable { .. } => Self::StorageUnavailable(value.to_string()),
            RagError::UpstreamUnavailable { .. } => Self::UpstreamUnavailable(value.to_string()),
            RagError::Config(msg) => Self::Config(msg),
            RagError::InvalidInput(msg) => Self::InvalidInput(msg),
        }
    }
}

impl WorkflowError {
    /// Text placed in the output box of the step that failed.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::InputIncomplete(msg) => format!("Input incomplete: {msg}"),
            WorkflowError::Timeout(_) => {
                format!("Error: {self}. The model did not answer in time; try again.")
            }
            _ => format!("Error: {self}"),
        }
    }

    /// Failures of the backing services, as opposed to problems with the
    /// session's own state.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            WorkflowError::StorageUnavailable(_)
                | WorkflowError::UpstreamUnavailable(_)
                | WorkflowError::Timeout(_)
        )
    }
}
