use crate::core::state_machine::IdeaState;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: IdeaState, to: IdeaState },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Persistence error: {0}")]
    PersistenceError(String),
    #[error("Provisioning failed for idea {idea_id}: {reason}")]
    ProvisioningError { idea_id: String, reason: String },
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl PipelineError {
    /// Errors the caller can fix by changing the request rather than retrying it.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::InvalidTransition { .. } | Self::ValidationError(_)
        )
    }

    /// Storage-level failures, whether raised by us or bubbled up from SQLite.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::RusqliteError(_))
    }
}
