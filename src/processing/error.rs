use crate::core::EngineError;
use crate::record::RejectionType;
use thiserror::Error;

/// Outcome of a processor that could not handle its command.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// An expected business failure. The framework rolls back and rejects the command.
    #[error("{rejection_type}: {reason}")]
    Failure {
        rejection_type: RejectionType,
        reason: String,
    },

    /// Anything unexpected. May ban the process instance the command refers to.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ProcessingError {
    pub fn failure(rejection_type: RejectionType, reason: impl Into<String>) -> Self {
        Self::Failure {
            rejection_type,
            reason: reason.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ProcessingError::Failure { .. })
    }
}

pub type ProcessingResult<T> = std::result::Result<T, ProcessingError>;
