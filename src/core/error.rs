use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Expected to find key {key} in column family {column_family}, but it does not exist")]
    NotFound { column_family: String, key: String },

    #[error("Key {key} already exists in column family {column_family}")]
    KeyAlreadyExists { column_family: String, key: String },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Read-only context: {0}")]
    ReadOnly(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Invalid process model: {0}")]
    InvalidModel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Migration '{task}' failed: {reason}")]
    Migration { task: String, reason: String },

    #[error("Partition actor is closed")]
    ActorClosed,
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }
}

impl<T> From<std::sync::PoisonError<T>> for EngineError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for EngineError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for EngineError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
