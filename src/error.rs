//! Error types shared by the store, the decoders and the service layer.

use crate::federation::FederationError;

pub type Result<T> = std::result::Result<T, Error>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not authorised: {0}")]
    Authorization(String),

    #[error("federation source failed: {0}")]
    Upstream(String),

    /// Only produced by the link repair pass. Never returned to a caller.
    #[error("reference mirror out of sync: {0}")]
    InvariantRepairable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(StoreError),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Error {
        Error::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => Error::Conflict(what),
            other => Error::Store(other),
        }
    }
}

impl From<FederationError> for Error {
    fn from(err: FederationError) -> Self {
        Error::Upstream(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(#[from] postgres::Error),

    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("document error: {0}")]
    Document(#[from] serde_json::Error),

    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
