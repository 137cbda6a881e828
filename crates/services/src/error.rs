//! Shared error types for the services crate.

use thiserror::Error;

use practice_core::config::ConfigError;
use practice_core::model::{IdError, IdentityError, ProfileError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the progress services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("progress store unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),
    #[error("requester is not an administrator")]
    Forbidden,
}

impl From<StorageError> for ProgressError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound("user"),
            other => Self::StorageUnavailable(other),
        }
    }
}

impl From<IdError> for ProgressError {
    fn from(err: IdError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<IdentityError> for ProgressError {
    fn from(err: IdentityError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<ProfileError> for ProgressError {
    fn from(err: ProfileError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
