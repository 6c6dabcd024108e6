//! Storage Layer
//!
//! Provides alert persistence with repository pattern.

mod repository;

pub use repository::{AlertFilter, AlertRecord, AlertRepository, DriverIdentity, NewAlert};

use alerting::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Alert {0} not found")]
    NotFound(Uuid),
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl From<StorageError> for StoreError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::DatabaseError(msg) => StoreError::Unavailable(msg),
            other => StoreError::Rejected(other.to_string()),
        }
    }
}
