//! Error types for MongoDB operations.

use docmap_core::error::{DataAccessError, MappingError};
use thiserror::Error;

use crate::bulk::BulkOperationError;

/// Result type for MongoDB operations.
pub type MongoResult<T> = Result<T, MongoError>;

/// Errors that can occur during MongoDB operations.
#[derive(Error, Debug)]
pub enum MongoError {
    /// MongoDB driver error the translator had no opinion on.
    #[error("mongodb error: {0}")]
    Driver(#[from] mongodb::error::Error),

    /// Mapping error.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Driver error translated into the data access taxonomy.
    #[error(transparent)]
    Translated(#[from] DataAccessError),

    /// A bulk write failed, with the partial outcome.
    #[error(transparent)]
    Bulk(Box<BulkOperationError>),

    /// BSON serialization error.
    #[error("bson error: {0}")]
    Bson(#[from] bson::ser::Error),

    /// BSON deserialization error.
    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The caller passed something unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The server replied with something we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl MongoError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// The translated error, for translated and bulk failures.
    pub fn data_access_error(&self) -> Option<&DataAccessError> {
        match self {
            Self::Translated(err) => Some(err),
            Self::Bulk(err) => Some(&err.translated),
            _ => None,
        }
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
            || self
                .data_access_error()
                .is_some_and(DataAccessError::is_resource_failure)
    }

    /// Check if a unique index rejected the write.
    pub fn is_duplicate_key(&self) -> bool {
        self.data_access_error()
            .is_some_and(DataAccessError::is_duplicate_key)
    }

    /// Check if this is a bulk write failure.
    pub fn is_bulk_failure(&self) -> bool {
        matches!(self, Self::Bulk(_))
    }
}

impl From<BulkOperationError> for MongoError {
    fn from(err: BulkOperationError) -> Self {
        Self::Bulk(Box::new(err))
    }
}
