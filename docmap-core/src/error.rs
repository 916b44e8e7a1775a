//! Error types for mapping operations and the translated data access taxonomy.
//!
//! Two families live here:
//!
//! - [`MappingError`]: failures raised by docmap itself while building metadata,
//!   rendering criteria or (de)serializing entities.
//! - [`DataAccessError`]: the closed taxonomy that driver failures are translated
//!   into. Every kind carries a stable code for programmatic handling.
//!
//! # Error Codes
//!
//! Data access codes follow the pattern `D{category}{number}`:
//! - 1xxx: constraint violations (duplicate key, data integrity)
//! - 2xxx: resource errors (failure, usage)
//! - 3xxx: API usage and permission errors
//! - 4xxx: session and transaction errors
//! - 9xxx: uncategorized
//!
//! ```rust
//! use docmap_core::error::{DataAccessError, DataAccessErrorKind};
//!
//! let err = DataAccessError::new(DataAccessErrorKind::DuplicateKey, "E11000 duplicate key");
//! assert_eq!(err.kind.code(), "D1001");
//! assert!(err.is_duplicate_key());
//! ```

use std::fmt;

use thiserror::Error;

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors raised while building metadata or mapping documents.
#[derive(Error, Debug)]
pub enum MappingError {
    /// The entity descriptor is malformed.
    #[error("invalid entity '{entity}': {message}")]
    InvalidEntity {
        /// The entity name.
        entity: String,
        /// What is wrong with it.
        message: String,
    },

    /// No descriptor is registered under the given name.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// A criteria tree could not be rendered.
    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    /// A value could not be converted.
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// BSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] bson::ser::Error),

    /// BSON deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] bson::de::Error),

    /// JSON rendering error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MappingError {
    /// Create an invalid entity error.
    pub fn invalid_entity(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEntity {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create an invalid criteria error.
    pub fn invalid_criteria(message: impl Into<String>) -> Self {
        Self::InvalidCriteria(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this is an unknown entity error.
    pub fn is_unknown_entity(&self) -> bool {
        matches!(self, Self::UnknownEntity(_))
    }
}

/// A value could not be converted to the requested target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot convert {from} to {to}: {reason}")]
pub struct ConversionError {
    /// Source BSON type.
    pub from: String,
    /// Requested target type.
    pub to: String,
    /// Why the conversion failed.
    pub reason: String,
}

impl ConversionError {
    /// Create a new conversion error.
    pub fn new(from: impl Into<String>, to: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }
}

/// The categories driver failures are translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataAccessErrorKind {
    /// A unique index rejected the write (D1001).
    DuplicateKey = 1001,
    /// A write violated a validation rule or index constraint (D1002).
    DataIntegrityViolation = 1002,
    /// The server or network could not be reached or failed mid-operation (D2001).
    ResourceFailure = 2001,
    /// A resource was used incorrectly, e.g. a missing namespace (D2002).
    ResourceUsage = 2002,
    /// The request itself was malformed (D3001).
    InvalidApiUsage = 3001,
    /// Authentication or authorization failed (D3002).
    PermissionDenied = 3002,
    /// A session or transaction could not be used (D4001).
    ClientSession = 4001,
    /// A transaction failed in a way that may succeed on retry (D4002).
    TransientClientSession = 4002,
    /// A driver failure that fits no other category (D9001).
    Uncategorized = 9001,
}

impl DataAccessErrorKind {
    /// Get the error code string (e.g., "D1001").
    pub fn code(&self) -> String {
        format!("D{}", *self as u16)
    }

    /// Get a short description of the category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::DuplicateKey => "Duplicate key",
            Self::DataIntegrityViolation => "Data integrity violation",
            Self::ResourceFailure => "Data access resource failure",
            Self::ResourceUsage => "Invalid data access resource usage",
            Self::InvalidApiUsage => "Invalid data access API usage",
            Self::PermissionDenied => "Permission denied",
            Self::ClientSession => "Client session failure",
            Self::TransientClientSession => "Transient client session failure",
            Self::Uncategorized => "Uncategorized MongoDB failure",
        }
    }

    /// Whether retrying the surrounding transaction may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientClientSession)
    }
}

impl fmt::Display for DataAccessErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A translated driver failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct DataAccessError {
    /// The category.
    pub kind: DataAccessErrorKind,
    /// The driver's message.
    pub message: String,
    /// The server error code, if the failure carried one.
    pub server_code: Option<i32>,
    /// The server error code name, if known.
    pub code_name: Option<String>,
}

impl fmt::Display for DataAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.code(), self.kind.description(), self.message)?;
        if let Some(code) = self.server_code {
            write!(f, " (server code {})", code)?;
        }
        Ok(())
    }
}

impl DataAccessError {
    /// Create a new translated error.
    pub fn new(kind: DataAccessErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            server_code: None,
            code_name: None,
        }
    }

    /// Attach the server error code.
    pub fn with_server_code(mut self, code: i32) -> Self {
        self.server_code = Some(code);
        self
    }

    /// Attach the server error code name.
    pub fn with_code_name(mut self, name: impl Into<String>) -> Self {
        self.code_name = Some(name.into());
        self
    }

    /// Check if this is a duplicate key error.
    pub fn is_duplicate_key(&self) -> bool {
        self.kind == DataAccessErrorKind::DuplicateKey
    }

    /// Check if this is a resource failure.
    pub fn is_resource_failure(&self) -> bool {
        self.kind == DataAccessErrorKind::ResourceFailure
    }

    /// Check if retrying the surrounding transaction may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_error_display() {
        let err = MappingError::invalid_entity("Person", "duplicate field 'name'");
        assert_eq!(
            err.to_string(),
            "invalid entity 'Person': duplicate field 'name'"
        );

        let err = MappingError::UnknownEntity("Ghost".to_string());
        assert!(err.is_unknown_entity());
        assert_eq!(err.to_string(), "unknown entity: Ghost");
    }

    #[test]
    fn test_conversion_error_into_mapping_error() {
        let err: MappingError = ConversionError::new("string", "objectId", "not hex").into();
        assert!(matches!(err, MappingError::Conversion(_)));
        assert_eq!(
            err.to_string(),
            "conversion error: cannot convert string to objectId: not hex"
        );
    }

    #[test]
    fn test_data_access_codes() {
        assert_eq!(DataAccessErrorKind::DuplicateKey.code(), "D1001");
        assert_eq!(DataAccessErrorKind::ResourceFailure.code(), "D2001");
        assert_eq!(DataAccessErrorKind::TransientClientSession.code(), "D4002");
        assert_eq!(DataAccessErrorKind::Uncategorized.code(), "D9001");
    }

    #[test]
    fn test_data_access_display() {
        let err = DataAccessError::new(DataAccessErrorKind::DuplicateKey, "E11000")
            .with_server_code(11000)
            .with_code_name("DuplicateKey");
        assert_eq!(
            err.to_string(),
            "[D1001] Duplicate key: E11000 (server code 11000)"
        );
        assert!(err.is_duplicate_key());
        assert!(!err.is_transient());
    }
}
