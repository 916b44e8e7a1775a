//! Translation of driver failures into [`DataAccessError`].
//!
//! A driver error is first captured as a [`DriverFault`], a plain snapshot of
//! its kind, server code, labels and bulk sub-error codes. The
//! [`MongoExceptionTranslator`] classifies that snapshot by kind, then by
//! label, then by code. Faults that do not come from the driver at all get no
//! translation so callers can fall through to their own handling.
//!
//! ```rust
//! use docmap_core::error::DataAccessErrorKind;
//! use docmap_mongodb::translator::{DriverFault, FaultKind, MongoExceptionTranslator};
//!
//! let fault = DriverFault::new(FaultKind::Command, "E11000 duplicate key").with_code(11000);
//! let translated = MongoExceptionTranslator::new().translate(&fault).unwrap();
//! assert_eq!(translated.kind, DataAccessErrorKind::DuplicateKey);
//! ```

use std::error::Error as StdError;

use docmap_core::error::{DataAccessError, DataAccessErrorKind};
use mongodb::error::{Error as DriverError, ErrorKind, WriteFailure};
use tracing::debug;

use crate::error::MongoError;
use crate::error_codes::{self, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT};

/// The kind of a driver failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Credentials were rejected.
    Authentication,
    /// The driver rejected an argument before sending anything.
    InvalidArgument,
    /// Socket level failure.
    Io,
    /// No suitable server was found in time.
    ServerSelection,
    /// The connection pool was cleared under the operation.
    ConnectionPoolCleared,
    /// SRV or TXT lookup failed.
    DnsResolve,
    /// The server rejected a command.
    Command,
    /// A single write failed.
    Write,
    /// The write concern could not be satisfied.
    WriteConcern,
    /// One or more writes of a batch failed.
    BulkWrite,
    /// A driver invariant was violated.
    Internal,
    /// The server reply was malformed.
    InvalidResponse,
    /// Transaction state misuse.
    Transaction,
    /// BSON serialization failed.
    Serialization,
    /// BSON deserialization failed.
    Deserialization,
    /// The deployment does not support sessions.
    SessionsNotSupported,
    /// The server wire version is not supported.
    IncompatibleServer,
    /// TLS configuration is invalid.
    InvalidTls,
    /// A unique index rejected the write.
    DuplicateKey,
    /// A driver error kind not modeled above.
    Other(String),
    /// The failure did not come from the driver.
    Foreign(String),
}

impl FaultKind {
    /// Kinds meaning the server or network is unavailable.
    pub fn is_resource_failure(&self) -> bool {
        matches!(
            self,
            Self::Io
                | Self::ServerSelection
                | Self::ConnectionPoolCleared
                | Self::DnsResolve
        )
    }

    /// Kinds meaning the driver or server was used in an unsupported way.
    pub fn is_resource_usage(&self) -> bool {
        matches!(
            self,
            Self::Internal | Self::InvalidResponse | Self::IncompatibleServer | Self::InvalidTls
        )
    }

    /// Kinds raised by rejected writes.
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, Self::Write | Self::WriteConcern | Self::BulkWrite)
    }

    /// Kinds raised by authentication.
    pub fn is_security(&self) -> bool {
        matches!(self, Self::Authentication)
    }

    /// Kinds raised by session or transaction misuse.
    pub fn is_session(&self) -> bool {
        matches!(self, Self::Transaction | Self::SessionsNotSupported)
    }
}

/// A snapshot of a driver failure.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverFault {
    /// The failure kind.
    pub kind: FaultKind,
    /// The server error code, if any.
    pub code: Option<i32>,
    /// The server error code name, if any.
    pub code_name: Option<String>,
    /// Error labels attached by the driver or server.
    pub labels: Vec<String>,
    /// The message.
    pub message: String,
    /// Codes of the individual write errors of a bulk failure.
    pub write_error_codes: Vec<i32>,
}

impl DriverFault {
    /// Create a fault of the given kind.
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            code_name: None,
            labels: Vec::new(),
            message: message.into(),
            write_error_codes: Vec::new(),
        }
    }

    /// Create a fault for an error that did not come from the driver.
    pub fn foreign(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FaultKind::Foreign(type_name.into()), message)
    }

    /// Attach the server code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach the server code name.
    pub fn with_code_name(mut self, code_name: impl Into<String>) -> Self {
        self.code_name = Some(code_name.into());
        self
    }

    /// Attach an error label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Attach the codes of individual write errors.
    pub fn with_write_error_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.write_error_codes.extend(codes);
        self
    }

    /// Check for an error label.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Whether the code or any write error code is a duplicate key code.
    pub fn has_duplicate_key_code(&self) -> bool {
        self.code.is_some_and(error_codes::is_duplicate_key)
            || self
                .write_error_codes
                .iter()
                .copied()
                .any(error_codes::is_duplicate_key)
    }

    fn is_transient(&self) -> bool {
        self.has_label(TRANSIENT_TRANSACTION_ERROR) || self.has_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
    }
}

impl From<&DriverError> for DriverFault {
    fn from(err: &DriverError) -> Self {
        let message = err.to_string();
        let mut fault = match err.kind.as_ref() {
            ErrorKind::Authentication { .. } => Self::new(FaultKind::Authentication, message),
            ErrorKind::InvalidArgument { .. } => Self::new(FaultKind::InvalidArgument, message),
            ErrorKind::Io(_) => Self::new(FaultKind::Io, message),
            ErrorKind::ServerSelection { .. } => Self::new(FaultKind::ServerSelection, message),
            ErrorKind::ConnectionPoolCleared { .. } => {
                Self::new(FaultKind::ConnectionPoolCleared, message)
            }
            ErrorKind::DnsResolve { .. } => Self::new(FaultKind::DnsResolve, message),
            ErrorKind::Command(command) => Self::new(FaultKind::Command, message)
                .with_code(command.code)
                .with_code_name(command.code_name.clone()),
            ErrorKind::Write(WriteFailure::WriteError(write)) => {
                let kind = if error_codes::is_duplicate_key(write.code) {
                    FaultKind::DuplicateKey
                } else {
                    FaultKind::Write
                };
                let fault = Self::new(kind, message).with_code(write.code);
                match &write.code_name {
                    Some(name) => fault.with_code_name(name.clone()),
                    None => fault,
                }
            }
            ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => {
                Self::new(FaultKind::WriteConcern, message)
                    .with_code(concern.code)
                    .with_code_name(concern.code_name.clone())
            }
            ErrorKind::BulkWrite(failure) => {
                let codes: Vec<i32> = failure
                    .write_errors
                    .iter()
                    .flatten()
                    .map(|e| e.code)
                    .collect();
                let code = codes
                    .first()
                    .copied()
                    .or_else(|| failure.write_concern_error.as_ref().map(|c| c.code));
                let fault = Self::new(FaultKind::BulkWrite, message).with_write_error_codes(codes);
                match code {
                    Some(code) => fault.with_code(code),
                    None => fault,
                }
            }
            ErrorKind::Internal { .. } => Self::new(FaultKind::Internal, message),
            ErrorKind::InvalidResponse { .. } => Self::new(FaultKind::InvalidResponse, message),
            ErrorKind::Transaction { .. } => Self::new(FaultKind::Transaction, message),
            ErrorKind::BsonSerialization(_) => Self::new(FaultKind::Serialization, message),
            ErrorKind::BsonDeserialization(_) => Self::new(FaultKind::Deserialization, message),
            ErrorKind::SessionsNotSupported => Self::new(FaultKind::SessionsNotSupported, message),
            ErrorKind::IncompatibleServer { .. } => {
                Self::new(FaultKind::IncompatibleServer, message)
            }
            ErrorKind::InvalidTlsConfig { .. } => Self::new(FaultKind::InvalidTls, message),
            other => Self::new(FaultKind::Other(format!("{other:?}")), message),
        };
        fault.labels = err.labels().iter().cloned().collect();
        fault.labels.sort();
        fault
    }
}

/// Translates driver failures into the [`DataAccessError`] taxonomy.
///
/// Stateless; a single instance can be shared freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoExceptionTranslator;

impl MongoExceptionTranslator {
    /// Create a translator.
    pub fn new() -> Self {
        Self
    }

    /// Translate a fault, or return `None` when it did not come from the driver
    /// and carries no recognizable code.
    pub fn translate(&self, fault: &DriverFault) -> Option<DataAccessError> {
        let kind = self.classify(fault)?;
        let mut translated = DataAccessError::new(kind, fault.message.clone());
        if let Some(code) = fault.code {
            translated = translated.with_server_code(code);
        }
        if let Some(name) = &fault.code_name {
            translated = translated.with_code_name(name.clone());
        }
        Some(translated)
    }

    /// Translate a driver error.
    pub fn translate_driver_error(&self, err: &DriverError) -> Option<DataAccessError> {
        self.translate(&DriverFault::from(err))
    }

    /// Translate any error, returning `None` for anything that is not a driver
    /// error.
    pub fn translate_error(&self, err: &(dyn StdError + 'static)) -> Option<DataAccessError> {
        if let Some(driver) = err.downcast_ref::<DriverError>() {
            return self.translate_driver_error(driver);
        }
        match err.downcast_ref::<MongoError>() {
            Some(MongoError::Driver(driver)) => self.translate_driver_error(driver),
            Some(other) => other.data_access_error().cloned(),
            None => None,
        }
    }

    /// Convert a driver error into a [`MongoError`], translated when possible.
    pub fn to_mongo_error(&self, err: DriverError) -> MongoError {
        match self.translate_driver_error(&err) {
            Some(translated) => MongoError::Translated(translated),
            None => MongoError::Driver(err),
        }
    }

    fn classify(&self, fault: &DriverFault) -> Option<DataAccessErrorKind> {
        let kind = &fault.kind;
        if *kind == FaultKind::DuplicateKey {
            return Some(DataAccessErrorKind::DuplicateKey);
        }
        if kind.is_resource_failure() {
            return Some(DataAccessErrorKind::ResourceFailure);
        }
        if kind.is_resource_usage() {
            return Some(DataAccessErrorKind::ResourceUsage);
        }
        if kind.is_data_integrity() {
            return Some(if fault.has_duplicate_key_code() {
                DataAccessErrorKind::DuplicateKey
            } else {
                DataAccessErrorKind::DataIntegrityViolation
            });
        }
        if kind.is_security() {
            return Some(DataAccessErrorKind::PermissionDenied);
        }
        if fault.is_transient() {
            return Some(DataAccessErrorKind::TransientClientSession);
        }
        if let Some(classified) = fault.code.and_then(error_codes::classify) {
            return Some(classified);
        }
        if kind.is_session() {
            return Some(DataAccessErrorKind::ClientSession);
        }
        if *kind == FaultKind::InvalidArgument {
            return Some(DataAccessErrorKind::InvalidApiUsage);
        }
        match kind {
            FaultKind::Foreign(type_name) => {
                debug!(type_name = %type_name, "No translation for non-driver failure");
                None
            }
            _ => {
                debug!(kind = ?kind, code = ?fault.code, "Uncategorized driver failure");
                Some(DataAccessErrorKind::Uncategorized)
            }
        }
    }
}
