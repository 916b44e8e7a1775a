//! Server error code tables used by the exception translator.
//!
//! Every table is sorted so membership is a binary search. Codes are the ones
//! documented in the server's `error_codes.yml`.

use docmap_core::error::DataAccessErrorKind;

/// Unique index violations.
pub const DUPLICATE_KEY: &[i32] = &[
    84,    // DuplicateKeyValue
    11000, // DuplicateKey
    11001, // legacy duplicate key on update
    12582, // legacy duplicate key on insert
];

/// Validation and index constraint violations.
pub const DATA_INTEGRITY: &[i32] = &[
    67,  // CannotCreateIndex
    68,  // IndexAlreadyExists
    85,  // IndexOptionsConflict
    86,  // IndexKeySpecsConflict
    112, // WriteConflict
    117, // ConflictingOperationInProgress
    121, // DocumentValidationFailure
];

/// Network, replication and shutdown failures.
pub const RESOURCE_FAILURE: &[i32] = &[
    6,     // HostUnreachable
    7,     // HostNotFound
    89,    // NetworkTimeout
    91,    // ShutdownInProgress
    189,   // PrimarySteppedDown
    9001,  // SocketException
    10107, // NotWritablePrimary
    11600, // InterruptedAtShutdown
    11602, // InterruptedDueToReplStateChange
    13435, // NotPrimaryNoSecondaryOk
    13436, // NotPrimaryOrSecondary
];

/// Malformed requests.
pub const INVALID_API_USAGE: &[i32] = &[
    2,  // BadValue
    9,  // FailedToParse
    14, // TypeMismatch
    15, // Overflow
    16, // InvalidLength
    52, // DollarPrefixedFieldName
    55, // InvalidDBRef
    56, // EmptyFieldName
    57, // DottedFieldName
    66, // ImmutableField
    72, // InvalidOptions
];

/// Session and transaction misuse.
pub const CLIENT_SESSION: &[i32] = &[
    206, // NoSuchSession
    225, // TransactionTooOld
    251, // NoSuchTransaction
    256, // TransactionCommitted
    257, // TransactionTooLarge
    261, // TooManyLogicalSessions
    263, // OperationNotSupportedInTransaction
];

/// Authentication and authorization failures.
pub const PERMISSION_DENIED: &[i32] = &[
    11, // UserNotFound
    13, // Unauthorized
    18, // AuthenticationFailed
    31, // RoleNotFound
];

/// Error label marking a transaction that may succeed when retried.
pub const TRANSIENT_TRANSACTION_ERROR: &str = "TransientTransactionError";

/// Error label marking a commit whose outcome is unknown.
pub const UNKNOWN_TRANSACTION_COMMIT_RESULT: &str = "UnknownTransactionCommitResult";

fn contains(table: &[i32], code: i32) -> bool {
    table.binary_search(&code).is_ok()
}

/// Whether the code reports a unique index violation.
pub fn is_duplicate_key(code: i32) -> bool {
    contains(DUPLICATE_KEY, code)
}

/// Whether the code reports a validation or index constraint violation.
pub fn is_data_integrity(code: i32) -> bool {
    contains(DATA_INTEGRITY, code)
}

/// Whether the code reports a network, replication or shutdown failure.
pub fn is_resource_failure(code: i32) -> bool {
    contains(RESOURCE_FAILURE, code)
}

/// Whether the code reports a malformed request.
pub fn is_invalid_api_usage(code: i32) -> bool {
    contains(INVALID_API_USAGE, code)
}

/// Whether the code reports session or transaction misuse.
pub fn is_client_session(code: i32) -> bool {
    contains(CLIENT_SESSION, code)
}

/// Whether the code reports an authentication or authorization failure.
pub fn is_permission_denied(code: i32) -> bool {
    contains(PERMISSION_DENIED, code)
}

/// Classify a server code, checking the tables in fixed priority.
pub fn classify(code: i32) -> Option<DataAccessErrorKind> {
    if is_duplicate_key(code) {
        Some(DataAccessErrorKind::DuplicateKey)
    } else if is_data_integrity(code) {
        Some(DataAccessErrorKind::DataIntegrityViolation)
    } else if is_resource_failure(code) {
        Some(DataAccessErrorKind::ResourceFailure)
    } else if is_invalid_api_usage(code) {
        Some(DataAccessErrorKind::InvalidApiUsage)
    } else if is_client_session(code) {
        Some(DataAccessErrorKind::ClientSession)
    } else if is_permission_denied(code) {
        Some(DataAccessErrorKind::PermissionDenied)
    } else {
        None
    }
}
