//! Error types and result types for organization service operations.
//!
//! Every failure raised by the store, the query engine, or the operation pipeline
//! is a [`CrmError`]. Use [`CrmResult<T>`] as the return type for fallible operations.
//!
//! Errors carry a stable numeric fault code (see [`CrmError::code`]) so protocol
//! front-ends can translate them into their own wire-format faults via [`Fault`].

use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use uuid::Uuid;

/// Fault code raised when a record or record type does not exist.
pub const OBJECT_DOES_NOT_EXIST: i32 = -2147220969;
/// Fault code raised when a record with the same identifier already exists.
pub const DUPLICATE_RECORD: i32 = -2147220937;
/// Fault code raised for malformed arguments (operator arity, bad magnitudes, bad cookies).
pub const INVALID_ARGUMENT: i32 = -2147220989;
/// Fault code raised when a query references an attribute the record type does not have.
pub const QUERY_BUILDER_NO_ATTRIBUTE: i32 = -2147217149;
/// Fault code raised for condition operators the engine does not evaluate.
pub const NOT_SUPPORTED: i32 = -2147220715;
/// Fault code raised when no handler accepts an operation.
pub const NOT_IMPLEMENTED: i32 = -2147220716;
/// Fault code raised for invalid query or service configuration (aliases, relationships).
pub const CONFIGURATION: i32 = -2147220970;
/// Fault code raised when converting between typed entities and records fails.
pub const SERIALIZATION: i32 = -2147220990;

/// Coarse classification of a [`CrmError`].
///
/// Callers that only need to know which family an error belongs to can match on
/// this instead of on the individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An identifier or record type is absent.
    NotFound,
    /// A record with the same identifier already exists.
    Duplicate,
    /// Wrong operator arity or an otherwise malformed argument.
    InvalidArgument,
    /// A query references an unknown attribute.
    SchemaMismatch,
    /// An operator or operation kind has no implementation.
    NotSupported,
    /// Duplicate alias, unknown relationship, or other invalid configuration.
    Configuration,
    /// Conversion between typed entities and records failed.
    Serialization,
}

/// Represents all possible errors raised by the organization service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CrmError {
    /// The record with the given identifier does not exist in the record type.
    #[error("{entity} with id {id} does not exist")]
    NotFound {
        /// The logical name of the record type.
        entity: String,
        /// The identifier that was looked up.
        id: Uuid,
    },
    /// The record type holds no records at all.
    #[error("The entity with a name = '{0}' was not found")]
    EntityNotFound(String),
    /// A record with the same identifier already exists in the record type.
    #[error("Cannot insert duplicate key: {entity} with id {id} already exists")]
    DuplicateRecord {
        /// The logical name of the record type.
        entity: String,
        /// The conflicting identifier.
        id: Uuid,
    },
    /// A malformed argument was supplied.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A condition operator received the wrong number of values.
    #[error("Condition for attribute '{attribute}': operator '{operator}' expects {expected} value(s) but received {actual}")]
    ConditionArity {
        /// The attribute the condition applies to.
        attribute: String,
        /// The operator name.
        operator: String,
        /// Human readable description of the accepted count.
        expected: &'static str,
        /// The number of values actually supplied.
        actual: usize,
    },
    /// The query references an attribute the record type does not have.
    #[error("'{entity}' entity doesn't contain attribute with Name = '{attribute}'")]
    SchemaMismatch {
        /// The logical name of the record type.
        entity: String,
        /// The unknown attribute.
        attribute: String,
    },
    /// The condition operator is declared but not evaluated by this engine.
    #[error("The operator '{0}' is not supported")]
    NotSupported(String),
    /// No registered handler accepts the operation kind.
    #[error("No handler is registered for request '{request}'")]
    NotImplemented {
        /// The operation kind that went unhandled.
        request: String,
    },
    /// Invalid query or service configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Conversion between typed entities and records failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CrmError {
    /// Returns the coarse family this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrmError::NotFound { .. } | CrmError::EntityNotFound(_) => ErrorKind::NotFound,
            CrmError::DuplicateRecord { .. } => ErrorKind::Duplicate,
            CrmError::InvalidArgument(_) | CrmError::ConditionArity { .. } => ErrorKind::InvalidArgument,
            CrmError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            CrmError::NotSupported(_) | CrmError::NotImplemented { .. } => ErrorKind::NotSupported,
            CrmError::Configuration(_) => ErrorKind::Configuration,
            CrmError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Returns the numeric fault code for this error.
    pub fn code(&self) -> i32 {
        match self {
            CrmError::NotFound { .. } | CrmError::EntityNotFound(_) => OBJECT_DOES_NOT_EXIST,
            CrmError::DuplicateRecord { .. } => DUPLICATE_RECORD,
            CrmError::InvalidArgument(_) | CrmError::ConditionArity { .. } => INVALID_ARGUMENT,
            CrmError::SchemaMismatch { .. } => QUERY_BUILDER_NO_ATTRIBUTE,
            CrmError::NotSupported(_) => NOT_SUPPORTED,
            CrmError::NotImplemented { .. } => NOT_IMPLEMENTED,
            CrmError::Configuration(_) => CONFIGURATION,
            CrmError::Serialization(_) => SERIALIZATION,
        }
    }

    /// Converts this error into a serializable fault object.
    pub fn to_fault(&self) -> Fault {
        Fault {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Structured fault carrying a numeric code and a message.
///
/// This is the shape protocol front-ends marshal over the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// The numeric fault code.
    pub code: i32,
    /// The human readable message.
    pub message: String,
}

impl From<CrmError> for Fault {
    fn from(err: CrmError) -> Self {
        err.to_fault()
    }
}

/// A specialized `Result` type for organization service operations.
pub type CrmResult<T> = Result<T, CrmError>;

impl From<SerdeJsonError> for CrmError {
    fn from(err: SerdeJsonError) -> Self {
        CrmError::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for CrmError {
    fn from(err: base64::DecodeError) -> Self {
        CrmError::InvalidArgument(format!("malformed paging cookie: {err}"))
    }
}
