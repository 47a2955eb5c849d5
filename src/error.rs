//! Error types for dispatch, coercion, secret lifecycle and storage.

use crate::field::FieldType;
use crate::request::Operation;

/// Boxed error from a downstream system (database session, remote API, ...).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the storage collaborator.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    Poisoned,
    /// A value could not be serialized before writing.
    #[error("encode: {0}")]
    Encode(#[source] serde_json::Error),
    /// A stored value could not be deserialized.
    #[error("decode {key:?}: {source}")]
    Decode {
        /// Key whose value failed to decode.
        key: String,
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },
    /// Opaque failure reported by a storage implementation.
    #[error("{0}")]
    Backend(String),
}

/// Unified error type for the dispatch core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No registered path pattern matches the request path.
    #[error("unsupported path")]
    UnsupportedPath,
    /// A path matched but has no callback for the requested operation.
    #[error("unsupported operation")]
    UnsupportedOperation,
    /// A raw field value could not be converted to its declared type.
    #[error("field {field:?}: expected {expected}: {reason}")]
    Coercion {
        /// Name of the offending field.
        field: String,
        /// Type declared by the schema.
        expected: FieldType,
        /// Why the conversion failed.
        reason: String,
    },
    /// A callback asked for a field that is not part of its schema.
    #[error("field {0:?} is not in the schema")]
    UnknownField(String),
    /// A secret's internal data lacks a key its callback requires.
    #[error("secret is missing {key:?} internal data")]
    MissingInternalData {
        /// Missing key.
        key: String,
    },
    /// A secret's internal data holds a value of the wrong shape.
    #[error("secret internal data {key:?} is not a {expected}")]
    InvalidInternalData {
        /// Offending key.
        key: String,
        /// Expected JSON shape.
        expected: &'static str,
    },
    /// The secret type named by a renew/revoke request is not registered.
    #[error("secret type {0:?} is unsupported by this backend")]
    UnsupportedSecret(String),
    /// The request itself is malformed or cannot be honored.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// A path pattern failed to compile.
    #[error("invalid path pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// Pattern as registered.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
    /// A schema default does not match the declared field type.
    #[error("field {field:?}: default is {found}, schema declares {declared}")]
    InvalidDefault {
        /// Field name.
        field: String,
        /// Type declared by the schema.
        declared: FieldType,
        /// Type of the configured default.
        found: FieldType,
    },
    /// A path registered a callback for an operation that is never routed.
    #[error("path {pattern:?} cannot handle {operation} requests")]
    InvalidCallback {
        /// Pattern as registered.
        pattern: String,
        /// Operation the backend answers itself.
        operation: Operation,
    },
    /// Storage collaborator failure.
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    /// Downstream system failure with context.
    #[error("{context}: {source}")]
    External {
        /// What the backend was doing.
        context: String,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },
    /// Opaque backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

impl Error {
    /// Wrap a downstream failure with a short description of the failed step.
    pub fn external(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::External { context: context.into(), source: source.into() }
    }

    /// Check if this is a routing failure.
    pub fn is_unsupported_path(&self) -> bool {
        matches!(self, Self::UnsupportedPath)
    }

    /// Check if a path matched without a callback for the operation.
    pub fn is_unsupported_operation(&self) -> bool {
        matches!(self, Self::UnsupportedOperation)
    }

    /// Check if a field failed to coerce.
    pub fn is_coercion(&self) -> bool {
        matches!(self, Self::Coercion { .. })
    }

    /// Name of the field behind a coercion error.
    pub fn coercion_field(&self) -> Option<&str> {
        match self {
            Self::Coercion { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
