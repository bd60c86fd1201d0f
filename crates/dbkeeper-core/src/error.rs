//! Operator error taxonomy
//!
//! Error definitions shared by every dbkeeper crate, with the classification
//! the reconciler needs to decide retry vs. terminal. Lower layers always
//! return errors; only the reconciliation state machine swallows the benign
//! cases (AlreadyExists on create, NotFound during teardown).

use thiserror::Error;

/// Error that can occur while reconciling a managed resource.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// A referenced dependency (server, secret, parent resource) is absent.
    ///
    /// Recovered by backoff-retry, or treated as resolved-by-deletion when
    /// the owning resource is being torn down.
    #[error("dependency not found: {what}")]
    NotFound { what: String },

    /// The declared spec is invalid (bad privilege token, scope, role flag).
    ///
    /// Never retried blindly; the spec must change.
    #[error("invalid spec: {message}")]
    InvalidSpec { message: String },

    /// The live object already exists; a previous create partially applied.
    #[error("already exists: {identifier}")]
    AlreadyExists { identifier: String },

    /// Statement execution failed on the backend.
    #[error("backend failure: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to establish or resolve a connection.
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The requested operation is not supported by this dialect.
    #[error("unsupported on dialect {dialect}: {operation}")]
    Unsupported { dialect: String, operation: String },

    /// Declared-resource store failure.
    #[error("store error: {message}")]
    Store { message: String },

    /// Anything not classified. Logged, retried with backoff, never fatal.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl OperatorError {
    /// True for the "referenced dependency absent" classification.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OperatorError::NotFound { .. })
    }

    /// True when a create raced a previous partially-applied create.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, OperatorError::AlreadyExists { .. })
    }

    /// True when the declared spec itself must change before retrying helps.
    pub fn is_invalid_spec(&self) -> bool {
        matches!(
            self,
            OperatorError::InvalidSpec { .. } | OperatorError::Unsupported { .. }
        )
    }

    /// True for errors that may resolve on their own (retry with backoff).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OperatorError::NotFound { .. }
                | OperatorError::Backend { .. }
                | OperatorError::Connection { .. }
                | OperatorError::Store { .. }
                | OperatorError::Internal { .. }
        )
    }

    // Convenience constructors

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        OperatorError::NotFound { what: what.into() }
    }

    /// Create an InvalidSpec error.
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        OperatorError::InvalidSpec {
            message: message.into(),
        }
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(identifier: impl Into<String>) -> Self {
        OperatorError::AlreadyExists {
            identifier: identifier.into(),
        }
    }

    /// Create a backend failure without a source error.
    pub fn backend(message: impl Into<String>) -> Self {
        OperatorError::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Create a backend failure wrapping the driver error.
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        OperatorError::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection failure without a source error.
    pub fn connection(message: impl Into<String>) -> Self {
        OperatorError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failure wrapping the driver error.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        OperatorError::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an Unsupported error.
    pub fn unsupported(dialect: impl Into<String>, operation: impl Into<String>) -> Self {
        OperatorError::Unsupported {
            dialect: dialect.into(),
            operation: operation.into(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        OperatorError::Store {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        OperatorError::Internal {
            message: message.into(),
            source: None,
        }
    }
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;
