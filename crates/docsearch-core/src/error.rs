//! Error taxonomy for the document search engine.

use thiserror::Error;

/// Errors produced by any public operation on a [`crate::store::DocumentStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// Named entity (collection or document) absent.
    #[error("{entity} not found: {identifier}")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    /// Name or document id conflict.
    #[error("{entity} already exists: {identifier}")]
    AlreadyExists {
        entity: &'static str,
        identifier: String,
    },

    /// Malformed request, dimensionality mismatch, bad paging, or embedding
    /// mode violation.
    #[error("Invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    /// Predicate tree failed compilation (unknown op, empty `in` list, path
    /// too deep).
    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    /// Non-cosine distance function, or an attempt to change an immutable
    /// collection attribute.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Index rebuild requested with too few rows and `force = false`.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Per-collection index operation already in progress.
    #[error("{collection} is busy rebuilding its index")]
    Busy { collection: String },

    /// Ambient cancellation observed while the operation was in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// Publish attempted after the embedding pipeline has been shut down.
    #[error("pipeline is shut down")]
    Shutdown,

    /// Storage or embedder fault that does not fit the taxonomy above.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for document store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    #[must_use]
    pub fn not_found(entity: &'static str, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            identifier: identifier.into(),
        }
    }

    #[must_use]
    pub fn already_exists(entity: &'static str, identifier: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            identifier: identifier.into(),
        }
    }

    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_predicate(message: impl Into<String>) -> Self {
        Self::InvalidPredicate(message.into())
    }

    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    #[must_use]
    pub fn busy(collection: impl Into<String>) -> Self {
        Self::Busy {
            collection: collection.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The stable machine-readable error code for this error.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidPredicate(_) => "INVALID_PREDICATE",
            Self::Unsupported(_) => "UNSUPPORTED",
            Self::Precondition(_) => "PRECONDITION",
            Self::Busy { .. } => "BUSY",
            Self::Cancelled => "CANCELLED",
            Self::Shutdown => "SHUTDOWN",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether a caller may reasonably retry the operation unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::Cancelled)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}
