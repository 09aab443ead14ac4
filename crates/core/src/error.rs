//! Error types for sub-document and transaction operations.
//!
//! Every failure that reaches a caller is an [`Error`]. Variants are
//! structured so callers can match on them without parsing messages:
//!
//! | Category | Variants | Raised |
//! |----------|----------|--------|
//! | Syntax | `PathSyntax` | locally, before any request |
//! | Validation | `InvalidArgument` | locally, before any request |
//! | Per-spec | `PathNotFound`, `PathExists`, `PathMismatch`, `InvalidValue` | by the server, carrying the spec index |
//! | Document | `DocumentNotFound`, `DocumentExists`, `CasMismatch` | by the server |
//! | Durability | `DurabilityImpossible` | by the server |
//! | Transaction | `TransactionConflict`, `TransactionOperationFailed`, `TransactionExpired`, `TransactionCommitAmbiguous`, `RetriesExhausted` | by the attempt context / orchestrator |
//! | Application | `Application` | by the transaction body |
//! | Transport | `Transport`, `FeatureNotAvailable`, `Protocol` | by the channel |

use std::fmt;

use crate::path::PathSyntaxError;
use crate::types::DurabilityLevel;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The request did not complete in time
    Timeout,
    /// The channel was closed
    Disconnected,
    /// The server asked the client to back off and retry
    TemporaryFailure,
    /// The target service is not reachable right now
    ServiceUnavailable,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Disconnected => "disconnected",
            TransportErrorKind::TemporaryFailure => "temporary failure",
            TransportErrorKind::ServiceUnavailable => "service unavailable",
        };
        f.write_str(name)
    }
}

/// Client error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    // ==================== Local ====================
    /// Path failed to parse
    #[error("invalid path: {0}")]
    PathSyntax(#[from] PathSyntaxError),

    /// Spec, batch or option validation failed
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the request was rejected
        reason: String,
    },

    // ==================== Per-spec ====================
    /// Path does not exist in the document
    #[error("path not found at spec {index}: {path}")]
    PathNotFound {
        /// Spec index within the batch
        index: usize,
        /// Path of the failing spec
        path: String,
    },

    /// Path already exists (insert, array_add_unique)
    #[error("path exists at spec {index}: {path}")]
    PathExists {
        /// Spec index within the batch
        index: usize,
        /// Path of the failing spec
        path: String,
    },

    /// Operation applied to the wrong container kind
    #[error("path mismatch at spec {index}: {path}")]
    PathMismatch {
        /// Spec index within the batch
        index: usize,
        /// Path of the failing spec
        path: String,
    },

    /// Value shape incompatible with the operation
    #[error("invalid value at spec {index} ({path}): {reason}")]
    InvalidValue {
        /// Spec index within the batch
        index: usize,
        /// Path of the failing spec
        path: String,
        /// What is wrong with the value
        reason: String,
    },

    // ==================== Document ====================
    /// Document does not exist
    #[error("document not found: {key}")]
    DocumentNotFound {
        /// Document key
        key: String,
    },

    /// Document already exists
    #[error("document exists: {key}")]
    DocumentExists {
        /// Document key
        key: String,
    },

    /// Version token did not match the stored document
    #[error("cas mismatch on {key}: expected {expected}, found {actual}")]
    CasMismatch {
        /// Document key
        key: String,
        /// CAS the caller supplied
        expected: u64,
        /// CAS currently stored
        actual: u64,
    },

    // ==================== Durability ====================
    /// Requested durability cannot be met by the current topology
    #[error("durability {level} impossible: {reason}")]
    DurabilityImpossible {
        /// Requested level
        level: DurabilityLevel,
        /// Why the topology cannot satisfy it
        reason: String,
    },

    // ==================== Transaction ====================
    /// Conflict with a concurrent writer; the attempt may be retried
    #[error("transaction conflict in attempt {attempt_id} on {key}: {reason}")]
    TransactionConflict {
        /// Attempt that raised the error
        attempt_id: String,
        /// Document key
        key: String,
        /// What conflicted
        reason: String,
    },

    /// Unrecognized failure inside an attempt, normalized
    #[error("transaction operation {operation} failed in attempt {attempt_id}: {message}")]
    TransactionOperationFailed {
        /// Attempt that raised the error
        attempt_id: String,
        /// Operation that failed
        operation: String,
        /// Underlying failure
        message: String,
    },

    /// Transaction exceeded its overall timeout
    #[error("transaction {transaction_id} expired after {elapsed_ms}ms")]
    TransactionExpired {
        /// Transaction that expired
        transaction_id: String,
        /// Time since the transaction started
        elapsed_ms: u64,
    },

    /// The commit request failed in transit and may or may not have applied
    #[error("commit of transaction {transaction_id} is ambiguous: {message}")]
    TransactionCommitAmbiguous {
        /// Transaction whose commit was in flight
        transaction_id: String,
        /// Underlying transport failure
        message: String,
    },

    /// Attempt ceiling reached
    #[error("transaction failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last_error: String,
    },

    /// Operation on an attempt that is no longer active
    #[error("attempt {attempt_id} is not active (state: {state})")]
    AttemptNotActive {
        /// Attempt that raised the error
        attempt_id: String,
        /// Current attempt state
        state: String,
    },

    // ==================== Application ====================
    /// Raised by caller code; never retried
    #[error("application error: {message}")]
    Application {
        /// Caller-supplied message
        message: String,
    },

    // ==================== Transport ====================
    /// Connectivity failure
    #[error("transport {kind}: {message}")]
    Transport {
        /// Failure classification
        kind: TransportErrorKind,
        /// Transport-level detail
        message: String,
    },

    /// The server cannot serve this kind of request
    #[error("feature not available: {feature}")]
    FeatureNotAvailable {
        /// Missing feature
        feature: String,
    },

    /// Unexpected response shape
    #[error("protocol error: {reason}")]
    Protocol {
        /// What was wrong with the response
        reason: String,
    },

    /// Bug or invariant violation
    #[error("internal error: {reason}")]
    Internal {
        /// What went wrong
        reason: String,
    },
}

impl Error {
    /// Create an `InvalidArgument` error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an `Application` error (for use inside transaction bodies)
    pub fn application(message: impl Into<String>) -> Self {
        Error::Application {
            message: message.into(),
        }
    }

    /// Create a `Transport` error
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Error::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Create a `Protocol` error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Error::Protocol {
            reason: reason.into(),
        }
    }

    /// Check if the orchestrator may retry the attempt that produced this
    ///
    /// Conflicts and transient transport failures are retryable. Everything
    /// else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TransactionConflict { .. } => true,
            Error::Transport { kind, .. } => matches!(
                kind,
                TransportErrorKind::Timeout
                    | TransportErrorKind::TemporaryFailure
                    | TransportErrorKind::ServiceUnavailable
            ),
            _ => false,
        }
    }

    /// Check if this is a local pre-flight failure
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::PathSyntax(_) | Error::InvalidArgument { .. })
    }

    /// Check if this is a per-spec failure
    pub fn is_spec_error(&self) -> bool {
        matches!(
            self,
            Error::PathNotFound { .. }
                | Error::PathExists { .. }
                | Error::PathMismatch { .. }
                | Error::InvalidValue { .. }
        )
    }

    /// Spec index within the batch, for per-spec failures
    pub fn spec_index(&self) -> Option<usize> {
        match self {
            Error::PathNotFound { index, .. }
            | Error::PathExists { index, .. }
            | Error::PathMismatch { index, .. }
            | Error::InvalidValue { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Check if this is a document-level failure
    pub fn is_document_error(&self) -> bool {
        matches!(
            self,
            Error::DocumentNotFound { .. } | Error::DocumentExists { .. } | Error::CasMismatch { .. }
        )
    }

    /// Check if this failure belongs to the transaction taxonomy
    pub fn is_transaction_error(&self) -> bool {
        matches!(
            self,
            Error::TransactionConflict { .. }
                | Error::TransactionOperationFailed { .. }
                | Error::TransactionExpired { .. }
                | Error::TransactionCommitAmbiguous { .. }
                | Error::RetriesExhausted { .. }
                | Error::AttemptNotActive { .. }
        )
    }

    /// Check if this error is one the transaction layer passes through as-is
    ///
    /// Anything else raised inside an attempt gets normalized into
    /// `TransactionOperationFailed`.
    pub fn is_domain_error(&self) -> bool {
        self.is_validation()
            || self.is_spec_error()
            || self.is_document_error()
            || self.is_transaction_error()
            || self.is_retryable()
            || matches!(
                self,
                Error::DurabilityImpossible { .. } | Error::Application { .. }
            )
    }
}
