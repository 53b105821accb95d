//! Error types for Flockline.
//!
//! Errors are layered the same way the code is:
//!
//! - **StoreError**: persistence failures, including optimistic version conflicts
//! - **CommandError**: business outcomes of a command (validation, missing
//!   documents, illegal transitions, stock shortages, authorization)
//!
//! A `StoreError::VersionConflict` surfaces as `CommandError::ConcurrencyConflict`
//! so the executor can decide whether to retry.

use crate::store::{DocumentKey, DocumentVersion, ExpectedVersion};
use std::fmt::Display;
use thiserror::Error;

/// Errors that can occur during command execution.
///
/// # Error Handling Strategy
///
/// - **Validation**: Retry with corrected input
/// - **NotFound**: The referenced document does not exist
/// - **InvalidState**: The document is in a status that forbids the request
/// - **InsufficientStock**: Reduce the quantity or wait for restock
/// - **ConcurrencyConflict**: Retry the command with fresh state
/// - **Store**: Handle based on specific store error
/// - **Internal**: Log and investigate, indicates a bug
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// Input failed validation.
    #[error("Validation failed for {field}: {reason}")]
    Validation {
        /// Offending input field
        field: String,
        /// Human-readable reason
        reason: String,
    },

    /// A referenced document does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of document that was looked up
        entity: &'static str,
        /// The identifier that was looked up
        id: String,
    },

    /// The requested transition is illegal for the document's current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A product does not have enough stock for the requested quantity.
    #[error("Insufficient stock for {product}: requested {requested}, available {available}")]
    InsufficientStock {
        /// Product name
        product: String,
        /// Quantity requested
        requested: u32,
        /// Quantity currently in stock
        available: u32,
    },

    /// A business rule was violated during command execution.
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),

    /// The caller could not be authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is authenticated but may not perform this action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Optimistic concurrency control detected conflicting updates.
    #[error("Concurrency conflict on documents: {documents:?}")]
    ConcurrencyConflict {
        /// The documents that had version conflicts
        documents: Vec<DocumentKey>,
    },

    /// An error occurred in the document store while executing the command.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// Validation failure on a named input field.
    pub fn validation(field: impl Into<String>, reason: impl Display) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    /// A document of kind `entity` with the given id was not found.
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Errors that can occur when interacting with the document store.
///
/// # Common Scenarios
///
/// - **VersionConflict**: Another request modified the document, retry needed
/// - **DuplicateWrite**: One batch named the same document twice (a bug in the command)
/// - **ConnectionFailed**: Network or database issues
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A document's version did not match the batch's expectation.
    #[error("Version conflict on {key}: expected {expected}, current {}", describe_version(*.current))]
    VersionConflict {
        /// The conflicting document
        key: DocumentKey,
        /// The version the batch expected
        expected: ExpectedVersion,
        /// The version actually stored, if the document exists
        current: Option<DocumentVersion>,
    },

    /// A write batch named the same document more than once.
    #[error("Document {key} appears more than once in a write batch")]
    DuplicateWrite {
        /// The repeated document
        key: DocumentKey,
    },

    /// A document could not be converted to its stored form.
    #[error("Failed to serialize {key}: {detail}")]
    SerializationFailed {
        /// The document being written
        key: DocumentKey,
        /// Serializer message
        detail: String,
    },

    /// A stored document could not be converted back to its type.
    #[error("Failed to deserialize {key}: {detail}")]
    DeserializationFailed {
        /// The document being read
        key: DocumentKey,
        /// Deserializer message
        detail: String,
    },

    /// Could not reach the backing database.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The backend failed while performing an operation.
    #[error("Store operation {operation} failed: {detail}")]
    StoreFailure {
        /// Operation name
        operation: &'static str,
        /// Backend message
        detail: String,
    },
}

fn describe_version(version: Option<DocumentVersion>) -> String {
    version.map_or_else(|| "absent".to_string(), |v| v.to_string())
}

impl From<StoreError> for CommandError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::VersionConflict { key, .. } => Self::ConcurrencyConflict {
                documents: vec![key],
            },
            other => Self::Store(other),
        }
    }
}

/// Result type for command operations
pub type CommandResult<T> = Result<T, CommandError>;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
