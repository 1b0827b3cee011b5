//! # Error Types
//!
//! Domain-specific error types for storefront-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  storefront-core errors (this file)                                    │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  storefront-db errors (separate crate)                                 │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (IDs, states)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain errors raised by the adjustment ledger and the taxon tree.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Adjustment cannot be found.
    #[error("Adjustment not found: {0}")]
    AdjustmentNotFound(String),

    /// Taxon cannot be found in the tree being operated on.
    #[error("Taxon not found: {0}")]
    TaxonNotFound(String),

    /// A state machine event fired from a state that does not allow it.
    ///
    /// ## When This Occurs
    /// - `close` on an adjustment that is already closed
    /// - `open` on an adjustment that is already open
    #[error("Cannot {event} adjustment {id}: it is {state}")]
    InvalidTransition {
        id: String,
        event: String,
        state: String,
    },

    /// A tree move that would break the nested set.
    ///
    /// ## When This Occurs
    /// - Moving a taxon under itself or one of its descendants
    /// - Moving a taxon into another taxonomy
    #[error("Cannot move taxon {id}: {reason}")]
    InvalidMove { id: String, reason: String },

    /// Stored nested set bounds are inconsistent.
    #[error("Nested set is corrupt: {0}")]
    CorruptTree(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., invalid UUID, malformed permalink).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., duplicate permalink).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidTransition {
            id: "adj-1".to_string(),
            event: "close".to_string(),
            state: "closed".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot close adjustment adj-1: it is closed");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "label".to_string(),
        };
        assert_eq!(err.to_string(), "label is required");

        let err = ValidationError::TooLong {
            field: "meta_title".to_string(),
            max: 255,
        };
        assert_eq!(err.to_string(), "meta_title must be at most 255 characters");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
