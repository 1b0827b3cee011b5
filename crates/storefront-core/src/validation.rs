//! # Validation Module
//!
//! Input validation for adjustments and taxons.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (Rust)                                           │
//! │  ├── Presence checks (label, name, order, adjustable)                  │
//! │  └── Length / format checks (meta fields, permalink)                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── UNIQUE (taxonomy_id, permalink)                                   │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use storefront_core::validation::{validate_label, validate_meta_field};
//!
//! validate_label("Sales tax").unwrap();
//! assert!(validate_meta_field("meta_title", &"x".repeat(300)).is_err());
//! ```

use crate::error::ValidationError;
use crate::MAX_META_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Checks that a field is present (non-blank after trimming).
pub fn validate_present(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates an adjustment label.
pub fn validate_label(label: &str) -> ValidationResult<()> {
    validate_present("label", label)
}

/// Validates a taxon, taxonomy, product or source name. Names only need
/// to be present; their length is not limited.
pub fn validate_name(name: &str) -> ValidationResult<()> {
    validate_present("name", name)
}

/// Validates an optional SEO field (`meta_title`, `meta_keywords`, ...).
///
/// ## Rules
/// - At most 255 characters (counted as chars, not bytes)
pub fn validate_meta_field(field: &str, value: &str) -> ValidationResult<()> {
    if value.chars().count() > MAX_META_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_META_LENGTH,
        });
    }
    Ok(())
}

/// Validates a permalink.
///
/// ## Rules
/// - Not blank
/// - Slash separated segments, none of them empty
/// - No whitespace or control characters
///
/// Derived permalinks are always lowercase slugs, but explicit ones are
/// kept as given.
///
/// ## Example
/// ```rust
/// use storefront_core::validation::validate_permalink;
///
/// assert!(validate_permalink("categories/bags").is_ok());
/// assert!(validate_permalink("Categories/Big-Bags").is_ok());
/// assert!(validate_permalink("categories//bags").is_err());
/// assert!(validate_permalink("categories/big bags").is_err());
/// ```
pub fn validate_permalink(permalink: &str) -> ValidationResult<()> {
    validate_present("permalink", permalink)?;

    let valid = permalink.split('/').all(|segment| {
        !segment.is_empty()
            && !segment
                .chars()
                .any(|c| c.is_whitespace() || c.is_control())
    });

    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "permalink".to_string(),
            reason: "segments must be non-empty and free of whitespace".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_label() {
        assert!(validate_label("Shipping").is_ok());
        assert!(validate_label("").is_err());
        assert!(validate_label("   ").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Brands").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"a".repeat(1000)).is_ok());
    }

    #[test]
    fn test_validate_meta_field_counts_chars() {
        assert!(validate_meta_field("meta_title", &"é".repeat(255)).is_ok());
        assert!(validate_meta_field("meta_title", &"é".repeat(256)).is_err());
        assert!(validate_meta_field("meta_title", "").is_ok());
    }

    #[test]
    fn test_validate_permalink() {
        assert!(validate_permalink("brands").is_ok());
        assert!(validate_permalink("brands/north_wind/t-shirts-2").is_ok());
        assert!(validate_permalink("Brands/Big-Bags").is_ok());
        assert!(validate_permalink("brands/crème").is_ok());
        assert!(validate_permalink("").is_err());
        assert!(validate_permalink("/brands").is_err());
        assert!(validate_permalink("brands/").is_err());
        assert!(validate_permalink("brands/Big Bags").is_err());
        assert!(validate_permalink("brands/tab\tbags").is_err());
    }

}
