//! # storefront-core: Pure Pricing and Catalog Logic
//!
//! This crate holds the storefront's business rules as pure functions with
//! zero I/O dependencies: adjustment bookkeeping for orders and the taxon
//! tree used to categorize products.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storefront Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            ★ storefront-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────┐  ┌────────────┐  ┌────────────┐               │   │
//! │  │   │ adjustment │  │   source   │  │    item_   │               │   │
//! │  │   │  scopes    │  │ tax, promo │  │adjustments │               │   │
//! │  │   │  lifecycle │  │  cancels   │  │  totals    │               │   │
//! │  │   └────────────┘  └────────────┘  └────────────┘               │   │
//! │  │   ┌────────────┐  ┌────────────┐  ┌────────────┐               │   │
//! │  │   │   taxon    │  │ nested_set │  │   money    │               │   │
//! │  │   │ permalinks │  │ TaxonTree  │  │  Currency  │               │   │
//! │  │   └────────────┘  └────────────┘  └────────────┘               │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 storefront-db (Database Layer)                  │   │
//! │  │        SQLite queries, migrations, repositories, config         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money and Currency (integer cents, no floating point)
//! - [`adjustment`] - Adjustment records, states and query scopes
//! - [`source`] - Tax rates, promotion actions and unit cancellations
//! - [`item_adjustments`] - Per-item recalculation and totals
//! - [`taxon`] - Taxon records, permalinks and filters
//! - [`nested_set`] - Nested set tree arithmetic
//! - [`types`] - Orders, line items, shipments, products
//! - [`error`] / [`validation`] - Typed errors and field checks
//!
//! ## Example Usage
//!
//! ```rust
//! use storefront_core::money::Money;
//! use storefront_core::types::TaxRate;
//!
//! let price = Money::from_cents(1099); // $10.99
//! let tax = price.calculate_tax(TaxRate::from_bps(825)); // 8.25%
//!
//! // Tax on $10.99 at 8.25% = $0.91 (rounded)
//! assert_eq!(tax.cents(), 91);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adjustment;
pub mod error;
pub mod item_adjustments;
pub mod money;
pub mod nested_set;
pub mod source;
pub mod taxon;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use adjustment::{
    AdjustableKind, AdjustableRef, AdjustableSnapshot, Adjustment, AdjustmentScope,
    AdjustmentState, NewAdjustment, SourceKind, SourceRef,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use item_adjustments::{ItemAdjustments, ItemUpdate};
pub use money::{Currency, Money};
pub use nested_set::{TaxonTree, TreeNode};
pub use source::{InMemoryCatalog, Source, SourceCatalog};
pub use taxon::{NewTaxon, Taxon, TaxonChanges};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Currency used when neither the order nor the store configures one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Maximum length of taxon meta fields (title, description, keywords).
pub const MAX_META_LENGTH: usize = 255;
