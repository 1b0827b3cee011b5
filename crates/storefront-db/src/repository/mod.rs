//! # Repository Module
//!
//! Database repository implementations for the storefront.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  db.adjustments().create(new)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  AdjustmentRepository                                                   │
//! │  ├── validates input (storefront-core)                                  │
//! │  ├── runs SQL inside one transaction                                    │
//! │  └── recomputes totals via ItemAdjustments (storefront-core)            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories are cheap handles around the shared pool. Work that spans
//! repositories goes through crate-private `*_in(conn, ..)` helpers that take
//! an open connection or transaction.
//!
//! ## Available Repositories
//!
//! - [`adjustment::AdjustmentRepository`] - Adjustment lifecycle and recalculation
//! - [`order::OrderRepository`] - Orders, line items, shipments
//! - [`source::SourceRepository`] - Tax rates, promotions, unit cancels
//! - [`taxonomy::TaxonomyRepository`] - Taxonomies and their roots
//! - [`taxon::TaxonRepository`] - Nested set taxon trees
//! - [`product::ProductRepository`] - Products and classifications

pub mod adjustment;
pub mod order;
pub mod product;
pub mod source;
pub mod taxon;
pub mod taxonomy;
