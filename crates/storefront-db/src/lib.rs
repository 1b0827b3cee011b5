//! # storefront-db: Database Layer for the Storefront
//!
//! SQLite persistence for the adjustment ledger and the taxon trees, using
//! sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storefront Data Flow                             │
//! │                                                                         │
//! │  Caller (admin API, checkout, seed binary)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 storefront-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ Adjustments    │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ Orders/Sources │   │ 001_initial  │  │   │
//! │  │   │               │    │ Taxonomies     │   │              │  │   │
//! │  │   │               │    │ Taxons/Products│   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │           ▲                     │                               │   │
//! │  │           │                     ▼                               │   │
//! │  │   StorefrontConfig      storefront-core (pricing, nested set)   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`config`] - TOML configuration with environment overrides
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storefront_db::{Database, StorefrontConfig};
//!
//! let config = StorefrontConfig::load_or_default(None);
//! let db = Database::new(config.db_config()).await?;
//!
//! let totals = db.adjustments().recalculate_order(&order_id).await?;
//! let trail = db.taxons().pretty_name(&taxon_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, ConfigResult, StorefrontConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::adjustment::AdjustmentRepository;
pub use repository::order::OrderRepository;
pub use repository::product::ProductRepository;
pub use repository::source::SourceRepository;
pub use repository::taxon::TaxonRepository;
pub use repository::taxonomy::TaxonomyRepository;
