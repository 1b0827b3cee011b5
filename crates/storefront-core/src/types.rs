//! # Domain Types
//!
//! Records shared by the adjustment ledger and the catalog.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Adjustables (carry adjustment totals)      Catalog                     │
//! │  ┌───────────┐ ┌───────────┐ ┌──────────┐   ┌──────────┐ ┌───────────┐  │
//! │  │  Order    │ │ LineItem  │ │ Shipment │   │ Taxonomy │ │  Product  │  │
//! │  │ currency  │ │ price ×   │ │  cost    │   │  name    │ │  name     │  │
//! │  │ item_total│ │ quantity  │ │          │   │ position │ │  price    │  │
//! │  └───────────┘ └───────────┘ └──────────┘   └──────────┘ └───────────┘  │
//! │                                                    │                    │
//! │                                              Classification             │
//! │                                           (taxon ⇄ product, position)   │
//! │                                              ProductProperty            │
//! │                                       (product ⇄ property, e.g. brand)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity is identified by a UUID v4 string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 825 bps = 8.25%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (for convenience).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Adjustment Totals
// =============================================================================

/// Cached adjustment totals carried by every adjustable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentTotals {
    pub promo_total: Money,
    pub included_tax_total: Money,
    pub additional_tax_total: Money,
    /// Eligible adjustments that are neither tax nor promotion
    /// (cancellations, manual adjustments).
    pub other_total: Money,
    /// `promo_total + additional_tax_total + other_total`.
    pub adjustment_total: Money,
}

impl AdjustmentTotals {
    /// Aggregates the totals of several adjustables (order-level rollup).
    pub fn sum<'a>(items: impl IntoIterator<Item = &'a AdjustmentTotals>) -> AdjustmentTotals {
        items
            .into_iter()
            .fold(AdjustmentTotals::default(), |mut acc, t| {
                acc.promo_total += t.promo_total;
                acc.included_tax_total += t.included_tax_total;
                acc.additional_tax_total += t.additional_tax_total;
                acc.other_total += t.other_total;
                acc.adjustment_total += t.adjustment_total;
                acc
            })
    }
}

// =============================================================================
// Order
// =============================================================================

/// A customer order. Orders are themselves adjustable (order-level promotions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    /// Human-facing order number, e.g. `R123456789`.
    pub number: String,
    /// ISO 4217 code.
    pub currency: String,
    /// Sum of line item amounts.
    pub item_total_cents: i64,
    pub shipment_total_cents: i64,
    pub adjustment_total_cents: i64,
    pub promo_total_cents: i64,
    pub included_tax_total_cents: i64,
    pub additional_tax_total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn item_total(&self) -> Money {
        Money::from_cents(self.item_total_cents)
    }

    /// Grand total: items + shipping + every eligible adjustment.
    pub fn total(&self) -> Money {
        Money::from_cents(
            self.item_total_cents + self.shipment_total_cents + self.adjustment_total_cents,
        )
    }
}

// =============================================================================
// Line Item
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LineItem {
    pub id: String,
    pub order_id: String,
    pub product_id: Option<String>,
    /// Unit price.
    pub price_cents: i64,
    pub quantity: i64,
    pub adjustment_total_cents: i64,
    pub promo_total_cents: i64,
    pub included_tax_total_cents: i64,
    pub additional_tax_total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LineItem {
    /// `price × quantity`, before adjustments.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.price_cents).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Shipment
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Shipment {
    pub id: String,
    pub order_id: String,
    pub cost_cents: i64,
    pub adjustment_total_cents: i64,
    pub promo_total_cents: i64,
    pub included_tax_total_cents: i64,
    pub additional_tax_total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A named tree of taxons (e.g. "Categories", "Brands").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Taxonomy {
    pub id: String,
    pub name: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub price_cents: i64,
    /// Inactive products are hidden from taxon listings.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// Link between a taxon and a product, ordered within the taxon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Classification {
    pub id: String,
    pub taxon_id: String,
    pub product_id: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

/// A named product attribute such as "brand".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Property {
    pub id: String,
    pub name: String,
    pub presentation: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product's value for one property.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductProperty {
    pub id: String,
    pub product_id: String,
    pub property_id: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
