//! # Item Adjustments
//!
//! Recomputes every adjustment attached to one adjustable and derives the
//! totals cached on it.
//!
//! ## Update Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     ItemAdjustments::update                             │
//! │                                                                         │
//! │  1. Promotions   recalculate ─► choose best eligible ─► promo_total     │
//! │                  (others marked ineligible)                             │
//! │         │                                                               │
//! │         ▼  promo_total feeds the discounted amount                      │
//! │  2. Taxes        recalculate ─► included_tax_total                      │
//! │                               ─► additional_tax_total                   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  3. Everything else (cancellations, manual) ─► other_total              │
//! │                                                                         │
//! │  adjustment_total = promo_total + additional_tax_total + other_total    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Included tax is reported but never added to `adjustment_total`: it is
//! already part of the price.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::adjustment::{AdjustableSnapshot, Adjustment};
use crate::money::Money;
use crate::source::SourceCatalog;
use crate::types::AdjustmentTotals;

/// Result of recomputing one adjustable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemUpdate {
    pub totals: AdjustmentTotals,
    /// Ids of adjustments whose amount or eligibility changed and must be
    /// persisted.
    pub changed: Vec<String>,
}

/// Recomputes the adjustments of a single adjustable.
pub struct ItemAdjustments<'a> {
    snapshot: AdjustableSnapshot,
    catalog: &'a dyn SourceCatalog,
    now: DateTime<Utc>,
}

impl<'a> ItemAdjustments<'a> {
    pub fn new(
        snapshot: AdjustableSnapshot,
        catalog: &'a dyn SourceCatalog,
        now: DateTime<Utc>,
    ) -> Self {
        ItemAdjustments {
            snapshot,
            catalog,
            now,
        }
    }

    /// Runs the three passes over `adjustments`.
    ///
    /// Adjustments belonging to another adjustable are left alone.
    pub fn update(mut self, adjustments: &mut [Adjustment]) -> ItemUpdate {
        let target = self.snapshot.adjustable.clone();
        let mut own: Vec<&mut Adjustment> = adjustments
            .iter_mut()
            .filter(|a| a.adjustable == target)
            .collect();
        let before: Vec<(i64, bool, DateTime<Utc>)> = own
            .iter()
            .map(|a| (a.amount_cents, a.eligible, a.updated_at))
            .collect();

        // 1. Promotions
        let mut promotion_total = Money::zero();
        for adjustment in own.iter_mut().filter(|a| a.is_promotion()) {
            adjustment.recalculate(&self.snapshot, self.catalog, self.now);
            promotion_total += adjustment.amount();
        }

        if !promotion_total.is_zero() {
            self.choose_best_promotion(&mut own);
        }
        let promo_total = best_promotion(&own).map_or(Money::zero(), |a| a.amount());
        self.snapshot.promo_total = promo_total;

        // 2. Taxes
        let mut included_tax_total = Money::zero();
        let mut additional_tax_total = Money::zero();
        for adjustment in own.iter_mut().filter(|a| a.is_tax()) {
            adjustment.recalculate(&self.snapshot, self.catalog, self.now);
            if !adjustment.eligible {
                continue;
            }
            if adjustment.included {
                included_tax_total += adjustment.amount();
            } else {
                additional_tax_total += adjustment.amount();
            }
        }

        // 3. Everything else
        let mut other_total = Money::zero();
        for adjustment in own
            .iter_mut()
            .filter(|a| !a.is_tax() && !a.is_promotion())
        {
            adjustment.recalculate(&self.snapshot, self.catalog, self.now);
            if adjustment.eligible && !adjustment.included {
                other_total += adjustment.amount();
            }
        }

        // A promotion can flip eligible and back within one run; only the
        // final state counts.
        let mut changed = Vec::new();
        for (adjustment, (amount_cents, eligible, updated_at)) in own.iter_mut().zip(before) {
            if adjustment.amount_cents == amount_cents && adjustment.eligible == eligible {
                adjustment.updated_at = updated_at;
            } else {
                changed.push(adjustment.id.clone());
            }
        }

        ItemUpdate {
            totals: AdjustmentTotals {
                promo_total,
                included_tax_total,
                additional_tax_total,
                other_total,
                adjustment_total: promo_total + additional_tax_total + other_total,
            },
            changed,
        }
    }

    /// Only the best promotion applies; every other one becomes ineligible.
    fn choose_best_promotion(&self, own: &mut [&mut Adjustment]) {
        let Some(best_id) = best_promotion(own).map(|a| a.id.clone()) else {
            return;
        };

        for adjustment in own
            .iter_mut()
            .filter(|a| a.is_promotion() && a.id != best_id && a.eligible)
        {
            adjustment.eligible = false;
            adjustment.updated_at = self.now;
        }
    }
}

/// The eligible promotion adjustment with the largest credit.
///
/// Ties go to the most recently created, then to the highest id.
pub fn best_promotion<'b>(adjustments: &'b [&mut Adjustment]) -> Option<&'b Adjustment> {
    adjustments
        .iter()
        .map(|a| &**a)
        .filter(|a| a.is_promotion() && a.eligible)
        .min_by(|a, b| compare_promotions(a, b))
}

fn compare_promotions(a: &Adjustment, b: &Adjustment) -> Ordering {
    a.amount_cents
        .cmp(&b.amount_cents)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

// =============================================================================
// Unit Tests
// =============================================================================
