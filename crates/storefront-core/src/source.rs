//! # Adjustment Sources
//!
//! A source is the record that generated an adjustment and knows how to
//! compute its amount against an adjustable.
//!
//! ## Source Kinds
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Source            compute_amount(adjustable)               sign        │
//! │  ────────────────  ───────────────────────────────────────  ─────────   │
//! │  TaxRateSource     additional: discounted × rate            charge ≥ 0  │
//! │                    included:   discounted − discounted/(1+r)            │
//! │  PromotionAction   flat rate or percent of amount,          credit ≤ 0  │
//! │                    never more than the amount itself                    │
//! │  UnitCancel        one unit of the line item                credit ≤ 0  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sources are resolved through a [`SourceCatalog`] so the recalculation
//! code never has to know where they are stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::adjustment::{AdjustableSnapshot, SourceKind, SourceRef};
use crate::money::{round_half_away, Money};
use crate::types::TaxRate;

// =============================================================================
// Tax Rate
// =============================================================================

/// A tax rate used as an adjustment source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRateSource {
    pub id: String,
    pub name: String,
    pub rate: TaxRate,
    /// VAT style: the tax is already part of the price.
    pub included_in_price: bool,
}

impl TaxRateSource {
    pub fn compute_amount(&self, adjustable: &AdjustableSnapshot) -> Money {
        let base = adjustable.discounted_amount();
        if !base.is_positive() {
            return Money::zero();
        }
        if self.included_in_price {
            base.included_tax(self.rate)
        } else {
            base.calculate_tax(self.rate)
        }
    }
}

// =============================================================================
// Promotions
// =============================================================================

/// A promotion with an optional activity window and optional codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    pub name: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Ids of the promotion codes that activate this promotion.
    pub code_ids: Vec<String>,
}

impl Promotion {
    /// Whether a code must accompany adjustments from this promotion.
    pub fn requires_code(&self) -> bool {
        !self.code_ids.is_empty()
    }

    /// Whether `now` falls inside the activity window.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        let started = self.starts_at.map_or(true, |starts| starts <= now);
        let not_expired = self.expires_at.map_or(true, |expires| expires > now);
        started && not_expired
    }

    /// Active, and when codes exist, `promotion_code_id` is one of them.
    pub fn is_eligible(&self, promotion_code_id: Option<&str>, now: DateTime<Utc>) -> bool {
        if !self.is_active(now) {
            return false;
        }
        if !self.requires_code() {
            return true;
        }
        promotion_code_id.is_some_and(|code| self.code_ids.iter().any(|c| c == code))
    }
}

/// How a promotion action computes its credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Calculator {
    /// A fixed amount off.
    FlatRate(Money),
    /// A share of the adjustable amount, in basis points.
    Percent(u32),
}

impl Calculator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Calculator::FlatRate(_) => "flat_rate",
            Calculator::Percent(_) => "percent",
        }
    }

    /// Reconstructs a calculator from its stored `(kind, value)` pair.
    pub fn from_parts(kind: &str, value: i64) -> Option<Self> {
        match kind {
            "flat_rate" => Some(Calculator::FlatRate(Money::from_cents(value))),
            "percent" => u32::try_from(value).ok().map(Calculator::Percent),
            _ => None,
        }
    }

    /// The stored value: cents for flat rates, bps for percentages.
    pub fn value(&self) -> i64 {
        match self {
            Calculator::FlatRate(amount) => amount.cents(),
            Calculator::Percent(bps) => *bps as i64,
        }
    }
}

/// The action of a promotion that creates adjustments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionAction {
    pub id: String,
    pub promotion: Promotion,
    pub calculator: Calculator,
}

impl PromotionAction {
    /// A credit no larger than the adjustable's amount.
    pub fn compute_amount(&self, adjustable: &AdjustableSnapshot) -> Money {
        let base = adjustable.amount;
        if !base.is_positive() {
            return Money::zero();
        }
        let discount = match self.calculator {
            Calculator::FlatRate(amount) => amount.abs(),
            Calculator::Percent(bps) => base.percentage_of(bps),
        };
        -discount.min(base)
    }
}

// =============================================================================
// Unit Cancel
// =============================================================================

/// Cancellation of a single unit of a line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCancel {
    pub id: String,
    pub reason: String,
}

impl UnitCancel {
    /// Credits the weighted price of one unit.
    pub fn compute_amount(&self, adjustable: &AdjustableSnapshot) -> Money {
        if adjustable.quantity <= 0 {
            return Money::zero();
        }
        let per_unit = round_half_away(
            adjustable.amount.cents() as i128,
            adjustable.quantity as i128,
        );
        Money::from_cents(-(per_unit as i64))
    }
}

// =============================================================================
// Source
// =============================================================================

/// A resolved adjustment source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    TaxRate(TaxRateSource),
    PromotionAction(PromotionAction),
    UnitCancel(UnitCancel),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::TaxRate(_) => SourceKind::TaxRate,
            Source::PromotionAction(_) => SourceKind::PromotionAction,
            Source::UnitCancel(_) => SourceKind::UnitCancel,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Source::TaxRate(s) => &s.id,
            Source::PromotionAction(s) => &s.id,
            Source::UnitCancel(s) => &s.id,
        }
    }

    pub fn compute_amount(&self, adjustable: &AdjustableSnapshot) -> Money {
        match self {
            Source::TaxRate(s) => s.compute_amount(adjustable),
            Source::PromotionAction(s) => s.compute_amount(adjustable),
            Source::UnitCancel(s) => s.compute_amount(adjustable),
        }
    }

    pub fn promotion(&self) -> Option<&Promotion> {
        match self {
            Source::PromotionAction(action) => Some(&action.promotion),
            _ => None,
        }
    }

    /// Tax rates say whether their adjustments are included in the price.
    pub fn included(&self) -> bool {
        matches!(self, Source::TaxRate(rate) if rate.included_in_price)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Resolves source references to sources.
pub trait SourceCatalog {
    fn resolve(&self, source: &SourceRef) -> Option<&Source>;
}

/// A `SourceCatalog` backed by a map; the database layer preloads one per
/// recalculation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    sources: HashMap<(SourceKind, String), Source>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: Source) {
        self.sources
            .insert((source.kind(), source.id().to_string()), source);
    }

    pub fn insert_tax_rate(&mut self, rate: TaxRateSource) {
        self.insert(Source::TaxRate(rate));
    }

    pub fn insert_promotion_action(&mut self, action: PromotionAction) {
        self.insert(Source::PromotionAction(action));
    }

    pub fn insert_unit_cancel(&mut self, cancel: UnitCancel) {
        self.insert(Source::UnitCancel(cancel));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SourceCatalog for InMemoryCatalog {
    fn resolve(&self, source: &SourceRef) -> Option<&Source> {
        let id = source.id.as_ref()?;
        self.sources.get(&(source.kind.clone(), id.clone()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjustment::AdjustableRef;
    use crate::money::Currency;
    use chrono::Duration;

    fn line_item(amount: i64, quantity: i64, promo_total: i64) -> AdjustableSnapshot {
        AdjustableSnapshot {
            adjustable: AdjustableRef::line_item("li-1"),
            order_id: "order-1".to_string(),
            currency: Currency::usd(),
            amount: Money::from_cents(amount),
            quantity,
            promo_total: Money::from_cents(promo_total),
        }
    }

    fn promotion() -> Promotion {
        Promotion {
            id: "promo-1".to_string(),
            name: "Ten off".to_string(),
            starts_at: None,
            expires_at: None,
            code_ids: vec![],
        }
    }

    #[test]
    fn test_additional_tax_uses_discounted_amount() {
        let tax = TaxRateSource {
            id: "tax".to_string(),
            name: "Sales tax".to_string(),
            rate: TaxRate::from_bps(1000),
            included_in_price: false,
        };
        assert_eq!(tax.compute_amount(&line_item(2000, 2, 0)).cents(), 200);
        assert_eq!(tax.compute_amount(&line_item(2000, 2, -500)).cents(), 150);
        assert!(tax.compute_amount(&line_item(500, 1, -500)).is_zero());
    }

    #[test]
    fn test_included_tax() {
        let vat = TaxRateSource {
            id: "vat".to_string(),
            name: "VAT".to_string(),
            rate: TaxRate::from_bps(2000),
            included_in_price: true,
        };
        assert_eq!(vat.compute_amount(&line_item(1200, 1, 0)).cents(), 200);
        assert!(Source::TaxRate(vat).included());
    }

    #[test]
    fn test_flat_rate_promotion_is_capped() {
        let action = PromotionAction {
            id: "a".to_string(),
            promotion: promotion(),
            calculator: Calculator::FlatRate(Money::from_cents(1000)),
        };
        assert_eq!(action.compute_amount(&line_item(2500, 1, 0)).cents(), -1000);
        assert_eq!(action.compute_amount(&line_item(600, 1, 0)).cents(), -600);
        assert!(action.compute_amount(&line_item(0, 1, 0)).is_zero());
    }

    #[test]
    fn test_percent_promotion() {
        let action = PromotionAction {
            id: "a".to_string(),
            promotion: promotion(),
            calculator: Calculator::Percent(1500),
        };
        assert_eq!(action.compute_amount(&line_item(2000, 1, 0)).cents(), -300);
    }

    #[test]
    fn test_unit_cancel_credits_one_unit() {
        let cancel = UnitCancel {
            id: "c".to_string(),
            reason: "Short ship".to_string(),
        };
        assert_eq!(cancel.compute_amount(&line_item(3000, 3, 0)).cents(), -1000);
        assert!(cancel.compute_amount(&line_item(3000, 0, 0)).is_zero());
    }

    #[test]
    fn test_promotion_window_and_codes() {
        let now = Utc::now();
        let mut promo = promotion();
        assert!(promo.is_eligible(None, now));

        promo.expires_at = Some(now - Duration::hours(1));
        assert!(!promo.is_eligible(None, now));

        promo.expires_at = None;
        promo.code_ids = vec!["code-1".to_string()];
        assert!(promo.requires_code());
        assert!(!promo.is_eligible(None, now));
        assert!(!promo.is_eligible(Some("code-2"), now));
        assert!(promo.is_eligible(Some("code-1"), now));
    }

    #[test]
    fn test_calculator_parts() {
        let flat = Calculator::FlatRate(Money::from_cents(500));
        assert_eq!(Calculator::from_parts(flat.as_str(), flat.value()), Some(flat));
        assert_eq!(Calculator::from_parts("percent", 1000), Some(Calculator::Percent(1000)));
        assert_eq!(Calculator::from_parts("percent", -1), None);
        assert_eq!(Calculator::from_parts("tiered", 1), None);
    }

    #[test]
    fn test_catalog_resolution() {
        let mut catalog = InMemoryCatalog::new();
        catalog.insert_unit_cancel(UnitCancel {
            id: "c-1".to_string(),
            reason: "Damaged".to_string(),
        });

        let found = catalog.resolve(&SourceRef::new(SourceKind::UnitCancel, "c-1"));
        assert!(matches!(found, Some(Source::UnitCancel(_))));

        // Same id, different kind.
        assert!(catalog
            .resolve(&SourceRef::new(SourceKind::TaxRate, "c-1"))
            .is_none());

        let no_id = SourceRef {
            kind: SourceKind::UnitCancel,
            id: None,
        };
        assert!(catalog.resolve(&no_id).is_none());
        assert_eq!(catalog.len(), 1);
    }
}
