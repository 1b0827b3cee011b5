//! # Adjustment Ledger
//!
//! Adjustments represent a change to the total of an order, a shipment or a
//! line item. Each adjustment has a signed amount: charges are positive,
//! credits negative.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Adjustment Lifecycle                               │
//! │                                                                         │
//! │  source generates a charge ──► Adjustment { state: Open }               │
//! │                                     │                                   │
//! │                 recalculate() ◄─────┤  amount follows the source        │
//! │                                     │                                   │
//! │                     close() ────────▼                                   │
//! │                              Adjustment { state: Closed }               │
//! │                                     │  amount frozen                    │
//! │                     open()  ────────┘  (manual only)                    │
//! │                                                                         │
//! │  source becomes irrelevant ──► adjustment destroyed                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Flags
//! - **mandatory**: the charge is kept even when its amount is zero, which
//!   makes "no tax was charged" explicit on the order.
//! - **eligible**: only eligible adjustments count towards totals. An
//!   ineligible adjustment is preserved so it can be reinstated later.
//! - **included**: the amount is already part of the adjustable's price
//!   (VAT style tax) and is not added on top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Currency, DisplayMoney, Money};
use crate::source::{Source, SourceCatalog};
use crate::validation::{validate_label, validate_present, ValidationResult};

// =============================================================================
// Adjustable
// =============================================================================

/// The kind of record an adjustment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AdjustableKind {
    Order,
    Shipment,
    LineItem,
}

impl AdjustableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustableKind::Order => "order",
            AdjustableKind::Shipment => "shipment",
            AdjustableKind::LineItem => "line_item",
        }
    }
}

impl fmt::Display for AdjustableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdjustableKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(AdjustableKind::Order),
            "shipment" => Ok(AdjustableKind::Shipment),
            "line_item" => Ok(AdjustableKind::LineItem),
            other => Err(ValidationError::InvalidFormat {
                field: "adjustable_type".to_string(),
                reason: format!("unknown adjustable type '{}'", other),
            }),
        }
    }
}

/// Polymorphic reference to an adjustable record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdjustableRef {
    pub kind: AdjustableKind,
    pub id: String,
}

impl AdjustableRef {
    pub fn new(kind: AdjustableKind, id: impl Into<String>) -> Self {
        AdjustableRef { kind, id: id.into() }
    }

    pub fn order(id: impl Into<String>) -> Self {
        Self::new(AdjustableKind::Order, id)
    }

    pub fn line_item(id: impl Into<String>) -> Self {
        Self::new(AdjustableKind::LineItem, id)
    }

    pub fn shipment(id: impl Into<String>) -> Self {
        Self::new(AdjustableKind::Shipment, id)
    }
}

/// The numbers a source needs to compute an amount against an adjustable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustableSnapshot {
    pub adjustable: AdjustableRef,
    pub order_id: String,
    pub currency: Currency,
    /// Line item `price × quantity`, shipment cost, or order item total.
    pub amount: Money,
    /// Units on a line item; 1 for shipments and orders.
    pub quantity: i64,
    /// Promotion credit already applied to this adjustable (≤ 0).
    pub promo_total: Money,
}

impl AdjustableSnapshot {
    /// Amount after promotions; tax is computed against this.
    pub fn discounted_amount(&self) -> Money {
        self.amount + self.promo_total
    }
}

// =============================================================================
// Source
// =============================================================================

/// The kind of record that generated an adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    TaxRate,
    PromotionAction,
    UnitCancel,
    /// Any other source type; never recomputed.
    Other(String),
}

impl SourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            SourceKind::TaxRate => "tax_rate",
            SourceKind::PromotionAction => "promotion_action",
            SourceKind::UnitCancel => "unit_cancel",
            SourceKind::Other(other) => other.as_str(),
        }
    }

    /// Parses a stored source type; unknown types map to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "tax_rate" => SourceKind::TaxRate,
            "promotion_action" => SourceKind::PromotionAction,
            "unit_cancel" => SourceKind::UnitCancel,
            other => SourceKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polymorphic reference to an adjustment source.
///
/// A type without an id happens for legacy rows; such sources never resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub id: Option<String>,
}

impl SourceRef {
    pub fn new(kind: SourceKind, id: impl Into<String>) -> Self {
        SourceRef {
            kind,
            id: Some(id.into()),
        }
    }
}

// =============================================================================
// State Machine
// =============================================================================

/// Open adjustments follow their source; closed ones are frozen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentState {
    #[default]
    Open,
    Closed,
}

impl AdjustmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentState::Open => "open",
            AdjustmentState::Closed => "closed",
        }
    }
}

impl fmt::Display for AdjustmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Adjustment
// =============================================================================

/// A monetary delta applied to an order, a shipment or a line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: String,
    pub order_id: String,
    pub adjustable: AdjustableRef,
    pub source: Option<SourceRef>,
    pub amount_cents: i64,
    pub label: String,
    pub eligible: bool,
    pub mandatory: bool,
    pub included: bool,
    pub state: AdjustmentState,
    pub promotion_code_id: Option<String>,
    pub adjustment_reason_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Adjustment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state == AdjustmentState::Closed
    }

    /// Promotion adjustments have a promotion action source.
    pub fn is_promotion(&self) -> bool {
        self.source_kind() == Some(&SourceKind::PromotionAction)
    }

    /// Tax adjustments have a tax rate source.
    pub fn is_tax(&self) -> bool {
        self.source_kind() == Some(&SourceKind::TaxRate)
    }

    /// Cancellation adjustments have a unit cancel source.
    pub fn is_cancellation(&self) -> bool {
        self.source_kind() == Some(&SourceKind::UnitCancel)
    }

    #[inline]
    pub fn is_charge(&self) -> bool {
        self.amount_cents >= 0
    }

    #[inline]
    pub fn is_credit(&self) -> bool {
        self.amount_cents < 0
    }

    fn source_kind(&self) -> Option<&SourceKind> {
        self.source.as_ref().map(|s| &s.kind)
    }

    /// The amount rendered in `currency`, e.g. `$10.55` or `¥11`.
    pub fn display_amount<'a>(&self, currency: &'a Currency) -> DisplayMoney<'a> {
        self.amount().display(currency)
    }

    /// Fires the `close` event (open → closed).
    pub fn close(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.transition("close", AdjustmentState::Open, AdjustmentState::Closed, now)
    }

    /// Fires the `open` event (closed → open).
    pub fn open(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.transition("open", AdjustmentState::Closed, AdjustmentState::Open, now)
    }

    fn transition(
        &mut self,
        event: &str,
        from: AdjustmentState,
        to: AdjustmentState,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.state != from {
            return Err(CoreError::InvalidTransition {
                id: self.id.clone(),
                event: event.to_string(),
                state: self.state.to_string(),
            });
        }
        self.state = to;
        self.updated_at = now;
        Ok(())
    }

    /// Recomputes the amount from the source against `adjustable`.
    ///
    /// ## Rules
    /// - Closed adjustments are never touched.
    /// - Adjustments without a resolvable source (manual adjustments) keep
    ///   their amount.
    /// - Promotion adjustments also refresh `eligible` from the promotion.
    ///
    /// Returns `true` when the amount or eligibility changed, i.e. when the
    /// row needs to be persisted.
    pub fn recalculate(
        &mut self,
        adjustable: &AdjustableSnapshot,
        catalog: &dyn SourceCatalog,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_closed() {
            return false;
        }

        let Some(source) = self.source.as_ref().and_then(|s| catalog.resolve(s)) else {
            return false;
        };

        let amount = source.compute_amount(adjustable).cents();
        let eligible = match source {
            Source::PromotionAction(action) => action
                .promotion
                .is_eligible(self.promotion_code_id.as_deref(), now),
            _ => self.eligible,
        };

        if amount == self.amount_cents && eligible == self.eligible {
            return false;
        }

        self.amount_cents = amount;
        self.eligible = eligible;
        self.updated_at = now;
        true
    }
}

// =============================================================================
// New Adjustment
// =============================================================================

/// Input for creating an adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAdjustment {
    pub order_id: String,
    pub adjustable: AdjustableRef,
    pub source: Option<SourceRef>,
    pub amount: Money,
    pub label: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub included: bool,
    #[serde(default = "default_eligible")]
    pub eligible: bool,
    #[serde(default)]
    pub state: AdjustmentState,
    #[serde(default)]
    pub promotion_code_id: Option<String>,
    #[serde(default)]
    pub adjustment_reason_id: Option<String>,
}

fn default_eligible() -> bool {
    true
}

impl NewAdjustment {
    /// A manual, sourceless adjustment.
    pub fn manual(
        order_id: impl Into<String>,
        adjustable: AdjustableRef,
        amount: Money,
        label: impl Into<String>,
    ) -> Self {
        NewAdjustment {
            order_id: order_id.into(),
            adjustable,
            source: None,
            amount,
            label: label.into(),
            mandatory: false,
            included: false,
            eligible: true,
            state: AdjustmentState::Open,
            promotion_code_id: None,
            adjustment_reason_id: None,
        }
    }

    pub fn with_source(mut self, source: SourceRef) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_promotion_code(mut self, code_id: impl Into<String>) -> Self {
        self.promotion_code_id = Some(code_id.into());
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn included(mut self) -> Self {
        self.included = true;
        self
    }

    /// Presence checks.
    ///
    /// `promotion_requires_code` is whether the source's promotion has any
    /// codes; a promotion adjustment must then carry one.
    pub fn validate(&self, promotion_requires_code: bool) -> ValidationResult<()> {
        validate_present("order", &self.order_id)?;
        validate_present("adjustable", &self.adjustable.id)?;
        validate_label(&self.label)?;

        let is_promotion = matches!(
            self.source,
            Some(SourceRef {
                kind: SourceKind::PromotionAction,
                ..
            })
        );
        if is_promotion && promotion_requires_code && self.promotion_code_id.is_none() {
            return Err(ValidationError::Required {
                field: "promotion_code".to_string(),
            });
        }

        Ok(())
    }

    /// Materializes the record with a fresh id.
    pub fn into_adjustment(self, id: impl Into<String>, now: DateTime<Utc>) -> Adjustment {
        Adjustment {
            id: id.into(),
            order_id: self.order_id,
            adjustable: self.adjustable,
            source: self.source,
            amount_cents: self.amount.cents(),
            label: self.label.trim().to_string(),
            eligible: self.eligible,
            mandatory: self.mandatory,
            included: self.included,
            state: self.state,
            promotion_code_id: self.promotion_code_id,
            adjustment_reason_id: self.adjustment_reason_id,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Scopes
// =============================================================================

/// Named filters over adjustments.
///
/// Each scope works as an in-memory predicate and as a SQL predicate over the
/// `adjustments` table, so repository queries and in-memory filtering agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdjustmentScope {
    Open,
    Closed,
    Cancellation,
    Tax,
    /// Not a tax adjustment, including adjustments without a source.
    NonTax,
    /// Adjustments on line items.
    Price,
    /// Adjustments on shipments.
    Shipping,
    /// Not mandatory.
    Optional,
    Eligible,
    /// amount ≥ 0
    Charge,
    /// amount < 0
    Credit,
    Nonzero,
    Promotion,
    /// Not a promotion adjustment, including adjustments without a source.
    NonPromotion,
    IsIncluded,
    Additional,
}

impl AdjustmentScope {
    pub fn matches(&self, adjustment: &Adjustment) -> bool {
        match self {
            AdjustmentScope::Open => !adjustment.is_closed(),
            AdjustmentScope::Closed => adjustment.is_closed(),
            AdjustmentScope::Cancellation => adjustment.is_cancellation(),
            AdjustmentScope::Tax => adjustment.is_tax(),
            AdjustmentScope::NonTax => !adjustment.is_tax(),
            AdjustmentScope::Price => adjustment.adjustable.kind == AdjustableKind::LineItem,
            AdjustmentScope::Shipping => adjustment.adjustable.kind == AdjustableKind::Shipment,
            AdjustmentScope::Optional => !adjustment.mandatory,
            AdjustmentScope::Eligible => adjustment.eligible,
            AdjustmentScope::Charge => adjustment.is_charge(),
            AdjustmentScope::Credit => adjustment.is_credit(),
            AdjustmentScope::Nonzero => adjustment.amount_cents != 0,
            AdjustmentScope::Promotion => adjustment.is_promotion(),
            AdjustmentScope::NonPromotion => !adjustment.is_promotion(),
            AdjustmentScope::IsIncluded => adjustment.included,
            AdjustmentScope::Additional => !adjustment.included,
        }
    }

    /// SQL predicate over the `adjustments` table columns.
    pub fn sql_predicate(&self) -> &'static str {
        match self {
            AdjustmentScope::Open => "state = 'open'",
            AdjustmentScope::Closed => "state = 'closed'",
            AdjustmentScope::Cancellation => "source_type = 'unit_cancel'",
            AdjustmentScope::Tax => "source_type = 'tax_rate'",
            AdjustmentScope::NonTax => "(source_type IS NULL OR source_type != 'tax_rate')",
            AdjustmentScope::Price => "adjustable_type = 'line_item'",
            AdjustmentScope::Shipping => "adjustable_type = 'shipment'",
            AdjustmentScope::Optional => "mandatory = 0",
            AdjustmentScope::Eligible => "eligible = 1",
            AdjustmentScope::Charge => "amount_cents >= 0",
            AdjustmentScope::Credit => "amount_cents < 0",
            AdjustmentScope::Nonzero => "amount_cents != 0",
            AdjustmentScope::Promotion => "source_type = 'promotion_action'",
            AdjustmentScope::NonPromotion => {
                "(source_type IS NULL OR source_type != 'promotion_action')"
            }
            AdjustmentScope::IsIncluded => "included = 1",
            AdjustmentScope::Additional => "included = 0",
        }
    }
}

/// Filters `adjustments` by every scope in `scopes`.
pub fn filter<'a>(
    adjustments: &'a [Adjustment],
    scopes: &'a [AdjustmentScope],
) -> impl Iterator<Item = &'a Adjustment> + 'a {
    adjustments
        .iter()
        .filter(move |a| scopes.iter().all(|scope| scope.matches(a)))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{
        Calculator, InMemoryCatalog, Promotion, PromotionAction, TaxRateSource,
    };
    use crate::types::TaxRate;
    use chrono::Duration;

    fn adjustment(source: Option<SourceRef>, amount: i64) -> Adjustment {
        NewAdjustment {
            source,
            ..NewAdjustment::manual(
                "order-1",
                AdjustableRef::order("order-1"),
                Money::from_cents(amount),
                "Adjustment",
            )
        }
        .into_adjustment("adj-1", Utc::now())
    }

    fn snapshot(amount: i64) -> AdjustableSnapshot {
        AdjustableSnapshot {
            adjustable: AdjustableRef::order("order-1"),
            order_id: "order-1".to_string(),
            currency: Currency::usd(),
            amount: Money::from_cents(amount),
            quantity: 1,
            promo_total: Money::zero(),
        }
    }

    fn tax_catalog() -> InMemoryCatalog {
        let mut catalog = InMemoryCatalog::new();
        catalog.insert_tax_rate(TaxRateSource {
            id: "tax-1".to_string(),
            name: "Sales tax".to_string(),
            rate: TaxRate::from_bps(1000),
            included_in_price: false,
        });
        catalog
    }

    #[test]
    fn test_closed_state() {
        let mut adj = adjustment(None, 500);
        assert!(!adj.is_closed());

        adj.close(Utc::now()).unwrap();
        assert!(adj.is_closed());
        assert!(adj.close(Utc::now()).is_err());

        adj.open(Utc::now()).unwrap();
        assert!(!adj.is_closed());
        assert!(matches!(
            adj.open(Utc::now()),
            Err(CoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_recalculate_updates_open_amount() {
        let catalog = tax_catalog();
        let mut adj = adjustment(Some(SourceRef::new(SourceKind::TaxRate, "tax-1")), 500);

        assert!(adj.recalculate(&snapshot(10_000), &catalog, Utc::now()));
        assert_eq!(adj.amount_cents, 1000);

        // Second pass is a no-op: nothing to persist.
        assert!(!adj.recalculate(&snapshot(10_000), &catalog, Utc::now()));
    }

    #[test]
    fn test_recalculate_skips_closed() {
        let catalog = tax_catalog();
        let mut adj = adjustment(Some(SourceRef::new(SourceKind::TaxRate, "tax-1")), 500);
        adj.close(Utc::now()).unwrap();

        assert!(!adj.recalculate(&snapshot(10_000), &catalog, Utc::now()));
        assert_eq!(adj.amount_cents, 500);
    }

    #[test]
    fn test_recalculate_without_source_keeps_amount() {
        let catalog = tax_catalog();
        let mut adj = adjustment(None, 500);
        assert!(!adj.recalculate(&snapshot(10_000), &catalog, Utc::now()));

        let mut unresolvable = adjustment(
            Some(SourceRef {
                kind: SourceKind::Other("return_authorization".to_string()),
                id: None,
            }),
            -300,
        );
        assert!(!unresolvable.recalculate(&snapshot(10_000), &catalog, Utc::now()));
        assert_eq!(unresolvable.amount_cents, -300);
    }

    #[test]
    fn test_recalculate_promotion_eligibility() {
        let now = Utc::now();
        let mut catalog = InMemoryCatalog::new();
        catalog.insert_promotion_action(PromotionAction {
            id: "action-1".to_string(),
            promotion: Promotion {
                id: "promo-1".to_string(),
                name: "Spring".to_string(),
                starts_at: Some(now + Duration::days(1)),
                expires_at: None,
                code_ids: vec![],
            },
            calculator: Calculator::FlatRate(Money::from_cents(500)),
        });

        let mut adj = adjustment(
            Some(SourceRef::new(SourceKind::PromotionAction, "action-1")),
            0,
        );
        assert!(adj.recalculate(&snapshot(2000), &catalog, now));
        assert_eq!(adj.amount_cents, -500);
        assert!(!adj.eligible);

        // Once the promotion has started, it becomes eligible again.
        assert!(adj.recalculate(&snapshot(2000), &catalog, now + Duration::days(2)));
        assert!(adj.eligible);
    }

    #[test]
    fn test_kind_predicates() {
        let tax = adjustment(Some(SourceRef::new(SourceKind::TaxRate, "t")), 10);
        assert!(tax.is_tax());
        assert!(!tax.is_promotion());

        let promo = adjustment(Some(SourceRef::new(SourceKind::PromotionAction, "p")), -10);
        assert!(promo.is_promotion());
        assert!(promo.is_credit());

        let cancel = adjustment(Some(SourceRef::new(SourceKind::UnitCancel, "u")), -10);
        assert!(cancel.is_cancellation());

        let manual = adjustment(None, 0);
        assert!(manual.is_charge());
        assert!(!manual.is_tax());
    }

    #[test]
    fn test_non_tax_scope_includes_sourceless() {
        let all = vec![
            adjustment(Some(SourceRef::new(SourceKind::TaxRate, "t")), 10),
            adjustment(
                Some(SourceRef {
                    kind: SourceKind::Other("order".to_string()),
                    id: None,
                }),
                10,
            ),
            adjustment(None, 10),
        ];

        let non_tax: Vec<_> = filter(&all, &[AdjustmentScope::NonTax]).collect();
        assert_eq!(non_tax.len(), 2);
        assert!(non_tax.iter().all(|a| !a.is_tax()));
    }

    #[test]
    fn test_combined_scopes() {
        let mut a = adjustment(None, -10);
        a.mandatory = true;
        let b = adjustment(None, 0);
        let c = adjustment(None, 25);
        let all = vec![a, b, c];

        assert_eq!(filter(&all, &[AdjustmentScope::Nonzero]).count(), 2);
        assert_eq!(
            filter(&all, &[AdjustmentScope::Optional, AdjustmentScope::Charge]).count(),
            2
        );
        assert_eq!(filter(&all, &[AdjustmentScope::Credit]).count(), 1);
        assert_eq!(
            filter(&all, &[AdjustmentScope::Credit, AdjustmentScope::Optional]).count(),
            0
        );
    }

    #[test]
    fn test_validation() {
        let base = NewAdjustment::manual(
            "order-1",
            AdjustableRef::line_item("li-1"),
            Money::from_cents(500),
            "Adjustment",
        );
        assert!(base.validate(false).is_ok());

        let blank_label = NewAdjustment {
            label: " ".to_string(),
            ..base.clone()
        };
        assert_eq!(
            blank_label.validate(false),
            Err(ValidationError::Required {
                field: "label".to_string()
            })
        );

        let no_order = NewAdjustment {
            order_id: String::new(),
            ..base.clone()
        };
        assert!(no_order.validate(false).is_err());

        let promo = base
            .clone()
            .with_source(SourceRef::new(SourceKind::PromotionAction, "action-1"));
        assert!(promo.validate(false).is_ok());
        assert!(promo.validate(true).is_err());
        assert!(promo.with_promotion_code("code-1").validate(true).is_ok());

        // Non-promotion adjustments never need a code.
        assert!(base.validate(true).is_ok());
    }

    #[test]
    fn test_display_amount() {
        let mut adj = adjustment(None, 1055);
        let usd = Currency::usd();
        let jpy = Currency::new("JPY").unwrap();

        assert_eq!(adj.display_amount(&usd).to_string(), "$10.55");
        assert_eq!(adj.display_amount(&jpy).to_string(), "¥11");

        adj.amount_cents = -500;
        assert_eq!(adj.display_amount(&usd).to_string(), "-$5.00");
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            "line_item".parse::<AdjustableKind>().unwrap(),
            AdjustableKind::LineItem
        );
        assert!("variant".parse::<AdjustableKind>().is_err());
        assert_eq!(SourceKind::parse("tax_rate"), SourceKind::TaxRate);
        assert_eq!(
            SourceKind::parse("store_credit"),
            SourceKind::Other("store_credit".to_string())
        );
        assert_eq!(SourceKind::parse("unit_cancel").as_str(), "unit_cancel");
    }
}
