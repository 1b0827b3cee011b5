//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely, plus the
//! `Currency` code and the `DisplayMoney` renderer used for adjustment labels.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer hundredths                                       │
//! │    Every adjustment amount is an i64 count of 1/100 major units.        │
//! │    Tax and promotion math is done in i128 and rounded exactly once.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use storefront_core::money::{Currency, Money};
//!
//! let price = Money::from_cents(1099);
//! let total = price * 2i64 + Money::from_cents(500);
//! assert_eq!(total.cents(), 2698);
//!
//! let usd = Currency::usd();
//! let shown = total.display(&usd);
//! assert_eq!(shown.to_string(), "$26.98");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use crate::error::ValidationError;
use crate::types::TaxRate;

// =============================================================================
// Rounding
// =============================================================================

/// Integer division rounding half away from zero.
///
/// `round_half_away(-5, 10) == -1`, `round_half_away(5, 10) == 1`.
pub(crate) fn round_half_away(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0);
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A signed monetary value in hundredths of the currency's major unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: credits (promotions, cancellations) are negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Currency-agnostic**: the currency lives on the adjustable, not here
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from hundredths ("cents").
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ```rust
    /// use storefront_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 55).cents(), 1055);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in hundredths.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Tax charged on top of this amount (additional tax).
    ///
    /// ```rust
    /// use storefront_core::money::Money;
    /// use storefront_core::types::TaxRate;
    ///
    /// // $10.00 × 8.25% = $0.825 → $0.83
    /// let tax = Money::from_cents(1000).calculate_tax(TaxRate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        let tax = round_half_away(self.0 as i128 * rate.bps() as i128, 10_000);
        Money(tax as i64)
    }

    /// Tax already contained in this amount (included tax).
    ///
    /// For a gross amount `g` and rate `r` the net is `g / (1 + r)`, the tax
    /// is `g - net`.
    ///
    /// ```rust
    /// use storefront_core::money::Money;
    /// use storefront_core::types::TaxRate;
    ///
    /// // $11.00 gross at 10% contains $1.00 of tax
    /// let tax = Money::from_cents(1100).included_tax(TaxRate::from_bps(1000));
    /// assert_eq!(tax.cents(), 100);
    /// ```
    pub fn included_tax(&self, rate: TaxRate) -> Money {
        let gross = self.0 as i128;
        let net = round_half_away(gross * 10_000, 10_000 + rate.bps() as i128);
        Money((gross - net) as i64)
    }

    /// Returns `bps` basis points of this amount, rounded half away from zero.
    pub fn percentage_of(&self, bps: u32) -> Money {
        Money(round_half_away(self.0 as i128 * bps as i128, 10_000) as i64)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Wraps this amount with a currency for rendering.
    pub fn display<'a>(&self, currency: &'a Currency) -> DisplayMoney<'a> {
        DisplayMoney {
            amount: *self,
            currency,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Currency
// =============================================================================

/// An ISO 4217 currency code (always three upper-case ASCII letters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parses and normalizes a currency code.
    ///
    /// ```rust
    /// use storefront_core::money::Currency;
    ///
    /// assert_eq!(Currency::new("jpy").unwrap().code(), "JPY");
    /// assert!(Currency::new("dollars").is_err());
    /// ```
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ValidationError::Required {
                field: "currency".to_string(),
            });
        }
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidFormat {
                field: "currency".to_string(),
                reason: "must be a three letter ISO 4217 code".to_string(),
            });
        }
        Ok(Currency(code.to_ascii_uppercase()))
    }

    pub fn usd() -> Self {
        Currency(crate::DEFAULT_CURRENCY.to_string())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Symbol shown before the amount, if the currency has a well-known one.
    pub fn symbol(&self) -> Option<&'static str> {
        match self.0.as_str() {
            "USD" | "CAD" | "AUD" | "NZD" => Some("$"),
            "EUR" => Some("€"),
            "GBP" => Some("£"),
            "JPY" | "CNY" => Some("¥"),
            "INR" => Some("₹"),
            _ => None,
        }
    }

    /// Number of minor-unit digits shown when rendering.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "CLP" | "VND" | "ISK" => 0,
            _ => 2,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::usd()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

// =============================================================================
// Display Money
// =============================================================================

/// An amount paired with its currency, rendered for humans.
///
/// Zero-decimal currencies round half away from zero: 10.55 JPY renders as
/// `¥11`.
#[derive(Debug, Clone, Copy)]
pub struct DisplayMoney<'a> {
    pub amount: Money,
    pub currency: &'a Currency,
}

impl fmt::Display for DisplayMoney<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount.is_negative() { "-" } else { "" };
        let abs = self.amount.abs();

        let number = if self.currency.decimal_places() == 0 {
            round_half_away(abs.cents() as i128, 100).to_string()
        } else {
            abs.to_string()
        };

        match self.currency.symbol() {
            Some(symbol) => write!(f, "{}{}{}", sign, symbol, number),
            None => write!(f, "{}{} {}", sign, number, self.currency.code()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor_part(), 99);
    }

    #[test]
    fn test_plain_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(0).to_string(), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((-a).cents(), -1000);
        assert_eq!((a * 3i64).cents(), 3000);

        let total: Money = vec![a, b, -b].into_iter().sum();
        assert_eq!(total, a);
    }

    #[test]
    fn test_round_half_away() {
        assert_eq!(round_half_away(5, 10), 1);
        assert_eq!(round_half_away(4, 10), 0);
        assert_eq!(round_half_away(-5, 10), -1);
        assert_eq!(round_half_away(-4, 10), 0);
    }

    #[test]
    fn test_additional_tax() {
        let amount = Money::from_cents(1000);
        assert_eq!(amount.calculate_tax(TaxRate::from_bps(1000)).cents(), 100);
        assert_eq!(amount.calculate_tax(TaxRate::from_bps(825)).cents(), 83);
        assert!(amount.calculate_tax(TaxRate::zero()).is_zero());
    }

    #[test]
    fn test_included_tax() {
        let gross = Money::from_cents(1100);
        assert_eq!(gross.included_tax(TaxRate::from_bps(1000)).cents(), 100);

        // 20% VAT on 12.00 gross is 2.00
        let gross = Money::from_cents(1200);
        assert_eq!(gross.included_tax(TaxRate::from_bps(2000)).cents(), 200);
    }

    #[test]
    fn test_percentage_of() {
        let subtotal = Money::from_cents(2500);
        assert_eq!(subtotal.percentage_of(1000).cents(), 250);
        assert_eq!(Money::from_cents(-2500).percentage_of(1000).cents(), -250);
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!(Currency::new(" eur ").unwrap().code(), "EUR");
        assert!(Currency::new("").is_err());
        assert!(Currency::new("EU").is_err());
        assert!(Currency::new("E1R").is_err());
        assert_eq!(Currency::default().code(), "USD");
    }

    #[test]
    fn test_display_money() {
        let usd = Currency::usd();
        assert_eq!(Money::from_cents(1055).display(&usd).to_string(), "$10.55");
        assert_eq!(Money::from_cents(-550).display(&usd).to_string(), "-$5.50");

        let jpy = Currency::new("JPY").unwrap();
        assert_eq!(Money::from_cents(1055).display(&jpy).to_string(), "¥11");
        assert_eq!(Money::from_cents(1049).display(&jpy).to_string(), "¥10");

        let chf = Currency::new("CHF").unwrap();
        assert_eq!(Money::from_cents(1055).display(&chf).to_string(), "10.55 CHF");
    }

    #[test]
    fn test_currency_serde_round_trip_rejects_garbage() {
        let parsed: Result<Currency, _> = serde_json::from_str("\"nope\"");
        assert!(parsed.is_err());
        let parsed: Currency = serde_json::from_str("\"gbp\"").unwrap();
        assert_eq!(parsed.symbol(), Some("£"));
    }
}
