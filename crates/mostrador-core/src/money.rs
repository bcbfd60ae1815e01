//! # Money Module
//!
//! Provides the `Money` type for handling peso amounts safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    1210.00 / 1.21 = 999.9999999999999  ❌                               │
//! │                                                                         │
//! │  AFIP validates ImpTotal == ImpNeto + ImpIVA + ImpOpEx to the centavo. │
//! │  A float split that drifts by 0.01 gets the whole voucher rejected.    │
//! │                                                                         │
//! │  OUR SOLUTION: Integer centavos                                        │
//! │    net = round(121000 × 10000 / 12100) = 100000                        │
//! │    iva = 121000 − 100000 = 21000        → always sums back exactly     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mostrador_core::money::Money;
//! use mostrador_core::types::IvaRate;
//!
//! let gross = Money::from_cents(121_000); // $1210.00, IVA included
//! let (net, iva) = gross.split_gross(IvaRate::GENERAL);
//! assert_eq!(net.cents(), 100_000);
//! assert_eq!(iva.cents(), 21_000);
//! assert_eq!(gross.to_afip_amount(), "1210.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use crate::error::ValidationError;
use crate::types::IvaRate;

// =============================================================================
// Money Type
// =============================================================================

/// A peso amount in centavos.
///
/// Signed so that refunds, credit notes and cash discrepancies can be
/// expressed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from centavos.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in centavos.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-peso portion (truncated toward zero).
    #[inline]
    pub const fn pesos(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the centavo portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
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

    /// Parses an operator-entered amount such as `1234.56`, `1234,5` or `-12`.
    ///
    /// ## Rules
    /// - One decimal separator, either `.` or `,`
    /// - At most two decimals
    /// - No thousands separators
    ///
    /// ```rust
    /// use mostrador_core::money::Money;
    ///
    /// assert_eq!(Money::from_decimal_str("1234,5").unwrap().cents(), 123_450);
    /// assert!(Money::from_decimal_str("1.234,56").is_err());
    /// ```
    pub fn from_decimal_str(input: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Required {
                field: "amount".to_string(),
            });
        }

        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let mut parts = digits.split(['.', ',']);
        let whole = parts.next().unwrap_or_default();
        let fraction = parts.next();
        if parts.next().is_some() {
            return Err(invalid("more than one decimal separator"));
        }

        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected digits before the decimal separator"));
        }

        let whole: i64 = whole
            .parse()
            .map_err(|_| invalid("amount is too large"))?;

        let fraction_cents = match fraction {
            None => 0,
            Some(f) if f.is_empty() || f.len() > 2 || !f.chars().all(|c| c.is_ascii_digit()) => {
                return Err(invalid("expected one or two decimals"));
            }
            Some(f) if f.len() == 1 => f.parse::<i64>().unwrap_or(0) * 10,
            Some(f) => f.parse::<i64>().unwrap_or(0),
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction_cents))
            .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }

    /// Renders the amount the way WSFEv1 expects it: `1234.56`.
    pub fn to_afip_amount(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.pesos().abs(), self.cents_part())
    }

    /// IVA on a net amount, rounded half away from zero to the centavo.
    ///
    /// ```rust
    /// use mostrador_core::money::Money;
    /// use mostrador_core::types::IvaRate;
    ///
    /// // $10.05 at 10.5% = 1.05525 → $1.06
    /// let iva = Money::from_cents(1005).calculate_tax(IvaRate::REDUCED);
    /// assert_eq!(iva.cents(), 106);
    /// ```
    pub fn calculate_tax(&self, rate: IvaRate) -> Money {
        let tax = div_round(self.0 as i128 * rate.bps() as i128, 10_000);
        Money(tax as i64)
    }

    /// Splits an IVA-inclusive amount into `(net, iva)`.
    ///
    /// The net is rounded to the centavo and the IVA is whatever remains,
    /// so `net + iva` is always exactly `self`.
    pub fn split_gross(&self, rate: IvaRate) -> (Money, Money) {
        if rate.is_zero() {
            return (*self, Money::zero());
        }
        let net = div_round(self.0 as i128 * 10_000, 10_000 + rate.bps() as i128) as i64;
        (Money(net), Money(self.0 - net))
    }

    /// `self × part / whole`, rounded half away from zero.
    ///
    /// Used to prorate the exempt share of a partial credit note.
    pub fn prorate(&self, part: Money, whole: Money) -> Money {
        if whole.is_zero() {
            return Money::zero();
        }
        Money(div_round(self.0 as i128 * part.0 as i128, whole.0 as i128) as i64)
    }

    /// Multiplies by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

/// Integer division rounding half away from zero.
fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if (numerator < 0) ^ (denominator < 0) {
        (numerator - half) / denominator
    } else {
        (numerator + half) / denominator
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.pesos().abs(), self.cents_part())
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
// Unit Tests
// =============================================================================
