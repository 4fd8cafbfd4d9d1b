//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Tiered prices are multiplied twice (× toBaseUnit, × quantity), so     │
//! │  any float drift is amplified on every checkout line.                  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units                                      │
//! │    70000 × 12 × 1 = 840000, exactly, every time                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockline_core::money::Money;
//!
//! let per_piece = Money::from_minor(70_000);
//! let per_dozen = per_piece.checked_mul(12).unwrap();
//! assert_eq!(per_dozen.minor(), 840_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use ts_rs::TS;

/// Basis points in one whole (100%).
pub const BPS_SCALE: i64 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary amount in the smallest currency unit.
///
/// Stockline is single-currency, so the unit is whatever the store's
/// currency uses as its minor unit (cents, or whole rupiah).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(amount: i64) -> Self {
        Money(amount)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    ///
    /// ## User Workflow
    /// ```text
    /// Tier value: 70000 per piece
    ///      │
    ///      ▼
    /// checked_mul(12)   ← per-unit price for a Dozen
    ///      │
    ///      ▼
    /// checked_mul(3)    ← line total for 3 Dozen
    /// ```
    #[inline]
    pub const fn checked_mul(&self, qty: i64) -> Option<Money> {
        match self.0.checked_mul(qty) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Adds two amounts, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Returns `bps` basis points of this amount, rounded half up, or
    /// `None` when the result does not fit in an `i64`.
    ///
    /// ## Example
    /// ```rust
    /// use stockline_core::money::Money;
    ///
    /// // 12.5% of 1000 = 125
    /// assert_eq!(Money::from_minor(1000).portion_bps(1250), Some(Money::from_minor(125)));
    /// // 10% of 1005 = 100.5 → 101
    /// assert_eq!(Money::from_minor(1005).portion_bps(1000), Some(Money::from_minor(101)));
    /// ```
    pub fn portion_bps(&self, bps: i64) -> Option<Money> {
        // i64 × i64 always fits in i128
        let raw = (self.0 as i128 * bps as i128 + (BPS_SCALE as i128 / 2)) / BPS_SCALE as i128;
        i64::try_from(raw).ok().map(Money)
    }

    /// Divides by a positive integer, rounding half up.
    ///
    /// Used to turn a per-unit purchase price into a per-base-unit cost.
    pub fn div_round(&self, divisor: i64) -> Money {
        if divisor <= 1 {
            return *self;
        }
        Money((self.0 + divisor / 2) / divisor)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows the amount with thousands separators: `840,000`.
///
/// ## Note
/// This is for logs and debugging. Currency symbols and localization
/// belong to the presentation layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        if self.0 < 0 {
            write!(f, "-{}", grouped)
        } else {
            write!(f, "{}", grouped)
        }
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

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
