//! # Tiered Price Resolver
//!
//! Picks the effective per-base-unit value from a variant's tier list and
//! turns it into line prices.
//!
//! ## Calculation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Line: 1 Dozen of Egg, tiers [{1, 75000}, {12, 70000}]                  │
//! │                                                                         │
//! │  1. base_qty   = quantity × to_base_unit      = 1 × 12   = 12           │
//! │  2. tier       = largest min_qty <= base_qty  = {12, 70000}             │
//! │  3. per_base   = PriceMode applied to tier    = 70000 (fixed)           │
//! │  4. unit_price = per_base × to_base_unit      = 70000 × 12 = 840000     │
//! │  5. line_total = quantity × unit_price        = 1 × 840000 = 840000     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tier is chosen by the BASE quantity, so a Dozen and twelve Pcs land
//! on the same tier.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{PriceMode, PricingTier};
use crate::validation::ValidationResult;

/// Validates a tier list before it is stored.
///
/// ## Rules
/// - At least one tier
/// - First `min_qty` is 1
/// - `min_qty` strictly ascending
/// - Every `value` is non-negative
pub fn validate_tiers(tiers: &[PricingTier]) -> ValidationResult<()> {
    let first = tiers
        .first()
        .ok_or_else(|| ValidationError::tiers("at least one tier is required"))?;

    if first.min_qty != 1 {
        return Err(ValidationError::tiers(format!(
            "first tier must start at quantity 1, found {}",
            first.min_qty
        )));
    }

    for pair in tiers.windows(2) {
        if pair[1].min_qty <= pair[0].min_qty {
            return Err(ValidationError::tiers(format!(
                "min_qty must be strictly ascending ({} after {})",
                pair[1].min_qty, pair[0].min_qty
            )));
        }
    }

    if let Some(tier) = tiers.iter().find(|t| t.value < 0) {
        return Err(ValidationError::tiers(format!(
            "tier at quantity {} has a negative value",
            tier.min_qty
        )));
    }

    Ok(())
}

/// Selects the tier with the largest `min_qty <= base_qty`.
///
/// Expects a list that passed [`validate_tiers`]. A quantity below the
/// first tier (only possible for 0) falls back to the first tier.
pub fn resolve(base_qty: i64, tiers: &[PricingTier]) -> CoreResult<&PricingTier> {
    if tiers.is_empty() {
        return Err(CoreError::EmptyTierList);
    }

    let idx = tiers.partition_point(|t| t.min_qty <= base_qty);
    Ok(&tiers[idx.saturating_sub(1)])
}

impl PriceMode {
    /// Interprets a raw tier value as a selling price per base unit.
    ///
    /// - `Fixed`: the value itself
    /// - `MarkupPercentage`: cost plus `value` basis points of cost
    /// - `MarkupAmount`: cost plus `value`
    pub fn per_base_unit_price(&self, tier_value: i64, cost_per_base: Money) -> CoreResult<Money> {
        let price = match self {
            PriceMode::Fixed => Some(Money::from_minor(tier_value)),
            PriceMode::MarkupPercentage => {
                cost_per_base
                    .portion_bps(tier_value)
                    .and_then(|markup| cost_per_base.checked_add(markup))
            }
            PriceMode::MarkupAmount => cost_per_base.checked_add(Money::from_minor(tier_value)),
        };
        price.ok_or_else(|| CoreError::overflow("per base unit price"))
    }
}

/// Fully priced line, before it is written anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineQuote {
    pub base_qty: i64,
    /// Raw value of the selected tier.
    pub tier_value: i64,
    /// Price of one unit of the line's unit.
    pub unit_price: Money,
    pub line_total: Money,
}

/// Prices `quantity` units of a unit worth `to_base_unit` base units.
pub fn quote_line(
    quantity: i64,
    to_base_unit: i64,
    tiers: &[PricingTier],
    mode: PriceMode,
    cost_per_base: Money,
) -> CoreResult<LineQuote> {
    let base_qty = quantity
        .checked_mul(to_base_unit)
        .ok_or_else(|| CoreError::overflow("base quantity"))?;
    let tier = resolve(base_qty, tiers)?;
    let unit_price = mode
        .per_base_unit_price(tier.value, cost_per_base)?
        .checked_mul(to_base_unit)
        .ok_or_else(|| CoreError::overflow("unit price"))?;
    let line_total = unit_price
        .checked_mul(quantity)
        .ok_or_else(|| CoreError::overflow("line total"))?;

    Ok(LineQuote {
        base_qty,
        tier_value: tier.value,
        unit_price,
        line_total,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn egg_tiers() -> Vec<PricingTier> {
        vec![PricingTier::new(1, 75_000), PricingTier::new(12, 70_000)]
    }

    #[test]
    fn test_resolve_picks_largest_min_qty_not_above() {
        let tiers = vec![
            PricingTier::new(1, 100),
            PricingTier::new(10, 90),
            PricingTier::new(50, 80),
        ];
        assert_eq!(resolve(1, &tiers).unwrap().value, 100);
        assert_eq!(resolve(9, &tiers).unwrap().value, 100);
        assert_eq!(resolve(10, &tiers).unwrap().value, 90);
        assert_eq!(resolve(49, &tiers).unwrap().value, 90);
        assert_eq!(resolve(50, &tiers).unwrap().value, 80);
        assert_eq!(resolve(10_000, &tiers).unwrap().value, 80);
    }

    #[test]
    fn test_resolve_matches_linear_scan() {
        let tiers = vec![
            PricingTier::new(1, 500),
            PricingTier::new(3, 450),
            PricingTier::new(7, 400),
            PricingTier::new(20, 350),
        ];
        for qty in 1..40 {
            let expected = tiers.iter().filter(|t| t.min_qty <= qty).last().unwrap();
            assert_eq!(resolve(qty, &tiers).unwrap(), expected, "qty {}", qty);
        }
    }

    #[test]
    fn test_resolve_empty() {
        assert!(matches!(resolve(5, &[]), Err(CoreError::EmptyTierList)));
    }

    #[test]
    fn test_one_dozen_egg_costs_840000() {
        let quote = quote_line(1, 12, &egg_tiers(), PriceMode::Fixed, Money::zero()).unwrap();
        assert_eq!(quote.base_qty, 12);
        assert_eq!(quote.tier_value, 70_000);
        assert_eq!(quote.unit_price.minor(), 840_000);
        assert_eq!(quote.line_total.minor(), 840_000);
    }

    #[test]
    fn test_eleven_pieces_stay_on_first_tier() {
        let quote = quote_line(11, 1, &egg_tiers(), PriceMode::Fixed, Money::zero()).unwrap();
        assert_eq!(quote.tier_value, 75_000);
        assert_eq!(quote.line_total.minor(), 825_000);
    }

    #[test]
    fn test_markup_modes() {
        let cost = Money::from_minor(60_000);
        // 25% markup
        assert_eq!(
            PriceMode::MarkupPercentage
                .per_base_unit_price(2_500, cost)
                .unwrap()
                .minor(),
            75_000
        );
        assert_eq!(
            PriceMode::MarkupAmount
                .per_base_unit_price(5_000, cost)
                .unwrap()
                .minor(),
            65_000
        );
    }

    #[test]
    fn test_quote_overflow() {
        let tiers = vec![PricingTier::new(1, i64::MAX / 2)];
        assert!(matches!(
            quote_line(3, 1, &tiers, PriceMode::Fixed, Money::zero()),
            Err(CoreError::Overflow { .. })
        ));
    }

    #[test]
    fn test_huge_percentage_markup_overflows_instead_of_wrapping() {
        let cost = Money::from_minor(1_000_000_000_000_000);
        assert!(matches!(
            PriceMode::MarkupPercentage.per_base_unit_price(100_000_000, cost),
            Err(CoreError::Overflow { .. })
        ));

        let tiers = vec![PricingTier::new(1, 100_000_000)];
        assert!(matches!(
            quote_line(1, 1, &tiers, PriceMode::MarkupPercentage, cost),
            Err(CoreError::Overflow { .. })
        ));
    }

    #[test]
    fn test_validate_tiers() {
        assert!(validate_tiers(&egg_tiers()).is_ok());
        assert!(validate_tiers(&[]).is_err());
        assert!(validate_tiers(&[PricingTier::new(2, 100)]).is_err());
        assert!(validate_tiers(&[PricingTier::new(1, 100), PricingTier::new(1, 90)]).is_err());
        assert!(validate_tiers(&[PricingTier::new(1, 100), PricingTier::new(5, -1)]).is_err());
        // a higher tier may cost more; only ordering of min_qty is enforced
        assert!(validate_tiers(&[PricingTier::new(1, 100), PricingTier::new(5, 120)]).is_ok());
    }
}
