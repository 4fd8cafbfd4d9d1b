//! # Checkout Planning
//!
//! Prices a cart and checks it against stock without touching storage.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. VALIDATE  cart size, quantities, ownership of unit and variant      │
//! │  2. PRICE     quote every line (unit graph + tier resolver)             │
//! │  3. CHECK     aggregate base quantity per variant, compare with stock   │
//! │               └── any shortfall fails the whole cart                    │
//! │  4. SETTLE    payment method, tendered amount, change                   │
//! │                                                                         │
//! │  Persistence (stockline-db) then applies -base_qty per line through     │
//! │  the ledger inside the same transaction.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::pricing::{quote_line, LineQuote};
use crate::types::{CheckoutLine, PaymentMethod, PricingTier, Product, Unit, Variant};
use crate::validation::{validate_cart_size, validate_quantity, ValidationResult};

/// Everything the planner needs to know about one cart line.
#[derive(Debug, Clone)]
pub struct LineContext {
    pub product: Product,
    pub variant: Variant,
    pub unit: Unit,
    pub tiers: Vec<PricingTier>,
}

/// A priced cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedLine {
    pub product_id: String,
    pub variant_id: String,
    pub unit_id: String,
    pub product_name: String,
    pub variant_label: String,
    pub unit_name: String,
    pub quantity: i64,
    pub to_base_unit: i64,
    pub quote: LineQuote,
}

/// Total base quantity a cart needs from one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDemand {
    pub variant_id: String,
    pub product_name: String,
    pub variant_label: String,
    pub available: i64,
    pub required: i64,
}

impl StockDemand {
    pub fn is_satisfied(&self) -> bool {
        self.required <= self.available
    }
}

/// A fully priced cart, ready to be committed.
#[derive(Debug, Clone)]
pub struct CartPlan {
    pub lines: Vec<PlannedLine>,
    pub demands: Vec<StockDemand>,
    pub subtotal: Money,
    pub total: Money,
    pub total_items: i64,
}

impl CartPlan {
    /// Fails with the first variant whose demand exceeds its stock.
    pub fn ensure_stock(&self) -> CoreResult<()> {
        match self.demands.iter().find(|d| !d.is_satisfied()) {
            Some(short) => Err(CoreError::InsufficientStock {
                product_name: short.product_name.clone(),
                variant_label: short.variant_label.clone(),
                available: short.available,
                required: short.required,
            }),
            None => Ok(()),
        }
    }
}

/// Checks the cart shape: line count and every quantity. Needs no catalog
/// data, so callers run it before opening a transaction.
pub fn validate_cart(lines: &[CheckoutLine]) -> ValidationResult<()> {
    validate_cart_size(lines.len())?;
    for line in lines {
        validate_quantity(line.quantity)?;
    }
    Ok(())
}

/// Prices every line and aggregates stock demand per variant.
///
/// `contexts[i]` describes `lines[i]`. Stock is taken from each context's
/// variant; the same variant on several lines is expected to carry the same
/// `current_stock`.
pub fn plan_cart(lines: &[CheckoutLine], contexts: &[LineContext]) -> CoreResult<CartPlan> {
    validate_cart(lines)?;
    if lines.len() != contexts.len() {
        return Err(ValidationError::Required {
            field: "line context".to_string(),
        }
        .into());
    }

    let mut planned = Vec::with_capacity(lines.len());
    let mut demands: Vec<StockDemand> = Vec::new();
    let mut subtotal = Money::zero();
    let mut total_items: i64 = 0;

    for (line, ctx) in lines.iter().zip(contexts) {
        ensure_line_ownership(line, ctx)?;

        let quote = quote_line(
            line.quantity,
            ctx.unit.to_base_unit,
            &ctx.tiers,
            ctx.variant.price_mode,
            ctx.variant.cost_per_base(),
        )?;

        subtotal = subtotal
            .checked_add(quote.line_total)
            .ok_or_else(|| CoreError::overflow("cart subtotal"))?;
        total_items = total_items
            .checked_add(line.quantity)
            .ok_or_else(|| CoreError::overflow("cart item count"))?;

        match demands.iter_mut().find(|d| d.variant_id == ctx.variant.id) {
            Some(demand) => {
                demand.required = demand
                    .required
                    .checked_add(quote.base_qty)
                    .ok_or_else(|| CoreError::overflow("variant demand"))?;
            }
            None => demands.push(StockDemand {
                variant_id: ctx.variant.id.clone(),
                product_name: ctx.product.name.clone(),
                variant_label: ctx.variant.label.clone(),
                available: ctx.variant.current_stock,
                required: quote.base_qty,
            }),
        }

        planned.push(PlannedLine {
            product_id: ctx.product.id.clone(),
            variant_id: ctx.variant.id.clone(),
            unit_id: ctx.unit.id.clone(),
            product_name: ctx.product.name.clone(),
            variant_label: ctx.variant.label.clone(),
            unit_name: ctx.unit.name.clone(),
            quantity: line.quantity,
            to_base_unit: ctx.unit.to_base_unit,
            quote,
        });
    }

    Ok(CartPlan {
        lines: planned,
        demands,
        subtotal,
        total: subtotal,
        total_items,
    })
}

fn ensure_line_ownership(line: &CheckoutLine, ctx: &LineContext) -> CoreResult<()> {
    let owner = format!("product {}", line.product_id);

    if ctx.product.id != line.product_id {
        return Err(ValidationError::Mismatch {
            field: "product_id".to_string(),
            value: ctx.product.id.clone(),
            owner,
        }
        .into());
    }
    if ctx.variant.id != line.variant_id || ctx.variant.product_id != line.product_id {
        return Err(ValidationError::Mismatch {
            field: "variant_id".to_string(),
            value: line.variant_id.clone(),
            owner,
        }
        .into());
    }
    if ctx.unit.id != line.unit_id || ctx.unit.product_id != line.product_id {
        return Err(ValidationError::Mismatch {
            field: "unit_id".to_string(),
            value: line.unit_id.clone(),
            owner,
        }
        .into());
    }
    if !ctx.product.is_active {
        return Err(ValidationError::InvalidFormat {
            field: "product_id".to_string(),
            reason: format!("product '{}' is inactive", ctx.product.name),
        }
        .into());
    }

    Ok(())
}

// =============================================================================
// Payment
// =============================================================================

/// Tendered amount and change recorded on the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentSettlement {
    pub amount_tendered: Money,
    pub change: Money,
}

/// Settles a payment for `total`.
///
/// Cash needs a tendered amount of at least `total`. Card and transfer are
/// always recorded as exact, whatever was passed in.
pub fn settle_payment(
    method: PaymentMethod,
    total: Money,
    tendered: Option<Money>,
) -> CoreResult<PaymentSettlement> {
    match method {
        PaymentMethod::Cash => {
            let tendered = tendered.ok_or_else(|| ValidationError::Required {
                field: "amount_tendered".to_string(),
            })?;
            if tendered < total {
                return Err(ValidationError::OutOfRange {
                    field: "amount_tendered".to_string(),
                    min: total.minor(),
                    max: i64::MAX,
                }
                .into());
            }
            Ok(PaymentSettlement {
                amount_tendered: tendered,
                change: tendered - total,
            })
        }
        PaymentMethod::Card | PaymentMethod::Transfer => Ok(PaymentSettlement {
            amount_tendered: total,
            change: Money::zero(),
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
