//! # stockline-core: Pure Inventory Logic for Stockline
//!
//! Units of measure, tiered pricing, purchase order rules and checkout
//! planning, as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            External endpoints (catalog, PO, checkout)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockline-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   units   │  │  pricing  │  │ purchase_ │  │ checkout  │  │   │
//! │  │   │ unit graph│  │ tier pick │  │   order   │  │ cart plan │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          stockline-db (ledger, repositories, SQLite)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Unit, Variant, PurchaseOrder, SalesTransaction)
//! - [`money`] - Money type with integer arithmetic
//! - [`units`] - Unit graph resolver
//! - [`pricing`] - Tiered price resolver
//! - [`purchase_order`] - Purchase order state machine and receive planning
//! - [`checkout`] - Cart pricing, stock demand and payment settlement
//! - [`numbering`] - `PREFIX-YYYY-NNNNNN` document numbers
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use stockline_core::pricing::quote_line;
//! use stockline_core::{Money, PriceMode, PricingTier};
//!
//! let tiers = [PricingTier::new(1, 75_000), PricingTier::new(12, 70_000)];
//!
//! // One Dozen (12 pcs) lands on the 12+ tier
//! let quote = quote_line(1, 12, &tiers, PriceMode::Fixed, Money::zero()).unwrap();
//! assert_eq!(quote.unit_price.minor(), 840_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod error;
pub mod money;
pub mod numbering;
pub mod pricing;
pub mod purchase_order;
pub mod types;
pub mod units;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use numbering::DocumentNumber;
pub use pricing::LineQuote;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in a single checkout.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity on one checkout or purchase order line, in the line's unit.
///
/// ## Business Reason
/// Catches typos like 1000 instead of 10 before they hit the ledger.
pub const MAX_LINE_QUANTITY: i64 = 9_999;

/// Maximum lines on a purchase order.
pub const MAX_PURCHASE_ORDER_LINES: usize = 500;

/// Default prefix of sales transaction numbers.
pub const DEFAULT_SALES_PREFIX: &str = "TRX";

/// Default prefix of purchase order numbers.
pub const DEFAULT_PURCHASE_PREFIX: &str = "PO";
