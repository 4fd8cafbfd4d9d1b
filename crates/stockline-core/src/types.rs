//! # Domain Types
//!
//! Core domain types used throughout Stockline.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Product ──┬── Unit (forest, exactly one base)                          │
//! │            │     Pcs ◄── Dozen ◄── Box                                  │
//! │            │                                                            │
//! │            └── Variant ── PricingTier[] (ascending minQty)              │
//! │                   │                                                     │
//! │                   └── StockMovement[] (append-only ledger)              │
//! │                              ▲                  ▲                       │
//! │                              │                  │                       │
//! │                 PurchaseOrder (+items)   SalesTransaction (+items)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where one exists: (sku, PO number, transaction number)
//!
//! Row structs keep money as `*_cents` integers (the minor unit) and expose
//! [`Money`] accessors, so rows map 1:1 onto table columns.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Product & Units
// =============================================================================

/// A catalog product. Owns its units of measure and its variants.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Soft-delete flag; inactive products cannot be sold.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A unit of measure of one product.
///
/// `to_base_unit` is derived: it is never accepted from input, only
/// computed by [`crate::units::recalculate_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Unit {
    pub id: String,
    pub product_id: String,
    pub name: String,
    /// How many `converts_to` units make one of this unit.
    pub conversion_factor: i64,
    /// Target unit id; `None` only for the base unit.
    pub converts_to: Option<String>,
    /// How many base units make one of this unit.
    pub to_base_unit: i64,
    pub is_base: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Variant & Pricing
// =============================================================================

/// One step of a variant's quantity-dependent price list.
///
/// `value` is a raw amount per base unit. What it means is decided by the
/// variant's [`PriceMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PricingTier {
    pub min_qty: i64,
    pub value: i64,
}

impl PricingTier {
    pub const fn new(min_qty: i64, value: i64) -> Self {
        PricingTier { min_qty, value }
    }
}

/// How a tier value turns into a selling price per base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PriceMode {
    /// The tier value is the selling price.
    #[default]
    Fixed,
    /// The tier value is a markup on cost, in basis points.
    MarkupPercentage,
    /// The tier value is an absolute markup added to cost.
    MarkupAmount,
}

/// A sellable variant of a product. Stock is tracked per variant, in base units.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Variant {
    pub id: String,
    pub product_id: String,
    /// Globally unique when present.
    pub sku: Option<String>,
    /// Globally unique when present.
    pub barcode: Option<String>,
    /// Display label, e.g. "Red / L".
    pub label: String,
    /// JSON object of attribute name → value.
    pub attributes: String,
    pub price_mode: PriceMode,
    /// Last received purchase cost per base unit.
    pub cost_per_base_cents: i64,
    /// Cached ledger aggregate. Written only by the stock ledger.
    pub current_stock: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    /// Returns the cost per base unit as Money.
    #[inline]
    pub fn cost_per_base(&self) -> Money {
        Money::from_minor(self.cost_per_base_cents)
    }

    /// Parses the attribute JSON. Malformed JSON yields an empty map.
    pub fn attribute_map(&self) -> BTreeMap<String, String> {
        serde_json::from_str(&self.attributes).unwrap_or_default()
    }
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    PurchaseReceive,
    Sales,
    Adjustment,
}

impl MovementType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::PurchaseReceive => "purchase_receive",
            MovementType::Sales => "sales",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of document a movement points back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    PurchaseOrder,
    SalesTransaction,
    Adjustment,
}

impl ReferenceType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::PurchaseOrder => "purchase_order",
            ReferenceType::SalesTransaction => "sales_transaction",
            ReferenceType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Back-reference from a movement to the document that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockReference {
    pub reference_type: ReferenceType,
    pub reference_id: String,
}

impl StockReference {
    pub fn purchase_order(id: impl Into<String>) -> Self {
        StockReference {
            reference_type: ReferenceType::PurchaseOrder,
            reference_id: id.into(),
        }
    }

    pub fn sales_transaction(id: impl Into<String>) -> Self {
        StockReference {
            reference_type: ReferenceType::SalesTransaction,
            reference_id: id.into(),
        }
    }

    pub fn adjustment(id: impl Into<String>) -> Self {
        StockReference {
            reference_type: ReferenceType::Adjustment,
            reference_id: id.into(),
        }
    }
}

/// One append-only ledger row. Never updated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub variant_id: String,
    pub movement_type: MovementType,
    /// Signed delta in base units.
    pub quantity: i64,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Purchase Orders
// =============================================================================

/// Lifecycle state of a purchase order. See [`crate::purchase_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseOrderStatus {
    #[default]
    Draft,
    Sent,
    Received,
    Completed,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Sent => "sent",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Completed => "completed",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purchase order header.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrder {
    pub id: String,
    /// Business number, `PO-YYYY-NNNNNN`.
    pub number: String,
    pub supplier_id: String,
    pub status: PurchaseOrderStatus,
    pub notes: Option<String>,
    /// Σ ordered_qty × price while open; Σ received_qty × received_price after receive.
    pub subtotal_cents: i64,
    /// Σ ordered_qty while open; Σ received_qty after receive.
    pub total_items: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub received_at: Option<DateTime<Utc>>,
}

impl PurchaseOrder {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_minor(self.subtotal_cents)
    }
}

/// Purchase order line. Display fields are denormalized at create time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrderItem {
    pub id: String,
    pub purchase_order_id: String,
    pub product_id: String,
    pub variant_id: String,
    /// Unit the quantity was ordered in.
    pub unit_id: String,
    pub product_name: String,
    pub variant_label: String,
    pub unit_name: String,
    pub ordered_qty: i64,
    /// Price per order unit.
    pub price_cents: i64,
    pub received_qty: Option<i64>,
    pub received_price_cents: Option<i64>,
    pub verified: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A purchase order with its lines.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseOrderDetail {
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
}

// =============================================================================
// Sales
// =============================================================================

/// How the customer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash; tendered amount and change are recorded.
    Cash,
    /// Card payment on an external terminal.
    Card,
    /// Bank or e-wallet transfer.
    Transfer,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed sale. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SalesTransaction {
    pub id: String,
    /// Business number, `PREFIX-YYYY-NNNNNN`.
    pub number: String,
    pub payment_method: PaymentMethod,
    pub subtotal_cents: i64,
    pub total_cents: i64,
    /// Σ line quantity, in the units the lines were sold in.
    pub total_items: i64,
    pub amount_tendered_cents: i64,
    pub change_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SalesTransaction {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_minor(self.total_cents)
    }
}

/// A sale line. Uses the snapshot pattern to freeze names and prices.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SalesTransactionItem {
    pub id: String,
    pub transaction_id: String,
    pub product_id: String,
    pub variant_id: String,
    pub unit_id: String,
    pub product_name: String,
    pub variant_label: String,
    pub unit_name: String,
    pub quantity: i64,
    pub to_base_unit: i64,
    pub base_quantity: i64,
    /// Resolved tier value per base unit.
    pub tier_value_cents: i64,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SalesTransactionItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_minor(self.unit_price_cents)
    }

    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_minor(self.total_price_cents)
    }
}

/// What the cashier gets back from a successful checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Receipt {
    pub transaction: SalesTransaction,
    pub items: Vec<SalesTransactionItem>,
}

// =============================================================================
// Input Types
// =============================================================================

/// Unit input for product creation and unit additions.
///
/// `converts_to` names the target unit, either by id or by name within the
/// same product, since ids do not exist yet while a product is created.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewUnit {
    pub name: String,
    pub conversion_factor: i64,
    pub converts_to: Option<String>,
    #[serde(default)]
    pub is_base: bool,
}

impl NewUnit {
    pub fn base(name: impl Into<String>) -> Self {
        NewUnit {
            name: name.into(),
            conversion_factor: 1,
            converts_to: None,
            is_base: true,
        }
    }

    pub fn derived(name: impl Into<String>, factor: i64, converts_to: impl Into<String>) -> Self {
        NewUnit {
            name: name.into(),
            conversion_factor: factor,
            converts_to: Some(converts_to.into()),
            is_base: false,
        }
    }
}

/// Partial edit of one unit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UnitEdit {
    pub name: Option<String>,
    pub conversion_factor: Option<i64>,
    /// New target, by id or name.
    pub converts_to: Option<String>,
}

/// Variant input for product creation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewVariant {
    pub label: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub price_mode: PriceMode,
    #[serde(default)]
    pub cost_per_base_cents: i64,
    pub tiers: Vec<PricingTier>,
    /// Posted through the ledger as an adjustment, in base units.
    #[serde(default)]
    pub opening_stock: i64,
}

/// Product input.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub units: Vec<NewUnit>,
    pub variants: Vec<NewVariant>,
}

/// A variant with its pricing tiers.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VariantDetail {
    pub variant: Variant,
    pub tiers: Vec<PricingTier>,
}

/// A product with everything the checkout and receive flows need.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductDetail {
    pub product: Product,
    pub units: Vec<Unit>,
    pub variants: Vec<VariantDetail>,
}

/// One line of a purchase order request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseOrderLine {
    pub product_id: String,
    pub variant_id: String,
    pub unit_id: String,
    pub ordered_qty: i64,
    /// Price per order unit.
    pub price_cents: i64,
}

/// Receive confirmation for one purchase order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiveItem {
    pub item_id: String,
    pub received_qty: i64,
    pub received_price_cents: i64,
    #[serde(default)]
    pub verified: bool,
}

/// One cart line at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutLine {
    pub product_id: String,
    pub variant_id: String,
    pub unit_id: String,
    pub quantity: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
