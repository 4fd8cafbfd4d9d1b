//! # Purchase Order Repository
//!
//! Persists purchase orders and drives their status workflow.
//!
//! ## Workflow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   draft ──send──► sent ──receive──► received ──complete──► completed    │
//! │     │              │                   │                                │
//! │     └──cancel──────┴──cancel──► cancelled                               │
//! │                                                                         │
//! │   Only draft orders can be edited or deleted.                           │
//! │   receive is the only step that touches stock.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every status write is conditional on the status it was validated
//! against, so two racing transitions cannot both succeed.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use stockline_core::purchase_order::{
    ensure_editable, order_totals, receipt_totals, resolve_receipt,
};
use stockline_core::validation::{validate_name, validate_price, validate_quantity};
use stockline_core::{
    CoreError, MovementType, PurchaseOrder, PurchaseOrderDetail, PurchaseOrderItem,
    PurchaseOrderLine, PurchaseOrderStatus, ReceiveItem, StockReference, ValidationError,
    MAX_PURCHASE_ORDER_LINES,
};

use crate::error::{DbError, DbResult};
use crate::repository::{catalog, ledger, sequence};
use crate::retry::RetryPolicy;

const ORDER_COLUMNS: &str = r#"
    id, number, supplier_id, status, notes, subtotal_cents,
    total_items, created_at, updated_at, received_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, purchase_order_id, product_id, variant_id, unit_id,
    product_name, variant_label, unit_name, ordered_qty, price_cents,
    received_qty, received_price_cents, verified, created_at
"#;

async fn fetch_order(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<PurchaseOrder>> {
    let sql = format!("SELECT {} FROM purchase_orders WHERE id = ?1", ORDER_COLUMNS);
    let order = sqlx::query_as::<_, PurchaseOrder>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(order)
}

async fn fetch_items(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<Vec<PurchaseOrderItem>> {
    let sql = format!(
        "SELECT {} FROM purchase_order_items WHERE purchase_order_id = ?1 ORDER BY created_at, rowid",
        ITEM_COLUMNS
    );
    let items = sqlx::query_as::<_, PurchaseOrderItem>(&sql)
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

fn validate_lines(lines: &[PurchaseOrderLine]) -> DbResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        }
        .into());
    }
    if lines.len() > MAX_PURCHASE_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_PURCHASE_ORDER_LINES as i64,
        }
        .into());
    }
    for line in lines {
        validate_quantity(line.ordered_qty)?;
        validate_price("price", line.price_cents)?;
    }
    Ok(())
}

/// Resolves each line against the catalog and snapshots its display names.
async fn build_items(
    conn: &mut SqliteConnection,
    order_id: &str,
    lines: &[PurchaseOrderLine],
    now: DateTime<Utc>,
) -> DbResult<Vec<PurchaseOrderItem>> {
    let mut items = Vec::with_capacity(lines.len());

    for line in lines {
        let product = catalog::fetch_product(conn, &line.product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &line.product_id))?;
        let variant = catalog::fetch_variant(conn, &line.variant_id)
            .await?
            .ok_or_else(|| DbError::not_found("Variant", &line.variant_id))?;
        let unit = catalog::fetch_unit(conn, &line.unit_id)
            .await?
            .ok_or_else(|| DbError::not_found("Unit", &line.unit_id))?;

        if variant.product_id != product.id {
            return Err(ValidationError::Mismatch {
                field: "variant_id".to_string(),
                value: variant.id,
                owner: product.name,
            }
            .into());
        }
        if unit.product_id != product.id {
            return Err(ValidationError::Mismatch {
                field: "unit_id".to_string(),
                value: unit.id,
                owner: product.name,
            }
            .into());
        }

        items.push(PurchaseOrderItem {
            id: Uuid::new_v4().to_string(),
            purchase_order_id: order_id.to_string(),
            product_id: product.id,
            variant_id: variant.id,
            unit_id: unit.id,
            product_name: product.name,
            variant_label: variant.label,
            unit_name: unit.name,
            ordered_qty: line.ordered_qty,
            price_cents: line.price_cents,
            received_qty: None,
            received_price_cents: None,
            verified: false,
            created_at: now,
        });
    }

    Ok(items)
}

async fn insert_items(conn: &mut SqliteConnection, items: &[PurchaseOrderItem]) -> DbResult<()> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO purchase_order_items (
                id, purchase_order_id, product_id, variant_id, unit_id,
                product_name, variant_label, unit_name, ordered_qty, price_cents,
                verified, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11)
            "#,
        )
        .bind(&item.id)
        .bind(&item.purchase_order_id)
        .bind(&item.product_id)
        .bind(&item.variant_id)
        .bind(&item.unit_id)
        .bind(&item.product_name)
        .bind(&item.variant_label)
        .bind(&item.unit_name)
        .bind(item.ordered_qty)
        .bind(item.price_cents)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Explains why a conditional status write matched no row.
async fn rejected_write(
    conn: &mut SqliteConnection,
    order_id: &str,
    attempted: PurchaseOrderStatus,
) -> DbError {
    match fetch_order(conn, order_id).await {
        Ok(Some(order)) => {
            debug!(
                number = %order.number,
                from = %order.status,
                to = %attempted,
                "Purchase order transition rejected"
            );
            CoreError::InvalidTransition {
                from: order.status,
                to: attempted,
            }
            .into()
        }
        Ok(None) => DbError::not_found("PurchaseOrder", order_id),
        Err(e) => e,
    }
}

/// Explains why a draft-only write matched no row.
async fn not_editable(conn: &mut SqliteConnection, order_id: &str) -> DbError {
    match fetch_order(conn, order_id).await {
        Ok(Some(order)) => match ensure_editable(&order) {
            Err(e) => e.into(),
            Ok(()) => DbError::ConcurrencyConflict(format!(
                "purchase order {} changed during the write",
                order.number
            )),
        },
        Ok(None) => DbError::not_found("PurchaseOrder", order_id),
        Err(e) => e,
    }
}

/// Repository for purchase orders.
#[derive(Debug, Clone)]
pub struct PurchaseOrderRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
    prefix: String,
}

impl PurchaseOrderRepository {
    /// Creates a new PurchaseOrderRepository numbering orders with `prefix`.
    pub fn new(pool: SqlitePool, retry: RetryPolicy, prefix: String) -> Self {
        PurchaseOrderRepository {
            pool,
            retry,
            prefix,
        }
    }

    /// Creates a draft order.
    pub async fn create(
        &self,
        supplier_id: &str,
        notes: Option<&str>,
        lines: &[PurchaseOrderLine],
    ) -> DbResult<PurchaseOrderDetail> {
        validate_name("supplier_id", supplier_id, 100)?;
        validate_lines(lines)?;

        let order_id = self
            .retry
            .run("create_purchase_order", move || {
                self.create_once(supplier_id, notes, lines)
            })
            .await?;

        self.get(&order_id).await
    }

    async fn create_once(
        &self,
        supplier_id: &str,
        notes: Option<&str>,
        lines: &[PurchaseOrderLine],
    ) -> DbResult<String> {
        let now = Utc::now();
        let order_id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;

        let number = sequence::next_number(&mut tx, &self.prefix, now).await?;
        let items = build_items(&mut tx, &order_id, lines, now).await?;
        let (subtotal, total_items) = order_totals(&items)?;

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, number, supplier_id, status, notes, subtotal_cents,
                total_items, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(&order_id)
        .bind(number.to_string())
        .bind(supplier_id.trim())
        .bind(PurchaseOrderStatus::Draft)
        .bind(notes)
        .bind(subtotal.minor())
        .bind(total_items)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        insert_items(&mut tx, &items).await?;
        tx.commit().await?;

        info!(
            number = %number,
            supplier_id = %supplier_id,
            items = items.len(),
            subtotal = %subtotal,
            "Purchase order created"
        );
        Ok(order_id)
    }

    /// Gets an order with its items.
    pub async fn get(&self, id: &str) -> DbResult<PurchaseOrderDetail> {
        let mut conn = self.pool.acquire().await?;
        let order = fetch_order(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("PurchaseOrder", id))?;
        let items = fetch_items(&mut conn, id).await?;
        Ok(PurchaseOrderDetail { order, items })
    }

    /// Lists orders in one status, oldest first.
    pub async fn list_by_status(&self, status: PurchaseOrderStatus) -> DbResult<Vec<PurchaseOrder>> {
        let sql = format!(
            "SELECT {} FROM purchase_orders WHERE status = ?1 ORDER BY created_at, rowid",
            ORDER_COLUMNS
        );
        let orders = sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(orders)
    }

    /// Replaces the items of a draft order.
    pub async fn update_items(
        &self,
        id: &str,
        lines: &[PurchaseOrderLine],
    ) -> DbResult<PurchaseOrderDetail> {
        validate_lines(lines)?;
        self.retry
            .run("update_purchase_order", move || {
                self.update_items_once(id, lines)
            })
            .await?;
        self.get(id).await
    }

    async fn update_items_once(&self, id: &str, lines: &[PurchaseOrderLine]) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query(
            "UPDATE purchase_orders SET updated_at = ?1 WHERE id = ?2 AND status = ?3",
        )
        .bind(now)
        .bind(id)
        .bind(PurchaseOrderStatus::Draft)
        .execute(&mut *tx)
        .await?;
        if touched.rows_affected() == 0 {
            return Err(not_editable(&mut tx, id).await);
        }

        sqlx::query("DELETE FROM purchase_order_items WHERE purchase_order_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let items = build_items(&mut tx, id, lines, now).await?;
        insert_items(&mut tx, &items).await?;

        let (subtotal, total_items) = order_totals(&items)?;
        sqlx::query("UPDATE purchase_orders SET subtotal_cents = ?1, total_items = ?2 WHERE id = ?3")
            .bind(subtotal.minor())
            .bind(total_items)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(order_id = %id, items = items.len(), "Purchase order items replaced");
        Ok(())
    }

    /// Deletes a draft order and its items.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        self.retry
            .run("delete_purchase_order", move || self.delete_once(id))
            .await
    }

    async fn delete_once(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        let deleted = sqlx::query("DELETE FROM purchase_orders WHERE id = ?1 AND status = ?2")
            .bind(id)
            .bind(PurchaseOrderStatus::Draft)
            .execute(&mut *conn)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(not_editable(&mut conn, id).await);
        }
        info!(order_id = %id, "Purchase order deleted");
        Ok(())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// draft → sent.
    pub async fn send(&self, id: &str) -> DbResult<PurchaseOrder> {
        self.transition(id, PurchaseOrderStatus::Sent).await
    }

    /// draft | sent → cancelled.
    pub async fn cancel(&self, id: &str) -> DbResult<PurchaseOrder> {
        self.transition(id, PurchaseOrderStatus::Cancelled).await
    }

    /// received → completed.
    pub async fn complete(&self, id: &str) -> DbResult<PurchaseOrder> {
        self.transition(id, PurchaseOrderStatus::Completed).await
    }

    async fn transition(&self, id: &str, to: PurchaseOrderStatus) -> DbResult<PurchaseOrder> {
        self.retry
            .run("purchase_order_transition", move || {
                self.transition_once(id, to)
            })
            .await
    }

    async fn transition_once(&self, id: &str, to: PurchaseOrderStatus) -> DbResult<PurchaseOrder> {
        let mut conn = self.pool.acquire().await?;

        let order = fetch_order(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("PurchaseOrder", id))?;
        let from = order.status;
        if let Err(e) = from.transition(to) {
            debug!(number = %order.number, from = %from, to = %to, "Purchase order transition rejected");
            return Err(e.into());
        }

        let updated = sqlx::query(
            "UPDATE purchase_orders SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(to)
        .bind(Utc::now())
        .bind(id)
        .bind(from)
        .execute(&mut *conn)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(rejected_write(&mut conn, id, to).await);
        }

        let order = fetch_order(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("PurchaseOrder", id))?;

        info!(number = %order.number, from = %from, to = %to, "Purchase order transitioned");
        Ok(order)
    }

    // =========================================================================
    // Receive
    // =========================================================================

    /// Receives a sent order into stock.
    ///
    /// Each item adds `received_qty × to_base_unit` base units through the
    /// ledger, referencing this order. Items missing from `input` are
    /// received as ordered. Everything commits together or not at all.
    pub async fn receive(&self, id: &str, input: &[ReceiveItem]) -> DbResult<PurchaseOrderDetail> {
        self.retry
            .run("receive_purchase_order", move || self.receive_once(id, input))
            .await?;
        self.get(id).await
    }

    async fn receive_once(&self, id: &str, input: &[ReceiveItem]) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE purchase_orders
            SET status = ?1, updated_at = ?2, received_at = ?2
            WHERE id = ?3 AND status = ?4
            "#,
        )
        .bind(PurchaseOrderStatus::Received)
        .bind(now)
        .bind(id)
        .bind(PurchaseOrderStatus::Sent)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            return Err(rejected_write(&mut tx, id, PurchaseOrderStatus::Received).await);
        }

        let order = fetch_order(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("PurchaseOrder", id))?;
        let items = fetch_items(&mut tx, id).await?;
        let receipts = resolve_receipt(&order.number, &items, input)?;
        let reference = StockReference::purchase_order(id);

        for receipt in &receipts {
            sqlx::query(
                r#"
                UPDATE purchase_order_items
                SET received_qty = ?1, received_price_cents = ?2, verified = ?3
                WHERE id = ?4
                "#,
            )
            .bind(receipt.received_qty)
            .bind(receipt.received_price.minor())
            .bind(receipt.verified)
            .bind(&receipt.item_id)
            .execute(&mut *tx)
            .await?;

            if receipt.received_qty == 0 {
                continue;
            }

            let unit = catalog::fetch_unit(&mut tx, &receipt.unit_id)
                .await?
                .ok_or_else(|| DbError::not_found("Unit", &receipt.unit_id))?;
            let base_qty = receipt
                .received_qty
                .checked_mul(unit.to_base_unit)
                .ok_or_else(|| CoreError::overflow("received base quantity"))?;

            ledger::apply(
                &mut tx,
                &receipt.variant_id,
                base_qty,
                MovementType::PurchaseReceive,
                &reference,
                None,
            )
            .await?;

            let cost = receipt.received_price.div_round(unit.to_base_unit);
            catalog::update_cost(&mut tx, &receipt.variant_id, cost.minor(), now).await?;
        }

        let (subtotal, total_items) = receipt_totals(&receipts)?;
        sqlx::query("UPDATE purchase_orders SET subtotal_cents = ?1, total_items = ?2 WHERE id = ?3")
            .bind(subtotal.minor())
            .bind(total_items)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            number = %order.number,
            items = receipts.len(),
            total_items,
            subtotal = %subtotal,
            "Purchase order received"
        );
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
