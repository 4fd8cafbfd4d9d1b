//! # Stock Ledger
//!
//! The only code path that changes `variants.current_stock`.
//!
//! ## Apply
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply(variant, delta, type, reference)   (inside caller's transaction) │
//! │                                                                         │
//! │  1. UPDATE variants                                                     │
//! │        SET current_stock = current_stock + delta                        │
//! │      WHERE id = variant AND current_stock + delta >= 0                  │
//! │        │                                                                │
//! │        ├── 0 rows ──► variant missing?  NotFound                        │
//! │        │              otherwise         InsufficientStock               │
//! │        ▼                                                                │
//! │  2. INSERT INTO stock_movements (..., delta, reference)                 │
//! │                                                                         │
//! │  Check and write are one statement under SQLite's write lock, so two   │
//! │  applies on the same variant can never both pass the check.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `current_stock == Σ stock_movements.quantity` holds for every variant
//! after every committed transaction; [`StockLedger::balance`] audits it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use stockline_core::{
    CoreError, MovementType, ReferenceType, StockMovement, StockReference, ValidationError,
};

use crate::error::{DbError, DbResult};
use crate::retry::RetryPolicy;

const MOVEMENT_COLUMNS: &str = r#"
    id, variant_id, movement_type, quantity,
    reference_type, reference_id, note, created_at
"#;

/// Cached stock next to the ledger sum, for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    pub current_stock: i64,
    pub ledger_total: i64,
}

impl LedgerBalance {
    pub fn is_consistent(&self) -> bool {
        self.current_stock == self.ledger_total
    }
}

/// Applies a signed stock delta and appends its movement.
///
/// Runs on the caller's connection so several applies share one
/// transaction. Never call it outside a transaction that also writes the
/// referenced document.
///
/// ## Errors
/// - `InsufficientStock` if the delta would take stock below zero
/// - `NotFound` if the variant does not exist
/// - Validation error for a zero delta
pub async fn apply(
    conn: &mut SqliteConnection,
    variant_id: &str,
    delta: i64,
    movement_type: MovementType,
    reference: &StockReference,
    note: Option<&str>,
) -> DbResult<StockMovement> {
    if delta == 0 {
        return Err(ValidationError::InvalidFormat {
            field: "delta".to_string(),
            reason: "a stock movement cannot be zero".to_string(),
        }
        .into());
    }

    let now = Utc::now();

    let updated = sqlx::query(
        r#"
        UPDATE variants
        SET current_stock = current_stock + ?1, updated_at = ?2
        WHERE id = ?3 AND current_stock + ?1 >= 0
        "#,
    )
    .bind(delta)
    .bind(now)
    .bind(variant_id)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT p.name, v.label, v.current_stock
            FROM variants v
            JOIN products p ON p.id = v.product_id
            WHERE v.id = ?1
            "#,
        )
        .bind(variant_id)
        .fetch_optional(&mut *conn)
        .await?;

        let (product_name, variant_label, available) =
            row.ok_or_else(|| DbError::not_found("Variant", variant_id))?;

        debug!(
            variant_id = %variant_id,
            available,
            required = -delta,
            "Stock apply rejected: insufficient stock"
        );

        return Err(CoreError::InsufficientStock {
            product_name,
            variant_label,
            available,
            required: -delta,
        }
        .into());
    }

    let movement = StockMovement {
        id: Uuid::new_v4().to_string(),
        variant_id: variant_id.to_string(),
        movement_type,
        quantity: delta,
        reference_type: reference.reference_type,
        reference_id: reference.reference_id.clone(),
        note: note.map(str::to_string),
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, variant_id, movement_type, quantity,
            reference_type, reference_id, note, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.variant_id)
    .bind(movement.movement_type)
    .bind(movement.quantity)
    .bind(movement.reference_type)
    .bind(&movement.reference_id)
    .bind(&movement.note)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    debug!(
        variant_id = %variant_id,
        delta,
        movement_type = %movement_type,
        reference = %reference.reference_id,
        "Stock movement applied"
    );

    Ok(movement)
}

/// Current cached stock of a variant.
pub(crate) async fn fetch_current_stock(
    conn: &mut SqliteConnection,
    variant_id: &str,
) -> DbResult<i64> {
    let stock: Option<i64> = sqlx::query_scalar("SELECT current_stock FROM variants WHERE id = ?1")
        .bind(variant_id)
        .fetch_optional(&mut *conn)
        .await?;
    stock.ok_or_else(|| DbError::not_found("Variant", variant_id))
}

/// Read and adjustment access to the stock ledger.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl StockLedger {
    /// Creates a new StockLedger.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        StockLedger { pool, retry }
    }

    /// Posts a manual correction as an `adjustment` movement.
    ///
    /// Negative adjustments obey the same floor as sales: stock never goes
    /// below zero.
    pub async fn adjust(
        &self,
        variant_id: &str,
        delta: i64,
        note: Option<&str>,
    ) -> DbResult<StockMovement> {
        self.retry
            .run("adjust", move || self.adjust_once(variant_id, delta, note))
            .await
    }

    async fn adjust_once(
        &self,
        variant_id: &str,
        delta: i64,
        note: Option<&str>,
    ) -> DbResult<StockMovement> {
        let reference = StockReference::adjustment(Uuid::new_v4().to_string());

        let mut tx = self.pool.begin().await?;
        let movement = apply(
            &mut tx,
            variant_id,
            delta,
            MovementType::Adjustment,
            &reference,
            note,
        )
        .await?;
        tx.commit().await?;

        info!(variant_id = %variant_id, delta, "Stock adjusted");
        Ok(movement)
    }

    /// Movements of one variant, oldest first.
    pub async fn history(&self, variant_id: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements WHERE variant_id = ?1 ORDER BY created_at, rowid",
            MOVEMENT_COLUMNS
        );
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(variant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }

    /// Movements caused by one document, oldest first.
    pub async fn history_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements \
             WHERE reference_type = ?1 AND reference_id = ?2 \
             ORDER BY created_at, rowid",
            MOVEMENT_COLUMNS
        );
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(reference_type)
            .bind(reference_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }

    /// Cached stock of a variant, in base units.
    pub async fn current_stock(&self, variant_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        fetch_current_stock(&mut conn, variant_id).await
    }

    /// Compares the cached stock with the sum of the variant's movements.
    pub async fn balance(&self, variant_id: &str) -> DbResult<LedgerBalance> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT
                v.current_stock,
                COALESCE((SELECT SUM(m.quantity) FROM stock_movements m WHERE m.variant_id = v.id), 0)
            FROM variants v
            WHERE v.id = ?1
            "#,
        )
        .bind(variant_id)
        .fetch_optional(&self.pool)
        .await?;

        let (current_stock, ledger_total) =
            row.ok_or_else(|| DbError::not_found("Variant", variant_id))?;

        Ok(LedgerBalance {
            current_stock,
            ledger_total,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
