//! # Sales Repository
//!
//! Checkout and receipt lookup.
//!
//! ## Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate_cart                   ← line count and quantities, no I/O    │
//! │  BEGIN                                                                  │
//! │    1. next_number(prefix)        ← first write, claims the write lock   │
//! │    2. load product/variant/unit/tiers per line                          │
//! │    3. plan_cart                  ← price every line, aggregate demand   │
//! │    4. ensure_stock               ← any shortfall: rollback, no writes   │
//! │    5. settle_payment                                                    │
//! │    6. INSERT transaction + line snapshots                               │
//! │    7. ledger::apply(-base_qty) per line                                 │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A rolled-back checkout also gives back its receipt number.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use stockline_core::checkout::{plan_cart, settle_payment, validate_cart, LineContext};
use stockline_core::{
    CheckoutLine, DocumentNumber, Money, MovementType, PaymentMethod, Receipt, SalesTransaction,
    SalesTransactionItem, StockReference,
};

use crate::error::{DbError, DbResult};
use crate::repository::{catalog, ledger, sequence};
use crate::retry::RetryPolicy;

const TRANSACTION_COLUMNS: &str = r#"
    id, number, payment_method, subtotal_cents, total_cents, total_items,
    amount_tendered_cents, change_cents, created_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, transaction_id, product_id, variant_id, unit_id, product_name,
    variant_label, unit_name, quantity, to_base_unit, base_quantity,
    tier_value_cents, unit_price_cents, total_price_cents, created_at
"#;

async fn load_contexts(
    conn: &mut SqliteConnection,
    lines: &[CheckoutLine],
) -> DbResult<Vec<LineContext>> {
    let mut contexts = Vec::with_capacity(lines.len());
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
        let tiers = catalog::fetch_tiers(conn, &line.variant_id).await?;

        contexts.push(LineContext {
            product,
            variant,
            unit,
            tiers,
        });
    }
    Ok(contexts)
}

async fn fetch_receipt(
    conn: &mut SqliteConnection,
    transaction: SalesTransaction,
) -> DbResult<Receipt> {
    let sql = format!(
        "SELECT {} FROM sales_transaction_items WHERE transaction_id = ?1 ORDER BY created_at, rowid",
        ITEM_COLUMNS
    );
    let items = sqlx::query_as::<_, SalesTransactionItem>(&sql)
        .bind(&transaction.id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(Receipt { transaction, items })
}

/// Repository for sales transactions.
#[derive(Debug, Clone)]
pub struct SalesRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
    prefix: String,
}

impl SalesRepository {
    /// Creates a new SalesRepository numbering receipts with `prefix`.
    pub fn new(pool: SqlitePool, retry: RetryPolicy, prefix: String) -> Self {
        SalesRepository {
            pool,
            retry,
            prefix,
        }
    }

    /// Sells a cart.
    ///
    /// Either every line is priced, stocked and written, or nothing is.
    /// `tendered` is required for cash and ignored otherwise.
    ///
    /// ## Errors
    /// - `InsufficientStock` naming the first short variant; stock untouched
    /// - Validation errors for empty carts, bad quantities, units or
    ///   variants from another product, inactive products, short cash
    /// - `ConcurrencyConflict` once the retry budget is spent
    pub async fn checkout(
        &self,
        method: PaymentMethod,
        lines: &[CheckoutLine],
        tendered: Option<Money>,
    ) -> DbResult<Receipt> {
        validate_cart(lines)?;
        self.retry
            .run("checkout", move || self.checkout_once(method, lines, tendered))
            .await
    }

    async fn checkout_once(
        &self,
        method: PaymentMethod,
        lines: &[CheckoutLine],
        tendered: Option<Money>,
    ) -> DbResult<Receipt> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let number = sequence::next_number(&mut tx, &self.prefix, now).await?;

        let contexts = load_contexts(&mut tx, lines).await?;
        let plan = plan_cart(lines, &contexts)?;
        if let Err(short) = plan.ensure_stock() {
            info!(number = %number, reason = %short, "Checkout rejected");
            return Err(short.into());
        }
        let settlement = settle_payment(method, plan.total, tendered)?;

        let transaction = SalesTransaction {
            id: Uuid::new_v4().to_string(),
            number: number.to_string(),
            payment_method: method,
            subtotal_cents: plan.subtotal.minor(),
            total_cents: plan.total.minor(),
            total_items: plan.total_items,
            amount_tendered_cents: settlement.amount_tendered.minor(),
            change_cents: settlement.change.minor(),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO sales_transactions (
                id, number, payment_method, subtotal_cents, total_cents,
                total_items, amount_tendered_cents, change_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.number)
        .bind(transaction.payment_method)
        .bind(transaction.subtotal_cents)
        .bind(transaction.total_cents)
        .bind(transaction.total_items)
        .bind(transaction.amount_tendered_cents)
        .bind(transaction.change_cents)
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await?;

        let reference = StockReference::sales_transaction(&transaction.id);
        let mut items = Vec::with_capacity(plan.lines.len());

        for line in plan.lines {
            let item = SalesTransactionItem {
                id: Uuid::new_v4().to_string(),
                transaction_id: transaction.id.clone(),
                product_id: line.product_id,
                variant_id: line.variant_id,
                unit_id: line.unit_id,
                product_name: line.product_name,
                variant_label: line.variant_label,
                unit_name: line.unit_name,
                quantity: line.quantity,
                to_base_unit: line.to_base_unit,
                base_quantity: line.quote.base_qty,
                tier_value_cents: line.quote.tier_value,
                unit_price_cents: line.quote.unit_price.minor(),
                total_price_cents: line.quote.line_total.minor(),
                created_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO sales_transaction_items (
                    id, transaction_id, product_id, variant_id, unit_id, product_name,
                    variant_label, unit_name, quantity, to_base_unit, base_quantity,
                    tier_value_cents, unit_price_cents, total_price_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
            )
            .bind(&item.id)
            .bind(&item.transaction_id)
            .bind(&item.product_id)
            .bind(&item.variant_id)
            .bind(&item.unit_id)
            .bind(&item.product_name)
            .bind(&item.variant_label)
            .bind(&item.unit_name)
            .bind(item.quantity)
            .bind(item.to_base_unit)
            .bind(item.base_quantity)
            .bind(item.tier_value_cents)
            .bind(item.unit_price_cents)
            .bind(item.total_price_cents)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;

            ledger::apply(
                &mut tx,
                &item.variant_id,
                -item.base_quantity,
                MovementType::Sales,
                &reference,
                None,
            )
            .await?;

            items.push(item);
        }

        tx.commit().await?;

        info!(
            number = %transaction.number,
            method = %method,
            lines = items.len(),
            total = %plan.total,
            "Checkout completed"
        );
        debug!(change = %settlement.change, "Payment settled");

        Ok(Receipt { transaction, items })
    }

    /// Gets a receipt by transaction id.
    pub async fn get_transaction(&self, id: &str) -> DbResult<Receipt> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM sales_transactions WHERE id = ?1",
            TRANSACTION_COLUMNS
        );
        let transaction = sqlx::query_as::<_, SalesTransaction>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("SalesTransaction", id))?;
        fetch_receipt(&mut conn, transaction).await
    }

    /// Gets a receipt by its business number, e.g. `TRX-2026-000042`.
    ///
    /// A malformed number is a validation error, not a miss.
    pub async fn get_by_number(&self, number: &str) -> DbResult<Receipt> {
        let number = DocumentNumber::parse(number.trim())?.to_string();
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM sales_transactions WHERE number = ?1",
            TRANSACTION_COLUMNS
        );
        let transaction = sqlx::query_as::<_, SalesTransaction>(&sql)
            .bind(&number)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("SalesTransaction", &number))?;
        fetch_receipt(&mut conn, transaction).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use stockline_core::{CoreError, ProductDetail, ReferenceType, ValidationError};

    fn cart_line(product: &ProductDetail, unit: &str, quantity: i64) -> CheckoutLine {
        CheckoutLine {
            product_id: product.product.id.clone(),
            variant_id: product.variants[0].variant.id.clone(),
            unit_id: testing::unit(product, unit).id.clone(),
            quantity,
        }
    }

    #[tokio::test]
    async fn test_one_dozen_prices_at_bulk_tier() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 100).await;
        let variant_id = &egg.variants[0].variant.id;

        let receipt = db
            .sales()
            .checkout(PaymentMethod::Card, &[cart_line(&egg, "Dozen", 1)], None)
            .await
            .unwrap();

        let item = &receipt.items[0];
        assert_eq!(item.base_quantity, 12);
        assert_eq!(item.tier_value_cents, 70_000);
        assert_eq!(item.unit_price_cents, 840_000);
        assert_eq!(item.total_price_cents, 840_000);
        assert_eq!(item.unit_name, "Dozen");
        assert_eq!(receipt.transaction.total_cents, 840_000);
        assert_eq!(receipt.transaction.amount_tendered_cents, 840_000);
        assert_eq!(receipt.transaction.change_cents, 0);

        let ledger = db.ledger();
        assert_eq!(ledger.current_stock(variant_id).await.unwrap(), 88);
        let movements = ledger
            .history_by_reference(ReferenceType::SalesTransaction, &receipt.transaction.id)
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].quantity, -12);
        assert_eq!(movements[0].movement_type, MovementType::Sales);
        assert!(ledger.balance(variant_id).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_cash_change() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 100).await;

        let receipt = db
            .sales()
            .checkout(
                PaymentMethod::Cash,
                &[cart_line(&egg, "Pcs", 2)],
                Some(Money::from_minor(200_000)),
            )
            .await
            .unwrap();
        assert_eq!(receipt.transaction.total_cents, 150_000);
        assert_eq!(receipt.transaction.amount_tendered_cents, 200_000);
        assert_eq!(receipt.transaction.change_cents, 50_000);
    }

    #[tokio::test]
    async fn test_short_cash_rolls_back_number_and_stock() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 100).await;
        let sales = db.sales();

        let err = sales
            .checkout(
                PaymentMethod::Cash,
                &[cart_line(&egg, "Pcs", 2)],
                Some(Money::from_minor(100_000)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));
        assert_eq!(
            db.ledger()
                .current_stock(&egg.variants[0].variant.id)
                .await
                .unwrap(),
            100
        );

        let receipt = sales
            .checkout(PaymentMethod::Card, &[cart_line(&egg, "Pcs", 1)], None)
            .await
            .unwrap();
        assert!(receipt.transaction.number.ends_with("-000001"));
    }

    #[tokio::test]
    async fn test_short_line_fails_whole_cart() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 10).await;
        let mut input = testing::egg_input(50);
        input.name = "Telur Bebek".to_string();
        input.variants[0].sku = Some("DUCK-A".to_string());
        input.variants[0].barcode = None;
        let duck = db.catalog().create_product(&input).await.unwrap();

        let err = db
            .sales()
            .checkout(
                PaymentMethod::Card,
                &[cart_line(&duck, "Pcs", 1), cart_line(&egg, "Dozen", 1)],
                None,
            )
            .await
            .unwrap_err();

        match err {
            DbError::Core(CoreError::InsufficientStock {
                product_name,
                available,
                required,
                ..
            }) => {
                assert_eq!(product_name, "Telur Ayam");
                assert_eq!(available, 10);
                assert_eq!(required, 12);
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }

        let ledger = db.ledger();
        assert_eq!(
            ledger
                .current_stock(&egg.variants[0].variant.id)
                .await
                .unwrap(),
            10
        );
        assert_eq!(
            ledger
                .current_stock(&duck.variants[0].variant.id)
                .await
                .unwrap(),
            50
        );
    }

    #[tokio::test]
    async fn test_lines_of_same_variant_are_aggregated() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 10).await;

        let err = db
            .sales()
            .checkout(
                PaymentMethod::Card,
                &[cart_line(&egg, "Pcs", 6), cart_line(&egg, "Pcs", 6)],
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_insufficient_stock());
        assert_eq!(
            db.ledger()
                .current_stock(&egg.variants[0].variant.id)
                .await
                .unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_exactly_one_wins() {
        let (db, path) = testing::file_db(4).await;
        let egg = testing::create_egg(&db, 10).await;
        let line = cart_line(&egg, "Pcs", 6);

        let first = {
            let sales = db.sales();
            let line = line.clone();
            tokio::spawn(async move { sales.checkout(PaymentMethod::Card, &[line], None).await })
        };
        let second = {
            let sales = db.sales();
            let line = line.clone();
            tokio::spawn(async move { sales.checkout(PaymentMethod::Card, &[line], None).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let won = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_insufficient_stock()))
            .count();
        assert_eq!(won, 1);
        assert_eq!(short, 1);

        let balance = db
            .ledger()
            .balance(&egg.variants[0].variant.id)
            .await
            .unwrap();
        assert_eq!(balance.current_stock, 4);
        assert!(balance.is_consistent());

        db.close().await;
        testing::remove_db_files(&path);
    }

    #[tokio::test]
    async fn test_numbers_are_sequential_and_retrievable() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 100).await;
        let sales = db.sales();

        let mut numbers = Vec::new();
        for _ in 0..3 {
            let receipt = sales
                .checkout(PaymentMethod::Transfer, &[cart_line(&egg, "Pcs", 1)], None)
                .await
                .unwrap();
            numbers.push(receipt.transaction.number.clone());
        }

        let year = Utc::now().format("%Y").to_string();
        assert_eq!(
            numbers,
            vec![
                format!("TRX-{}-000001", year),
                format!("TRX-{}-000002", year),
                format!("TRX-{}-000003", year),
            ]
        );

        let by_number = sales.get_by_number(&numbers[1]).await.unwrap();
        let by_id = sales
            .get_transaction(&by_number.transaction.id)
            .await
            .unwrap();
        assert_eq!(by_id.transaction.number, numbers[1]);
        assert_eq!(by_id.items.len(), 1);
        assert_eq!(by_id.transaction.payment_method, PaymentMethod::Transfer);

        assert!(matches!(
            sales.get_by_number("TRX-1999-000001").await,
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            sales.get_by_number("TRX-42").await,
            Err(DbError::Core(CoreError::Validation(ValidationError::InvalidFormat { .. })))
        ));
    }

    #[tokio::test]
    async fn test_inactive_product_cannot_be_sold() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 100).await;
        db.catalog()
            .set_product_active(&egg.product.id, false)
            .await
            .unwrap();

        let err = db
            .sales()
            .checkout(PaymentMethod::Card, &[cart_line(&egg, "Pcs", 1)], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::InvalidFormat { .. }))
        ));
    }

    #[tokio::test]
    async fn test_empty_cart_and_unknown_variant() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 100).await;
        let sales = db.sales();

        assert!(sales.checkout(PaymentMethod::Card, &[], None).await.is_err());

        let mut line = cart_line(&egg, "Pcs", 1);
        line.variant_id = "missing".to_string();
        assert!(matches!(
            sales.checkout(PaymentMethod::Card, &[line.clone()], None).await,
            Err(DbError::NotFound { .. })
        ));

        // shape errors win over lookups: nothing is loaded for a bad quantity
        line.quantity = 0;
        assert!(matches!(
            sales.checkout(PaymentMethod::Card, &[line], None).await,
            Err(DbError::Core(CoreError::Validation(ValidationError::MustBePositive { .. })))
        ));
    }
}
