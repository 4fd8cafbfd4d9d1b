//! # Catalog Repository
//!
//! Products, their unit graphs, variants and pricing tiers.
//!
//! ## Unit Edits
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_unit / update_unit / delete_unit                                   │
//! │                                                                         │
//! │  1. Touch products.updated_at   ← takes the write lock first            │
//! │  2. Any variant with stock > 0?  ──yes──► UnitsLockedByStock            │
//! │  3. Load the full unit set                                              │
//! │  4. stockline_core::units validates and recalculates                    │
//! │  5. Write every changed unit     ← one transaction                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use stockline_core::pricing::validate_tiers;
use stockline_core::units::{self, build_unit_set};
use stockline_core::validation::{validate_barcode, validate_name, validate_price, validate_sku};
use stockline_core::{
    CoreError, MovementType, NewProduct, NewUnit, NewVariant, PricingTier, Product,
    ProductDetail, StockReference, Unit, UnitEdit, ValidationError, Variant, VariantDetail,
};

use crate::error::{DbError, DbResult};
use crate::repository::ledger;
use crate::retry::RetryPolicy;

const MAX_PRODUCT_NAME: usize = 200;
const MAX_VARIANT_LABEL: usize = 100;

const PRODUCT_COLUMNS: &str = "id, name, description, is_active, created_at, updated_at";

const UNIT_COLUMNS: &str = r#"
    id, product_id, name, conversion_factor, converts_to,
    to_base_unit, is_base, created_at
"#;

const VARIANT_COLUMNS: &str = r#"
    id, product_id, sku, barcode, label, attributes, price_mode,
    cost_per_base_cents, current_stock, created_at, updated_at
"#;

// =============================================================================
// Shared Row Access
// =============================================================================
// Used by the purchase order and sales repositories inside their own
// transactions.

pub(crate) async fn fetch_product(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

pub(crate) async fn fetch_units(
    conn: &mut SqliteConnection,
    product_id: &str,
) -> DbResult<Vec<Unit>> {
    let sql = format!(
        "SELECT {} FROM units WHERE product_id = ?1 ORDER BY to_base_unit, name",
        UNIT_COLUMNS
    );
    let units = sqlx::query_as::<_, Unit>(&sql)
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(units)
}

pub(crate) async fn fetch_unit(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Unit>> {
    let sql = format!("SELECT {} FROM units WHERE id = ?1", UNIT_COLUMNS);
    let unit = sqlx::query_as::<_, Unit>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(unit)
}

pub(crate) async fn fetch_variant(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<Variant>> {
    let sql = format!("SELECT {} FROM variants WHERE id = ?1", VARIANT_COLUMNS);
    let variant = sqlx::query_as::<_, Variant>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(variant)
}

async fn fetch_variants(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Vec<Variant>> {
    let sql = format!(
        "SELECT {} FROM variants WHERE product_id = ?1 ORDER BY created_at, rowid",
        VARIANT_COLUMNS
    );
    let variants = sqlx::query_as::<_, Variant>(&sql)
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(variants)
}

pub(crate) async fn fetch_tiers(
    conn: &mut SqliteConnection,
    variant_id: &str,
) -> DbResult<Vec<PricingTier>> {
    let tiers = sqlx::query_as::<_, PricingTier>(
        "SELECT min_qty, value FROM pricing_tiers WHERE variant_id = ?1 ORDER BY min_qty",
    )
    .bind(variant_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(tiers)
}

/// Sets the last known purchase cost per base unit.
pub(crate) async fn update_cost(
    conn: &mut SqliteConnection,
    variant_id: &str,
    cost_per_base_cents: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query("UPDATE variants SET cost_per_base_cents = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(cost_per_base_cents)
        .bind(now)
        .bind(variant_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn touch_product(
    conn: &mut SqliteConnection,
    product_id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE products SET updated_at = ?1 WHERE id = ?2")
        .bind(now)
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", product_id));
    }
    Ok(())
}

async fn ensure_units_unlocked(conn: &mut SqliteConnection, product_id: &str) -> DbResult<()> {
    let stocked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM variants WHERE product_id = ?1 AND current_stock > 0",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    if stocked > 0 {
        debug!(product_id = %product_id, "Unit edit rejected: stock on hand");
        return Err(CoreError::UnitsLockedByStock {
            product_id: product_id.to_string(),
        }
        .into());
    }
    Ok(())
}

async fn insert_unit(conn: &mut SqliteConnection, unit: &Unit) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO units (
            id, product_id, name, conversion_factor, converts_to,
            to_base_unit, is_base, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&unit.id)
    .bind(&unit.product_id)
    .bind(&unit.name)
    .bind(unit.conversion_factor)
    .bind(&unit.converts_to)
    .bind(unit.to_base_unit)
    .bind(unit.is_base)
    .bind(unit.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_tiers(
    conn: &mut SqliteConnection,
    variant_id: &str,
    tiers: &[PricingTier],
) -> DbResult<()> {
    for tier in tiers {
        sqlx::query("INSERT INTO pricing_tiers (variant_id, min_qty, value) VALUES (?1, ?2, ?3)")
            .bind(variant_id)
            .bind(tier.min_qty)
            .bind(tier.value)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn validate_new_variant(variant: &NewVariant) -> DbResult<()> {
    validate_name("variant label", &variant.label, MAX_VARIANT_LABEL)?;
    if let Some(sku) = &variant.sku {
        validate_sku(sku)?;
    }
    if let Some(barcode) = &variant.barcode {
        validate_barcode(barcode)?;
    }
    validate_price("cost_per_base", variant.cost_per_base_cents)?;
    validate_tiers(&variant.tiers)?;
    if variant.opening_stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "opening_stock".to_string(),
            min: 0,
            max: i64::MAX,
        }
        .into());
    }
    Ok(())
}

/// SKUs and barcodes share one lookup namespace: a code may not already be
/// any variant's SKU or barcode.
async fn ensure_code_free(conn: &mut SqliteConnection, field: &str, code: &str) -> DbResult<()> {
    let taken: Option<String> =
        sqlx::query_scalar("SELECT id FROM variants WHERE sku = ?1 OR barcode = ?1 LIMIT 1")
            .bind(code)
            .fetch_optional(&mut *conn)
            .await?;
    match taken {
        Some(variant_id) => {
            debug!(field = field, code = code, variant_id = %variant_id, "Variant code taken");
            Err(DbError::duplicate(field, code))
        }
        None => Ok(()),
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        CatalogRepository { pool, retry }
    }

    /// Creates a product with its units and variants.
    ///
    /// Units reference their target by name. Opening stock is posted
    /// through the ledger as an adjustment, never written directly.
    pub async fn create_product(&self, input: &NewProduct) -> DbResult<ProductDetail> {
        validate_name("product name", &input.name, MAX_PRODUCT_NAME)?;
        if input.variants.is_empty() {
            return Err(ValidationError::Required {
                field: "variants".to_string(),
            }
            .into());
        }
        for variant in &input.variants {
            validate_new_variant(variant)?;
        }

        let product_id = self
            .retry
            .run("create_product", move || self.create_product_once(input))
            .await?;

        self.get_product(&product_id).await
    }

    async fn create_product_once(&self, input: &NewProduct) -> DbResult<String> {
        let now = Utc::now();
        let product_id = Uuid::new_v4().to_string();
        let units = build_unit_set(&product_id, &input.units, now, || {
            Uuid::new_v4().to_string()
        })?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            "#,
        )
        .bind(&product_id)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for unit in &units {
            insert_unit(&mut tx, unit).await?;
        }

        for variant in &input.variants {
            let variant_id = Uuid::new_v4().to_string();
            let attributes = serde_json::to_string(&variant.attributes)
                .map_err(|e| DbError::Internal(e.to_string()))?;
            let sku = variant.sku.as_deref().map(str::trim);
            let barcode = variant.barcode.as_deref().map(str::trim);
            if let Some(sku) = sku {
                ensure_code_free(&mut tx, "sku", sku).await?;
            }
            if let Some(barcode) = barcode {
                ensure_code_free(&mut tx, "barcode", barcode).await?;
            }

            sqlx::query(
                r#"
                INSERT INTO variants (
                    id, product_id, sku, barcode, label, attributes, price_mode,
                    cost_per_base_cents, current_stock, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)
                "#,
            )
            .bind(&variant_id)
            .bind(&product_id)
            .bind(sku)
            .bind(barcode)
            .bind(variant.label.trim())
            .bind(attributes)
            .bind(variant.price_mode)
            .bind(variant.cost_per_base_cents)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            insert_tiers(&mut tx, &variant_id, &variant.tiers).await?;

            if variant.opening_stock > 0 {
                ledger::apply(
                    &mut tx,
                    &variant_id,
                    variant.opening_stock,
                    MovementType::Adjustment,
                    &StockReference::adjustment(Uuid::new_v4().to_string()),
                    Some("opening stock"),
                )
                .await?;
            }
        }

        tx.commit().await?;

        info!(
            product_id = %product_id,
            name = %input.name,
            units = units.len(),
            variants = input.variants.len(),
            "Product created"
        );
        Ok(product_id)
    }

    /// Gets a product with its units, variants and tiers.
    pub async fn get_product(&self, id: &str) -> DbResult<ProductDetail> {
        let mut conn = self.pool.acquire().await?;

        let product = fetch_product(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;
        let units = fetch_units(&mut conn, id).await?;

        let mut variants = Vec::new();
        for variant in fetch_variants(&mut conn, id).await? {
            let tiers = fetch_tiers(&mut conn, &variant.id).await?;
            variants.push(VariantDetail { variant, tiers });
        }

        Ok(ProductDetail {
            product,
            units,
            variants,
        })
    }

    /// Gets a variant with its tiers.
    pub async fn get_variant(&self, id: &str) -> DbResult<VariantDetail> {
        let mut conn = self.pool.acquire().await?;
        let variant = fetch_variant(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Variant", id))?;
        let tiers = fetch_tiers(&mut conn, id).await?;
        Ok(VariantDetail { variant, tiers })
    }

    /// Finds a variant by SKU or barcode.
    pub async fn find_variant_by_code(&self, code: &str) -> DbResult<Option<Variant>> {
        let sql = format!(
            "SELECT {} FROM variants WHERE sku = ?1 OR barcode = ?1 LIMIT 1",
            VARIANT_COLUMNS
        );
        let variant = sqlx::query_as::<_, Variant>(&sql)
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(variant)
    }

    /// Lists a product's units, smallest first.
    pub async fn list_units(&self, product_id: &str) -> DbResult<Vec<Unit>> {
        let mut conn = self.pool.acquire().await?;
        fetch_units(&mut conn, product_id).await
    }

    /// Lists a variant's tiers in ascending `min_qty`.
    pub async fn list_tiers(&self, variant_id: &str) -> DbResult<Vec<PricingTier>> {
        let mut conn = self.pool.acquire().await?;
        fetch_tiers(&mut conn, variant_id).await
    }

    /// Activates or deactivates a product. Inactive products cannot be sold.
    pub async fn set_product_active(&self, product_id: &str, active: bool) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE products SET is_active = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(active)
                .bind(Utc::now())
                .bind(product_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id));
        }
        info!(product_id = %product_id, active, "Product activity changed");
        Ok(())
    }

    // =========================================================================
    // Units
    // =========================================================================

    /// Adds a derived unit to a product.
    pub async fn add_unit(&self, product_id: &str, input: &NewUnit) -> DbResult<Unit> {
        self.retry
            .run("add_unit", move || self.add_unit_once(product_id, input))
            .await
    }

    async fn add_unit_once(&self, product_id: &str, input: &NewUnit) -> DbResult<Unit> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        touch_product(&mut tx, product_id, now).await?;
        ensure_units_unlocked(&mut tx, product_id).await?;

        let current = fetch_units(&mut tx, product_id).await?;
        let next = units::add_unit(&current, input, Uuid::new_v4().to_string(), now)?;
        let unit = next
            .last()
            .cloned()
            .ok_or_else(|| DbError::Internal("unit set is empty after add".to_string()))?;

        insert_unit(&mut tx, &unit).await?;
        tx.commit().await?;

        info!(
            product_id = %product_id,
            unit = %unit.name,
            to_base_unit = unit.to_base_unit,
            "Unit added"
        );
        Ok(unit)
    }

    /// Renames, re-factors or retargets a unit and returns the product's
    /// recalculated unit set.
    pub async fn update_unit(&self, unit_id: &str, edit: &UnitEdit) -> DbResult<Vec<Unit>> {
        let product_id = self.unit_product_id(unit_id).await?;
        let product_id = product_id.as_str();
        self.retry
            .run("update_unit", move || {
                self.update_unit_once(product_id, unit_id, edit)
            })
            .await
    }

    async fn update_unit_once(
        &self,
        product_id: &str,
        unit_id: &str,
        edit: &UnitEdit,
    ) -> DbResult<Vec<Unit>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        touch_product(&mut tx, product_id, now).await?;
        ensure_units_unlocked(&mut tx, product_id).await?;

        let current = fetch_units(&mut tx, product_id).await?;
        let next = units::apply_edit(&current, unit_id, edit)?;

        for unit in next.iter().filter(|u| !current.contains(u)) {
            sqlx::query(
                r#"
                UPDATE units
                SET name = ?1, conversion_factor = ?2, converts_to = ?3, to_base_unit = ?4
                WHERE id = ?5
                "#,
            )
            .bind(&unit.name)
            .bind(unit.conversion_factor)
            .bind(&unit.converts_to)
            .bind(unit.to_base_unit)
            .bind(&unit.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(product_id = %product_id, unit_id = %unit_id, "Unit updated");
        Ok(next)
    }

    /// Deletes a unit. The base unit and units other units convert through
    /// are never deleted.
    pub async fn delete_unit(&self, unit_id: &str) -> DbResult<()> {
        let product_id = self.unit_product_id(unit_id).await?;
        let product_id = product_id.as_str();
        self.retry
            .run("delete_unit", move || {
                self.delete_unit_once(product_id, unit_id)
            })
            .await
    }

    async fn delete_unit_once(&self, product_id: &str, unit_id: &str) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        touch_product(&mut tx, product_id, now).await?;
        ensure_units_unlocked(&mut tx, product_id).await?;

        let current = fetch_units(&mut tx, product_id).await?;
        units::ensure_deletable(unit_id, &current)?;

        sqlx::query("DELETE FROM units WHERE id = ?1")
            .bind(unit_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(product_id = %product_id, unit_id = %unit_id, "Unit deleted");
        Ok(())
    }

    async fn unit_product_id(&self, unit_id: &str) -> DbResult<String> {
        let product_id: Option<String> =
            sqlx::query_scalar("SELECT product_id FROM units WHERE id = ?1")
                .bind(unit_id)
                .fetch_optional(&self.pool)
                .await?;
        product_id.ok_or_else(|| DbError::not_found("Unit", unit_id))
    }

    // =========================================================================
    // Pricing Tiers
    // =========================================================================

    /// Replaces a variant's tier list.
    pub async fn set_pricing_tiers(
        &self,
        variant_id: &str,
        tiers: &[PricingTier],
    ) -> DbResult<Vec<PricingTier>> {
        validate_tiers(tiers)?;
        self.retry
            .run("set_pricing_tiers", move || {
                self.set_pricing_tiers_once(variant_id, tiers)
            })
            .await?;
        Ok(tiers.to_vec())
    }

    async fn set_pricing_tiers_once(&self, variant_id: &str, tiers: &[PricingTier]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE variants SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(variant_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(DbError::not_found("Variant", variant_id));
        }

        sqlx::query("DELETE FROM pricing_tiers WHERE variant_id = ?1")
            .bind(variant_id)
            .execute(&mut *tx)
            .await?;
        insert_tiers(&mut tx, variant_id, tiers).await?;
        tx.commit().await?;

        info!(variant_id = %variant_id, tiers = tiers.len(), "Pricing tiers replaced");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn unit_named<'a>(units: &'a [Unit], name: &str) -> &'a Unit {
        units.iter().find(|u| u.name == name).unwrap()
    }

    #[tokio::test]
    async fn test_create_product_derives_to_base_unit() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 0).await;

        assert_eq!(egg.units.len(), 3);
        assert_eq!(unit_named(&egg.units, "Pcs").to_base_unit, 1);
        assert_eq!(unit_named(&egg.units, "Dozen").to_base_unit, 12);
        assert_eq!(unit_named(&egg.units, "Box").to_base_unit, 144);
        assert_eq!(egg.variants[0].tiers, testing::egg_tiers());
        assert_eq!(egg.variants[0].variant.current_stock, 0);
    }

    #[tokio::test]
    async fn test_opening_stock_goes_through_ledger() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 40).await;
        let variant_id = &egg.variants[0].variant.id;

        assert_eq!(egg.variants[0].variant.current_stock, 40);
        let history = db.ledger().history(variant_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].movement_type, MovementType::Adjustment);
        assert_eq!(history[0].quantity, 40);
    }

    #[tokio::test]
    async fn test_create_product_rejects_bad_unit_graph() {
        let db = testing::memory_db().await;
        let mut input = testing::egg_input(0);
        input.units = vec![
            NewUnit::base("Pcs"),
            NewUnit::derived("Dozen", 12, "Box"),
            NewUnit::derived("Box", 12, "Dozen"),
        ];

        let err = db.catalog().create_product(&input).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::CycleDetected { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_rejected() {
        let db = testing::memory_db().await;
        testing::create_egg(&db, 0).await;
        let err = db
            .catalog()
            .create_product(&testing::egg_input(0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::UniqueViolation { ref field, ref value } if field == "sku" && value == "EGG-A"
        ));
    }

    #[tokio::test]
    async fn test_sku_and_barcode_share_one_namespace() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 0).await;
        let catalog = db.catalog();

        // SKU equal to the egg's barcode
        let mut input = testing::egg_input(0);
        input.name = "Telur Bebek".to_string();
        input.variants[0].sku = Some("8991234567890".to_string());
        input.variants[0].barcode = None;
        let err = catalog.create_product(&input).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::UniqueViolation { ref field, .. } if field == "sku"
        ));

        // barcode equal to the egg's SKU
        input.variants[0].sku = Some("DUCK-A".to_string());
        input.variants[0].barcode = Some("EGG-A".to_string());
        let err = catalog.create_product(&input).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::UniqueViolation { ref field, .. } if field == "barcode"
        ));

        let found = catalog.find_variant_by_code("EGG-A").await.unwrap().unwrap();
        assert_eq!(found.id, egg.variants[0].variant.id);
        assert!(catalog.find_variant_by_code("DUCK-A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_tiers_are_rejected() {
        let db = testing::memory_db().await;
        let mut input = testing::egg_input(0);
        input.variants[0].tiers = vec![PricingTier::new(12, 70_000)];
        let err = db.catalog().create_product(&input).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::InvalidTiers { .. }))
        ));
    }

    #[tokio::test]
    async fn test_add_and_delete_unit() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 0).await;
        let catalog = db.catalog();

        let tray = catalog
            .add_unit(&egg.product.id, &NewUnit::derived("Tray", 30, "Pcs"))
            .await
            .unwrap();
        assert_eq!(tray.to_base_unit, 30);
        assert_eq!(catalog.list_units(&egg.product.id).await.unwrap().len(), 4);

        catalog.delete_unit(&tray.id).await.unwrap();
        assert_eq!(catalog.list_units(&egg.product.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_unit_guards() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 0).await;
        let catalog = db.catalog();

        let base = unit_named(&egg.units, "Pcs");
        assert!(matches!(
            catalog.delete_unit(&base.id).await,
            Err(DbError::Core(CoreError::BaseUnitDeletion { .. }))
        ));

        let dozen = unit_named(&egg.units, "Dozen");
        match catalog.delete_unit(&dozen.id).await {
            Err(DbError::Core(CoreError::DependentUnitsExist { dependents, .. })) => {
                assert_eq!(dependents, vec!["Box".to_string()]);
            }
            other => panic!("expected DependentUnitsExist, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_unit_recalculates_chain() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 0).await;
        let dozen = unit_named(&egg.units, "Dozen");

        let edit = UnitEdit {
            conversion_factor: Some(10),
            ..Default::default()
        };
        let next = db.catalog().update_unit(&dozen.id, &edit).await.unwrap();
        assert_eq!(unit_named(&next, "Box").to_base_unit, 120);

        let stored = db.catalog().list_units(&egg.product.id).await.unwrap();
        assert_eq!(unit_named(&stored, "Box").to_base_unit, 120);
    }

    #[tokio::test]
    async fn test_update_unit_rejects_cycle() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 0).await;
        let dozen = unit_named(&egg.units, "Dozen");

        let edit = UnitEdit {
            converts_to: Some("Box".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            db.catalog().update_unit(&dozen.id, &edit).await,
            Err(DbError::Core(CoreError::CycleDetected { .. }))
        ));
    }

    #[tokio::test]
    async fn test_units_locked_while_stock_on_hand() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 5).await;
        let catalog = db.catalog();
        let dozen = unit_named(&egg.units, "Dozen");

        let refactor = UnitEdit {
            conversion_factor: Some(10),
            ..Default::default()
        };
        assert!(matches!(
            catalog.update_unit(&dozen.id, &refactor).await,
            Err(DbError::Core(CoreError::UnitsLockedByStock { .. }))
        ));
        assert!(matches!(
            catalog
                .add_unit(&egg.product.id, &NewUnit::derived("Tray", 30, "Pcs"))
                .await,
            Err(DbError::Core(CoreError::UnitsLockedByStock { .. }))
        ));


        let rename = UnitEdit {
            name: Some("Lusin".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            catalog.update_unit(&dozen.id, &rename).await,
            Err(DbError::Core(CoreError::UnitsLockedByStock { .. }))
        ));
        assert!(matches!(
            catalog.delete_unit(&dozen.id).await,
            Err(DbError::Core(CoreError::UnitsLockedByStock { .. }))
        ));

        let units = catalog.list_units(&egg.product.id).await.unwrap();
        assert_eq!(unit_named(&units, "Dozen").to_base_unit, 12);
        assert_eq!(units.len(), 3);
    }

    #[tokio::test]
    async fn test_set_pricing_tiers() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 0).await;
        let variant_id = &egg.variants[0].variant.id;
        let catalog = db.catalog();

        let tiers = vec![
            PricingTier::new(1, 80_000),
            PricingTier::new(6, 77_000),
            PricingTier::new(144, 65_000),
        ];
        catalog.set_pricing_tiers(variant_id, &tiers).await.unwrap();
        assert_eq!(catalog.list_tiers(variant_id).await.unwrap(), tiers);

        let bad = vec![PricingTier::new(1, 10), PricingTier::new(1, 5)];
        assert!(catalog.set_pricing_tiers(variant_id, &bad).await.is_err());
        assert_eq!(catalog.list_tiers(variant_id).await.unwrap(), tiers);
    }

    #[tokio::test]
    async fn test_find_variant_by_code() {
        let db = testing::memory_db().await;
        let egg = testing::create_egg(&db, 0).await;
        let found = db
            .catalog()
            .find_variant_by_code("8991234567890")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, egg.variants[0].variant.id);
        assert!(db
            .catalog()
            .find_variant_by_code("nope")
            .await
            .unwrap()
            .is_none());
    }
}
