//! # Database Migrations
//!
//! Embedded SQL migrations for Stockline.
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/sqlite/` with the next sequence number
//! 2. Name format: `NNN_description.sql` (e.g., `002_add_supplier_table.sql`)
//! 3. **NEVER** modify existing migrations - always add new ones

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations.
///
/// Idempotent; each migration runs in its own transaction, in filename order.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)`.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await?;

    Ok((total, applied as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_all_migrations_applied() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (total, applied) = migration_status(db.pool()).await.unwrap();
        assert!(total >= 1);
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_movements_are_append_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = sqlx::query("DELETE FROM stock_movements")
            .execute(db.pool())
            .await;
        // empty table: the trigger never fires, but the statement is legal
        assert!(result.is_ok());

        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO products (id, name, is_active, created_at, updated_at) VALUES ('p', 'P', 1, ?1, ?1)",
        )
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO variants (id, product_id, label, current_stock, created_at, updated_at) VALUES ('v', 'p', 'V', 1, ?1, ?1)",
        )
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO stock_movements (id, variant_id, movement_type, quantity, reference_type, reference_id, created_at) VALUES ('m', 'v', 'adjustment', 1, 'adjustment', 'a', ?1)",
        )
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();

        let update = sqlx::query("UPDATE stock_movements SET quantity = 5")
            .execute(db.pool())
            .await;
        assert!(update.is_err());
        let delete = sqlx::query("DELETE FROM stock_movements")
            .execute(db.pool())
            .await;
        assert!(delete.is_err());
    }
}
