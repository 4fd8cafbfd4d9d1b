//! Shared fixtures for repository tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use stockline_core::{NewProduct, NewUnit, NewVariant, PriceMode, PricingTier, ProductDetail, Unit};
use uuid::Uuid;

use crate::pool::{Database, DbConfig};

pub(crate) async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

/// A file-backed database, for tests that need real concurrent writers.
pub(crate) async fn file_db(max_connections: u32) -> (Database, PathBuf) {
    let path = std::env::temp_dir().join(format!("stockline-test-{}.db", Uuid::new_v4()));
    let db = Database::new(DbConfig::new(&path).max_connections(max_connections))
        .await
        .unwrap();
    (db, path)
}

pub(crate) fn remove_db_files(path: &Path) {
    let _ = std::fs::remove_file(path);
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(side));
    }
}

/// 1 pcs = 75,000; 12+ pcs = 70,000 per pcs.
pub(crate) fn egg_tiers() -> Vec<PricingTier> {
    vec![PricingTier::new(1, 75_000), PricingTier::new(12, 70_000)]
}

/// Eggs: Pcs (base), Dozen = 12 Pcs, Box = 12 Dozen.
pub(crate) fn egg_input(opening_stock: i64) -> NewProduct {
    NewProduct {
        name: "Telur Ayam".to_string(),
        description: Some("Chicken eggs".to_string()),
        units: vec![
            NewUnit::base("Pcs"),
            NewUnit::derived("Dozen", 12, "Pcs"),
            NewUnit::derived("Box", 12, "Dozen"),
        ],
        variants: vec![NewVariant {
            label: "Grade A".to_string(),
            sku: Some("EGG-A".to_string()),
            barcode: Some("8991234567890".to_string()),
            attributes: BTreeMap::from([("grade".to_string(), "A".to_string())]),
            price_mode: PriceMode::Fixed,
            cost_per_base_cents: 60_000,
            tiers: egg_tiers(),
            opening_stock,
        }],
    }
}

pub(crate) async fn create_egg(db: &Database, opening_stock: i64) -> ProductDetail {
    db.catalog()
        .create_product(&egg_input(opening_stock))
        .await
        .unwrap()
}

pub(crate) fn unit<'a>(product: &'a ProductDetail, name: &str) -> &'a Unit {
    product.units.iter().find(|u| u.name == name).unwrap()
}
