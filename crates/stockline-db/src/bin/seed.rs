//! # Demo Seed
//!
//! Builds a small catalog and runs one full inventory cycle against it:
//! purchase order → receive → checkout → ledger audit.
//!
//! ## Usage
//! ```bash
//! # Use stockline.toml / environment / defaults
//! cargo run -p stockline-db --bin seed
//!
//! # Specify database path
//! cargo run -p stockline-db --bin seed -- --db ./data/stockline.db
//!
//! # Specify config file
//! cargo run -p stockline-db --bin seed -- --config ./stockline.toml
//! ```
//!
//! ## Seeded Catalog
//! - Telur Ayam: Pcs (base), Dozen = 12 Pcs, Box = 12 Dozen; 1+ / 12+ pcs tiers
//! - Air Mineral 600ml: Bottle (base), Carton = 24 Bottle; 1+ / 24+ bottle tiers

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use stockline_core::{
    CheckoutLine, Money, NewProduct, NewUnit, NewVariant, PaymentMethod, PriceMode, PricingTier,
    ProductDetail, PurchaseOrderLine,
};
use stockline_db::{AppConfig, Database};

fn eggs() -> NewProduct {
    NewProduct {
        name: "Telur Ayam".to_string(),
        description: Some("Fresh chicken eggs".to_string()),
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
            cost_per_base_cents: 0,
            tiers: vec![PricingTier::new(1, 75_000), PricingTier::new(12, 70_000)],
            opening_stock: 0,
        }],
    }
}

fn water() -> NewProduct {
    NewProduct {
        name: "Air Mineral 600ml".to_string(),
        description: None,
        units: vec![
            NewUnit::base("Bottle"),
            NewUnit::derived("Carton", 24, "Bottle"),
        ],
        variants: vec![NewVariant {
            label: "Regular".to_string(),
            sku: Some("WTR-600".to_string()),
            barcode: None,
            attributes: BTreeMap::new(),
            // 25% over the last purchase cost, 20% for full cartons
            price_mode: PriceMode::MarkupPercentage,
            cost_per_base_cents: 0,
            tiers: vec![PricingTier::new(1, 2_500), PricingTier::new(24, 2_000)],
            opening_stock: 0,
        }],
    }
}

fn unit_id(product: &ProductDetail, name: &str) -> Result<String, Box<dyn std::error::Error>> {
    product
        .units
        .iter()
        .find(|u| u.name == name)
        .map(|u| u.id.clone())
        .ok_or_else(|| format!("unit {} missing on {}", name, product.product.name).into())
}

fn variant_id(product: &ProductDetail) -> Result<String, Box<dyn std::error::Error>> {
    product
        .variants
        .first()
        .map(|v| v.variant.id.clone())
        .ok_or_else(|| format!("{} has no variants", product.product.name).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stockline=debug,sqlx=warn")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockline Demo Seed");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("  -c, --config <PATH>  Config file path (default: platform config dir)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = AppConfig::load_or_default(config_path);
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("Stockline Demo Seed");
    println!("===================");
    println!("Database: {}", config.database.path.display());
    println!();

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database, migrations applied");

    let catalog = db.catalog();
    if catalog.find_variant_by_code("EGG-A").await?.is_some() {
        println!("⚠ Demo catalog already present, skipping.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Catalog
    let egg = catalog.create_product(&eggs()).await?;
    let wtr = catalog.create_product(&water()).await?;
    println!("✓ Created {} and {}", egg.product.name, wtr.product.name);

    let egg_variant = variant_id(&egg)?;
    let wtr_variant = variant_id(&wtr)?;

    // Purchase order: 2 Box of eggs, 5 Carton of water
    let orders = db.purchase_orders();
    let po = orders
        .create(
            "SUP-DEMO",
            Some("demo restock"),
            &[
                PurchaseOrderLine {
                    product_id: egg.product.id.clone(),
                    variant_id: egg_variant.clone(),
                    unit_id: unit_id(&egg, "Box")?,
                    ordered_qty: 2,
                    price_cents: 8_640_000,
                },
                PurchaseOrderLine {
                    product_id: wtr.product.id.clone(),
                    variant_id: wtr_variant.clone(),
                    unit_id: unit_id(&wtr, "Carton")?,
                    ordered_qty: 5,
                    price_cents: 72_000,
                },
            ],
        )
        .await?;
    orders.send(&po.order.id).await?;
    let received = orders.receive(&po.order.id, &[]).await?;
    println!(
        "✓ {} received: {} items, subtotal {}",
        received.order.number,
        received.order.total_items,
        received.order.subtotal()
    );

    // Checkout: 1 Dozen eggs and 3 bottles, paid in cash
    let receipt = db
        .sales()
        .checkout(
            PaymentMethod::Cash,
            &[
                CheckoutLine {
                    product_id: egg.product.id.clone(),
                    variant_id: egg_variant.clone(),
                    unit_id: unit_id(&egg, "Dozen")?,
                    quantity: 1,
                },
                CheckoutLine {
                    product_id: wtr.product.id.clone(),
                    variant_id: wtr_variant.clone(),
                    unit_id: unit_id(&wtr, "Bottle")?,
                    quantity: 3,
                },
            ],
            Some(Money::from_minor(1_000_000)),
        )
        .await?;

    println!();
    println!("Receipt {}", receipt.transaction.number);
    for item in &receipt.items {
        println!(
            "  {} ({}) x{} {} @ {} = {}",
            item.product_name,
            item.variant_label,
            item.quantity,
            item.unit_name,
            item.unit_price(),
            item.total_price()
        );
    }
    println!("  Total   {}", receipt.transaction.total());
    println!(
        "  Change  {}",
        Money::from_minor(receipt.transaction.change_cents)
    );
    println!();

    // Ledger audit
    let ledger = db.ledger();
    for (name, id) in [("Telur Ayam", &egg_variant), ("Air Mineral", &wtr_variant)] {
        let balance = ledger.balance(id).await?;
        info!(
            variant = name,
            stock = balance.current_stock,
            consistent = balance.is_consistent(),
            "Ledger balance"
        );
        println!(
            "✓ {}: {} base units on hand (ledger {})",
            name,
            balance.current_stock,
            if balance.is_consistent() { "consistent" } else { "MISMATCH" }
        );
    }

    db.close().await;
    Ok(())
}
