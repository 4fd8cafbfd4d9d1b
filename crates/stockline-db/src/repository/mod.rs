//! # Repository Module
//!
//! Database access for Stockline, one repository per aggregate.
//!
//! ## Transactions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SalesRepository::checkout                                              │
//! │       │                                                                 │
//! │       │  pool.begin()                                                   │
//! │       ▼                                                                 │
//! │  sequence::next_number(&mut tx)     catalog::fetch_*(&mut tx)           │
//! │  ledger::apply(&mut tx, ...)        INSERT receipt rows                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tx.commit()   (or drop: everything above rolls back)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Row helpers take `&mut SqliteConnection` so a transaction or a pooled
//! connection can be passed alike. Each unit of work starts with a write
//! so SQLite's write lock is taken up front.
//!
//! ## Available Repositories
//!
//! - [`catalog::CatalogRepository`] - Products, units, variants, tiers
//! - [`ledger::StockLedger`] - Stock movements and adjustments
//! - [`purchase_order::PurchaseOrderRepository`] - PO workflow and receive
//! - [`sales::SalesRepository`] - Checkout and receipts

pub mod catalog;
pub mod ledger;
pub mod purchase_order;
pub mod sales;
pub mod sequence;
