//! Persistence layer for the group-buy service.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Read-side repositories
//! - The PostgreSQL ledger store and notification sink

pub mod db;
pub mod entities;
pub mod ledger;
pub mod metrics;
pub mod notification;
pub mod repositories;

pub use ledger::{map_sqlx_error, PgLedgerStore, PgLedgerTx};
pub use notification::PgNotificationService;
