//! Domain layer for the group-buy service.
//!
//! This crate contains:
//! - Domain models (GroupBuy, Participation, PointHistory, Badge, Review)
//! - The ledger store traits and the in-memory adapter
//! - The lifecycle, capacity and reward services behind `GroupBuyEngine`
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::ErrorKind;
