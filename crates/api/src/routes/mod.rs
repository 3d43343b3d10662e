//! HTTP route handlers.

pub mod admin;
pub mod group_buys;
pub mod health;
pub mod participants;
pub mod reviews;
pub mod rewards;
