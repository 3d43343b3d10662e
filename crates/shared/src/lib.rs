//! Shared utilities and common types for the group-buy backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Keyset cursor encoding for paginated listings
//! - Field validators used by request payloads

pub mod pagination;
pub mod validation;
