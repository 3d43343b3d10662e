//! Custom Axum extractors.

pub mod acting_user;

pub use acting_user::{ActingUser, AdminUser, USER_ID_HEADER, USER_ROLE_HEADER};
