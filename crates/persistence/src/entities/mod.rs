//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod badge;
pub mod group_buy;
pub mod participation;
pub mod point_history;
pub mod review;

pub use badge::{BadgeEntity, UserActivityEntity, UserProfileEntity};
pub use group_buy::{GroupBuyEntity, GROUP_BUY_COLUMNS};
pub use participation::ParticipationEntity;
pub use point_history::PointHistoryEntity;
pub use review::ReviewEntity;
