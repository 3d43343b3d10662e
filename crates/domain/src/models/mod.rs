//! Domain models for the group-buy marketplace.

pub mod badge;
pub mod group_buy;
pub mod participation;
pub mod point_history;
pub mod reputation;
pub mod review;

pub use badge::{Badge, BadgeGoal, BadgeType, UserActivity};
pub use group_buy::{GroupBuy, GroupBuyStatus};
pub use participation::Participation;
pub use point_history::{PointHistory, PointType};
pub use reputation::{ReputationScore, UserProfile};
pub use review::Review;
