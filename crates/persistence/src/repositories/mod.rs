//! Repository implementations for database operations.

pub mod group_buy;
pub mod notification;
pub mod reward;

pub use group_buy::GroupBuyRepository;
pub use notification::NotificationRepository;
pub use reward::RewardRepository;
