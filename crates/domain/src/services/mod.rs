//! Domain services for the group-buy engine.
//!
//! Services contain business logic that operates on domain models through a
//! ledger unit of work.

pub mod capacity;
pub mod clock;
pub mod engine;
pub mod lifecycle;
pub mod notification;
pub mod retry;
pub mod reward;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{CancelActor, CompletionOutcome, EngineConfig, GroupBuyEngine, GroupBuyPage};
pub use lifecycle::TransitionOutcome;
pub use notification::{
    MockNotificationService, NotificationEvent, NotificationResult, NotificationService, Outbox,
};
pub use retry::{RetryPolicy, Retryable};
pub use reward::{AwardedBadge, RewardDispatcher, RewardPolicy, SettlementSummary};
