//! Ledger store abstraction.
//!
//! The engine talks to storage through two traits:
//!
//! - [`LedgerStore`] hands out transactions and serves read-only queries.
//! - [`LedgerTx`] is one atomic unit of work. Everything written through it
//!   becomes visible together on [`LedgerTx::commit`]; dropping it without
//!   committing discards the writes.
//!
//! Two implementations exist:
//!
//! - `PgLedgerStore` in the persistence crate (production, row locks + version CAS)
//! - [`InMemoryLedgerStore`] here (tests and local development)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::pagination::Cursor;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Badge, BadgeType, GroupBuy, Participation, PointHistory, ReputationScore, Review,
    UserActivity, UserProfile,
};

pub mod memory;

pub use memory::{InMemoryLedgerStore, LockMode, PausedCommit};

/// Errors surfaced by ledger store implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the row changed since it was read.
    #[error("Concurrent modification of {0}")]
    Conflict(String),

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Timeouts, serialization failures, deadlocks. The whole unit may be retried.
    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Storage failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether restarting the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Transient(_))
    }
}

/// Entry point to durable storage.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a new atomic unit of work.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;

    /// Cheap connectivity check for health probes.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Direct lookup. Resolves soft-deleted rows too.
    async fn find_group_buy(&self, id: Uuid) -> Result<Option<GroupBuy>, StoreError>;

    /// RECRUITING, non-deleted group buys, newest first, strictly after `after`.
    async fn list_open_group_buys(
        &self,
        after: Option<Cursor>,
        limit: u32,
    ) -> Result<Vec<GroupBuy>, StoreError>;

    /// IDs of RECRUITING group buys whose deadline is at or before `now`.
    async fn expirable_group_buys(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// IDs of CONFIRMED group buys whose deadline is before `cutoff`.
    async fn confirmed_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// All participations, active and historical, oldest first.
    async fn participations(&self, group_buy_id: Uuid) -> Result<Vec<Participation>, StoreError>;

    /// Ledger entries for a user, oldest first.
    async fn point_history(&self, user_id: Uuid) -> Result<Vec<PointHistory>, StoreError>;

    async fn point_balance(&self, user_id: Uuid) -> Result<i64, StoreError>;

    async fn badges(&self, user_id: Uuid) -> Result<Vec<Badge>, StoreError>;

    /// Users never touched by the engine report the default score.
    async fn reputation(&self, user_id: Uuid) -> Result<ReputationScore, StoreError>;

    async fn reviews_for(&self, group_buy_id: Uuid) -> Result<Vec<Review>, StoreError>;

    async fn is_settled(&self, group_buy_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;
}

/// One atomic unit of work against the ledger.
#[async_trait]
pub trait LedgerTx: Send {
    /// Read a group buy and hold it exclusively until the unit ends.
    async fn lock_group_buy(&mut self, id: Uuid) -> Result<Option<GroupBuy>, StoreError>;

    async fn insert_group_buy(&mut self, group_buy: &GroupBuy) -> Result<(), StoreError>;

    /// Replace the row with `next` if its stored version still equals `expected_version`.
    ///
    /// Returns [`StoreError::Conflict`] when the version moved.
    async fn update_group_buy(
        &mut self,
        next: &GroupBuy,
        expected_version: i64,
    ) -> Result<(), StoreError>;

    async fn active_participation(
        &mut self,
        group_buy_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Participation>, StoreError>;

    async fn active_participants(
        &mut self,
        group_buy_id: Uuid,
    ) -> Result<Vec<Participation>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the user already has an active row.
    async fn insert_participation(&mut self, participation: &Participation)
        -> Result<(), StoreError>;

    async fn deactivate_participation(
        &mut self,
        participation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Read and lock the user's profile, creating it with the default score on first touch.
    async fn lock_user(&mut self, user_id: Uuid) -> Result<UserProfile, StoreError>;

    async fn set_reputation(
        &mut self,
        user_id: Uuid,
        score: ReputationScore,
    ) -> Result<(), StoreError>;

    async fn point_balance(&mut self, user_id: Uuid) -> Result<i64, StoreError>;

    async fn append_point(&mut self, entry: &PointHistory) -> Result<(), StoreError>;

    /// Record that `(group_buy_id, user_id)` has been settled.
    ///
    /// Returns `false` if the marker already existed.
    async fn insert_settlement_marker(
        &mut self,
        group_buy_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn has_badge(&mut self, user_id: Uuid, badge_type: BadgeType)
        -> Result<bool, StoreError>;

    /// Returns `false` if `(user_id, badge_type)` already existed.
    async fn insert_badge(&mut self, badge: &Badge) -> Result<bool, StoreError>;

    async fn user_activity(&mut self, user_id: Uuid) -> Result<UserActivity, StoreError>;

    async fn find_review(
        &mut self,
        group_buy_id: Uuid,
        reviewer_id: Uuid,
    ) -> Result<Option<Review>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the reviewer already reviewed this group buy.
    async fn insert_review(&mut self, review: &Review) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(StoreError::Conflict("group_buy".into()).is_retryable());
        assert!(StoreError::Transient("deadlock".into()).is_retryable());
        assert!(!StoreError::Duplicate("badge".into()).is_retryable());
        assert!(!StoreError::Backend("gone".into()).is_retryable());
    }
}
