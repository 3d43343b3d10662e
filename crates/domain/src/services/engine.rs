//! Group-buy engine facade.
//!
//! Every mutation follows the same shape: open a unit of work, run the
//! component logic against it, commit, then flush the notification outbox.
//! The whole unit is retried on version conflicts and transient storage
//! failures.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use shared::pagination::Cursor;
use shared::validation::validate_deadline;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::capacity;
use super::clock::Clock;
use super::lifecycle::{self, TransitionOutcome};
use super::notification::{NotificationEvent, NotificationService, Outbox};
use super::retry::RetryPolicy;
use super::reward::{RewardDispatcher, RewardPolicy, SettlementSummary};
use crate::error::{
    CancelError, CompletionError, CreateError, JoinError, LeaveError, ReviewError,
};
use crate::models::participation::JoinGroupBuyResponse;
use crate::models::review::{SubmitReviewRequest, SubmitReviewResponse};
use crate::models::{
    group_buy::CreateGroupBuyRequest, Badge, BadgeType, GroupBuy, GroupBuyStatus,
    Participation, PointHistory, ReputationScore, Review,
};
use crate::store::{LedgerStore, StoreError};

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    /// How far ahead a deadline may be set.
    pub max_deadline_days: i64,
    /// Rows fetched per sweep or auto-completion query.
    pub batch_size: u32,
    pub rewards: RewardPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_deadline_days: 30,
            batch_size: 100,
            rewards: RewardPolicy::default(),
        }
    }
}

/// Who is cancelling a group buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelActor {
    /// Must own the group buy.
    Host(Uuid),
    Admin(Uuid),
    /// Report resolution and other internal triggers.
    System,
}

/// Result of a completion request.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Completed(SettlementSummary),
    /// Already COMPLETED; settlement was re-run and only filled gaps.
    AlreadyCompleted(SettlementSummary),
}

impl CompletionOutcome {
    pub fn summary(&self) -> &SettlementSummary {
        match self {
            CompletionOutcome::Completed(s) | CompletionOutcome::AlreadyCompleted(s) => s,
        }
    }
}

/// One page of open group buys.
#[derive(Debug, Clone)]
pub struct GroupBuyPage {
    pub items: Vec<GroupBuy>,
    pub next_cursor: Option<Cursor>,
}

pub struct GroupBuyEngine {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn NotificationService>,
    clock: Arc<dyn Clock>,
    dispatcher: RewardDispatcher,
    config: EngineConfig,
}

impl GroupBuyEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn NotificationService>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            dispatcher: RewardDispatcher::new(config.rewards),
            store,
            notifier,
            clock,
            config,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn flush(&self, outbox: Outbox) {
        if !outbox.is_empty() {
            outbox.flush(self.notifier.as_ref()).await;
        }
    }

    // ------------------------------------------------------------------
    // Hosting
    // ------------------------------------------------------------------

    pub async fn create_group_buy(
        &self,
        host_user_id: Uuid,
        request: &CreateGroupBuyRequest,
    ) -> Result<GroupBuy, CreateError> {
        request
            .validate()
            .map_err(|e| CreateError::Validation(e.to_string()))?;
        validate_deadline(request.deadline, self.now(), self.config.max_deadline_days).map_err(
            |e| {
                CreateError::Validation(
                    e.message
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                )
            },
        )?;

        let group_buy = self
            .config
            .retry
            .run("create_group_buy", || self.create_unit(host_user_id, request))
            .await?;

        info!(
            group_buy_id = %group_buy.id,
            host_user_id = %host_user_id,
            target_headcount = group_buy.target_headcount,
            deadline = %group_buy.deadline,
            "Group buy created"
        );
        Ok(group_buy)
    }

    async fn create_unit(
        &self,
        host_user_id: Uuid,
        request: &CreateGroupBuyRequest,
    ) -> Result<GroupBuy, CreateError> {
        let now = self.now();
        let group_buy = GroupBuy {
            id: Uuid::new_v4(),
            host_user_id,
            title: request.title.trim().to_string(),
            description: request.description.clone(),
            target_headcount: request.target_headcount,
            current_headcount: 0,
            point_cost: request.point_cost,
            deadline: request.deadline,
            status: GroupBuyStatus::Recruiting,
            deleted_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        tx.lock_user(host_user_id).await?;
        tx.insert_group_buy(&group_buy).await?;
        tx.commit().await?;
        Ok(group_buy)
    }

    // ------------------------------------------------------------------
    // Capacity
    // ------------------------------------------------------------------

    pub async fn join_group_buy(
        &self,
        group_buy_id: Uuid,
        user_id: Uuid,
    ) -> Result<JoinGroupBuyResponse, JoinError> {
        let result = self
            .config
            .retry
            .run("join_group_buy", || self.join_unit(group_buy_id, user_id))
            .await;

        match result {
            Ok((accepted, outbox)) => {
                counter!("group_buy_joins_total", "outcome" => "accepted").increment(1);
                info!(
                    group_buy_id = %group_buy_id,
                    user_id = %user_id,
                    current_headcount = accepted.group_buy.current_headcount,
                    confirmed = accepted.confirmed,
                    "Participant joined"
                );
                self.flush(outbox).await;
                Ok(JoinGroupBuyResponse {
                    participation_id: accepted.participation.id,
                    group_buy_id,
                    current_headcount: accepted.group_buy.current_headcount,
                    target_headcount: accepted.group_buy.target_headcount,
                    status: accepted.group_buy.status,
                })
            }
            Err(err) => {
                counter!("group_buy_joins_total", "outcome" => err.label()).increment(1);
                debug!(
                    group_buy_id = %group_buy_id,
                    user_id = %user_id,
                    reason = err.label(),
                    "Join rejected"
                );
                Err(err)
            }
        }
    }

    async fn join_unit(
        &self,
        group_buy_id: Uuid,
        user_id: Uuid,
    ) -> Result<(capacity::JoinAccepted, Outbox), JoinError> {
        let mut outbox = Outbox::new();
        let mut tx = self.store.begin().await?;
        let accepted =
            capacity::try_join(tx.as_mut(), &mut outbox, self.clock.as_ref(), group_buy_id, user_id)
                .await?;
        tx.commit().await?;
        Ok((accepted, outbox))
    }

    pub async fn leave_group_buy(
        &self,
        group_buy_id: Uuid,
        user_id: Uuid,
    ) -> Result<GroupBuy, LeaveError> {
        let (group_buy, outbox) = self
            .config
            .retry
            .run("leave_group_buy", || self.leave_unit(group_buy_id, user_id))
            .await
            .inspect_err(|err| {
                debug!(
                    group_buy_id = %group_buy_id,
                    user_id = %user_id,
                    error = %err,
                    "Leave rejected"
                )
            })?;

        info!(
            group_buy_id = %group_buy_id,
            user_id = %user_id,
            current_headcount = group_buy.current_headcount,
            "Participant left"
        );
        self.flush(outbox).await;
        Ok(group_buy)
    }

    async fn leave_unit(
        &self,
        group_buy_id: Uuid,
        user_id: Uuid,
    ) -> Result<(GroupBuy, Outbox), LeaveError> {
        let mut outbox = Outbox::new();
        let mut tx = self.store.begin().await?;
        let group_buy =
            capacity::leave(tx.as_mut(), &mut outbox, self.clock.as_ref(), group_buy_id, user_id)
                .await?;
        tx.commit().await?;
        Ok((group_buy, outbox))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Host marks a CONFIRMED group buy as delivered, triggering settlement.
    pub async fn complete_group_buy(
        &self,
        group_buy_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<CompletionOutcome, CompletionError> {
        self.complete(group_buy_id, Some(acting_user_id)).await
    }

    async fn complete(
        &self,
        group_buy_id: Uuid,
        acting_user_id: Option<Uuid>,
    ) -> Result<CompletionOutcome, CompletionError> {
        let (outcome, outbox) = self
            .config
            .retry
            .run("complete_group_buy", || {
                self.complete_unit(group_buy_id, acting_user_id)
            })
            .await?;
        self.flush(outbox).await;
        Ok(outcome)
    }

    async fn complete_unit(
        &self,
        group_buy_id: Uuid,
        acting_user_id: Option<Uuid>,
    ) -> Result<(CompletionOutcome, Outbox), CompletionError> {
        let now = self.now();
        let mut outbox = Outbox::new();
        let mut tx = self.store.begin().await?;

        let current = tx
            .lock_group_buy(group_buy_id)
            .await?
            .ok_or(CompletionError::NotFound)?;

        if let Some(actor) = acting_user_id {
            if current.host_user_id != actor {
                return Err(CompletionError::NotHost);
            }
        }

        let outcome = match current.status {
            GroupBuyStatus::Completed => {
                let summary = self
                    .dispatcher
                    .on_group_buy_completed(tx.as_mut(), &mut outbox, &current, now)
                    .await?;
                CompletionOutcome::AlreadyCompleted(summary)
            }
            GroupBuyStatus::Confirmed => {
                let next = lifecycle::complete(tx.as_mut(), &mut outbox, &current, now)
                    .await?
                    .map_err(CompletionError::NotConfirmed)?;
                let summary = self
                    .dispatcher
                    .on_group_buy_completed(tx.as_mut(), &mut outbox, &next, now)
                    .await?;
                CompletionOutcome::Completed(summary)
            }
            other => return Err(CompletionError::NotConfirmed(other)),
        };

        tx.commit().await?;
        Ok((outcome, outbox))
    }

    /// Expire every RECRUITING group buy whose deadline is at or before `now`.
    ///
    /// Safe to call repeatedly or late. Returns how many rows this call moved to EXPIRED.
    pub async fn sweep_expired_group_buys(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let batch = self.config.batch_size.max(1);
        let mut expired = 0;

        loop {
            let ids = self.store.expirable_group_buys(now, batch).await?;
            let mut progressed = 0;

            for id in &ids {
                match self
                    .config
                    .retry
                    .run("expire_group_buy", || self.expire_unit(*id, now))
                    .await
                {
                    Ok((true, outbox)) => {
                        progressed += 1;
                        self.flush(outbox).await;
                    }
                    Ok((false, _)) => {}
                    Err(e) => {
                        warn!(group_buy_id = %id, error = %e, "Failed to expire group buy");
                    }
                }
            }

            expired += progressed;
            if ids.len() < batch as usize || progressed == 0 {
                break;
            }
        }

        if expired > 0 {
            info!(expired, "Deadline sweep finished");
        }
        Ok(expired)
    }

    async fn expire_unit(
        &self,
        group_buy_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(bool, Outbox), StoreError> {
        let mut outbox = Outbox::new();
        let mut tx = self.store.begin().await?;
        let expired = lifecycle::expire(tx.as_mut(), &mut outbox, group_buy_id, now).await?;
        tx.commit().await?;
        Ok((expired, outbox))
    }

    /// Complete CONFIRMED group buys whose deadline passed more than `grace` ago.
    pub async fn auto_complete_confirmed(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<usize, StoreError> {
        let ids = self
            .store
            .confirmed_before(now - grace, self.config.batch_size.max(1))
            .await?;

        let mut completed = 0;
        for id in ids {
            match self.complete(id, None).await {
                Ok(CompletionOutcome::Completed(_)) => completed += 1,
                Ok(CompletionOutcome::AlreadyCompleted(_)) => {}
                Err(CompletionError::NotConfirmed(status)) => {
                    debug!(group_buy_id = %id, status = %status, "Skipped auto-completion");
                }
                Err(e) => warn!(group_buy_id = %id, error = %e, "Auto-completion failed"),
            }
        }

        if completed > 0 {
            info!(completed, "Auto-completion finished");
        }
        Ok(completed)
    }

    pub async fn cancel_group_buy(
        &self,
        group_buy_id: Uuid,
        actor: CancelActor,
        reason: Option<String>,
    ) -> Result<TransitionOutcome, CancelError> {
        let (outcome, outbox) = self
            .config
            .retry
            .run("cancel_group_buy", || {
                self.cancel_unit(group_buy_id, actor, reason.as_deref())
            })
            .await?;

        if outcome == TransitionOutcome::Applied {
            info!(group_buy_id = %group_buy_id, actor = ?actor, "Group buy cancelled");
        }
        self.flush(outbox).await;
        Ok(outcome)
    }

    async fn cancel_unit(
        &self,
        group_buy_id: Uuid,
        actor: CancelActor,
        reason: Option<&str>,
    ) -> Result<(TransitionOutcome, Outbox), CancelError> {
        let now = self.now();
        let mut outbox = Outbox::new();
        let mut tx = self.store.begin().await?;

        let current = tx
            .lock_group_buy(group_buy_id)
            .await?
            .ok_or(CancelError::NotFound)?;

        if let CancelActor::Host(user_id) = actor {
            if current.host_user_id != user_id {
                return Err(CancelError::Forbidden);
            }
        }

        let outcome =
            lifecycle::cancel(tx.as_mut(), &mut outbox, &current, reason, None, now).await?;
        tx.commit().await?;
        Ok((outcome, outbox))
    }

    /// Host-only soft delete. A live group buy is cancelled in the same unit.
    pub async fn soft_delete_group_buy(
        &self,
        group_buy_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<GroupBuy, CancelError> {
        let (group_buy, outbox) = self
            .config
            .retry
            .run("soft_delete_group_buy", || {
                self.soft_delete_unit(group_buy_id, acting_user_id)
            })
            .await?;
        self.flush(outbox).await;
        Ok(group_buy)
    }

    async fn soft_delete_unit(
        &self,
        group_buy_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<(GroupBuy, Outbox), CancelError> {
        let now = self.now();
        let mut outbox = Outbox::new();
        let mut tx = self.store.begin().await?;

        let current = tx
            .lock_group_buy(group_buy_id)
            .await?
            .ok_or(CancelError::NotFound)?;

        if current.host_user_id != acting_user_id {
            return Err(CancelError::Forbidden);
        }
        if current.is_deleted() {
            return Ok((current, outbox));
        }

        if current.status.is_terminal() {
            let mut next = current.next_revision(now);
            next.deleted_at = Some(now);
            tx.update_group_buy(&next, current.version).await?;
        } else {
            lifecycle::cancel(
                tx.as_mut(),
                &mut outbox,
                &current,
                Some("deleted by host"),
                Some(now),
                now,
            )
            .await?;
        }

        let deleted = tx
            .lock_group_buy(group_buy_id)
            .await?
            .ok_or(CancelError::NotFound)?;
        tx.commit().await?;

        info!(group_buy_id = %group_buy_id, status = %deleted.status, "Group buy soft-deleted");
        Ok((deleted, outbox))
    }

    // ------------------------------------------------------------------
    // Reviews
    // ------------------------------------------------------------------

    pub async fn submit_review(
        &self,
        group_buy_id: Uuid,
        reviewer_id: Uuid,
        request: &SubmitReviewRequest,
    ) -> Result<SubmitReviewResponse, ReviewError> {
        request
            .validate()
            .map_err(|e| ReviewError::Validation(e.to_string()))?;

        let (response, outbox) = self
            .config
            .retry
            .run("submit_review", || {
                self.review_unit(group_buy_id, reviewer_id, request)
            })
            .await?;

        info!(
            group_buy_id = %group_buy_id,
            reviewer_id = %reviewer_id,
            host_user_id = %response.host_user_id,
            rating = request.rating,
            "Review submitted"
        );
        self.flush(outbox).await;
        Ok(response)
    }

    async fn review_unit(
        &self,
        group_buy_id: Uuid,
        reviewer_id: Uuid,
        request: &SubmitReviewRequest,
    ) -> Result<(SubmitReviewResponse, Outbox), ReviewError> {
        let now = self.now();
        let mut outbox = Outbox::new();
        let mut tx = self.store.begin().await?;

        let group_buy = tx
            .lock_group_buy(group_buy_id)
            .await?
            .ok_or(ReviewError::NotFound)?;

        if group_buy.status != GroupBuyStatus::Completed {
            return Err(ReviewError::NotCompleted(group_buy.status));
        }
        if tx
            .active_participation(group_buy_id, reviewer_id)
            .await?
            .is_none()
        {
            return Err(ReviewError::NotParticipant);
        }
        if tx.find_review(group_buy_id, reviewer_id).await?.is_some() {
            return Err(ReviewError::DuplicateReview);
        }

        let review = Review {
            id: Uuid::new_v4(),
            group_buy_id,
            reviewer_id,
            host_user_id: group_buy.host_user_id,
            rating: request.rating,
            content: request.content.trim().to_string(),
            created_at: now,
        };
        match tx.insert_review(&review).await {
            Err(StoreError::Duplicate(_)) => return Err(ReviewError::DuplicateReview),
            other => other?,
        }

        let (host_reputation, _) = self
            .dispatcher
            .on_review_submitted(
                tx.as_mut(),
                &mut outbox,
                reviewer_id,
                group_buy.host_user_id,
                request.rating,
                now,
            )
            .await?;

        outbox.push(
            group_buy.host_user_id,
            NotificationEvent::ReviewReceived {
                group_buy_id,
                review_id: review.id,
                rating: review.rating,
            },
        );

        tx.commit().await?;
        Ok((
            SubmitReviewResponse {
                review_id: review.id,
                host_user_id: group_buy.host_user_id,
                host_reputation: host_reputation.value(),
            },
            outbox,
        ))
    }

    /// Re-evaluate a user's badges outside any review, e.g. to finish an interrupted award.
    pub async fn reevaluate_badges(&self, user_id: Uuid) -> Result<Vec<BadgeType>, StoreError> {
        let (awarded, outbox) = self
            .config
            .retry
            .run("award_badges", move || async move {
                let now = self.now();
                let mut outbox = Outbox::new();
                let mut tx = self.store.begin().await?;
                tx.lock_user(user_id).await?;
                let awarded = self
                    .dispatcher
                    .award_badges(tx.as_mut(), &mut outbox, user_id, now)
                    .await?;
                tx.commit().await?;
                Ok::<_, StoreError>((awarded, outbox))
            })
            .await?;
        self.flush(outbox).await;
        Ok(awarded)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    /// Direct lookup; soft-deleted rows still resolve.
    pub async fn get_group_buy(&self, group_buy_id: Uuid) -> Result<Option<GroupBuy>, StoreError> {
        self.store.find_group_buy(group_buy_id).await
    }

    pub async fn list_open_group_buys(
        &self,
        after: Option<Cursor>,
        limit: u32,
    ) -> Result<GroupBuyPage, StoreError> {
        let items = self.store.list_open_group_buys(after, limit).await?;
        let next_cursor = if items.len() == limit as usize {
            items.last().map(|gb| Cursor::new(gb.created_at, gb.id))
        } else {
            None
        };
        Ok(GroupBuyPage { items, next_cursor })
    }

    pub async fn participants(&self, group_buy_id: Uuid) -> Result<Vec<Participation>, StoreError> {
        self.store.participations(group_buy_id).await
    }

    pub async fn reviews(&self, group_buy_id: Uuid) -> Result<Vec<Review>, StoreError> {
        self.store.reviews_for(group_buy_id).await
    }

    pub async fn point_balance(&self, user_id: Uuid) -> Result<i64, StoreError> {
        self.store.point_balance(user_id).await
    }

    pub async fn point_history(&self, user_id: Uuid) -> Result<Vec<PointHistory>, StoreError> {
        self.store.point_history(user_id).await
    }

    pub async fn badges(&self, user_id: Uuid) -> Result<Vec<Badge>, StoreError> {
        self.store.badges(user_id).await
    }

    pub async fn reputation(&self, user_id: Uuid) -> Result<ReputationScore, StoreError> {
        self.store.reputation(user_id).await
    }

    pub async fn is_settled(&self, group_buy_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        self.store.is_settled(group_buy_id, user_id).await
    }
}
