//! Group-buy lifecycle state machine.
//!
//! ```text
//! RECRUITING ──(target met)──▶ CONFIRMED ──(host / auto)──▶ COMPLETED
//!     │                            │
//!     ├──(deadline)──▶ EXPIRED     └──────────▶ CANCELLED
//!     └────────────────────────────────────────▶ CANCELLED
//! ```
//!
//! Every transition is applied to a row already locked by the caller's unit
//! of work and written with a version-checked update. Applying a transition
//! to a terminal row is a no-op reported as [`TransitionOutcome::AlreadyTerminal`].

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::notification::{NotificationEvent, Outbox};
use crate::models::{GroupBuy, GroupBuyStatus, PointHistory};
use crate::store::{LedgerTx, StoreError};

/// Result of applying a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Applied,
    AlreadyTerminal(GroupBuyStatus),
}

/// Produce the next revision of `current` in status `to`, if the lifecycle allows it.
pub fn transition(
    current: &GroupBuy,
    to: GroupBuyStatus,
    now: DateTime<Utc>,
) -> Result<GroupBuy, GroupBuyStatus> {
    if !current.status.can_transition_to(to) {
        return Err(current.status);
    }
    let mut next = current.next_revision(now);
    next.status = to;
    Ok(next)
}

/// Flip a RECRUITING revision to CONFIRMED once its headcount reaches the target.
///
/// Called on the revision being written by a join so that the status change
/// lands in the same version-checked update as the increment.
pub fn confirm_if_full(next: &mut GroupBuy) -> bool {
    if next.status == GroupBuyStatus::Recruiting && next.is_full() {
        next.status = GroupBuyStatus::Confirmed;
        return true;
    }
    false
}

pub(crate) fn record_transition(group_buy: &GroupBuy) {
    counter!("group_buy_transitions_total", "to" => group_buy.status.as_str()).increment(1);
    info!(
        group_buy_id = %group_buy.id,
        status = %group_buy.status,
        version = group_buy.version,
        "Group buy transitioned"
    );
}

/// Queue `event` for the host and every active participant.
pub(crate) async fn notify_members(
    tx: &mut dyn LedgerTx,
    outbox: &mut Outbox,
    group_buy: &GroupBuy,
    event: NotificationEvent,
) -> Result<(), StoreError> {
    outbox.push(group_buy.host_user_id, event.clone());
    for participation in tx.active_participants(group_buy.id).await? {
        outbox.push(participation.user_id, event.clone());
    }
    Ok(())
}

/// RECRUITING → EXPIRED for a row whose deadline has passed.
///
/// Re-checks status and deadline under the row lock, so repeated or late
/// sweeps are harmless. Participations stay active and nothing is refunded.
pub async fn expire(
    tx: &mut dyn LedgerTx,
    outbox: &mut Outbox,
    group_buy_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let Some(current) = tx.lock_group_buy(group_buy_id).await? else {
        return Ok(false);
    };
    if current.status != GroupBuyStatus::Recruiting || !current.deadline_passed(now) {
        return Ok(false);
    }

    let Ok(next) = transition(&current, GroupBuyStatus::Expired, now) else {
        return Ok(false);
    };
    tx.update_group_buy(&next, current.version).await?;
    record_transition(&next);

    notify_members(
        tx,
        outbox,
        &next,
        NotificationEvent::GroupBuyExpired { group_buy_id },
    )
    .await?;
    Ok(true)
}

/// Cancel a locked row: deactivate every participation, refund pre-charged
/// points, zero the headcount.
///
/// `deleted_at` is stamped onto the same revision when the cancellation comes
/// from a soft delete.
pub async fn cancel(
    tx: &mut dyn LedgerTx,
    outbox: &mut Outbox,
    current: &GroupBuy,
    reason: Option<&str>,
    deleted_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, StoreError> {
    let mut next = match transition(current, GroupBuyStatus::Cancelled, now) {
        Ok(next) => next,
        Err(status) => return Ok(TransitionOutcome::AlreadyTerminal(status)),
    };

    let mut participants = tx.active_participants(current.id).await?;
    participants.sort_by_key(|p| p.user_id);

    for participation in &participants {
        tx.deactivate_participation(participation.id, now).await?;

        if current.point_cost > 0 {
            tx.lock_user(participation.user_id).await?;
            tx.append_point(&PointHistory::earn(
                participation.user_id,
                current.point_cost,
                format!("Refund: {} was cancelled", current.title),
                Some(current.id),
                now,
            ))
            .await?;
            outbox.push(
                participation.user_id,
                NotificationEvent::PointsRefunded {
                    group_buy_id: current.id,
                    amount: current.point_cost,
                },
            );
        }
    }

    next.current_headcount = 0;
    if deleted_at.is_some() {
        next.deleted_at = deleted_at;
    }
    tx.update_group_buy(&next, current.version).await?;
    record_transition(&next);

    let event = NotificationEvent::GroupBuyCancelled {
        group_buy_id: current.id,
        previous_status: current.status,
        reason: reason.map(str::to_string),
    };
    outbox.push(current.host_user_id, event.clone());
    for participation in &participants {
        outbox.push(participation.user_id, event.clone());
    }

    Ok(TransitionOutcome::Applied)
}

/// CONFIRMED → COMPLETED. Settlement is the caller's next step in the same unit.
pub async fn complete(
    tx: &mut dyn LedgerTx,
    outbox: &mut Outbox,
    current: &GroupBuy,
    now: DateTime<Utc>,
) -> Result<Result<GroupBuy, GroupBuyStatus>, StoreError> {
    let next = match transition(current, GroupBuyStatus::Completed, now) {
        Ok(next) => next,
        Err(status) => return Ok(Err(status)),
    };
    tx.update_group_buy(&next, current.version).await?;
    record_transition(&next);

    notify_members(
        tx,
        outbox,
        &next,
        NotificationEvent::GroupBuyCompleted {
            group_buy_id: next.id,
        },
    )
    .await?;
    Ok(Ok(next))
}
