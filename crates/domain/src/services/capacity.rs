//! Capacity controller: admits or rejects joins and leaves for one group buy.
//!
//! Both operations run inside a unit of work that starts by locking the
//! group-buy row. The check and the headcount write are one version-checked
//! update, so two joins racing for the last slot cannot both commit.
//! "Now" is read only once the row lock is held, so a join that waited on
//! the lock past the deadline is judged against the time it actually runs.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::clock::Clock;
use super::lifecycle::{confirm_if_full, notify_members, record_transition};
use super::notification::{NotificationEvent, Outbox};
use crate::error::{JoinError, LeaveError};
use crate::models::{GroupBuy, GroupBuyStatus, Participation, PointHistory};
use crate::store::{LedgerTx, StoreError};

/// A committed-to-be join.
#[derive(Debug, Clone)]
pub struct JoinAccepted {
    pub participation: Participation,
    pub group_buy: GroupBuy,
    /// The join filled the last slot and moved the group buy to CONFIRMED.
    pub confirmed: bool,
}

fn check_joinable(
    group_buy: &GroupBuy,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), JoinError> {
    if group_buy.is_deleted() {
        return Err(JoinError::Deleted);
    }
    if group_buy.status != GroupBuyStatus::Recruiting {
        return Err(JoinError::NotRecruiting(group_buy.status));
    }
    if group_buy.deadline_passed(now) {
        return Err(JoinError::DeadlinePassed);
    }
    if group_buy.host_user_id == user_id {
        return Err(JoinError::HostCannotJoin);
    }
    Ok(())
}

pub async fn try_join(
    tx: &mut dyn LedgerTx,
    outbox: &mut Outbox,
    clock: &dyn Clock,
    group_buy_id: Uuid,
    user_id: Uuid,
) -> Result<JoinAccepted, JoinError> {
    let current = tx
        .lock_group_buy(group_buy_id)
        .await?
        .ok_or(JoinError::NotFound)?;
    let now = clock.now();

    check_joinable(&current, user_id, now)?;

    if tx
        .active_participation(group_buy_id, user_id)
        .await?
        .is_some()
    {
        return Err(JoinError::AlreadyJoined);
    }

    if current.is_full() {
        debug!(
            group_buy_id = %group_buy_id,
            user_id = %user_id,
            current_headcount = current.current_headcount,
            "Join rejected: capacity full"
        );
        return Err(JoinError::CapacityFull);
    }

    if current.point_cost > 0 {
        tx.lock_user(user_id).await?;
        let balance = tx.point_balance(user_id).await?;
        if balance < current.point_cost {
            return Err(JoinError::InsufficientPoints {
                balance,
                required: current.point_cost,
            });
        }
        tx.append_point(&PointHistory::spend(
            user_id,
            current.point_cost,
            format!("Joined group buy: {}", current.title),
            Some(group_buy_id),
            now,
        ))
        .await?;
    }

    let participation = Participation::new(group_buy_id, user_id, now);
    match tx.insert_participation(&participation).await {
        Err(StoreError::Duplicate(_)) => return Err(JoinError::AlreadyJoined),
        other => other?,
    }

    let mut next = current.next_revision(now);
    next.current_headcount += 1;
    let confirmed = confirm_if_full(&mut next);
    tx.update_group_buy(&next, current.version).await?;

    outbox.push(
        next.host_user_id,
        NotificationEvent::ParticipantJoined {
            group_buy_id,
            participant_id: user_id,
            current_headcount: next.current_headcount,
            target_headcount: next.target_headcount,
        },
    );

    if confirmed {
        record_transition(&next);
        notify_members(
            tx,
            outbox,
            &next,
            NotificationEvent::GroupBuyConfirmed { group_buy_id },
        )
        .await?;
    }

    Ok(JoinAccepted {
        participation,
        group_buy: next,
        confirmed,
    })
}

/// Leave a RECRUITING group buy, refunding any pre-charged points.
pub async fn leave(
    tx: &mut dyn LedgerTx,
    outbox: &mut Outbox,
    clock: &dyn Clock,
    group_buy_id: Uuid,
    user_id: Uuid,
) -> Result<GroupBuy, LeaveError> {
    let current = tx
        .lock_group_buy(group_buy_id)
        .await?
        .ok_or(LeaveError::NotFound)?;
    let now = clock.now();

    // Capacity is frozen once the target is met.
    if current.status != GroupBuyStatus::Recruiting {
        return Err(LeaveError::TerminalState(current.status));
    }

    let participation = tx
        .active_participation(group_buy_id, user_id)
        .await?
        .ok_or(LeaveError::NotAParticipant)?;

    tx.deactivate_participation(participation.id, now).await?;

    if current.point_cost > 0 {
        tx.lock_user(user_id).await?;
        tx.append_point(&PointHistory::earn(
            user_id,
            current.point_cost,
            format!("Refund: left {}", current.title),
            Some(group_buy_id),
            now,
        ))
        .await?;
        outbox.push(
            user_id,
            NotificationEvent::PointsRefunded {
                group_buy_id,
                amount: current.point_cost,
            },
        );
    }

    let mut next = current.next_revision(now);
    next.current_headcount -= 1;
    tx.update_group_buy(&next, current.version).await?;

    outbox.push(
        next.host_user_id,
        NotificationEvent::ParticipantLeft {
            group_buy_id,
            participant_id: user_id,
            current_headcount: next.current_headcount,
        },
    );

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::FixedClock;
    use crate::store::{InMemoryLedgerStore, LedgerStore};
    use chrono::Duration;

    async fn seeded(store: &InMemoryLedgerStore, target: i32, cost: i64) -> GroupBuy {
        let now = Utc::now();
        let gb = GroupBuy {
            id: Uuid::new_v4(),
            host_user_id: Uuid::new_v4(),
            title: "Eggs 60ct".to_string(),
            description: None,
            target_headcount: target,
            current_headcount: 0,
            point_cost: cost,
            deadline: now + Duration::hours(1),
            status: GroupBuyStatus::Recruiting,
            deleted_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_group_buy(&gb).await.unwrap();
        tx.commit().await.unwrap();
        gb
    }

    #[tokio::test]
    async fn test_join_fills_and_confirms() {
        let store = InMemoryLedgerStore::new();
        let gb = seeded(&store, 2, 0).await;
        let clock = FixedClock::new(Utc::now());

        let mut tx = store.begin().await.unwrap();
        let mut outbox = Outbox::new();
        let first = try_join(tx.as_mut(), &mut outbox, &clock, gb.id, Uuid::new_v4())
            .await
            .unwrap();
        assert!(!first.confirmed);
        assert_eq!(first.group_buy.current_headcount, 1);

        let second = try_join(tx.as_mut(), &mut outbox, &clock, gb.id, Uuid::new_v4())
            .await
            .unwrap();
        assert!(second.confirmed);
        assert_eq!(second.group_buy.status, GroupBuyStatus::Confirmed);

        let third = try_join(tx.as_mut(), &mut outbox, &clock, gb.id, Uuid::new_v4()).await;
        assert!(matches!(
            third,
            Err(JoinError::NotRecruiting(GroupBuyStatus::Confirmed))
        ));
    }

    #[tokio::test]
    async fn test_join_rejections() {
        let store = InMemoryLedgerStore::new();
        let gb = seeded(&store, 3, 0).await;
        let clock = FixedClock::new(Utc::now());
        let user = Uuid::new_v4();
        let mut outbox = Outbox::new();

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            try_join(tx.as_mut(), &mut outbox, &clock, Uuid::new_v4(), user).await,
            Err(JoinError::NotFound)
        ));
        assert!(matches!(
            try_join(tx.as_mut(), &mut outbox, &clock, gb.id, gb.host_user_id).await,
            Err(JoinError::HostCannotJoin)
        ));
        try_join(tx.as_mut(), &mut outbox, &clock, gb.id, user)
            .await
            .unwrap();
        assert!(matches!(
            try_join(tx.as_mut(), &mut outbox, &clock, gb.id, user).await,
            Err(JoinError::AlreadyJoined)
        ));
        let at_deadline = FixedClock::new(gb.deadline);
        assert!(matches!(
            try_join(tx.as_mut(), &mut outbox, &at_deadline, gb.id, Uuid::new_v4()).await,
            Err(JoinError::DeadlinePassed)
        ));
    }

    #[tokio::test]
    async fn test_join_charges_and_leave_refunds() {
        let store = InMemoryLedgerStore::new();
        let gb = seeded(&store, 3, 50).await;
        let user = Uuid::new_v4();
        let poor = Uuid::new_v4();
        store.grant_points(user, 80, "signup bonus").await;
        store.grant_points(poor, 10, "signup bonus").await;
        let clock = FixedClock::new(Utc::now());
        let mut outbox = Outbox::new();

        let mut tx = store.begin().await.unwrap();
        let err = try_join(tx.as_mut(), &mut outbox, &clock, gb.id, poor)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JoinError::InsufficientPoints {
                balance: 10,
                required: 50
            }
        ));

        try_join(tx.as_mut(), &mut outbox, &clock, gb.id, user)
            .await
            .unwrap();
        assert_eq!(tx.point_balance(user).await.unwrap(), 30);

        let after = leave(tx.as_mut(), &mut outbox, &clock, gb.id, user)
            .await
            .unwrap();
        assert_eq!(after.current_headcount, 0);
        assert_eq!(tx.point_balance(user).await.unwrap(), 80);
    }

    #[tokio::test]
    async fn test_leave_requires_participation() {
        let store = InMemoryLedgerStore::new();
        let gb = seeded(&store, 3, 0).await;
        let clock = FixedClock::new(Utc::now());
        let mut outbox = Outbox::new();

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            leave(tx.as_mut(), &mut outbox, &clock, gb.id, Uuid::new_v4()).await,
            Err(LeaveError::NotAParticipant)
        ));
    }

    #[tokio::test]
    async fn test_leave_after_confirmation_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let gb = seeded(&store, 2, 0).await;
        let clock = FixedClock::new(Utc::now());
        let user = Uuid::new_v4();
        let mut outbox = Outbox::new();

        let mut tx = store.begin().await.unwrap();
        try_join(tx.as_mut(), &mut outbox, &clock, gb.id, user)
            .await
            .unwrap();
        try_join(tx.as_mut(), &mut outbox, &clock, gb.id, Uuid::new_v4())
            .await
            .unwrap();

        assert!(matches!(
            leave(tx.as_mut(), &mut outbox, &clock, gb.id, user).await,
            Err(LeaveError::TerminalState(GroupBuyStatus::Confirmed))
        ));
    }
}
