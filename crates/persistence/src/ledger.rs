//! PostgreSQL implementation of the ledger store.
//!
//! Every unit of work is one database transaction. Group buys are locked with
//! `SELECT ... FOR UPDATE` and written back with a version check, so a lost
//! race surfaces as [`StoreError::Conflict`] and the engine retries the unit.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{
    Badge, BadgeType, GroupBuy, Participation, PointHistory, ReputationScore, Review,
    UserActivity, UserProfile,
};
use domain::store::{LedgerStore, LedgerTx, StoreError};
use shared::pagination::Cursor;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{
    GroupBuyEntity, ParticipationEntity, ReviewEntity, UserActivityEntity, UserProfileEntity,
    GROUP_BUY_COLUMNS,
};
use crate::metrics::record_commit;
use crate::repositories::{GroupBuyRepository, RewardRepository};

/// Map a driver error onto the store's retry classification.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Transient(err.to_string()),
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // serialization_failure, deadlock_detected, lock_not_available
            Some("40001") | Some("40P01") | Some("55P03") => {
                StoreError::Transient(db_err.message().to_string())
            }
            Some("23505") => {
                StoreError::Duplicate(db_err.constraint().unwrap_or("unique").to_string())
            }
            _ => StoreError::Backend(db_err.to_string()),
        },
        _ => StoreError::Backend(err.to_string()),
    }
}

fn to_model<E, M>(entity: E) -> Result<M, StoreError>
where
    M: TryFrom<E, Error = String>,
{
    M::try_from(entity).map_err(StoreError::Backend)
}

/// Ledger store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    group_buys: GroupBuyRepository,
    rewards: RewardRepository,
    lock_timeout: Option<Duration>,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            group_buys: GroupBuyRepository::new(pool.clone()),
            rewards: RewardRepository::new(pool.clone()),
            pool,
            lock_timeout: None,
        }
    }

    /// Bound how long a transaction waits for a row lock before failing transiently.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        if let Some(timeout) = self.lock_timeout {
            // SET LOCAL does not take bind parameters.
            let stmt = format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis());
            sqlx::query(&stmt)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn find_group_buy(&self, id: Uuid) -> Result<Option<GroupBuy>, StoreError> {
        self.group_buys
            .find_by_id(id)
            .await
            .map_err(map_sqlx_error)?
            .map(to_model::<_, GroupBuy>)
            .transpose()
    }

    async fn list_open_group_buys(
        &self,
        after: Option<Cursor>,
        limit: u32,
    ) -> Result<Vec<GroupBuy>, StoreError> {
        self.group_buys
            .list_open(after, limit)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(to_model::<_, GroupBuy>)
            .collect()
    }

    async fn expirable_group_buys(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Uuid>, StoreError> {
        self.group_buys
            .expirable_ids(now, limit)
            .await
            .map_err(map_sqlx_error)
    }

    async fn confirmed_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Uuid>, StoreError> {
        self.group_buys
            .confirmed_before(cutoff, limit)
            .await
            .map_err(map_sqlx_error)
    }

    async fn participations(&self, group_buy_id: Uuid) -> Result<Vec<Participation>, StoreError> {
        Ok(self
            .group_buys
            .participations(group_buy_id)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(Participation::from)
            .collect())
    }

    async fn point_history(&self, user_id: Uuid) -> Result<Vec<PointHistory>, StoreError> {
        self.rewards
            .point_history(user_id)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(to_model::<_, PointHistory>)
            .collect()
    }

    async fn point_balance(&self, user_id: Uuid) -> Result<i64, StoreError> {
        self.rewards
            .point_balance(user_id)
            .await
            .map_err(map_sqlx_error)
    }

    async fn badges(&self, user_id: Uuid) -> Result<Vec<Badge>, StoreError> {
        self.rewards
            .badges(user_id)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(to_model::<_, Badge>)
            .collect()
    }

    async fn reputation(&self, user_id: Uuid) -> Result<ReputationScore, StoreError> {
        Ok(self
            .rewards
            .reputation(user_id)
            .await
            .map_err(map_sqlx_error)?
            .map(ReputationScore::new)
            .unwrap_or_default())
    }

    async fn reviews_for(&self, group_buy_id: Uuid) -> Result<Vec<Review>, StoreError> {
        Ok(self
            .rewards
            .reviews_for(group_buy_id)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(Review::from)
            .collect())
    }

    async fn is_settled(&self, group_buy_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        self.rewards
            .is_settled(group_buy_id, user_id)
            .await
            .map_err(map_sqlx_error)
    }
}

/// One PostgreSQL transaction. Dropping it rolls back.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_group_buy(&mut self, id: Uuid) -> Result<Option<GroupBuy>, StoreError> {
        let sql = format!(
            "SELECT {} FROM group_buys WHERE id = $1 FOR UPDATE",
            GROUP_BUY_COLUMNS
        );
        sqlx::query_as::<_, GroupBuyEntity>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?
            .map(to_model::<_, GroupBuy>)
            .transpose()
    }

    async fn insert_group_buy(&mut self, gb: &GroupBuy) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO group_buys (
                id, host_user_id, title, description, target_headcount, current_headcount,
                point_cost, deadline, status, deleted_at, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(gb.id)
        .bind(gb.host_user_id)
        .bind(&gb.title)
        .bind(&gb.description)
        .bind(gb.target_headcount)
        .bind(gb.current_headcount)
        .bind(gb.point_cost)
        .bind(gb.deadline)
        .bind(gb.status.as_str())
        .bind(gb.deleted_at)
        .bind(gb.version)
        .bind(gb.created_at)
        .bind(gb.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_group_buy(
        &mut self,
        next: &GroupBuy,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE group_buys
            SET title = $3,
                description = $4,
                current_headcount = $5,
                status = $6,
                deleted_at = $7,
                version = $8,
                updated_at = $9
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(next.id)
        .bind(expected_version)
        .bind(&next.title)
        .bind(&next.description)
        .bind(next.current_headcount)
        .bind(next.status.as_str())
        .bind(next.deleted_at)
        .bind(next.version)
        .bind(next.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            debug!(group_buy_id = %next.id, expected_version, "Version check failed");
            return Err(StoreError::Conflict(format!("group_buy {}", next.id)));
        }
        Ok(())
    }

    async fn active_participation(
        &mut self,
        group_buy_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Participation>, StoreError> {
        Ok(sqlx::query_as::<_, ParticipationEntity>(
            r#"
            SELECT id, group_buy_id, user_id, joined_at, left_at, active
            FROM participations
            WHERE group_buy_id = $1 AND user_id = $2 AND active
            "#,
        )
        .bind(group_buy_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .map(Participation::from))
    }

    async fn active_participants(
        &mut self,
        group_buy_id: Uuid,
    ) -> Result<Vec<Participation>, StoreError> {
        Ok(sqlx::query_as::<_, ParticipationEntity>(
            r#"
            SELECT id, group_buy_id, user_id, joined_at, left_at, active
            FROM participations
            WHERE group_buy_id = $1 AND active
            ORDER BY user_id ASC
            "#,
        )
        .bind(group_buy_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .into_iter()
        .map(Participation::from)
        .collect())
    }

    async fn insert_participation(&mut self, p: &Participation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO participations (id, group_buy_id, user_id, joined_at, left_at, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(p.id)
        .bind(p.group_buy_id)
        .bind(p.user_id)
        .bind(p.joined_at)
        .bind(p.left_at)
        .bind(p.active)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn deactivate_participation(
        &mut self,
        participation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE participations SET active = FALSE, left_at = $2 WHERE id = $1 AND active",
        )
        .bind(participation_id)
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<UserProfile, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, reputation)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(ReputationScore::DEFAULT)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query_as::<_, UserProfileEntity>(
            "SELECT user_id, reputation FROM user_profiles WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await
        .map(UserProfile::from)
        .map_err(map_sqlx_error)
    }

    async fn set_reputation(
        &mut self,
        user_id: Uuid,
        score: ReputationScore,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, reputation)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET reputation = EXCLUDED.reputation, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(score.value())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn point_balance(&mut self, user_id: Uuid) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM point_history WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn append_point(&mut self, entry: &PointHistory) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO point_history (id, user_id, amount, description, point_type, group_buy_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.amount)
        .bind(&entry.description)
        .bind(entry.point_type.as_str())
        .bind(entry.group_buy_id)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn insert_settlement_marker(
        &mut self,
        group_buy_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO settlement_markers (group_buy_id, user_id, settled_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (group_buy_id, user_id) DO NOTHING
            "#,
        )
        .bind(group_buy_id)
        .bind(user_id)
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn has_badge(&mut self, user_id: Uuid, badge_type: BadgeType) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM badges WHERE user_id = $1 AND badge_type = $2)",
        )
        .bind(user_id)
        .bind(badge_type.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn insert_badge(&mut self, badge: &Badge) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO badges (id, user_id, badge_type, acquired_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, badge_type) DO NOTHING
            "#,
        )
        .bind(badge.id)
        .bind(badge.user_id)
        .bind(badge.badge_type.as_str())
        .bind(badge.acquired_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn user_activity(&mut self, user_id: Uuid) -> Result<UserActivity, StoreError> {
        sqlx::query_as::<_, UserActivityEntity>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM group_buys
                 WHERE host_user_id = $1 AND status = 'COMPLETED') AS hosted_completed,
                (SELECT COUNT(*) FROM participations p
                 JOIN group_buys g ON g.id = p.group_buy_id
                 WHERE p.user_id = $1 AND p.active AND g.status = 'COMPLETED') AS participated_completed,
                (SELECT COUNT(*) FROM reviews WHERE reviewer_id = $1) AS reviews_written,
                (SELECT reputation FROM user_profiles WHERE user_id = $1) AS reputation
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await
        .map(UserActivity::from)
        .map_err(map_sqlx_error)
    }

    async fn find_review(
        &mut self,
        group_buy_id: Uuid,
        reviewer_id: Uuid,
    ) -> Result<Option<Review>, StoreError> {
        Ok(sqlx::query_as::<_, ReviewEntity>(
            r#"
            SELECT id, group_buy_id, reviewer_id, host_user_id, rating, content, created_at
            FROM reviews
            WHERE group_buy_id = $1 AND reviewer_id = $2
            "#,
        )
        .bind(group_buy_id)
        .bind(reviewer_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .map(Review::from))
    }

    async fn insert_review(&mut self, review: &Review) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO reviews (id, group_buy_id, reviewer_id, host_user_id, rating, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.id)
        .bind(review.group_buy_id)
        .bind(review.reviewer_id)
        .bind(review.host_user_id)
        .bind(review.rating)
        .bind(&review.content)
        .bind(review.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let result = self.tx.commit().await;
        record_commit(result.is_ok());
        result.map_err(map_sqlx_error)
    }
}
