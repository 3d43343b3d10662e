//! Group buy repository for read-side queries.
//!
//! Writes go through `PgLedgerTx` so they share the caller's transaction.

use chrono::{DateTime, Utc};
use shared::pagination::Cursor;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{GroupBuyEntity, GROUP_BUY_COLUMNS};
use crate::metrics::QueryTimer;

/// Repository for group-buy database queries.
#[derive(Clone)]
pub struct GroupBuyRepository {
    pool: PgPool,
}

impl GroupBuyRepository {
    /// Creates a new GroupBuyRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a group buy by ID, soft-deleted rows included.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<GroupBuyEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_group_buy_by_id");
        let sql = format!("SELECT {} FROM group_buys WHERE id = $1", GROUP_BUY_COLUMNS);
        let result = sqlx::query_as::<_, GroupBuyEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        timer.finish(&result);
        result
    }

    /// Recruiting, non-deleted group buys, newest first.
    ///
    /// Keyset pagination on `(created_at, id)`.
    pub async fn list_open(
        &self,
        after: Option<Cursor>,
        limit: u32,
    ) -> Result<Vec<GroupBuyEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_open_group_buys");
        let result = match after {
            Some(cursor) => {
                let sql = format!(
                    r#"
                    SELECT {}
                    FROM group_buys
                    WHERE status = 'RECRUITING' AND deleted_at IS NULL
                      AND (created_at, id) < ($1, $2)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $3
                    "#,
                    GROUP_BUY_COLUMNS
                );
                sqlx::query_as::<_, GroupBuyEntity>(&sql)
                    .bind(cursor.created_at)
                    .bind(cursor.id)
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    r#"
                    SELECT {}
                    FROM group_buys
                    WHERE status = 'RECRUITING' AND deleted_at IS NULL
                    ORDER BY created_at DESC, id DESC
                    LIMIT $1
                    "#,
                    GROUP_BUY_COLUMNS
                );
                sqlx::query_as::<_, GroupBuyEntity>(&sql)
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await
            }
        };
        timer.finish(&result);
        result
    }

    /// IDs of recruiting group buys whose deadline is at or before `now`, oldest deadline first.
    pub async fn expirable_ids(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let timer = QueryTimer::new("expirable_group_buys");
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM group_buys
            WHERE status = 'RECRUITING' AND deadline <= $1
            ORDER BY deadline ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await;
        timer.finish(&result);
        result
    }

    /// IDs of confirmed group buys whose deadline is before `cutoff`.
    pub async fn confirmed_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let timer = QueryTimer::new("confirmed_group_buys_before");
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM group_buys
            WHERE status = 'CONFIRMED' AND deadline < $1
            ORDER BY deadline ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await;
        timer.finish(&result);
        result
    }

    /// All participations of a group buy, oldest first.
    pub async fn participations(
        &self,
        group_buy_id: Uuid,
    ) -> Result<Vec<crate::entities::ParticipationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_participations");
        let result = sqlx::query_as::<_, crate::entities::ParticipationEntity>(
            r#"
            SELECT id, group_buy_id, user_id, joined_at, left_at, active
            FROM participations
            WHERE group_buy_id = $1
            ORDER BY joined_at ASC, id ASC
            "#,
        )
        .bind(group_buy_id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(&result);
        result
    }
}
