//! Read-side queries for points, reputation, badges and reviews.

use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{BadgeEntity, PointHistoryEntity, ReviewEntity};
use crate::metrics::QueryTimer;

/// Repository for reward ledger queries.
#[derive(Clone)]
pub struct RewardRepository {
    pool: PgPool,
}

impl RewardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ledger entries for a user, oldest first.
    pub async fn point_history(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PointHistoryEntity>, sqlx::Error> {
        let timer = QueryTimer::new("point_history_for_user");
        let result = sqlx::query_as::<_, PointHistoryEntity>(
            r#"
            SELECT id, user_id, amount, description, point_type, group_buy_id, created_at
            FROM point_history
            WHERE user_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(&result);
        result
    }

    pub async fn point_balance(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("point_balance");
        let result = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM point_history WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await;
        timer.finish(&result);
        result
    }

    /// Stored reputation, `None` for users the engine never touched.
    pub async fn reputation(&self, user_id: Uuid) -> Result<Option<f64>, sqlx::Error> {
        sqlx::query_scalar::<_, f64>("SELECT reputation FROM user_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn badges(&self, user_id: Uuid) -> Result<Vec<BadgeEntity>, sqlx::Error> {
        let timer = QueryTimer::new("badges_for_user");
        let result = sqlx::query_as::<_, BadgeEntity>(
            r#"
            SELECT id, user_id, badge_type, acquired_at
            FROM badges
            WHERE user_id = $1
            ORDER BY acquired_at ASC, badge_type ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(&result);
        result
    }

    pub async fn reviews_for(&self, group_buy_id: Uuid) -> Result<Vec<ReviewEntity>, sqlx::Error> {
        let timer = QueryTimer::new("reviews_for_group_buy");
        let result = sqlx::query_as::<_, ReviewEntity>(
            r#"
            SELECT id, group_buy_id, reviewer_id, host_user_id, rating, content, created_at
            FROM reviews
            WHERE group_buy_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(group_buy_id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(&result);
        result
    }

    pub async fn is_settled(&self, group_buy_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM settlement_markers WHERE group_buy_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(group_buy_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }
}
