//! Notification repository for database operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::metrics::QueryTimer;

/// Repository for persisted user notifications.
#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        user_id: Uuid,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Uuid, sqlx::Error> {
        let timer = QueryTimer::new("insert_notification");
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO notifications (user_id, event_type, payload)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(event_type)
        .bind(payload)
        .fetch_one(&self.pool)
        .await;
        timer.finish(&result);
        result
    }
}
