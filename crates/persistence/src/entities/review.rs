//! Review entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::Review;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the reviews table.
#[derive(Debug, Clone, FromRow)]
pub struct ReviewEntity {
    pub id: Uuid,
    pub group_buy_id: Uuid,
    pub reviewer_id: Uuid,
    pub host_user_id: Uuid,
    pub rating: i16,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<ReviewEntity> for Review {
    fn from(entity: ReviewEntity) -> Self {
        Self {
            id: entity.id,
            group_buy_id: entity.group_buy_id,
            reviewer_id: entity.reviewer_id,
            host_user_id: entity.host_user_id,
            rating: entity.rating,
            content: entity.content,
            created_at: entity.created_at,
        }
    }
}
