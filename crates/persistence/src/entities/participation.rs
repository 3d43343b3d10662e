//! Participation entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::Participation;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the participations table.
#[derive(Debug, Clone, FromRow)]
pub struct ParticipationEntity {
    pub id: Uuid,
    pub group_buy_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl From<ParticipationEntity> for Participation {
    fn from(entity: ParticipationEntity) -> Self {
        Self {
            id: entity.id,
            group_buy_id: entity.group_buy_id,
            user_id: entity.user_id,
            joined_at: entity.joined_at,
            left_at: entity.left_at,
            active: entity.active,
        }
    }
}
