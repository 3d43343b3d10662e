//! Point ledger entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{PointHistory, PointType};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the point_history table.
#[derive(Debug, Clone, FromRow)]
pub struct PointHistoryEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub description: String,
    pub point_type: String,
    pub group_buy_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PointHistoryEntity> for PointHistory {
    type Error = String;

    fn try_from(entity: PointHistoryEntity) -> Result<Self, Self::Error> {
        let point_type: PointType = entity.point_type.parse()?;
        Ok(Self {
            id: entity.id,
            user_id: entity.user_id,
            amount: entity.amount,
            description: entity.description,
            point_type,
            group_buy_id: entity.group_buy_id,
            created_at: entity.created_at,
        })
    }
}
