//! Group buy entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{GroupBuy, GroupBuyStatus};
use sqlx::FromRow;
use uuid::Uuid;

/// Column list shared by every query that maps into [`GroupBuyEntity`].
pub const GROUP_BUY_COLUMNS: &str = "id, host_user_id, title, description, target_headcount, \
     current_headcount, point_cost, deadline, status, deleted_at, version, created_at, updated_at";

/// Database row mapping for the group_buys table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupBuyEntity {
    pub id: Uuid,
    pub host_user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub target_headcount: i32,
    pub current_headcount: i32,
    pub point_cost: i64,
    pub deadline: DateTime<Utc>,
    pub status: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<GroupBuyEntity> for GroupBuy {
    type Error = String;

    fn try_from(entity: GroupBuyEntity) -> Result<Self, Self::Error> {
        let status: GroupBuyStatus = entity.status.parse()?;
        Ok(Self {
            id: entity.id,
            host_user_id: entity.host_user_id,
            title: entity.title,
            description: entity.description,
            target_headcount: entity.target_headcount,
            current_headcount: entity.current_headcount,
            point_cost: entity.point_cost,
            deadline: entity.deadline,
            status,
            deleted_at: entity.deleted_at,
            version: entity.version,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}
