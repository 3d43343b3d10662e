//! Badge and user profile entities.

use chrono::{DateTime, Utc};
use domain::models::{Badge, BadgeType, ReputationScore, UserProfile};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the badges table.
#[derive(Debug, Clone, FromRow)]
pub struct BadgeEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub badge_type: String,
    pub acquired_at: DateTime<Utc>,
}

impl TryFrom<BadgeEntity> for Badge {
    type Error = String;

    fn try_from(entity: BadgeEntity) -> Result<Self, Self::Error> {
        let badge_type: BadgeType = entity.badge_type.parse()?;
        Ok(Self {
            id: entity.id,
            user_id: entity.user_id,
            badge_type,
            acquired_at: entity.acquired_at,
        })
    }
}

/// Database row mapping for the user_profiles table.
#[derive(Debug, Clone, FromRow)]
pub struct UserProfileEntity {
    pub user_id: Uuid,
    pub reputation: f64,
}

impl From<UserProfileEntity> for UserProfile {
    fn from(entity: UserProfileEntity) -> Self {
        Self {
            user_id: entity.user_id,
            reputation: ReputationScore::new(entity.reputation),
        }
    }
}

/// Aggregated counts used for badge evaluation.
#[derive(Debug, Clone, FromRow)]
pub struct UserActivityEntity {
    pub hosted_completed: i64,
    pub participated_completed: i64,
    pub reviews_written: i64,
    pub reputation: Option<f64>,
}

impl From<UserActivityEntity> for domain::models::UserActivity {
    fn from(entity: UserActivityEntity) -> Self {
        Self {
            hosted_completed: entity.hosted_completed,
            participated_completed: entity.participated_completed,
            reviews_written: entity.reviews_written,
            reputation: entity
                .reputation
                .map(ReputationScore::new)
                .unwrap_or_default(),
        }
    }
}
