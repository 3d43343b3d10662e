//! Participation domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One user's membership in one group buy.
///
/// Rows are never removed; leaving or cancellation flips `active` off and stamps `left_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Participation {
    pub id: Uuid,
    pub group_buy_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl Participation {
    pub fn new(group_buy_id: Uuid, user_id: Uuid, joined_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_buy_id,
            user_id,
            joined_at,
            left_at: None,
            active: true,
        }
    }
}

/// Response after a successful join.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct JoinGroupBuyResponse {
    pub participation_id: Uuid,
    pub group_buy_id: Uuid,
    pub current_headcount: i32,
    pub target_headcount: i32,
    pub status: super::GroupBuyStatus,
}

/// Participant entry for listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ParticipantSummary {
    pub participation_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl From<Participation> for ParticipantSummary {
    fn from(p: Participation) -> Self {
        Self {
            participation_id: p.id,
            user_id: p.user_id,
            joined_at: p.joined_at,
            left_at: p.left_at,
            active: p.active,
        }
    }
}

/// Response for listing participants.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ListParticipantsResponse {
    pub data: Vec<ParticipantSummary>,
    pub active_count: usize,
}
