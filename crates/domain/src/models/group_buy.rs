//! Group-buy domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use shared::validation::validate_not_blank;

/// Lifecycle status of a group buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupBuyStatus {
    Recruiting,
    Confirmed,
    Completed,
    Expired,
    Cancelled,
}

impl GroupBuyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBuyStatus::Recruiting => "RECRUITING",
            GroupBuyStatus::Confirmed => "CONFIRMED",
            GroupBuyStatus::Completed => "COMPLETED",
            GroupBuyStatus::Expired => "EXPIRED",
            GroupBuyStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GroupBuyStatus::Completed | GroupBuyStatus::Expired | GroupBuyStatus::Cancelled
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: GroupBuyStatus) -> bool {
        use GroupBuyStatus::*;
        matches!(
            (self, next),
            (Recruiting, Confirmed)
                | (Recruiting, Expired)
                | (Recruiting, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
        )
    }
}

impl FromStr for GroupBuyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RECRUITING" => Ok(GroupBuyStatus::Recruiting),
            "CONFIRMED" => Ok(GroupBuyStatus::Confirmed),
            "COMPLETED" => Ok(GroupBuyStatus::Completed),
            "EXPIRED" => Ok(GroupBuyStatus::Expired),
            "CANCELLED" => Ok(GroupBuyStatus::Cancelled),
            _ => Err(format!("Invalid group buy status: {}", s)),
        }
    }
}

impl fmt::Display for GroupBuyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One hosted purchase campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupBuy {
    pub id: Uuid,
    pub host_user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub target_headcount: i32,
    pub current_headcount: i32,
    /// Points charged to each participant on join, refunded on leave or cancellation.
    pub point_cost: i64,
    pub deadline: DateTime<Utc>,
    pub status: GroupBuyStatus,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupBuy {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_full(&self) -> bool {
        self.current_headcount >= self.target_headcount
    }

    pub fn remaining_slots(&self) -> i32 {
        (self.target_headcount - self.current_headcount).max(0)
    }

    /// A join landing exactly on the deadline is already too late.
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Copy of `self` carrying the next version and the given timestamp.
    pub fn next_revision(&self, now: DateTime<Utc>) -> GroupBuy {
        GroupBuy {
            version: self.version + 1,
            updated_at: now,
            ..self.clone()
        }
    }
}

/// Request payload for hosting a group buy.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateGroupBuyRequest {
    #[validate(
        length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    #[validate(range(
        min = 2,
        max = 100,
        message = "Target headcount must be between 2 and 100"
    ))]
    pub target_headcount: i32,

    #[validate(range(min = 0, max = 1_000_000, message = "Point cost must be between 0 and 1000000"))]
    #[serde(default)]
    pub point_cost: i64,

    pub deadline: DateTime<Utc>,
}

/// Query parameters for listing open group buys.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct ListGroupBuysQuery {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

/// Response for a single group buy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupBuyResponse {
    pub id: Uuid,
    pub host_user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub target_headcount: i32,
    pub current_headcount: i32,
    pub remaining_slots: i32,
    pub point_cost: i64,
    pub deadline: DateTime<Utc>,
    pub status: GroupBuyStatus,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GroupBuy> for GroupBuyResponse {
    fn from(gb: GroupBuy) -> Self {
        Self {
            remaining_slots: gb.remaining_slots(),
            deleted: gb.is_deleted(),
            id: gb.id,
            host_user_id: gb.host_user_id,
            title: gb.title,
            description: gb.description,
            target_headcount: gb.target_headcount,
            current_headcount: gb.current_headcount,
            point_cost: gb.point_cost,
            deadline: gb.deadline,
            status: gb.status,
            created_at: gb.created_at,
            updated_at: gb.updated_at,
        }
    }
}

/// Response for listing group buys.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ListGroupBuysResponse {
    pub data: Vec<GroupBuyResponse>,
    pub next_cursor: Option<String>,
}
