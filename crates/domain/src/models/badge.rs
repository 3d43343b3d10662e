//! Badge catalogue and eligibility rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ReputationScore;

/// Finite set of one-time achievements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BadgeType {
    FirstHost,
    TenHosts,
    FirstParticipation,
    TenParticipations,
    FirstReview,
    PopularHost,
}

/// The goal a user must reach to earn a badge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BadgeGoal {
    HostedCompleted(i64),
    ParticipatedCompleted(i64),
    ReviewsWritten(i64),
    ReputationAtLeast(f64),
}

impl BadgeType {
    pub const ALL: [BadgeType; 6] = [
        BadgeType::FirstHost,
        BadgeType::TenHosts,
        BadgeType::FirstParticipation,
        BadgeType::TenParticipations,
        BadgeType::FirstReview,
        BadgeType::PopularHost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeType::FirstHost => "FIRST_HOST",
            BadgeType::TenHosts => "TEN_HOSTS",
            BadgeType::FirstParticipation => "FIRST_PARTICIPATION",
            BadgeType::TenParticipations => "TEN_PARTICIPATIONS",
            BadgeType::FirstReview => "FIRST_REVIEW",
            BadgeType::PopularHost => "POPULAR_HOST",
        }
    }

    pub fn goal(&self) -> BadgeGoal {
        match self {
            BadgeType::FirstHost => BadgeGoal::HostedCompleted(1),
            BadgeType::TenHosts => BadgeGoal::HostedCompleted(10),
            BadgeType::FirstParticipation => BadgeGoal::ParticipatedCompleted(1),
            BadgeType::TenParticipations => BadgeGoal::ParticipatedCompleted(10),
            BadgeType::FirstReview => BadgeGoal::ReviewsWritten(1),
            BadgeType::PopularHost => BadgeGoal::ReputationAtLeast(40.0),
        }
    }

    pub fn is_met_by(&self, activity: &UserActivity) -> bool {
        match self.goal() {
            BadgeGoal::HostedCompleted(n) => activity.hosted_completed >= n,
            BadgeGoal::ParticipatedCompleted(n) => activity.participated_completed >= n,
            BadgeGoal::ReviewsWritten(n) => activity.reviews_written >= n,
            BadgeGoal::ReputationAtLeast(min) => activity.reputation.value() >= min,
        }
    }
}

impl FromStr for BadgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BadgeType::ALL
            .iter()
            .copied()
            .find(|b| b.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid badge type: {}", s))
    }
}

impl fmt::Display for BadgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Accumulated history used to evaluate badge goals.
#[derive(Debug, Clone, PartialEq)]
pub struct UserActivity {
    pub hosted_completed: i64,
    pub participated_completed: i64,
    pub reviews_written: i64,
    pub reputation: ReputationScore,
}

impl UserActivity {
    /// Badges whose goal this history satisfies.
    pub fn eligible_badges(&self) -> Vec<BadgeType> {
        BadgeType::ALL
            .iter()
            .copied()
            .filter(|b| b.is_met_by(self))
            .collect()
    }
}

impl Default for UserActivity {
    fn default() -> Self {
        Self {
            hosted_completed: 0,
            participated_completed: 0,
            reviews_written: 0,
            reputation: ReputationScore::default(),
        }
    }
}

/// One-time achievement record. At most one per `(user_id, badge_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Badge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub badge_type: BadgeType,
    pub acquired_at: DateTime<Utc>,
}

impl Badge {
    pub fn new(user_id: Uuid, badge_type: BadgeType, acquired_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            badge_type,
            acquired_at,
        }
    }
}
