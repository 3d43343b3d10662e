//! Point ledger models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Direction of a point ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointType {
    Earn,
    Use,
}

impl PointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointType::Earn => "EARN",
            PointType::Use => "USE",
        }
    }
}

impl FromStr for PointType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "EARN" => Ok(PointType::Earn),
            "USE" => Ok(PointType::Use),
            _ => Err(format!("Invalid point type: {}", s)),
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only ledger entry. A user's balance is the running sum of `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PointHistory {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Positive for earnings, negative for spending.
    pub amount: i64,
    pub description: String,
    pub point_type: PointType,
    pub group_buy_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl PointHistory {
    /// Credit `amount` points (must be positive).
    pub fn earn(
        user_id: Uuid,
        amount: i64,
        description: impl Into<String>,
        group_buy_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Self {
        debug_assert!(amount > 0);
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount: amount.abs(),
            description: description.into(),
            point_type: PointType::Earn,
            group_buy_id,
            created_at: at,
        }
    }

    /// Debit `amount` points (given as a positive number, stored negative).
    pub fn spend(
        user_id: Uuid,
        amount: i64,
        description: impl Into<String>,
        group_buy_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Self {
        debug_assert!(amount > 0);
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount: -amount.abs(),
            description: description.into(),
            point_type: PointType::Use,
            group_buy_id,
            created_at: at,
        }
    }
}

/// Sum a slice of ledger entries into a balance.
pub fn balance_of(entries: &[PointHistory]) -> i64 {
    entries.iter().map(|e| e.amount).sum()
}

/// Response for a user's point history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PointHistoryResponse {
    pub balance: i64,
    pub data: Vec<PointHistory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earn_and_spend_signs() {
        let user = Uuid::new_v4();
        let now = Utc::now();
        let earn = PointHistory::earn(user, 100, "Completed group buy", None, now);
        let spend = PointHistory::spend(user, 30, "Joined group buy", None, now);

        assert_eq!(earn.amount, 100);
        assert_eq!(earn.point_type, PointType::Earn);
        assert_eq!(spend.amount, -30);
        assert_eq!(spend.point_type, PointType::Use);
        assert_eq!(balance_of(&[earn, spend]), 70);
    }

    #[test]
    fn test_point_type_parse() {
        assert_eq!("earn".parse::<PointType>().unwrap(), PointType::Earn);
        assert_eq!("USE".parse::<PointType>().unwrap(), PointType::Use);
        assert!("refund".parse::<PointType>().is_err());
    }

    #[test]
    fn test_point_type_serialization() {
        let json = serde_json::to_string(&PointType::Use).unwrap();
        assert_eq!(json, "\"USE\"");
    }
}
