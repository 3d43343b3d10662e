//! Review models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use shared::validation::validate_printable;

/// A participant's review of the host of a completed group buy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Review {
    pub id: Uuid,
    pub group_buy_id: Uuid,
    pub reviewer_id: Uuid,
    pub host_user_id: Uuid,
    pub rating: i16,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Request payload for submitting a review.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct SubmitReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,

    #[validate(
        length(max = 1000, message = "Content must be at most 1000 characters"),
        custom(function = "validate_printable")
    )]
    #[serde(default)]
    pub content: String,
}

/// Response after submitting a review.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SubmitReviewResponse {
    pub review_id: Uuid,
    pub host_user_id: Uuid,
    pub host_reputation: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        let ok = SubmitReviewRequest {
            rating: 5,
            content: "Smooth pickup".to_string(),
        };
        assert!(ok.validate().is_ok());

        let zero = SubmitReviewRequest {
            rating: 0,
            content: String::new(),
        };
        assert!(zero.validate().is_err());

        let six = SubmitReviewRequest {
            rating: 6,
            content: String::new(),
        };
        assert!(six.validate().is_err());
    }

    #[test]
    fn test_content_length() {
        let long = SubmitReviewRequest {
            rating: 3,
            content: "x".repeat(1001),
        };
        assert!(long.validate().is_err());
    }
}
