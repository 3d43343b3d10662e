//! Reputation ("manner temperature") score.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounded trust score carried on the user aggregate.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReputationScore(f64);

impl ReputationScore {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 100.0;
    pub const DEFAULT: f64 = 36.5;

    /// Build a score, clamping into `[MIN, MAX]`.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self(Self::DEFAULT);
        }
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Apply a signed adjustment. The result stays within bounds.
    pub fn adjust(self, delta: f64) -> Self {
        Self::new(self.0 + delta)
    }
}

impl Default for ReputationScore {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl fmt::Display for ReputationScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

/// Per-user profile row holding the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UserProfile {
    pub user_id: uuid::Uuid,
    pub reputation: ReputationScore,
}

impl UserProfile {
    pub fn new(user_id: uuid::Uuid) -> Self {
        Self {
            user_id,
            reputation: ReputationScore::default(),
        }
    }
}
