//! Reward dispatcher: settlement of completed group buys and badge awards.
//!
//! Two idempotency layers keep repeated triggers harmless:
//!
//! 1. A `(group_buy_id, user_id)` settlement marker, written in the same unit
//!    as the reputation and point deltas. A user with a marker is skipped.
//! 2. Badge awards check for an existing `(user_id, badge_type)` row and then
//!    insert with a conflict-ignoring write.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::notification::{NotificationEvent, Outbox};
use crate::models::{Badge, BadgeType, GroupBuy, PointHistory, ReputationScore};
use crate::store::{LedgerTx, StoreError};

/// Reward amounts applied at settlement and on reviews.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardPolicy {
    pub participant_reputation: f64,
    pub participant_points: i64,
    pub host_reputation: f64,
    pub host_points: i64,
    /// Reputation change per rating step away from 3.
    pub review_step: f64,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            participant_reputation: 0.5,
            participant_points: 100,
            host_reputation: 1.0,
            host_points: 200,
            review_step: 0.5,
        }
    }
}

impl RewardPolicy {
    /// A 5-star review adds `2 * review_step`, a 1-star review removes it, 3 is neutral.
    pub fn review_delta(&self, rating: i16) -> f64 {
        f64::from(rating - 3) * self.review_step
    }
}

/// What one settlement run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettlementSummary {
    pub group_buy_id: Uuid,
    /// Users whose deltas were applied by this run.
    pub settled: Vec<Uuid>,
    /// Users already settled by an earlier run.
    pub skipped: Vec<Uuid>,
    pub badges_awarded: Vec<AwardedBadge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AwardedBadge {
    pub user_id: Uuid,
    pub badge_type: BadgeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Host,
    Participant,
}

#[derive(Debug, Clone, Default)]
pub struct RewardDispatcher {
    policy: RewardPolicy,
}

impl RewardDispatcher {
    pub fn new(policy: RewardPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RewardPolicy {
        &self.policy
    }

    /// Settle a COMPLETED group buy for its host and active participants.
    ///
    /// User rows are locked in ascending id order.
    pub async fn on_group_buy_completed(
        &self,
        tx: &mut dyn LedgerTx,
        outbox: &mut Outbox,
        group_buy: &GroupBuy,
        now: DateTime<Utc>,
    ) -> Result<SettlementSummary, StoreError> {
        let mut members: Vec<(Uuid, Role)> = tx
            .active_participants(group_buy.id)
            .await?
            .into_iter()
            .filter(|p| p.user_id != group_buy.host_user_id)
            .map(|p| (p.user_id, Role::Participant))
            .collect();
        members.push((group_buy.host_user_id, Role::Host));
        members.sort_by_key(|(user_id, _)| *user_id);

        let mut summary = SettlementSummary {
            group_buy_id: group_buy.id,
            ..SettlementSummary::default()
        };

        for (user_id, role) in &members {
            let profile = tx.lock_user(*user_id).await?;

            if !tx
                .insert_settlement_marker(group_buy.id, *user_id, now)
                .await?
            {
                summary.skipped.push(*user_id);
                continue;
            }

            let (reputation, points, description) = match role {
                Role::Host => (
                    self.policy.host_reputation,
                    self.policy.host_points,
                    format!("Hosted group buy: {}", group_buy.title),
                ),
                Role::Participant => (
                    self.policy.participant_reputation,
                    self.policy.participant_points,
                    format!("Completed group buy: {}", group_buy.title),
                ),
            };

            tx.set_reputation(*user_id, profile.reputation.adjust(reputation))
                .await?;

            if points > 0 {
                tx.append_point(&PointHistory::earn(
                    *user_id,
                    points,
                    description,
                    Some(group_buy.id),
                    now,
                ))
                .await?;
                outbox.push(
                    *user_id,
                    NotificationEvent::PointsEarned {
                        group_buy_id: group_buy.id,
                        amount: points,
                    },
                );
            }

            summary.settled.push(*user_id);
        }

        // Badges are re-evaluated for everyone, settled or not, so a run that
        // died between marker and badge insert is finished here.
        for (user_id, _) in &members {
            for badge_type in self.award_badges(tx, outbox, *user_id, now).await? {
                summary.badges_awarded.push(AwardedBadge {
                    user_id: *user_id,
                    badge_type,
                });
            }
        }

        if !summary.settled.is_empty() {
            counter!("settlements_total").increment(summary.settled.len() as u64);
            info!(
                group_buy_id = %group_buy.id,
                settled = summary.settled.len(),
                skipped = summary.skipped.len(),
                badges = summary.badges_awarded.len(),
                "Group buy settled"
            );
        }

        Ok(summary)
    }

    /// Apply a review's reputation change to the host and re-evaluate badges
    /// for both sides.
    ///
    /// Returns the host's new score. Both users are locked in ascending id order.
    pub async fn on_review_submitted(
        &self,
        tx: &mut dyn LedgerTx,
        outbox: &mut Outbox,
        reviewer_id: Uuid,
        host_user_id: Uuid,
        rating: i16,
        now: DateTime<Utc>,
    ) -> Result<(ReputationScore, Vec<AwardedBadge>), StoreError> {
        let mut users = [reviewer_id, host_user_id];
        users.sort();
        let mut host_reputation = ReputationScore::default();
        for user_id in users {
            let profile = tx.lock_user(user_id).await?;
            if user_id == host_user_id {
                host_reputation = profile.reputation;
            }
        }

        let updated = host_reputation.adjust(self.policy.review_delta(rating));
        tx.set_reputation(host_user_id, updated).await?;

        let mut awarded = Vec::new();
        for user_id in users {
            for badge_type in self.award_badges(tx, outbox, user_id, now).await? {
                awarded.push(AwardedBadge {
                    user_id,
                    badge_type,
                });
            }
        }

        Ok((updated, awarded))
    }

    /// Grant every badge the user's history now satisfies and they lack.
    pub async fn award_badges(
        &self,
        tx: &mut dyn LedgerTx,
        outbox: &mut Outbox,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<BadgeType>, StoreError> {
        let activity = tx.user_activity(user_id).await?;
        let mut awarded = Vec::new();

        for badge_type in activity.eligible_badges() {
            if tx.has_badge(user_id, badge_type).await? {
                continue;
            }
            if tx
                .insert_badge(&Badge::new(user_id, badge_type, now))
                .await?
            {
                info!(user_id = %user_id, badge_type = %badge_type, "Badge awarded");
                outbox.push(user_id, NotificationEvent::BadgeAwarded { badge_type });
                awarded.push(badge_type);
            }
        }

        Ok(awarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.participant_points, 100);
        assert_eq!(policy.host_points, 200);
        assert_eq!(policy.participant_reputation, 0.5);
        assert_eq!(policy.host_reputation, 1.0);
    }

    #[test]
    fn test_review_delta() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.review_delta(5), 1.0);
        assert_eq!(policy.review_delta(3), 0.0);
        assert_eq!(policy.review_delta(1), -1.0);
    }
}
