//! Notification fan-out.
//!
//! The engine never delivers notifications itself. It collects events in an
//! [`Outbox`] while a unit of work runs and hands them to a
//! [`NotificationService`] after the unit commits. Delivery failures are
//! logged and swallowed.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{BadgeType, GroupBuyStatus};

/// Events delivered to users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// Sent to the host when someone joins.
    ParticipantJoined {
        group_buy_id: Uuid,
        participant_id: Uuid,
        current_headcount: i32,
        target_headcount: i32,
    },
    /// Sent to the host when someone leaves.
    ParticipantLeft {
        group_buy_id: Uuid,
        participant_id: Uuid,
        current_headcount: i32,
    },
    GroupBuyConfirmed {
        group_buy_id: Uuid,
    },
    GroupBuyCompleted {
        group_buy_id: Uuid,
    },
    GroupBuyExpired {
        group_buy_id: Uuid,
    },
    GroupBuyCancelled {
        group_buy_id: Uuid,
        previous_status: GroupBuyStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    PointsEarned {
        group_buy_id: Uuid,
        amount: i64,
    },
    PointsRefunded {
        group_buy_id: Uuid,
        amount: i64,
    },
    BadgeAwarded {
        badge_type: BadgeType,
    },
    ReviewReceived {
        group_buy_id: Uuid,
        review_id: Uuid,
        rating: i16,
    },
}

impl NotificationEvent {
    /// Stable event name, used as the persisted `event_type`.
    pub fn event_type(&self) -> &'static str {
        match self {
            NotificationEvent::ParticipantJoined { .. } => "participant_joined",
            NotificationEvent::ParticipantLeft { .. } => "participant_left",
            NotificationEvent::GroupBuyConfirmed { .. } => "group_buy_confirmed",
            NotificationEvent::GroupBuyCompleted { .. } => "group_buy_completed",
            NotificationEvent::GroupBuyExpired { .. } => "group_buy_expired",
            NotificationEvent::GroupBuyCancelled { .. } => "group_buy_cancelled",
            NotificationEvent::PointsEarned { .. } => "points_earned",
            NotificationEvent::PointsRefunded { .. } => "points_refunded",
            NotificationEvent::BadgeAwarded { .. } => "badge_awarded",
            NotificationEvent::ReviewReceived { .. } => "review_received",
        }
    }
}

/// Result of a notification send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    Sent,
    /// Delivery failed; the triggering operation is unaffected.
    Failed(String),
}

/// Fire-and-forget notification channel.
#[async_trait::async_trait]
pub trait NotificationService: Send + Sync {
    async fn emit(&self, user_id: Uuid, event: NotificationEvent) -> NotificationResult;
}

/// Events waiting for their unit of work to commit.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<(Uuid, NotificationEvent)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, user_id: Uuid, event: NotificationEvent) {
        self.pending.push((user_id, event));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Deliver every pending event. Never fails.
    pub async fn flush(self, service: &dyn NotificationService) {
        for (user_id, event) in self.pending {
            let event_type = event.event_type();
            if let NotificationResult::Failed(reason) = service.emit(user_id, event).await {
                tracing::warn!(
                    user_id = %user_id,
                    event_type,
                    reason = %reason,
                    "Notification emission failed"
                );
            }
        }
    }
}

/// Mock notification service for development and testing.
///
/// Records every delivered event instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct MockNotificationService {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    sent: Arc<Mutex<Vec<(Uuid, NotificationEvent)>>>,
}

impl MockNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock service that simulates failures.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    /// Everything delivered so far, in order.
    pub fn sent(&self) -> Vec<(Uuid, NotificationEvent)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sent_to(&self, user_id: Uuid) -> Vec<NotificationEvent> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| *to == user_id)
            .map(|(_, event)| event)
            .collect()
    }
}

#[async_trait::async_trait]
impl NotificationService for MockNotificationService {
    async fn emit(&self, user_id: Uuid, event: NotificationEvent) -> NotificationResult {
        if self.simulate_failure {
            return NotificationResult::Failed("Simulated failure".to_string());
        }

        tracing::debug!(
            user_id = %user_id,
            event_type = event.event_type(),
            "Mock: Would deliver notification"
        );

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id, event));
        NotificationResult::Sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let gb = Uuid::new_v4();
        let event = NotificationEvent::GroupBuyCancelled {
            group_buy_id: gb,
            previous_status: GroupBuyStatus::Confirmed,
            reason: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "group_buy_cancelled");
        assert_eq!(json["previous_status"], "CONFIRMED");
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn test_badge_event_serialization() {
        let json = serde_json::to_value(NotificationEvent::BadgeAwarded {
            badge_type: BadgeType::FirstHost,
        })
        .unwrap();
        assert_eq!(json["type"], "badge_awarded");
        assert_eq!(json["badge_type"], "FIRST_HOST");
    }

    #[tokio::test]
    async fn test_outbox_flush_delivers_in_order() {
        let service = MockNotificationService::new();
        let user = Uuid::new_v4();
        let gb = Uuid::new_v4();

        let mut outbox = Outbox::new();
        outbox.push(user, NotificationEvent::GroupBuyConfirmed { group_buy_id: gb });
        outbox.push(user, NotificationEvent::GroupBuyCompleted { group_buy_id: gb });
        assert_eq!(outbox.len(), 2);
        outbox.flush(&service).await;

        assert_eq!(
            service.sent_to(user),
            vec![
                NotificationEvent::GroupBuyConfirmed { group_buy_id: gb },
                NotificationEvent::GroupBuyCompleted { group_buy_id: gb },
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_service_is_swallowed() {
        let service = MockNotificationService::failing();
        let mut outbox = Outbox::new();
        outbox.push(
            Uuid::new_v4(),
            NotificationEvent::GroupBuyExpired {
                group_buy_id: Uuid::new_v4(),
            },
        );

        outbox.flush(&service).await;
        assert!(service.sent().is_empty());
    }
}
