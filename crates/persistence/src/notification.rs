//! Notification sink that persists events to the notifications table.

use async_trait::async_trait;
use domain::services::notification::{NotificationEvent, NotificationResult, NotificationService};
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::repositories::NotificationRepository;

/// Stores each event as a row that clients poll or a push worker drains.
#[derive(Clone)]
pub struct PgNotificationService {
    repo: NotificationRepository,
}

impl PgNotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: NotificationRepository::new(pool),
        }
    }
}

#[async_trait]
impl NotificationService for PgNotificationService {
    async fn emit(&self, user_id: Uuid, event: NotificationEvent) -> NotificationResult {
        let event_type = event.event_type();
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => return NotificationResult::Failed(e.to_string()),
        };

        match self.repo.insert(user_id, event_type, &payload).await {
            Ok(id) => {
                debug!(notification_id = %id, user_id = %user_id, event_type, "Notification stored");
                NotificationResult::Sent
            }
            Err(e) => {
                warn!(user_id = %user_id, event_type, error = %e, "Failed to store notification");
                NotificationResult::Failed(e.to_string())
            }
        }
    }
}
