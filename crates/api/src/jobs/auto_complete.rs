//! Background job that completes confirmed group buys after a grace period.

use std::sync::Arc;

use chrono::Duration;
use domain::services::GroupBuyEngine;

use super::scheduler::Job;

/// Completes CONFIRMED group buys whose deadline passed more than `grace` ago
/// and settles their rewards, as if the host had completed them.
pub struct AutoCompleteJob {
    engine: Arc<GroupBuyEngine>,
    grace: Duration,
    interval_secs: u64,
}

impl AutoCompleteJob {
    pub fn new(engine: Arc<GroupBuyEngine>, grace: Duration, interval_secs: u64) -> Self {
        Self {
            engine,
            grace,
            interval_secs: interval_secs.max(1),
        }
    }
}

#[async_trait::async_trait]
impl Job for AutoCompleteJob {
    fn name(&self) -> &'static str {
        "auto_complete_group_buys"
    }

    fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    async fn execute(&self) -> Result<usize, String> {
        self.engine
            .auto_complete_confirmed(self.engine.now(), self.grace)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domain::models::group_buy::CreateGroupBuyRequest;
    use domain::models::GroupBuyStatus;
    use domain::services::{Clock, EngineConfig, FixedClock, MockNotificationService};
    use domain::store::InMemoryLedgerStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_job_completes_after_grace_period() {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let engine = Arc::new(GroupBuyEngine::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(MockNotificationService::new()),
            clock.clone(),
            EngineConfig::default(),
        ));

        let host = Uuid::new_v4();
        let gb = engine
            .create_group_buy(
                host,
                &CreateGroupBuyRequest {
                    title: "Rice 10kg".to_string(),
                    description: None,
                    target_headcount: 2,
                    point_cost: 0,
                    deadline: clock.now() + Duration::hours(1),
                },
            )
            .await
            .unwrap();
        for _ in 0..2 {
            engine.join_group_buy(gb.id, Uuid::new_v4()).await.unwrap();
        }

        let job = AutoCompleteJob::new(engine.clone(), Duration::hours(24), 300);

        clock.advance(Duration::hours(12));
        assert_eq!(job.execute().await.unwrap(), 0);

        clock.advance(Duration::hours(14));
        assert_eq!(job.execute().await.unwrap(), 1);

        let completed = engine.get_group_buy(gb.id).await.unwrap().unwrap();
        assert_eq!(completed.status, GroupBuyStatus::Completed);
        assert!(engine.is_settled(gb.id, host).await.unwrap());
    }
}
