//! Background job that expires group buys past their deadline.

use std::sync::Arc;
use std::time::Duration;

use domain::services::GroupBuyEngine;

use super::scheduler::Job;

/// Moves RECRUITING group buys whose deadline has passed to EXPIRED.
pub struct ExpireGroupBuysJob {
    engine: Arc<GroupBuyEngine>,
    interval_secs: u64,
}

impl ExpireGroupBuysJob {
    pub fn new(engine: Arc<GroupBuyEngine>, interval_secs: u64) -> Self {
        Self {
            engine,
            interval_secs: interval_secs.max(1),
        }
    }
}

#[async_trait::async_trait]
impl Job for ExpireGroupBuysJob {
    fn name(&self) -> &'static str {
        "expire_group_buys"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    // Catch up on deadlines that passed while the service was down.
    fn run_at_startup(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<usize, String> {
        self.engine
            .sweep_expired_group_buys(self.engine.now())
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
    async fn test_job_expires_overdue_group_buys() {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let engine = Arc::new(GroupBuyEngine::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(MockNotificationService::new()),
            clock.clone(),
            EngineConfig::default(),
        ));

        let gb = engine
            .create_group_buy(
                Uuid::new_v4(),
                &CreateGroupBuyRequest {
                    title: "Flour 25kg".to_string(),
                    description: None,
                    target_headcount: 3,
                    point_cost: 0,
                    deadline: clock.now() + chrono::Duration::hours(1),
                },
            )
            .await
            .unwrap();

        let job = ExpireGroupBuysJob::new(engine.clone(), 60);
        assert_eq!(job.name(), "expire_group_buys");

        assert_eq!(job.execute().await.unwrap(), 0);
        let still_open = engine.get_group_buy(gb.id).await.unwrap().unwrap();
        assert_eq!(still_open.status, GroupBuyStatus::Recruiting);

        clock.advance(chrono::Duration::hours(2));
        assert_eq!(job.execute().await.unwrap(), 1);
        let expired = engine.get_group_buy(gb.id).await.unwrap().unwrap();
        assert_eq!(expired.status, GroupBuyStatus::Expired);
    }
}
