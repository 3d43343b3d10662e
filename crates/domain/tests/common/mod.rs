//! Shared fixtures for engine integration tests.
//!
//! Everything runs against the in-memory ledger store; no database required.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use domain::models::group_buy::CreateGroupBuyRequest;
use domain::models::GroupBuy;
use domain::services::{
    EngineConfig, FixedClock, GroupBuyEngine, MockNotificationService, RetryPolicy,
};
use domain::store::{InMemoryLedgerStore, LedgerStore, LockMode};
use fake::faker::lorem::en::Word;
use fake::Fake;
use uuid::Uuid;

pub struct TestEngine {
    pub engine: Arc<GroupBuyEngine>,
    pub store: InMemoryLedgerStore,
    pub notifier: MockNotificationService,
    pub clock: Arc<FixedClock>,
}

pub const LOCK_MODES: [LockMode; 2] = [LockMode::Pessimistic, LockMode::Optimistic];

pub fn test_engine() -> TestEngine {
    test_engine_with_retry(RetryPolicy::new(5, 0))
}

pub fn test_engine_with_retry(retry: RetryPolicy) -> TestEngine {
    test_engine_with(InMemoryLedgerStore::new(), retry)
}

/// Without row locks every lost race is a retry, so optimistic mode gets a deeper budget.
pub fn test_engine_in(mode: LockMode) -> TestEngine {
    let retry = match mode {
        LockMode::Pessimistic => RetryPolicy::new(5, 0),
        LockMode::Optimistic => RetryPolicy::new(30, 1),
    };
    test_engine_with(InMemoryLedgerStore::with_mode(mode), retry)
}

pub fn test_engine_with(store: InMemoryLedgerStore, retry: RetryPolicy) -> TestEngine {
    let notifier = MockNotificationService::new();
    let clock = Arc::new(FixedClock::new(
        DateTime::parse_from_rfc3339("2025-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc),
    ));
    let engine = GroupBuyEngine::new(
        Arc::new(store.clone()),
        Arc::new(notifier.clone()),
        clock.clone(),
        EngineConfig {
            retry,
            ..EngineConfig::default()
        },
    );

    TestEngine {
        engine: Arc::new(engine),
        store,
        notifier,
        clock,
    }
}

pub fn create_request(target_headcount: i32, deadline: DateTime<Utc>) -> CreateGroupBuyRequest {
    let product: String = Word().fake();
    CreateGroupBuyRequest {
        title: format!("Bulk {}", product),
        description: None,
        target_headcount,
        point_cost: 0,
        deadline,
    }
}

/// Host a group buy with a one-hour deadline.
pub async fn host_group_buy(t: &TestEngine, host: Uuid, target_headcount: i32) -> GroupBuy {
    let deadline = t.engine.now() + Duration::hours(1);
    t.engine
        .create_group_buy(host, &create_request(target_headcount, deadline))
        .await
        .unwrap()
}

/// Host a group buy and fill it to CONFIRMED. Returns the participants.
pub async fn confirmed_group_buy(t: &TestEngine, host: Uuid, target: i32) -> (GroupBuy, Vec<Uuid>) {
    let gb = host_group_buy(t, host, target).await;
    let mut users = Vec::new();
    for _ in 0..target {
        let user = Uuid::new_v4();
        t.engine.join_group_buy(gb.id, user).await.unwrap();
        users.push(user);
    }
    let gb = t.engine.get_group_buy(gb.id).await.unwrap().unwrap();
    (gb, users)
}

/// Active participations must always match the stored headcount.
pub async fn assert_headcount_consistent(store: &InMemoryLedgerStore, group_buy_id: Uuid) {
    let gb = store.find_group_buy(group_buy_id).await.unwrap().unwrap();
    let active = store
        .participations(group_buy_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.active)
        .count();
    assert_eq!(
        active as i32, gb.current_headcount,
        "active participations disagree with headcount"
    );
    assert!(gb.current_headcount <= gb.target_headcount);
}
