//! Common test utilities for integration tests.
//!
//! The app runs over the in-memory ledger store with a fixed clock, so no
//! database is needed.

#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use domain::services::{
    Clock, EngineConfig, FixedClock, GroupBuyEngine, MockNotificationService, RetryPolicy,
};
use domain::store::InMemoryLedgerStore;
use fake::faker::lorem::en::Word;
use fake::Fake;
use group_buy_api::{app::create_app, config::Config};
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use uuid::Uuid;

pub struct TestApp {
    pub router: Router,
    pub engine: Arc<GroupBuyEngine>,
    pub notifier: MockNotificationService,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    pub fn new() -> Self {
        let clock = Arc::new(FixedClock::new(
            DateTime::parse_from_rfc3339("2025-03-01T09:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        ));
        let notifier = MockNotificationService::new();
        let engine = Arc::new(GroupBuyEngine::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(notifier.clone()),
            clock.clone(),
            EngineConfig {
                retry: RetryPolicy::new(5, 0),
                ..EngineConfig::default()
            },
        ));

        Self {
            router: create_app(test_config(), engine.clone()),
            engine,
            notifier,
            clock,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, parse_response_body(response).await)
    }

    /// Create a group buy through the API and return its id.
    pub async fn create_group_buy(&self, host: Uuid, target_headcount: i32) -> Uuid {
        let deadline = self.clock.now() + Duration::hours(6);
        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/api/v1/group-buys",
                create_body(target_headcount, deadline),
                host,
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
        body["id"].as_str().unwrap().parse().unwrap()
    }

    pub async fn join(&self, group_buy_id: Uuid, user: Uuid) -> (StatusCode, Value) {
        self.send(json_request(
            Method::POST,
            &format!("/api/v1/group-buys/{}/participants", group_buy_id),
            json!({}),
            user,
        ))
        .await
    }

    /// Host a group buy and fill every slot. Returns the id and the participants.
    pub async fn confirmed_group_buy(&self, host: Uuid, target: i32) -> (Uuid, Vec<Uuid>) {
        let id = self.create_group_buy(host, target).await;
        let mut users = Vec::new();
        for _ in 0..target {
            let user = Uuid::new_v4();
            let (status, _) = self.join(id, user).await;
            assert_eq!(status, StatusCode::CREATED);
            users.push(user);
        }
        (id, users)
    }
}

pub fn test_config() -> Config {
    Config::with_overrides(&[("database.url", "postgres://unused@localhost/unused")])
        .expect("Failed to load test config")
}

pub fn create_body(target_headcount: i32, deadline: DateTime<Utc>) -> Value {
    let product: String = Word().fake();
    json!({
        "title": format!("Bulk {}", product),
        "target_headcount": target_headcount,
        "deadline": deadline.to_rfc3339(),
    })
}

pub fn json_request(method: Method, uri: &str, body: Value, user: Uuid) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-User-Id", user.to_string())
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn admin_json_request(method: Method, uri: &str, body: Value, user: Uuid) -> Request<Body> {
    let mut request = json_request(method, uri, body, user);
    request
        .headers_mut()
        .insert("X-User-Role", "admin".parse().unwrap());
    request
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn request_as(method: Method, uri: &str, user: Uuid) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("X-User-Id", user.to_string())
        .body(Body::empty())
        .unwrap()
}

pub async fn parse_response_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

/// Collects the message of every event logged while installed.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<String>>>);

impl CapturedLogs {
    pub fn count(&self, message: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|m| *m == message).count()
    }
}

struct MessageVisitor<'a>(&'a mut Option<String>);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.0 = Some(format!("{:?}", value));
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = None;
        event.record(&mut MessageVisitor(&mut message));
        if let Some(message) = message {
            self.0.lock().unwrap().push(message);
        }
    }
}
