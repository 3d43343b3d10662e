//! Integration tests for joining, leaving and listing participants.
//!
//! Run with: cargo test -p group-buy-api --test participation_integration

mod common;

use axum::http::{Method, StatusCode};
use chrono::Duration;
use common::{get_request, request_as, TestApp};
use domain::services::NotificationEvent;
use uuid::Uuid;

#[tokio::test]
async fn test_join_group_buy() {
    let app = TestApp::new();
    let id = app.create_group_buy(Uuid::new_v4(), 3).await;

    let (status, body) = app.join(id, Uuid::new_v4()).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["group_buy_id"], id.to_string());
    assert_eq!(body["current_headcount"], 1);
    assert_eq!(body["target_headcount"], 3);
    assert_eq!(body["status"], "RECRUITING");
}

#[tokio::test]
async fn test_filling_last_slot_confirms() {
    let app = TestApp::new();
    let host = Uuid::new_v4();
    let id = app.create_group_buy(host, 2).await;
    app.join(id, Uuid::new_v4()).await;

    let (status, body) = app.join(id, Uuid::new_v4()).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "CONFIRMED");
    assert_eq!(body["current_headcount"], 2);

    assert!(app
        .notifier
        .sent_to(host)
        .contains(&NotificationEvent::GroupBuyConfirmed { group_buy_id: id }));
}

#[tokio::test]
async fn test_join_full_group_buy_conflicts() {
    let app = TestApp::new();
    let (id, _) = app.confirmed_group_buy(Uuid::new_v4(), 2).await;

    let (status, body) = app.join(id, Uuid::new_v4()).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn test_double_join_conflicts() {
    let app = TestApp::new();
    let id = app.create_group_buy(Uuid::new_v4(), 3).await;
    let user = Uuid::new_v4();
    app.join(id, user).await;

    let (status, body) = app.join(id, user).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (_, gb) = app
        .send(get_request(&format!("/api/v1/group-buys/{}", id)))
        .await;
    assert_eq!(gb["current_headcount"], 1);
}

#[tokio::test]
async fn test_host_cannot_join_own_group_buy() {
    let app = TestApp::new();
    let host = Uuid::new_v4();
    let id = app.create_group_buy(host, 3).await;

    let (status, _) = app.join(id, host).await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_join_after_deadline_is_rejected() {
    let app = TestApp::new();
    let id = app.create_group_buy(Uuid::new_v4(), 3).await;
    app.clock.advance(Duration::hours(7));

    let (status, body) = app.join(id, Uuid::new_v4()).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn test_join_unknown_group_buy() {
    let app = TestApp::new();

    let (status, _) = app.join(Uuid::new_v4(), Uuid::new_v4()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_leave_frees_a_slot() {
    let app = TestApp::new();
    let id = app.create_group_buy(Uuid::new_v4(), 3).await;
    let user = Uuid::new_v4();
    app.join(id, user).await;

    let (status, body) = app
        .send(request_as(
            Method::DELETE,
            &format!("/api/v1/group-buys/{}/participants/me", id),
            user,
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_headcount"], 0);
    assert_eq!(body["remaining_slots"], 3);

    // The user can come back later.
    let (status, _) = app.join(id, user).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_leave_without_joining_conflicts() {
    let app = TestApp::new();
    let id = app.create_group_buy(Uuid::new_v4(), 3).await;

    let (status, _) = app
        .send(request_as(
            Method::DELETE,
            &format!("/api/v1/group-buys/{}/participants/me", id),
            Uuid::new_v4(),
        ))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_leave_confirmed_group_buy_is_rejected() {
    let app = TestApp::new();
    let (id, users) = app.confirmed_group_buy(Uuid::new_v4(), 2).await;

    let (status, body) = app
        .send(request_as(
            Method::DELETE,
            &format!("/api/v1/group-buys/{}/participants/me", id),
            users[0],
        ))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn test_list_participants() {
    let app = TestApp::new();
    let id = app.create_group_buy(Uuid::new_v4(), 4).await;
    let stays = Uuid::new_v4();
    let leaves = Uuid::new_v4();
    app.join(id, stays).await;
    app.join(id, leaves).await;
    app.send(request_as(
        Method::DELETE,
        &format!("/api/v1/group-buys/{}/participants/me", id),
        leaves,
    ))
    .await;

    let (status, body) = app
        .send(get_request(&format!("/api/v1/group-buys/{}/participants", id)))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["active_count"], 1);
}

#[tokio::test]
async fn test_list_participants_unknown_group_buy() {
    let app = TestApp::new();

    let (status, _) = app
        .send(get_request(&format!(
            "/api/v1/group-buys/{}/participants",
            Uuid::new_v4()
        )))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
