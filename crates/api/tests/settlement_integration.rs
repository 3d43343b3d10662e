//! Integration tests for completion, reward reads and host reviews.
//!
//! Run with: cargo test -p group-buy-api --test settlement_integration

mod common;

use axum::http::{Method, StatusCode};
use common::{get_request, json_request, request_as, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

async fn complete(app: &TestApp, id: Uuid, user: Uuid) -> (StatusCode, Value) {
    app.send(request_as(
        Method::POST,
        &format!("/api/v1/group-buys/{}/complete", id),
        user,
    ))
    .await
}

async fn review(app: &TestApp, id: Uuid, user: Uuid, rating: i64) -> (StatusCode, Value) {
    app.send(json_request(
        Method::POST,
        &format!("/api/v1/group-buys/{}/reviews", id),
        json!({ "rating": rating, "content": "Smooth pickup" }),
        user,
    ))
    .await
}

// ============================================================================
// Completion
// ============================================================================

#[tokio::test]
async fn test_host_completes_and_settles() {
    let app = TestApp::new();
    let host = Uuid::new_v4();
    let (id, users) = app.confirmed_group_buy(host, 2).await;

    let (status, body) = complete(&app, id, host).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_completed"], false);
    assert_eq!(body["settlement"]["settled"].as_array().unwrap().len(), 3);
    assert!(body["settlement"]["skipped"].as_array().unwrap().is_empty());

    let (_, gb) = app
        .send(get_request(&format!("/api/v1/group-buys/{}", id)))
        .await;
    assert_eq!(gb["status"], "COMPLETED");

    let (status, rewards) = app
        .send(get_request(&format!("/api/v1/users/{}/rewards", users[0])))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rewards["point_balance"], 100);
    assert_eq!(rewards["reputation"], 37.0);
    assert_eq!(rewards["badges"][0]["badge_type"], "FIRST_PARTICIPATION");

    let (_, host_rewards) = app
        .send(get_request(&format!("/api/v1/users/{}/rewards", host)))
        .await;
    assert_eq!(host_rewards["point_balance"], 200);
    assert_eq!(host_rewards["reputation"], 37.5);
    assert_eq!(host_rewards["badges"][0]["badge_type"], "FIRST_HOST");
}

#[tokio::test]
async fn test_second_completion_reports_already_completed() {
    let app = TestApp::new();
    let host = Uuid::new_v4();
    let (id, users) = app.confirmed_group_buy(host, 2).await;
    complete(&app, id, host).await;

    let (status, body) = complete(&app, id, host).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_completed"], true);
    assert!(body["settlement"]["settled"].as_array().unwrap().is_empty());

    let (_, points) = app
        .send(get_request(&format!("/api/v1/users/{}/points", users[1])))
        .await;
    assert_eq!(points["balance"], 100);
    assert_eq!(points["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_only_host_can_complete() {
    let app = TestApp::new();
    let (id, users) = app.confirmed_group_buy(Uuid::new_v4(), 2).await;

    let (status, body) = complete(&app, id, users[0]).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn test_recruiting_group_buy_cannot_complete() {
    let app = TestApp::new();
    let host = Uuid::new_v4();
    let id = app.create_group_buy(host, 3).await;

    let (status, body) = complete(&app, id, host).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn test_rewards_for_new_user_are_defaults() {
    let app = TestApp::new();

    let (status, body) = app
        .send(get_request(&format!(
            "/api/v1/users/{}/rewards",
            Uuid::new_v4()
        )))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point_balance"], 0);
    assert_eq!(body["reputation"], 36.5);
    assert!(body["badges"].as_array().unwrap().is_empty());
}

// ============================================================================
// Reviews
// ============================================================================

#[tokio::test]
async fn test_participant_reviews_host() {
    let app = TestApp::new();
    let host = Uuid::new_v4();
    let (id, users) = app.confirmed_group_buy(host, 2).await;
    complete(&app, id, host).await;

    let (status, body) = review(&app, id, users[0], 5).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["host_user_id"], host.to_string());
    // 36.5 + 1.0 for hosting + 1.0 for a five-star review
    assert_eq!(body["host_reputation"], 38.5);

    let (status, listed) = app
        .send(get_request(&format!("/api/v1/group-buys/{}/reviews", id)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_review_conflicts() {
    let app = TestApp::new();
    let host = Uuid::new_v4();
    let (id, users) = app.confirmed_group_buy(host, 2).await;
    complete(&app, id, host).await;
    review(&app, id, users[0], 4).await;

    let (status, body) = review(&app, id, users[0], 1).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_review_requires_completion() {
    let app = TestApp::new();
    let (id, users) = app.confirmed_group_buy(Uuid::new_v4(), 2).await;

    let (status, body) = review(&app, id, users[0], 5).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn test_outsider_cannot_review() {
    let app = TestApp::new();
    let host = Uuid::new_v4();
    let (id, _) = app.confirmed_group_buy(host, 2).await;
    complete(&app, id, host).await;

    let (status, _) = review(&app, id, Uuid::new_v4(), 5).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_review_rating_out_of_range() {
    let app = TestApp::new();
    let host = Uuid::new_v4();
    let (id, users) = app.confirmed_group_buy(host, 2).await;
    complete(&app, id, host).await;

    let (status, body) = review(&app, id, users[0], 6).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}
