use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use domain::services::GroupBuyEngine;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{admin, group_buys, health, participants, reviews, rewards};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GroupBuyEngine>,
    pub config: Arc<Config>,
}

pub fn create_app(config: Config, engine: Arc<GroupBuyEngine>) -> Router {
    let config = Arc::new(config);

    let state = AppState {
        engine,
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Caller identity comes from the X-User-Id extractor on each handler.
    let group_buy_routes = Router::new()
        .route(
            "/api/v1/group-buys",
            post(group_buys::create_group_buy).get(group_buys::list_group_buys),
        )
        .route(
            "/api/v1/group-buys/:group_buy_id",
            get(group_buys::get_group_buy).delete(group_buys::delete_group_buy),
        )
        .route(
            "/api/v1/group-buys/:group_buy_id/participants",
            post(participants::join_group_buy).get(participants::list_participants),
        )
        .route(
            "/api/v1/group-buys/:group_buy_id/participants/me",
            delete(participants::leave_group_buy),
        )
        .route(
            "/api/v1/group-buys/:group_buy_id/complete",
            post(group_buys::complete_group_buy),
        )
        .route(
            "/api/v1/group-buys/:group_buy_id/cancel",
            post(group_buys::cancel_group_buy),
        )
        .route(
            "/api/v1/group-buys/:group_buy_id/reviews",
            post(reviews::submit_review).get(reviews::list_reviews),
        );

    let user_routes = Router::new()
        .route("/api/v1/users/:user_id/rewards", get(rewards::get_rewards))
        .route(
            "/api/v1/users/:user_id/points",
            get(rewards::get_point_history),
        );

    let admin_routes = Router::new().route(
        "/api/v1/admin/group-buys/sweep",
        post(admin::sweep_expired),
    );

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(group_buy_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .route_layer(middleware::from_fn(metrics_middleware))
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
