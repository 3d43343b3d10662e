//! Reward read routes: balance, reputation, badges and the point ledger.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::models::point_history::{balance_of, PointHistoryResponse};
use domain::models::Badge;
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct RewardsResponse {
    pub user_id: Uuid,
    pub point_balance: i64,
    pub reputation: f64,
    pub badges: Vec<Badge>,
}

/// GET /api/v1/users/:user_id/rewards
pub async fn get_rewards(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RewardsResponse>, ApiError> {
    let point_balance = state.engine.point_balance(user_id).await?;
    let reputation = state.engine.reputation(user_id).await?;
    let badges = state.engine.badges(user_id).await?;

    Ok(Json(RewardsResponse {
        user_id,
        point_balance,
        reputation: reputation.value(),
        badges,
    }))
}

/// GET /api/v1/users/:user_id/points
pub async fn get_point_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PointHistoryResponse>, ApiError> {
    let data = state.engine.point_history(user_id).await?;
    Ok(Json(PointHistoryResponse {
        balance: balance_of(&data),
        data,
    }))
}
