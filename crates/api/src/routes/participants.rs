//! Participation routes: join, leave and roster.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::group_buy::GroupBuyResponse;
use domain::models::participation::{
    JoinGroupBuyResponse, ListParticipantsResponse, ParticipantSummary,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::ActingUser;

/// Join a recruiting group buy.
///
/// POST /api/v1/group-buys/:group_buy_id/participants
///
/// The join that fills the last slot also confirms the group buy.
pub async fn join_group_buy(
    State(state): State<AppState>,
    user: ActingUser,
    Path(group_buy_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JoinGroupBuyResponse>), ApiError> {
    let response = state
        .engine
        .join_group_buy(group_buy_id, user.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Leave a recruiting group buy.
///
/// DELETE /api/v1/group-buys/:group_buy_id/participants/me
pub async fn leave_group_buy(
    State(state): State<AppState>,
    user: ActingUser,
    Path(group_buy_id): Path<Uuid>,
) -> Result<Json<GroupBuyResponse>, ApiError> {
    let group_buy = state
        .engine
        .leave_group_buy(group_buy_id, user.user_id)
        .await?;

    Ok(Json(group_buy.into()))
}

/// GET /api/v1/group-buys/:group_buy_id/participants
pub async fn list_participants(
    State(state): State<AppState>,
    Path(group_buy_id): Path<Uuid>,
) -> Result<Json<ListParticipantsResponse>, ApiError> {
    if state.engine.get_group_buy(group_buy_id).await?.is_none() {
        return Err(ApiError::NotFound("Group buy not found".to_string()));
    }

    let data: Vec<ParticipantSummary> = state
        .engine
        .participants(group_buy_id)
        .await?
        .into_iter()
        .map(ParticipantSummary::from)
        .collect();
    let active_count = data.iter().filter(|p| p.active).count();

    Ok(Json(ListParticipantsResponse { data, active_count }))
}
