//! Group buy routes: hosting, listing, completion, cancellation and deletion.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::models::group_buy::{
    CreateGroupBuyRequest, GroupBuyResponse, ListGroupBuysQuery, ListGroupBuysResponse,
};
use domain::services::{CancelActor, CompletionOutcome, SettlementSummary, TransitionOutcome};
use serde::{Deserialize, Serialize};
use shared::pagination::{clamp_limit, Cursor};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::ActingUser;

/// Create a new group buy hosted by the acting user.
///
/// POST /api/v1/group-buys
pub async fn create_group_buy(
    State(state): State<AppState>,
    user: ActingUser,
    Json(request): Json<CreateGroupBuyRequest>,
) -> Result<(StatusCode, Json<GroupBuyResponse>), ApiError> {
    request.validate()?;

    let group_buy = state.engine.create_group_buy(user.user_id, &request).await?;

    Ok((StatusCode::CREATED, Json(group_buy.into())))
}

/// List recruiting group buys, newest first.
///
/// GET /api/v1/group-buys?cursor=...&limit=...
pub async fn list_group_buys(
    State(state): State<AppState>,
    Query(query): Query<ListGroupBuysQuery>,
) -> Result<Json<ListGroupBuysResponse>, ApiError> {
    let after = query.cursor.as_deref().map(Cursor::decode).transpose()?;
    let limit = clamp_limit(query.limit);

    let page = state.engine.list_open_group_buys(after, limit).await?;

    Ok(Json(ListGroupBuysResponse {
        data: page.items.into_iter().map(GroupBuyResponse::from).collect(),
        next_cursor: page.next_cursor.map(|c| c.encode()),
    }))
}

/// GET /api/v1/group-buys/:group_buy_id
pub async fn get_group_buy(
    State(state): State<AppState>,
    Path(group_buy_id): Path<Uuid>,
) -> Result<Json<GroupBuyResponse>, ApiError> {
    let group_buy = state
        .engine
        .get_group_buy(group_buy_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Group buy not found".to_string()))?;

    Ok(Json(group_buy.into()))
}

/// Soft-delete a group buy. Host only; a live group buy is cancelled first.
///
/// DELETE /api/v1/group-buys/:group_buy_id
pub async fn delete_group_buy(
    State(state): State<AppState>,
    user: ActingUser,
    Path(group_buy_id): Path<Uuid>,
) -> Result<Json<GroupBuyResponse>, ApiError> {
    let group_buy = state
        .engine
        .soft_delete_group_buy(group_buy_id, user.user_id)
        .await?;

    Ok(Json(group_buy.into()))
}

#[derive(Debug, Serialize)]
pub struct CompleteGroupBuyResponse {
    pub group_buy_id: Uuid,
    pub already_completed: bool,
    pub settlement: SettlementSummary,
}

/// Mark a confirmed group buy completed and settle rewards. Host only.
///
/// POST /api/v1/group-buys/:group_buy_id/complete
pub async fn complete_group_buy(
    State(state): State<AppState>,
    user: ActingUser,
    Path(group_buy_id): Path<Uuid>,
) -> Result<Json<CompleteGroupBuyResponse>, ApiError> {
    let outcome = state
        .engine
        .complete_group_buy(group_buy_id, user.user_id)
        .await?;

    let already_completed = matches!(outcome, CompletionOutcome::AlreadyCompleted(_));
    let settlement = match outcome {
        CompletionOutcome::Completed(s) | CompletionOutcome::AlreadyCompleted(s) => s,
    };

    Ok(Json(CompleteGroupBuyResponse {
        group_buy_id,
        already_completed,
        settlement,
    }))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CancelGroupBuyRequest {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelGroupBuyResponse {
    /// `false` when the group buy was already terminal and nothing changed.
    pub cancelled: bool,
    pub group_buy: GroupBuyResponse,
}

/// Cancel a group buy. Allowed for its host and for admins.
///
/// POST /api/v1/group-buys/:group_buy_id/cancel
pub async fn cancel_group_buy(
    State(state): State<AppState>,
    user: ActingUser,
    Path(group_buy_id): Path<Uuid>,
    body: Option<Json<CancelGroupBuyRequest>>,
) -> Result<Json<CancelGroupBuyResponse>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let actor = if user.is_admin {
        CancelActor::Admin(user.user_id)
    } else {
        CancelActor::Host(user.user_id)
    };

    let outcome = state
        .engine
        .cancel_group_buy(group_buy_id, actor, request.reason)
        .await?;

    let group_buy = state
        .engine
        .get_group_buy(group_buy_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Group buy not found".to_string()))?;

    Ok(Json(CancelGroupBuyResponse {
        cancelled: outcome == TransitionOutcome::Applied,
        group_buy: group_buy.into(),
    }))
}
