//! Review routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::review::{Review, SubmitReviewRequest, SubmitReviewResponse};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::ActingUser;

/// Review the host of a completed group buy.
///
/// POST /api/v1/group-buys/:group_buy_id/reviews
pub async fn submit_review(
    State(state): State<AppState>,
    user: ActingUser,
    Path(group_buy_id): Path<Uuid>,
    Json(request): Json<SubmitReviewRequest>,
) -> Result<(StatusCode, Json<SubmitReviewResponse>), ApiError> {
    request.validate()?;

    let response = state
        .engine
        .submit_review(group_buy_id, user.user_id, &request)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/group-buys/:group_buy_id/reviews
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(group_buy_id): Path<Uuid>,
) -> Result<Json<Vec<Review>>, ApiError> {
    Ok(Json(state.engine.reviews(group_buy_id).await?))
}
