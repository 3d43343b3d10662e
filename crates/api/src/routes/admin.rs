//! Operator routes.

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminUser;

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired: usize,
}

/// Run the deadline sweep now instead of waiting for the scheduled job.
///
/// POST /api/v1/admin/group-buys/sweep
pub async fn sweep_expired(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<SweepResponse>, ApiError> {
    let expired = state
        .engine
        .sweep_expired_group_buys(state.engine.now())
        .await?;

    info!(admin_id = %admin.user_id, expired, "Manual deadline sweep");
    Ok(Json(SweepResponse { expired }))
}
