//! Health probes.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use domain::services::GroupBuyEngine;
use serde::Serialize;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: StoreHealth,
}

/// Reachability of the ledger store behind the engine.
#[derive(Debug, Serialize)]
pub struct StoreHealth {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

async fn probe_store(engine: &GroupBuyEngine) -> StoreHealth {
    let start = Instant::now();
    match engine.ping().await {
        Ok(()) => StoreHealth {
            reachable: true,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Ledger store ping failed");
            StoreHealth {
                reachable: false,
                latency_ms: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// GET /api/health
///
/// 503 with the same body when the store is unreachable.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = probe_store(&state.engine).await;
    let (code, status) = if store.reachable {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            store,
        }),
    )
}

/// GET /api/health/live
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse { status: "alive" })
}

/// GET /api/health/ready
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<StatusResponse>) {
    if probe_store(&state.engine).await.reachable {
        (StatusCode::OK, Json(StatusResponse { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StatusResponse { status: "not_ready" }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_store_serialization() {
        let response = HealthResponse {
            status: "unhealthy",
            version: "0.3.0",
            store: StoreHealth {
                reachable: false,
                latency_ms: None,
                error: Some("pool timed out".to_string()),
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["store"]["reachable"], false);
        assert_eq!(json["store"]["error"], "pool timed out");
        assert!(json["store"].get("latency_ms").is_none());
    }
}
