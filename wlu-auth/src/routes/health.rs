use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use wlu_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.users.ping() {
        Ok(()) => HealthCheck { name: "database".into(), status: HealthStatus::Healthy, message: None },
        Err(e) => HealthCheck {
            name: "database".into(),
            status: HealthStatus::Unhealthy,
            message: Some(e.to_string()),
        },
    };

    let health = HealthResponse::healthy("wlu-auth", env!("CARGO_PKG_VERSION")).with_checks(vec![database]);
    let status = if health.status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(health))
}
