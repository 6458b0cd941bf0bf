use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use wlu_shared::types::ApiResponse;
use wlu_shared::{AppError, AppResult, ErrorCode};

use crate::services::token_service::RefreshOutcome;
use crate::AppState;

/// Body shared by `/auth/token` and `/auth/logout`.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshTokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

pub async fn token(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<RefreshTokenRequest>>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let refresh_token = payload
        .and_then(|Json(req)| req.token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthorized("Refresh token required"))?;

    match state.tokens.rotate_access_token(&refresh_token)? {
        RefreshOutcome::Granted { access_token, refresh_token } => {
            Ok(Json(ApiResponse::ok(TokenResponse { access_token, refresh_token })))
        }
        RefreshOutcome::Rejected => Err(AppError::new(
            ErrorCode::RefreshTokenRejected,
            "Invalid or expired refresh token",
        )),
    }
}
