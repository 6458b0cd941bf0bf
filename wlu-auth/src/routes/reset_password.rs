use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use wlu_shared::types::{ApiResponse, Empty};
use wlu_shared::{AppError, AppResult, ErrorCode};

use crate::routes::json_body;
use crate::services::auth_service;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

fn invalid_token() -> AppError {
    AppError::new(ErrorCode::ResetTokenInvalid, "Invalid or expired reset token")
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<Empty>>> {
    let req = json_body(payload)?;
    if req.token.is_empty() {
        return Err(invalid_token());
    }
    auth_service::validate_password(&req.password)?;

    let user = state.users.find_by_reset_token(&req.token)?.ok_or_else(invalid_token)?;

    let expired = user.reset_token_expires.map_or(true, |expires| Utc::now() > expires);
    if expired {
        return Err(AppError::new(
            ErrorCode::ResetTokenExpired,
            "Reset token has expired. Please request a new one.",
        ));
    }

    let new_hash = auth_service::hash_password(&req.password)?;
    if !state.users.reset_password(user.user_id, &req.token, &new_hash)? {
        return Err(invalid_token());
    }

    // Sign out every session.
    let revoked = state.tokens.revoke_all_for(&user.username)?;

    tracing::info!(user_id = user.user_id, revoked, "password reset");

    Ok(Json(ApiResponse::message("Password reset successful. Please log in with your new password.")))
}
