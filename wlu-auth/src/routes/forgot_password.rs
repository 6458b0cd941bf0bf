use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use wlu_shared::types::{ApiResponse, Empty};
use wlu_shared::{AppError, AppResult};

use crate::routes::json_body;
use crate::services::auth_service;
use crate::AppState;

pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent.";

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<Empty>>> {
    let req = json_body(payload)?;
    let email = auth_service::normalize_email(&req.email);
    if email.is_empty() {
        return Err(AppError::validation("Email is required"));
    }

    // Don't reveal whether the email exists.
    if let Some(user) = state.users.find_by_email(&email)? {
        let token = auth_service::generate_opaque_token();
        state
            .users
            .set_reset_token(user.user_id, &token, Utc::now() + state.config.password_reset_ttl())?;

        if let Err(e) = state
            .mailer
            .send_password_reset_email(&user.email, &user.username, &token)
            .await
        {
            tracing::error!(error = %e, user_id = user.user_id, "failed to send reset email");
        }
    }

    Ok(Json(ApiResponse::message(FORGOT_PASSWORD_MESSAGE)))
}
