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

/// Identical for unknown and pending accounts.
pub const RESEND_MESSAGE: &str =
    "If an account with that email exists and is not yet verified, a new verification email has been sent.";

#[derive(Debug, Deserialize)]
pub struct ResendVerificationRequest {
    #[serde(default)]
    pub email: String,
}

pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ResendVerificationRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<Empty>>> {
    let req = json_body(payload)?;
    let email = auth_service::normalize_email(&req.email);
    if email.is_empty() {
        return Err(AppError::validation("Email is required"));
    }

    let Some(user) = state.users.find_by_email(&email)? else {
        return Ok(Json(ApiResponse::message(RESEND_MESSAGE)));
    };

    if user.email_verified {
        return Err(AppError::new(
            ErrorCode::AlreadyVerified,
            "This email is already verified. Please log in.",
        ));
    }

    let token = auth_service::generate_opaque_token();
    state
        .users
        .set_verification_token(user.user_id, &token, Utc::now() + state.config.verification_ttl())?;

    if let Err(e) = state
        .mailer
        .send_verification_email(&user.email, &user.username, &token)
        .await
    {
        tracing::error!(error = %e, user_id = user.user_id, "failed to resend verification email");
    } else {
        tracing::info!(user_id = user.user_id, "verification email resent");
    }

    Ok(Json(ApiResponse::message(RESEND_MESSAGE)))
}
