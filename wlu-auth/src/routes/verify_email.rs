use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use wlu_shared::types::ApiResponse;
use wlu_shared::{AppError, AppResult, ErrorCode};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyEmailResponse {
    pub username: String,
}

fn invalid_token() -> AppError {
    AppError::new(ErrorCode::VerificationTokenInvalid, "Invalid or expired verification token")
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyEmailQuery>,
) -> AppResult<Json<ApiResponse<VerifyEmailResponse>>> {
    let token = query.token.filter(|t| !t.is_empty()).ok_or_else(invalid_token)?;

    let user = state
        .users
        .find_by_verification_token(&token)?
        .ok_or_else(invalid_token)?;

    // Expired tokens are left in place; a resend replaces them.
    let expired = user
        .verification_token_expires
        .map_or(true, |expires| Utc::now() > expires);
    if expired {
        return Err(AppError::new(
            ErrorCode::VerificationTokenExpired,
            "Verification token has expired. Please request a new one.",
        ));
    }

    // Lost a race with a concurrent verification or resend.
    if !state.users.consume_verification_token(user.user_id, &token)? {
        return Err(invalid_token());
    }

    tracing::info!(user_id = user.user_id, username = %user.username, "email verified");

    Ok(Json(ApiResponse::ok_with_message(
        VerifyEmailResponse { username: user.username },
        "Email verified successfully! You can now log in.",
    )))
}
