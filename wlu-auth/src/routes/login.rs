use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use wlu_shared::types::auth::TokenPair;
use wlu_shared::types::ApiResponse;
use wlu_shared::{AppError, AppResult, ErrorCode};

use crate::routes::json_body;
use crate::services::auth_service;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: i32,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: LoginUser,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let req = json_body(payload)?;
    let email = auth_service::normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }

    let user = state
        .users
        .find_by_email(&email)?
        .ok_or_else(|| AppError::new(ErrorCode::AccountNotFound, "Account does not exist"))?;

    // Unverified accounts get the verification signal whatever the password.
    if !user.email_verified {
        return Err(AppError::with_details(
            ErrorCode::EmailNotVerified,
            "Please verify your email before logging in",
            serde_json::json!({ "needsVerification": true, "email": user.email }),
        ));
    }

    if !auth_service::verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::new(ErrorCode::InvalidPassword, "Incorrect password"));
    }

    let tokens = state.tokens.start_session(&user.username)?;

    tracing::info!(user_id = user.user_id, username = %user.username, "user logged in");

    Ok(Json(ApiResponse::ok(LoginResponse {
        tokens,
        user: LoginUser {
            id: user.user_id,
            username: user.username,
            email: user.email,
        },
    })))
}
