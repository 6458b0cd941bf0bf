use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use wlu_shared::types::auth::TokenPair;
use wlu_shared::types::ApiResponse;
use wlu_shared::{AppError, AppResult, ErrorCode};

use crate::models::NewUser;
use crate::routes::json_body;
use crate::services::auth_service;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[serde(default)]
    #[validate(length(max = 50, message = "Username must be at most 50 characters"))]
    pub username: String,
    #[serde(default)]
    #[validate(
        email(message = "Invalid email format"),
        length(max = 254, message = "Email must be at most 254 characters")
    )]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub user_id: i32,
    #[serde(flatten)]
    pub tokens: Option<TokenPair>,
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<SignupResponse>>)> {
    let mut req = json_body(payload)?;
    req.username = req.username.trim().to_string();
    req.email = auth_service::normalize_email(&req.email);

    if req.username.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(AppError::validation("Username, email, and password are required"));
    }
    req.validate()?;
    auth_service::validate_password(&req.password)?;

    // Fast path only; the unique constraints on insert are authoritative.
    if state.users.find_by_username(&req.username)?.is_some() {
        return Err(AppError::new(ErrorCode::UsernameAlreadyExists, "Username already taken"));
    }
    if state.users.find_by_email(&req.email)?.is_some() {
        return Err(AppError::new(ErrorCode::EmailAlreadyExists, "Email already registered"));
    }

    let password_hash = auth_service::hash_password(&req.password)?;
    let now = Utc::now();

    if !state.config.require_email_verification {
        let user = state.users.insert(NewUser {
            username: req.username,
            email: req.email,
            password_hash,
            email_verified: true,
            verification_token: None,
            verification_token_expires: None,
            created_at: now,
        })?;
        let tokens = state.tokens.start_session(&user.username)?;

        tracing::info!(user_id = user.user_id, username = %user.username, "user registered and signed in");

        return Ok((
            StatusCode::CREATED,
            Json(ApiResponse::ok_with_message(
                SignupResponse { user_id: user.user_id, tokens: Some(tokens) },
                format!("user {} added successfully", user.username),
            )),
        ));
    }

    let verification_token = auth_service::generate_opaque_token();
    let user = state.users.insert(NewUser {
        username: req.username,
        email: req.email,
        password_hash,
        email_verified: false,
        verification_token: Some(verification_token.clone()),
        verification_token_expires: Some(now + state.config.verification_ttl()),
        created_at: now,
    })?;

    tracing::info!(user_id = user.user_id, username = %user.username, "user registered");

    // The account stays even when the email cannot be delivered.
    if let Err(e) = state
        .mailer
        .send_verification_email(&user.email, &user.username, &verification_token)
        .await
    {
        tracing::error!(error = %e, user_id = user.user_id, "failed to send verification email");
        return Err(AppError::with_details(
            ErrorCode::EmailDeliveryFailed,
            "Account created, but the verification email could not be sent. Please contact support.",
            serde_json::json!({ "userId": user.user_id }),
        ));
    }

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(
            SignupResponse { user_id: user.user_id, tokens: None },
            "Account created! Please check your email to verify your account.",
        )),
    ))
}
