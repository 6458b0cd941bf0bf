use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::routing::{delete, get, post};
use axum::{middleware, Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use wlu_shared::middleware::rate_limit;
use wlu_shared::{AppError, AppResult};

use crate::AppState;

pub mod forgot_password;
pub mod health;
pub mod login;
pub mod logout;
pub mod me;
pub mod resend_verification;
pub mod reset_password;
pub mod signup;
pub mod token;
pub mod verify_email;


pub fn router(state: Arc<AppState>) -> Router {
    let signup = post(signup::signup)
        .layer(middleware::from_fn_with_state(state.signup_limiter.clone(), rate_limit));
    let login = post(login::login)
        .layer(middleware::from_fn_with_state(state.login_limiter.clone(), rate_limit));

    let auth = Router::new()
        .route("/signup", signup)
        .route("/login", login)
        .route("/token", post(token::token))
        .route("/logout", delete(logout::logout))
        .route("/verify-email", get(verify_email::verify_email))
        .route("/resend-verification", post(resend_verification::resend_verification))
        .route("/forgot-password", post(forgot_password::forgot_password))
        .route("/reset-password", post(reset_password::reset_password))
        .route("/me", get(me::me));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/auth", auth)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Malformed or non-JSON bodies are validation errors in the usual envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}
