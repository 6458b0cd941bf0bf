//! WLU Connect authentication service.
//!
//! Signup with email verification, login, access/refresh tokens, logout,
//! password reset and the periodic sweep of expired refresh tokens.

use std::sync::Arc;

use wlu_shared::middleware::{AccessTokenVerifier, RateLimiter};
use wlu_shared::types::auth::Claims;

pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;

#[cfg(test)]
mod test_support;

use config::AppConfig;
use services::mailer::AccountMailer;
use services::token_service::TokenEngine;
use store::{CredentialStore, RefreshTokenStore};

pub struct AppState {
    pub config: AppConfig,
    pub users: Arc<dyn CredentialStore>,
    pub tokens: Arc<TokenEngine>,
    pub mailer: Arc<dyn AccountMailer>,
    pub login_limiter: RateLimiter,
    pub signup_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        users: Arc<dyn CredentialStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        mailer: Arc<dyn AccountMailer>,
    ) -> Self {
        let tokens = Arc::new(TokenEngine::new(&config, refresh_tokens));
        let window = config.rate_limit_window();
        let minutes = window.as_secs() / 60;
        let login_limiter = RateLimiter::new(
            config.login_rate_limit,
            window,
            format!("Too many login attempts from this IP, please try again after {minutes} minutes."),
        )
        .with_trusted_proxy_depth(config.trusted_proxy_depth);
        let signup_limiter = RateLimiter::new(
            config.signup_rate_limit,
            window,
            format!("Too many registration attempts from this IP, please try again after {minutes} minutes."),
        )
        .with_trusted_proxy_depth(config.trusted_proxy_depth);

        Self {
            config,
            users,
            tokens,
            mailer,
            login_limiter,
            signup_limiter,
        }
    }
}

impl AccessTokenVerifier for AppState {
    fn verify_access_token(&self, token: &str) -> Option<Claims> {
        self.tokens.verify_access_token(token)
    }
}
