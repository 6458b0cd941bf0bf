use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};

use crate::errors::{AppError, ErrorCode};
use crate::types::auth::{AuthUser, Claims};

/// Application state that can check access tokens. Verification is pure
/// (signature and expiry), so implementors never touch storage.
pub trait AccessTokenVerifier {
    fn verify_access_token(&self, token: &str) -> Option<Claims>;
}

impl<T: AccessTokenVerifier + ?Sized> AccessTokenVerifier for Arc<T> {
    fn verify_access_token(&self, token: &str) -> Option<Claims> {
        (**self).verify_access_token(token)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: AccessTokenVerifier + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Access token required"))?;

        let claims = state
            .verify_access_token(token)
            .ok_or_else(|| AppError::new(ErrorCode::TokenInvalid, "Invalid or expired token"))?;

        Ok(AuthUser::from(claims))
    }
}

/// `Authorization: Bearer <token>`; the second space-separated part is the token.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .split_whitespace()
        .nth(1)
}
