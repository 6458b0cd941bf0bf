use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried by both access and refresh tokens. The subject is the
/// username, which is immutable after signup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn new(username: impl Into<String>, issued_at: DateTime<Utc>, ttl: Duration, jti: impl Into<String>) -> Self {
        Self {
            sub: username.into(),
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            jti: jti.into(),
        }
    }
}

/// Identity of the caller on a request that presented a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self { username: claims.sub }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }
}
