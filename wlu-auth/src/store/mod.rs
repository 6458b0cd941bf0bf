//! Persistence seams for the auth core.
//!
//! Both stores are synchronous: every operation is a single statement against
//! the relational store (or a single critical section in memory), so no
//! multi-step transaction is ever held open across an `.await`.

mod memory;
mod postgres;

pub use memory::{MemoryCredentialStore, MemoryRefreshTokenStore};
pub use postgres::{PgCredentialStore, PgRefreshTokenStore};

use chrono::{DateTime, Utc};
use wlu_shared::AppResult;

use crate::models::{NewRefreshToken, NewUser, RefreshToken, User};

/// User accounts with their credential and inline verification/reset tokens.
pub trait CredentialStore: Send + Sync {
    fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;

    fn find_by_verification_token(&self, token: &str) -> AppResult<Option<User>>;

    fn find_by_reset_token(&self, token: &str) -> AppResult<Option<User>>;

    /// Unique-constraint violations surface as `UsernameAlreadyExists` /
    /// `EmailAlreadyExists`; this is the authoritative duplicate check.
    fn insert(&self, user: NewUser) -> AppResult<User>;

    /// Set `email_verified` and clear both verification fields, but only while
    /// `token` is still the user's current token. Returns whether a row changed.
    fn consume_verification_token(&self, user_id: i32, token: &str) -> AppResult<bool>;

    /// Replace the pending verification token, invalidating any previous one.
    fn set_verification_token(&self, user_id: i32, token: &str, expires_at: DateTime<Utc>) -> AppResult<()>;

    fn set_reset_token(&self, user_id: i32, token: &str, expires_at: DateTime<Utc>) -> AppResult<()>;

    /// Write the new hash and clear the reset fields while `token` is still current.
    fn reset_password(&self, user_id: i32, token: &str, password_hash: &str) -> AppResult<bool>;

    fn ping(&self) -> AppResult<()>;
}

/// Persisted refresh tokens keyed by the literal token string.
pub trait RefreshTokenStore: Send + Sync {
    fn insert(&self, token: NewRefreshToken) -> AppResult<()>;

    /// The record for `token` if it exists and `expires_at > now`.
    fn find_valid(&self, token: &str, now: DateTime<Utc>) -> AppResult<Option<RefreshToken>>;

    /// Number of rows removed (0 or 1).
    fn delete(&self, token: &str) -> AppResult<usize>;

    fn delete_for_user(&self, username: &str) -> AppResult<usize>;

    /// Remove every record with `expires_at < now`.
    fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<usize>;
}
