use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use wlu_shared::{AppError, AppResult, ErrorCode};

use super::{CredentialStore, RefreshTokenStore};
use crate::models::{NewRefreshToken, NewUser, RefreshToken, User};

/// In-process credential store with the same uniqueness rules as the
/// `users` table. Backs the router tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<UserTable>,
}

#[derive(Default)]
struct UserTable {
    next_id: i32,
    rows: Vec<User>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> AppResult<std::sync::MutexGuard<'_, UserTable>> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("credential store lock poisoned")))
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> AppResult<Option<User>> {
        Ok(self.table()?.rows.iter().find(|u| pred(u)).cloned())
    }

    /// Overwrite a row wholesale. Lets tests move expiries into the past.
    pub fn update(&self, user_id: i32, f: impl FnOnce(&mut User)) -> AppResult<bool> {
        let mut table = self.table()?;
        Ok(match table.rows.iter_mut().find(|u| u.user_id == user_id) {
            Some(user) => {
                f(user);
                true
            }
            None => false,
        })
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.find(|u| u.email == email)
    }

    fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        self.find(|u| u.username == username)
    }

    fn find_by_verification_token(&self, token: &str) -> AppResult<Option<User>> {
        self.find(|u| u.verification_token.as_deref() == Some(token))
    }

    fn find_by_reset_token(&self, token: &str) -> AppResult<Option<User>> {
        self.find(|u| u.reset_token.as_deref() == Some(token))
    }

    fn insert(&self, user: NewUser) -> AppResult<User> {
        let mut table = self.table()?;
        if table.rows.iter().any(|u| u.username == user.username) {
            return Err(AppError::new(ErrorCode::UsernameAlreadyExists, "Username already taken"));
        }
        if table.rows.iter().any(|u| u.email == user.email) {
            return Err(AppError::new(ErrorCode::EmailAlreadyExists, "Email already registered"));
        }

        table.next_id += 1;
        let row = User {
            user_id: table.next_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            bio: None,
            profile_picture_url: None,
            program: None,
            email_verified: user.email_verified,
            verification_token: user.verification_token,
            verification_token_expires: user.verification_token_expires,
            reset_token: None,
            reset_token_expires: None,
            created_at: user.created_at,
        };
        table.rows.push(row.clone());
        Ok(row)
    }

    fn consume_verification_token(&self, user_id: i32, token: &str) -> AppResult<bool> {
        let mut table = self.table()?;
        let row = table
            .rows
            .iter_mut()
            .find(|u| u.user_id == user_id && u.verification_token.as_deref() == Some(token));
        Ok(match row {
            Some(user) => {
                user.email_verified = true;
                user.verification_token = None;
                user.verification_token_expires = None;
                true
            }
            None => false,
        })
    }

    fn set_verification_token(&self, user_id: i32, token: &str, expires_at: DateTime<Utc>) -> AppResult<()> {
        self.update(user_id, |u| {
            u.verification_token = Some(token.to_string());
            u.verification_token_expires = Some(expires_at);
        })?;
        Ok(())
    }

    fn set_reset_token(&self, user_id: i32, token: &str, expires_at: DateTime<Utc>) -> AppResult<()> {
        self.update(user_id, |u| {
            u.reset_token = Some(token.to_string());
            u.reset_token_expires = Some(expires_at);
        })?;
        Ok(())
    }

    fn reset_password(&self, user_id: i32, token: &str, password_hash: &str) -> AppResult<bool> {
        let mut table = self.table()?;
        let row = table
            .rows
            .iter_mut()
            .find(|u| u.user_id == user_id && u.reset_token.as_deref() == Some(token));
        Ok(match row {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.reset_token = None;
                user.reset_token_expires = None;
                true
            }
            None => false,
        })
    }

    fn ping(&self) -> AppResult<()> {
        self.table().map(|_| ())
    }
}

#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    rows: Mutex<HashMap<String, RefreshToken>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, RefreshToken>>> {
        self.rows
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("refresh token store lock poisoned")))
    }

    /// Whether a row exists for `token`, expired or not.
    pub fn contains(&self, token: &str) -> bool {
        self.rows().map(|rows| rows.contains_key(token)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.rows().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RefreshTokenStore for MemoryRefreshTokenStore {
    fn insert(&self, token: NewRefreshToken) -> AppResult<()> {
        let mut rows = self.rows()?;
        if rows.contains_key(&token.token) {
            return Err(AppError::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                Box::new("refresh_tokens_pkey".to_string()),
            )));
        }
        rows.insert(
            token.token.clone(),
            RefreshToken {
                token: token.token,
                username: token.username,
                created_at: token.created_at,
                expires_at: token.expires_at,
            },
        );
        Ok(())
    }

    fn find_valid(&self, token: &str, now: DateTime<Utc>) -> AppResult<Option<RefreshToken>> {
        Ok(self.rows()?.get(token).filter(|r| r.is_valid_at(now)).cloned())
    }

    fn delete(&self, token: &str) -> AppResult<usize> {
        Ok(self.rows()?.remove(token).map_or(0, |_| 1))
    }

    fn delete_for_user(&self, username: &str) -> AppResult<usize> {
        let mut rows = self.rows()?;
        let before = rows.len();
        rows.retain(|_, r| r.username != username);
        Ok(before - rows.len())
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let mut rows = self.rows()?;
        let before = rows.len();
        rows.retain(|_, r| r.expires_at >= now);
        Ok(before - rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            email_verified: false,
            verification_token: Some(format!("tok-{username}")),
            verification_token_expires: Some(Utc::now() + Duration::hours(24)),
            created_at: Utc::now(),
        }
    }

    fn record(token: &str, expires_at: DateTime<Utc>) -> NewRefreshToken {
        NewRefreshToken {
            token: token.into(),
            username: "alice".into(),
            created_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn insert_enforces_unique_username_and_email() {
        let store = MemoryCredentialStore::new();
        let alice = store.insert(new_user("alice", "alice@x.edu")).unwrap();
        assert_eq!(alice.user_id, 1);

        let err = store.insert(new_user("alice", "other@x.edu")).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::UsernameAlreadyExists);

        let err = store.insert(new_user("bob", "alice@x.edu")).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::EmailAlreadyExists);
    }

    #[test]
    fn consuming_verification_token_is_single_use() {
        let store = MemoryCredentialStore::new();
        let alice = store.insert(new_user("alice", "alice@x.edu")).unwrap();

        assert!(store.consume_verification_token(alice.user_id, "tok-alice").unwrap());
        assert!(!store.consume_verification_token(alice.user_id, "tok-alice").unwrap());

        let alice = store.find_by_username("alice").unwrap().unwrap();
        assert!(alice.email_verified);
        assert!(alice.verification_token.is_none());
        assert!(alice.verification_token_expires.is_none());
    }

    #[test]
    fn replacing_verification_token_invalidates_old_one() {
        let store = MemoryCredentialStore::new();
        let alice = store.insert(new_user("alice", "alice@x.edu")).unwrap();
        store
            .set_verification_token(alice.user_id, "fresh", Utc::now() + Duration::hours(24))
            .unwrap();

        assert!(store.find_by_verification_token("tok-alice").unwrap().is_none());
        assert!(!store.consume_verification_token(alice.user_id, "tok-alice").unwrap());
        assert!(store.consume_verification_token(alice.user_id, "fresh").unwrap());
    }

    #[test]
    fn find_valid_requires_future_expiry() {
        let store = MemoryRefreshTokenStore::new();
        let now = Utc::now();
        store.insert(record("live", now + Duration::days(7))).unwrap();
        store.insert(record("dead", now - Duration::seconds(1))).unwrap();

        assert!(store.find_valid("live", now).unwrap().is_some());
        assert!(store.find_valid("dead", now).unwrap().is_none());
        assert!(store.find_valid("missing", now).unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemoryRefreshTokenStore::new();
        store.insert(record("t", Utc::now() + Duration::days(7))).unwrap();
        assert_eq!(store.delete("t").unwrap(), 1);
        assert_eq!(store.delete("t").unwrap(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn delete_expired_removes_only_expired_rows() {
        let store = MemoryRefreshTokenStore::new();
        let now = Utc::now();
        for i in 0..5 {
            store.insert(record(&format!("old-{i}"), now - Duration::minutes(i + 1))).unwrap();
            store.insert(record(&format!("new-{i}"), now + Duration::minutes(i + 1))).unwrap();
        }

        assert_eq!(store.delete_expired(now).unwrap(), 5);
        assert_eq!(store.len(), 5);
        assert!((0..5).all(|i| store.contains(&format!("new-{i}"))));
        assert!((0..5).all(|i| !store.contains(&format!("old-{i}"))));
    }
}
