use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use wlu_shared::middleware::AccessTokenVerifier;
use wlu_shared::types::auth::{Claims, TokenPair};
use wlu_shared::{AppError, AppResult};

use crate::config::AppConfig;
use crate::models::NewRefreshToken;
use crate::store::RefreshTokenStore;

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq)]
pub enum RefreshOutcome {
    Granted {
        access_token: String,
        /// Present only when refresh tokens are rotated on use.
        refresh_token: Option<String>,
    },
    Rejected,
}

/// Issues, verifies and rotates access/refresh tokens.
///
/// Access tokens are checked by signature and expiry alone. Refresh tokens must
/// additionally be present and unexpired in the [`RefreshTokenStore`].
pub struct TokenEngine {
    access: SigningKey,
    refresh: SigningKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    rotate_refresh_tokens: bool,
    validation: Validation,
    store: Arc<dyn RefreshTokenStore>,
}

impl TokenEngine {
    pub fn new(config: &AppConfig, store: Arc<dyn RefreshTokenStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access: SigningKey::new(&config.access_token_secret),
            refresh: SigningKey::new(&config.refresh_token_secret),
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
            rotate_refresh_tokens: config.rotate_refresh_tokens,
            validation,
            store,
        }
    }

    fn sign(key: &SigningKey, claims: &Claims) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &key.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT encoding failed: {e}")))
    }

    fn decode_with(&self, key: &SigningKey, token: &str) -> Option<Claims> {
        decode::<Claims>(token, &key.decoding, &self.validation)
            .map(|data| data.claims)
            .ok()
    }

    pub fn issue_access_token(&self, username: &str) -> AppResult<String> {
        let claims = Claims::new(username, Utc::now(), self.access_ttl, Uuid::new_v4().to_string());
        Self::sign(&self.access, &claims)
    }

    /// Sign a refresh token. The caller persists it (see [`Self::start_session`]).
    pub fn issue_refresh_token(&self, username: &str) -> AppResult<IssuedRefreshToken> {
        let now = Utc::now();
        let claims = Claims::new(username, now, self.refresh_ttl, Uuid::new_v4().to_string());
        Ok(IssuedRefreshToken {
            token: Self::sign(&self.refresh, &claims)?,
            expires_at: now + self.refresh_ttl,
        })
    }

    fn persist(&self, username: &str, issued: &IssuedRefreshToken) -> AppResult<()> {
        self.store.insert(NewRefreshToken {
            token: issued.token.clone(),
            username: username.to_string(),
            created_at: Utc::now(),
            expires_at: issued.expires_at,
        })
    }

    /// Issue an access/refresh pair and persist the refresh token.
    pub fn start_session(&self, username: &str) -> AppResult<TokenPair> {
        let access_token = self.issue_access_token(username)?;
        let refresh = self.issue_refresh_token(username)?;
        self.persist(username, &refresh)?;
        Ok(TokenPair::new(access_token, refresh.token))
    }

    pub fn verify_access_token(&self, token: &str) -> Option<Claims> {
        self.decode_with(&self.access, token)
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// Granted only when the token is stored, its record has not expired, its
    /// signature checks out against the refresh secret, and its subject is the
    /// stored owner.
    pub fn rotate_access_token(&self, refresh_token: &str) -> AppResult<RefreshOutcome> {
        let Some(record) = self.store.find_valid(refresh_token, Utc::now())? else {
            return Ok(RefreshOutcome::Rejected);
        };
        let Some(claims) = self.decode_with(&self.refresh, refresh_token) else {
            return Ok(RefreshOutcome::Rejected);
        };
        if claims.sub != record.username {
            tracing::warn!(owner = %record.username, "refresh token subject does not match stored owner");
            return Ok(RefreshOutcome::Rejected);
        }

        if !self.rotate_refresh_tokens {
            let access_token = self.issue_access_token(&record.username)?;
            return Ok(RefreshOutcome::Granted { access_token, refresh_token: None });
        }

        // Single use: whoever deletes the row wins, a concurrent redeemer gets nothing.
        if self.store.delete(refresh_token)? != 1 {
            tracing::warn!(owner = %record.username, "refresh token already redeemed");
            return Ok(RefreshOutcome::Rejected);
        }
        let next = self.issue_refresh_token(&record.username)?;
        self.persist(&record.username, &next)?;
        let access_token = self.issue_access_token(&record.username)?;
        tracing::debug!(username = %record.username, "refresh token rotated");

        Ok(RefreshOutcome::Granted {
            access_token,
            refresh_token: Some(next.token),
        })
    }

    /// Deleting a token that is not stored is not an error.
    pub fn revoke_refresh_token(&self, token: &str) -> AppResult<()> {
        self.store.delete(token)?;
        Ok(())
    }

    pub fn revoke_all_for(&self, username: &str) -> AppResult<usize> {
        self.store.delete_for_user(username)
    }

    /// Delete every expired refresh token. Never fails; errors are logged and
    /// reported as zero rows.
    pub fn sweep_expired(&self) -> usize {
        match self.store.delete_expired(Utc::now()) {
            Ok(0) => 0,
            Ok(deleted) => {
                tracing::info!(deleted, "swept expired refresh tokens");
                deleted
            }
            Err(e) => {
                tracing::error!(error = %e, "refresh token sweep failed");
                0
            }
        }
    }
}

impl AccessTokenVerifier for TokenEngine {
    fn verify_access_token(&self, token: &str) -> Option<Claims> {
        TokenEngine::verify_access_token(self, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RefreshToken;
    use crate::store::MemoryRefreshTokenStore;

    fn engine_with(config: AppConfig) -> (TokenEngine, Arc<MemoryRefreshTokenStore>) {
        let store = Arc::new(MemoryRefreshTokenStore::new());
        (TokenEngine::new(&config, store.clone()), store)
    }

    fn engine() -> (TokenEngine, Arc<MemoryRefreshTokenStore>) {
        engine_with(AppConfig::default())
    }

    fn store_raw(store: &MemoryRefreshTokenStore, token: &str, username: &str, expires_at: DateTime<Utc>) {
        store
            .insert(NewRefreshToken {
                token: token.into(),
                username: username.into(),
                created_at: Utc::now(),
                expires_at,
            })
            .unwrap();
    }

    struct FailingStore;

    impl RefreshTokenStore for FailingStore {
        fn insert(&self, _: NewRefreshToken) -> AppResult<()> {
            Err(AppError::Internal(anyhow::anyhow!("store down")))
        }
        fn find_valid(&self, _: &str, _: DateTime<Utc>) -> AppResult<Option<RefreshToken>> {
            Err(AppError::Internal(anyhow::anyhow!("store down")))
        }
        fn delete(&self, _: &str) -> AppResult<usize> {
            Err(AppError::Internal(anyhow::anyhow!("store down")))
        }
        fn delete_for_user(&self, _: &str) -> AppResult<usize> {
            Err(AppError::Internal(anyhow::anyhow!("store down")))
        }
        fn delete_expired(&self, _: DateTime<Utc>) -> AppResult<usize> {
            Err(AppError::Internal(anyhow::anyhow!("store down")))
        }
    }

    #[test]
    fn access_token_round_trips_username() {
        let (engine, _) = engine();
        let token = engine.issue_access_token("alice").unwrap();
        let claims = engine.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn expired_access_token_is_invalid() {
        let (engine, _) = engine_with(AppConfig { access_token_ttl_secs: -60, ..AppConfig::default() });
        let token = engine.issue_access_token("alice").unwrap();
        assert!(engine.verify_access_token(&token).is_none());
    }

    #[test]
    fn tokens_signed_with_another_secret_are_invalid() {
        let (engine, _) = engine();
        let (other, _) = engine_with(AppConfig {
            access_token_secret: "someone-else".into(),
            ..AppConfig::default()
        });
        let token = other.issue_access_token("alice").unwrap();
        assert!(engine.verify_access_token(&token).is_none());

        // A refresh token is not an access token.
        let refresh = engine.issue_refresh_token("alice").unwrap();
        assert!(engine.verify_access_token(&refresh.token).is_none());
    }

    #[test]
    fn tokens_issued_together_are_distinct() {
        let (engine, _) = engine();
        let a = engine.issue_refresh_token("alice").unwrap();
        let b = engine.issue_refresh_token("alice").unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn start_session_persists_refresh_token() {
        let (engine, store) = engine();
        let pair = engine.start_session("alice").unwrap();
        assert!(store.contains(&pair.refresh_token));
        assert!(engine.verify_access_token(&pair.access_token).is_some());
    }

    #[test]
    fn rotation_granted_without_invalidating_refresh_token() {
        let (engine, store) = engine();
        let pair = engine.start_session("alice").unwrap();

        for _ in 0..2 {
            match engine.rotate_access_token(&pair.refresh_token).unwrap() {
                RefreshOutcome::Granted { access_token, refresh_token } => {
                    assert_eq!(engine.verify_access_token(&access_token).unwrap().sub, "alice");
                    assert!(refresh_token.is_none());
                }
                RefreshOutcome::Rejected => panic!("expected refresh to be granted"),
            }
        }
        assert!(store.contains(&pair.refresh_token));
    }

    #[test]
    fn rotation_rejected_when_not_stored() {
        let (engine, _) = engine();
        let issued = engine.issue_refresh_token("alice").unwrap();
        assert_eq!(engine.rotate_access_token(&issued.token).unwrap(), RefreshOutcome::Rejected);
    }

    #[test]
    fn rotation_rejected_when_record_expired() {
        let (engine, store) = engine();
        let issued = engine.issue_refresh_token("alice").unwrap();
        store_raw(&store, &issued.token, "alice", Utc::now() - Duration::seconds(1));
        assert_eq!(engine.rotate_access_token(&issued.token).unwrap(), RefreshOutcome::Rejected);
    }

    #[test]
    fn rotation_rejected_when_signature_fails() {
        let (engine, store) = engine();
        let (forger, _) = engine_with(AppConfig {
            refresh_token_secret: "forged".into(),
            ..AppConfig::default()
        });
        let forged = forger.issue_refresh_token("alice").unwrap();
        store_raw(&store, &forged.token, "alice", Utc::now() + Duration::days(7));
        assert_eq!(engine.rotate_access_token(&forged.token).unwrap(), RefreshOutcome::Rejected);

        store_raw(&store, "not-a-jwt", "alice", Utc::now() + Duration::days(7));
        assert_eq!(engine.rotate_access_token("not-a-jwt").unwrap(), RefreshOutcome::Rejected);
    }

    #[test]
    fn rotation_rejected_when_subject_differs_from_owner() {
        let (engine, store) = engine();
        let issued = engine.issue_refresh_token("mallory").unwrap();
        store_raw(&store, &issued.token, "alice", issued.expires_at);
        assert_eq!(engine.rotate_access_token(&issued.token).unwrap(), RefreshOutcome::Rejected);
    }

    #[test]
    fn rotating_mode_replaces_the_refresh_token() {
        let (engine, store) = engine_with(AppConfig { rotate_refresh_tokens: true, ..AppConfig::default() });
        let pair = engine.start_session("alice").unwrap();

        let next = match engine.rotate_access_token(&pair.refresh_token).unwrap() {
            RefreshOutcome::Granted { refresh_token: Some(next), .. } => next,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert!(!store.contains(&pair.refresh_token));
        assert!(store.contains(&next));
        assert_eq!(engine.rotate_access_token(&pair.refresh_token).unwrap(), RefreshOutcome::Rejected);
    }

    /// Holds every `find_valid` caller until `parties` of them have looked the
    /// token up, so they all see it as live before anyone deletes it.
    struct LockstepStore {
        inner: MemoryRefreshTokenStore,
        barrier: std::sync::Barrier,
    }

    impl RefreshTokenStore for LockstepStore {
        fn insert(&self, token: NewRefreshToken) -> AppResult<()> {
            self.inner.insert(token)
        }
        fn find_valid(&self, token: &str, now: DateTime<Utc>) -> AppResult<Option<RefreshToken>> {
            let found = self.inner.find_valid(token, now);
            self.barrier.wait();
            found
        }
        fn delete(&self, token: &str) -> AppResult<usize> {
            self.inner.delete(token)
        }
        fn delete_for_user(&self, username: &str) -> AppResult<usize> {
            self.inner.delete_for_user(username)
        }
        fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
            self.inner.delete_expired(now)
        }
    }

    #[test]
    fn concurrent_rotation_grants_exactly_one() {
        let config = AppConfig { rotate_refresh_tokens: true, ..AppConfig::default() };
        let seed = TokenEngine::new(&config, Arc::new(MemoryRefreshTokenStore::new()));
        let issued = seed.issue_refresh_token("alice").unwrap();

        let store = Arc::new(LockstepStore {
            inner: MemoryRefreshTokenStore::new(),
            barrier: std::sync::Barrier::new(2),
        });
        store_raw(&store.inner, &issued.token, "alice", issued.expires_at);
        let engine = TokenEngine::new(&config, store.clone());

        let outcomes: Vec<RefreshOutcome> = std::thread::scope(|scope| {
            let racers: Vec<_> = (0..2)
                .map(|_| scope.spawn(|| engine.rotate_access_token(&issued.token).unwrap()))
                .collect();
            racers.into_iter().map(|r| r.join().unwrap()).collect()
        });

        let granted = outcomes
            .iter()
            .filter(|o| matches!(o, RefreshOutcome::Granted { .. }))
            .count();
        assert_eq!(granted, 1);
        assert!(outcomes.contains(&RefreshOutcome::Rejected));
        assert!(!store.inner.contains(&issued.token));
        assert_eq!(store.inner.len(), 1);
    }

    #[test]
    fn revoke_is_idempotent() {
        let (engine, store) = engine();
        let pair = engine.start_session("alice").unwrap();
        engine.revoke_refresh_token(&pair.refresh_token).unwrap();
        engine.revoke_refresh_token(&pair.refresh_token).unwrap();
        assert!(!store.contains(&pair.refresh_token));
        assert_eq!(engine.rotate_access_token(&pair.refresh_token).unwrap(), RefreshOutcome::Rejected);
    }

    #[test]
    fn revoke_all_signs_out_every_session() {
        let (engine, store) = engine();
        engine.start_session("alice").unwrap();
        engine.start_session("alice").unwrap();
        let bob = engine.start_session("bob").unwrap();

        assert_eq!(engine.revoke_all_for("alice").unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&bob.refresh_token));
    }

    #[test]
    fn sweep_removes_expired_and_keeps_valid() {
        let (engine, store) = engine();
        let live = engine.start_session("alice").unwrap();
        store_raw(&store, "stale-1", "alice", Utc::now() - Duration::hours(1));
        store_raw(&store, "stale-2", "bob", Utc::now() - Duration::days(8));

        assert_eq!(engine.sweep_expired(), 2);
        assert!(store.contains(&live.refresh_token));
        assert_eq!(engine.sweep_expired(), 0);
    }

    #[test]
    fn store_failures_surface_but_sweep_swallows_them() {
        let engine = TokenEngine::new(&AppConfig::default(), Arc::new(FailingStore));
        assert!(engine.start_session("alice").is_err());
        assert!(engine.rotate_access_token("anything").is_err());
        assert_eq!(engine.sweep_expired(), 0);
    }
}
