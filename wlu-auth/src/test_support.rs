use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use wlu_shared::clients::email::EmailError;

use crate::config::AppConfig;
use crate::routes;
use crate::services::mailer::AccountMailer;
use crate::store::{MemoryCredentialStore, MemoryRefreshTokenStore};
use crate::AppState;

#[derive(Debug, Clone, PartialEq)]
pub enum MailKind {
    Verification,
    PasswordReset,
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub kind: MailKind,
    pub to: String,
    pub token: String,
}

/// Captures outgoing mail instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    fn last_token(&self, kind: MailKind, to: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.kind == kind && m.to == to)
            .map(|m| m.token)
    }

    pub fn verification_token_for(&self, to: &str) -> Option<String> {
        self.last_token(MailKind::Verification, to)
    }

    pub fn reset_token_for(&self, to: &str) -> Option<String> {
        self.last_token(MailKind::PasswordReset, to)
    }

    fn record(&self, kind: MailKind, to: &str, token: &str) -> Result<(), EmailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmailError::Rejected { status: 503, body: "unavailable".into() });
        }
        self.sent.lock().unwrap().push(SentMail {
            kind,
            to: to.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountMailer for RecordingMailer {
    async fn send_verification_email(&self, to: &str, _username: &str, token: &str) -> Result<(), EmailError> {
        self.record(MailKind::Verification, to, token)
    }

    async fn send_password_reset_email(&self, to: &str, _username: &str, token: &str) -> Result<(), EmailError> {
        self.record(MailKind::PasswordReset, to, token)
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub users: Arc<MemoryCredentialStore>,
    pub refresh_tokens: Arc<MemoryRefreshTokenStore>,
    pub mailer: Arc<RecordingMailer>,
}

/// Defaults with rate limits high enough not to interfere.
pub fn test_config() -> AppConfig {
    AppConfig {
        login_rate_limit: 1000,
        signup_rate_limit: 1000,
        ..AppConfig::default()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let users = Arc::new(MemoryCredentialStore::new());
        let refresh_tokens = Arc::new(MemoryRefreshTokenStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let state = Arc::new(AppState::new(config, users.clone(), refresh_tokens.clone(), mailer.clone()));

        Self {
            router: routes::router(state.clone()),
            state,
            users,
            refresh_tokens,
            mailer,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(json_request(method, uri, body, None)).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn signup(&self, username: &str, email: &str, password: &str) -> (StatusCode, Value) {
        self.json(
            Method::POST,
            "/auth/signup",
            serde_json::json!({ "username": username, "email": email, "password": password }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.json(Method::POST, "/auth/login", serde_json::json!({ "email": email, "password": password }))
            .await
    }

    /// Signup and verify, returning the verified account's login response.
    pub async fn verified_login(&self, username: &str, email: &str, password: &str) -> Value {
        let (status, _) = self.signup(username, email, password).await;
        assert_eq!(status, StatusCode::CREATED);
        let token = self.mailer.verification_token_for(email).unwrap();
        let (status, _) = self.get(&format!("/auth/verify-email?token={token}")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = self.login(email, password).await;
        assert_eq!(status, StatusCode::OK);
        body
    }
}

/// JSON request, optionally arriving from socket peer `peer_ip`.
pub fn json_request(method: Method, uri: &str, body: Value, peer_ip: Option<&str>) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    if let Some(ip) = peer_ip {
        let addr = SocketAddr::new(ip.parse().unwrap(), 40000);
        req.extensions_mut().insert(ConnectInfo(addr));
    }
    req
}
