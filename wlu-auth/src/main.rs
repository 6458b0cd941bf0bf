use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use wlu_auth::config::AppConfig;
use wlu_auth::routes;
use wlu_auth::services::mailer::SendGridMailer;
use wlu_auth::services::sweeper::spawn_sweeper;
use wlu_auth::store::{PgCredentialStore, PgRefreshTokenStore};
use wlu_auth::AppState;
use wlu_shared::clients::db::create_pool;
use wlu_shared::clients::email::EmailClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    wlu_shared::middleware::init_tracing("wlu_auth");

    let production = std::env::var("WLU_ENV").is_ok_and(|env| env == "production");
    let config = AppConfig::load()?;
    config.validate(production).context("invalid configuration")?;
    let port = config.port;

    let db = create_pool(&config.database_url).context("failed to create database pool")?;
    let email = EmailClient::new(&config.sendgrid_api_key, &config.email_from, "WLU Connect");
    if !email.is_configured() {
        tracing::warn!("sendgrid api key not set; verification emails will fail");
    }
    let mailer = Arc::new(SendGridMailer::new(
        email,
        &config.frontend_url,
        config.verification_ttl(),
        config.password_reset_ttl(),
    ));

    let sweep_interval = config.sweep_interval();
    let state = Arc::new(AppState::new(
        config,
        Arc::new(PgCredentialStore::new(db.clone())),
        Arc::new(PgRefreshTokenStore::new(db)),
        mailer,
    ));

    let shutdown = CancellationToken::new();
    let limiters = vec![state.login_limiter.clone(), state.signup_limiter.clone()];
    let sweeper = spawn_sweeper(state.tokens.clone(), limiters, sweep_interval, shutdown.clone());

    let app = routes::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "wlu-auth starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    sweeper.await.ok();
    tracing::info!("wlu-auth stopped");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
