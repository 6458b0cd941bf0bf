use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use wlu_shared::middleware::RateLimiter;

use super::token_service::TokenEngine;

/// Sweep expired refresh tokens now and then every `every` until `cancel` fires.
/// Each pass also forgets rate-limit entries that have fully refilled.
pub fn spawn_sweeper(
    engine: Arc<TokenEngine>,
    limiters: Vec<RateLimiter>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("refresh token sweeper stopped");
                    break;
                }
                // The first tick completes immediately.
                _ = ticker.tick() => {
                    let engine = engine.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || engine.sweep_expired()).await {
                        tracing::error!(error = %e, "refresh token sweep task panicked");
                    }
                    let tracked: usize = limiters.iter().map(RateLimiter::prune).sum();
                    tracing::debug!(tracked, "rate limiter entries pruned");
                }
            }
        }
    })
}
