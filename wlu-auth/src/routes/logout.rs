use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use wlu_shared::AppResult;

use crate::routes::token::RefreshTokenRequest;
use crate::AppState;

/// Always succeeds unless storage fails; unknown tokens are a no-op.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<RefreshTokenRequest>>,
) -> AppResult<&'static str> {
    if let Some(token) = payload.and_then(|Json(req)| req.token) {
        state.tokens.revoke_refresh_token(&token)?;
        tracing::debug!("refresh token deleted");
    }
    Ok("success! refresh token deleted")
}
