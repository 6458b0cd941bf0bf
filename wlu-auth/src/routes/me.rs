use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use wlu_shared::types::auth::AuthUser;
use wlu_shared::types::ApiResponse;
use wlu_shared::{AppError, AppResult, ErrorCode};

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeUser {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
    pub program: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: MeUser,
}

pub async fn me(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<MeResponse>>> {
    let account = state
        .users
        .find_by_username(&user.username)?
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "Account no longer exists"))?;

    Ok(Json(ApiResponse::ok(MeResponse {
        user: MeUser {
            id: account.user_id,
            username: account.username,
            email: account.email,
            email_verified: account.email_verified,
            bio: account.bio,
            profile_picture_url: account.profile_picture_url,
            program: account.program,
            created_at: account.created_at,
        },
    })))
}
