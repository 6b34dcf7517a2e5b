//! Handlers for the authenticated user's own account.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{UpdateProfileRequest, UserResponse};

/// `GET /auth/me`
pub async fn get_profile_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> AppResult<Json<UserResponse>> {
    let user = state.sessions.profile(&claims.sub).await?;
    Ok(Json(user.into()))
}

/// `PATCH /auth/me` — change the display name.
pub async fn update_profile_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .sessions
        .update_display_name(&claims.sub, &body.display_name)
        .await?;
    Ok(Json(user.into()))
}

/// `DELETE /auth/me` — delete the account and end the calling session.
pub async fn delete_account_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> AppResult<StatusCode> {
    state.sessions.delete_account(&claims).await?;
    Ok(StatusCode::NO_CONTENT)
}
