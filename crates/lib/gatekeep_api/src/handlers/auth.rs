//! Authentication request handlers.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use gatekeep_core::session::VerificationOutcome;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{
    AccessTokenResponse, CheckEmailRequest, LoginRequest, LogoutRequest, MessageResponse,
    RefreshRequest, RegisterRequest, RegisterResponse, ResendVerificationRequest, RevokeRequest,
    TokenResponse, VerifyQuery, VerifyResponse,
};

/// `POST /auth/check-email` — 204 if an account exists, 404 otherwise.
pub async fn check_email_handler(
    State(state): State<AppState>,
    Json(body): Json<CheckEmailRequest>,
) -> AppResult<StatusCode> {
    state.sessions.check_by_email(&body.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /auth/login` — authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state.sessions.login(&body.email, &body.password).await?;
    Ok(Json(pair.into()))
}

/// `POST /auth/logout` — revoke the session of a refresh token.
pub async fn logout_handler(
    State(state): State<AppState>,
    Json(body): Json<LogoutRequest>,
) -> AppResult<Json<MessageResponse>> {
    state.sessions.logout(&body.refresh_token).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// `POST /auth/refresh` — exchange a refresh token for a new access token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<AccessTokenResponse>> {
    let access_token = state.sessions.refresh(&body.refresh_token).await?;
    Ok(Json(AccessTokenResponse { access_token }))
}

/// `POST /auth/register` — create an unverified account and mail its link.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let reg = state
        .sessions
        .register(
            &body.email,
            &body.password,
            &body.verification_link,
            body.display_name.as_deref(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: reg.user_id,
            email: reg.email,
        }),
    ))
}

/// `GET /auth/verify?token=` — resolve a verification link.
///
/// An expired or unknown link is reported in the body, not as an error status.
pub async fn verify_handler(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> AppResult<Json<VerifyResponse>> {
    let outcome = state.sessions.verify_email(&query.token).await?;
    Ok(Json(VerifyResponse {
        verified: outcome == VerificationOutcome::Verified,
        message: outcome.message().into(),
    }))
}

/// `POST /auth/verify/resend` — mail a fresh link to an unverified account.
pub async fn resend_verification_handler(
    State(state): State<AppState>,
    Json(body): Json<ResendVerificationRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .sessions
        .resend_verification(&body.email, &body.verification_link)
        .await?;
    Ok(Json(MessageResponse::new("Verification email sent")))
}

/// `POST /auth/revoke` — revoke the session of an access token.
pub async fn revoke_handler(
    State(state): State<AppState>,
    Json(body): Json<RevokeRequest>,
) -> AppResult<Json<MessageResponse>> {
    let message = state.sessions.revoke_token(&body.access_token).await?;
    Ok(Json(MessageResponse::new(message)))
}
