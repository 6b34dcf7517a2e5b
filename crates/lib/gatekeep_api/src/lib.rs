//! # gatekeep_api
//!
//! HTTP API library for Gatekeep.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use gatekeep_core::session::SessionService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{auth, health, me};

/// Route paths.
pub mod routes {
    pub const GET_HEALTH: &str = "/health";
    pub const POST_AUTH_CHECK_EMAIL: &str = "/auth/check-email";
    pub const POST_AUTH_LOGIN: &str = "/auth/login";
    pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
    pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
    pub const POST_AUTH_REGISTER: &str = "/auth/register";
    pub const GET_AUTH_VERIFY: &str = "/auth/verify";
    pub const POST_AUTH_VERIFY_RESEND: &str = "/auth/verify/resend";
    pub const POST_AUTH_REVOKE: &str = "/auth/revoke";
    pub const AUTH_ME: &str = "/auth/me";
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
}

impl AppState {
    pub fn new(sessions: SessionService) -> Self {
        Self {
            sessions: Arc::new(sessions),
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::health_handler))
        .route(routes::POST_AUTH_CHECK_EMAIL, post(auth::check_email_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::GET_AUTH_VERIFY, get(auth::verify_handler))
        .route(
            routes::POST_AUTH_VERIFY_RESEND,
            post(auth::resend_verification_handler),
        )
        .route(routes::POST_AUTH_REVOKE, post(auth::revoke_handler));

    // Protected routes (require a live access token)
    let protected = Router::new()
        .route(
            routes::AUTH_ME,
            get(me::get_profile_handler)
                .patch(me::update_profile_handler)
                .delete(me::delete_account_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
