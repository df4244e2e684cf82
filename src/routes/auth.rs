//! Authentication routes.

use crate::handlers::auth::{login, me};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// `POST /auth/login`, open.
pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

/// `GET /auth/me`, mounted behind authentication.
pub(super) fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(me))
}
