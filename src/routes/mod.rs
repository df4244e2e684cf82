//! Router assembly.

mod auth;
mod common;
mod entity;

pub use auth::auth_routes;
pub use common::common_routes;
pub use entity::entity_routes;

use crate::middleware::require_auth;
use crate::state::AppState;
use axum::{middleware::from_fn_with_state, Router};

/// Full application router: open health routes, `/api/v1/auth/login`, and everything else
/// under `/api/v1` behind bearer authentication.
pub fn app_router(state: AppState) -> Router {
    let protected = entity_routes()
        .merge(auth::me_routes())
        .route_layer(from_fn_with_state(state.clone(), require_auth));
    let api = auth_routes().merge(protected);
    Router::new()
        .merge(common_routes())
        .nest("/api/v1", api)
        .with_state(state)
}
