//! Bearer authentication for the protected part of the router.

use crate::auth::AccessGate;
use crate::error::AppError;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Reject the request unless the gate accepts its `Authorization` header. The principal is
/// stored in request extensions for [`crate::extractors::CurrentPrincipal`].
pub async fn require_auth(
    State(gate): State<Arc<dyn AccessGate>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let principal = gate.authenticate(header).map_err(AppError::Unauthorized)?;
    tracing::debug!(email = %principal.email, path = %request.uri().path(), "authenticated");
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
