//! Login and the current-principal endpoint.

use crate::auth::{CredentialIssuer, LoginRequest};
use crate::error::AppError;
use crate::extractors::CurrentPrincipal;
use crate::response::success_one_ok;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

pub async fn login(
    State(issuer): State<Arc<CredentialIssuer>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    Ok(success_one_ok(issuer.login(&request)?))
}

pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> impl IntoResponse {
    success_one_ok(principal)
}
