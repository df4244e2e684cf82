//! HTTP handlers: generic entity CRUD, scheduling operations and login.

pub mod auth;
pub mod entity;
pub mod scheduling;

use crate::case::object_keys_to_snake_case;
use crate::error::AppError;
use crate::store::Record;
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde_json::Value;

/// Path id as a positive integer.
pub(crate) fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::Validation(format!("invalid id '{}'", raw)))
}

/// JSON object body with keys converted to column names.
pub(crate) fn body_to_record(body: Result<Json<Value>, JsonRejection>) -> Result<Record, AppError> {
    let Json(value) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    match value {
        Value::Object(m) => Ok(object_keys_to_snake_case(m)),
        _ => Err(AppError::Validation("body must be a JSON object".into())),
    }
}
