//! Typed errors and HTTP mapping.

use crate::response::ErrorBody;
use crate::schema::APPOINTMENT_SLOT_INDEX;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Failures raised by an entity store. Converted into [`AppError`] by kind.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A foreign key column points at a row that does not exist. Holds the column name.
    #[error("referenced record does not exist: {0}")]
    MissingReference(String),
    /// Delete blocked by rows in another table. Holds the referencing table.
    #[error("record is still referenced by {0}")]
    StillReferenced(String),
    #[error("missing value for non-null column {0}")]
    NotNull(String),
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation {
        constraint: String,
        column: Option<String>,
    },
    #[error("unknown relation '{relation}' on {table}")]
    UnknownRelation { table: &'static str, relation: String },
    #[error("decode: {0}")]
    Decode(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

/// Why a request was not allowed through the access gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthRejection {
    /// No `Authorization` header, or not of the form `Bearer <token>`.
    MissingOrMalformedHeader,
    /// Token present but signature, claims or expiry are not acceptable.
    InvalidOrExpiredToken,
    /// Login attempt with an unknown identifier or wrong secret.
    InvalidCredentials,
}

impl AuthRejection {
    fn message(self) -> &'static str {
        match self {
            AuthRejection::MissingOrMalformedHeader => "missing or malformed authorization header",
            AuthRejection::InvalidOrExpiredToken => "invalid or expired token",
            AuthRejection::InvalidCredentials => "invalid credentials",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unauthorized: {}", .0.message())]
    Unauthorized(AuthRejection),
    #[error("internal: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: impl std::fmt::Display, id: i64) -> Self {
        AppError::NotFound(format!("{} {} not found", what, id))
    }

    pub fn slot_booked() -> Self {
        AppError::Conflict("time slot already booked".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a caller. Internal detail never leaves the process.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(m) | AppError::NotFound(m) | AppError::Conflict(m) => m.clone(),
            AppError::Unauthorized(r) => r.message().to_string(),
            AppError::Internal(_) => "internal server error".to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingReference(column) => AppError::NotFound(format!(
                "referenced {} does not exist",
                crate::case::to_camel_case(&column)
            )),
            StoreError::StillReferenced(table) => {
                AppError::Conflict(format!("record is still referenced by {}", table))
            }
            StoreError::NotNull(column) => AppError::Validation(format!(
                "{} is required",
                crate::case::to_camel_case(&column)
            )),
            StoreError::UniqueViolation { constraint, .. } if constraint == APPOINTMENT_SLOT_INDEX => {
                AppError::slot_booked()
            }
            StoreError::UniqueViolation { column, .. } => match column {
                Some(col) => AppError::Conflict(format!(
                    "{} is already in use",
                    crate::case::to_camel_case(&col)
                )),
                None => AppError::Conflict("duplicate value for a unique field".into()),
            },
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = ErrorBody {
            ok: false,
            error: self.public_message(),
            status_hint: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_by_kind() {
        let slot: AppError = StoreError::UniqueViolation {
            constraint: APPOINTMENT_SLOT_INDEX.into(),
            column: None,
        }
        .into();
        assert!(matches!(slot, AppError::Conflict(ref m) if m == "time slot already booked"));

        let email: AppError = StoreError::UniqueViolation {
            constraint: "owners_email_key".into(),
            column: Some("email".into()),
        }
        .into();
        assert_eq!(email.status(), StatusCode::CONFLICT);
        assert_eq!(email.public_message(), "email is already in use");

        let missing: AppError = StoreError::MissingReference("owner_id".into()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.public_message(), "referenced ownerId does not exist");

        let referenced: AppError = StoreError::StillReferenced("pets".into()).into();
        assert_eq!(referenced.status(), StatusCode::CONFLICT);
        assert_eq!(referenced.public_message(), "record is still referenced by pets");

        let not_null: AppError = StoreError::NotNull("time_slot".into()).into();
        assert_eq!(not_null.status(), StatusCode::BAD_REQUEST);

        let decode: AppError = StoreError::Decode("bad row".into()).into();
        assert_eq!(decode.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let err = AppError::Internal("connection refused at 10.0.0.3".into());
        assert_eq!(err.public_message(), "internal server error");
        let auth = AppError::Unauthorized(AuthRejection::InvalidOrExpiredToken);
        assert_eq!(auth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(auth.public_message(), "invalid or expired token");
    }
}
