use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use sea_orm::{DbErr, SqlErr};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CampusError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(campus::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(campus::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(campus::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(campus::db))]
    Db(#[from] DbErr),

    #[error("JOSE error: {0}")]
    #[diagnostic(code(campus::jose))]
    Jose(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("Bad request: {0}")]
    #[diagnostic(code(campus::bad_request))]
    BadRequest(String),

    #[error("{0}")]
    #[diagnostic(code(campus::other))]
    Other(String),
}

impl From<josekit::JoseError> for CampusError {
    fn from(value: josekit::JoseError) -> Self {
        CampusError::Jose(value.to_string())
    }
}

/// Errors surfaced by the storage port. Callers branch on the variant,
/// never on the driver's message text.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    #[diagnostic(
        code(campus::store::unavailable),
        help("Check `database.url`, or enable `storage.fallback_to_memory`")
    )]
    Unavailable(String),

    #[error("conflict: {0}")]
    #[diagnostic(code(campus::store::conflict))]
    Conflict(String),

    #[error("not found: {0}")]
    #[diagnostic(code(campus::store::not_found))]
    NotFound(String),

    #[error("storage error: {0}")]
    #[diagnostic(code(campus::store::backend))]
    Backend(String),
}

impl StoreError {
    /// Whether the store as a whole is unreachable. Backend errors can come
    /// from one record's data (bad encoding, a foreign key) and are not fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return StoreError::Conflict(detail);
        }
        match err {
            DbErr::Conn(e) => StoreError::Unavailable(e.to_string()),
            DbErr::ConnectionAcquire(e) => StoreError::Unavailable(e.to_string()),
            DbErr::RecordNotFound(what) => StoreError::NotFound(what),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// JSON error response: `{"error": code, "error_description": text}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    description: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, description: impl Into<String>) -> Self {
        Self {
            status,
            code,
            description: description.into(),
        }
    }

    pub fn bad_request(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", description)
    }

    pub fn unauthorized(code: &'static str, description: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, description)
    }

    pub fn forbidden(description: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", description)
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", description)
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "server_error", description)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.code, "error_description": self.description });
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::Conflict(_) => Self::new(StatusCode::CONFLICT, "conflict", err.to_string()),
            StoreError::NotFound(_) => Self::not_found(err.to_string()),
            StoreError::Unavailable(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
                err.to_string(),
            ),
            StoreError::Backend(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<CampusError> for ApiError {
    fn from(err: CampusError) -> Self {
        match err {
            CampusError::Store(e) => e.into(),
            CampusError::BadRequest(msg) => Self::bad_request(msg),
            other => Self::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_not_found_maps_to_not_found() {
        let err: StoreError = DbErr::RecordNotFound("course 7".into()).into();
        assert!(matches!(err, StoreError::NotFound(ref s) if s == "course 7"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_other_db_errors_are_backend_not_fatal() {
        let err: StoreError = DbErr::Custom("boom".into()).into();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_connection_errors_are_fatal() {
        let err: StoreError =
            DbErr::Conn(sea_orm::RuntimeErr::Internal("refused".into())).into();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_store_error_status_codes() {
        let conflict: ApiError = StoreError::Conflict("code".into()).into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let unavailable: ApiError = StoreError::Unavailable("down".into()).into();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let missing: ApiError = StoreError::NotFound("x".into()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
