//! Error taxonomy shared by the store, the upstream clients and the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),
    #[error("bad input: {0}")]
    BadInput(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{context}: {message}")]
    Upstream { context: String, message: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn bad_input(msg: impl Into<String>) -> Self {
        Error::BadInput(msg.into())
    }

    pub fn upstream(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Upstream {
            context: context.into(),
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadInput(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Upstream { .. } | Error::Database(_) | Error::Migrate(_) | Error::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Wire shape of every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// An [`Error`] tagged with the operation that failed, e.g. "CRM Workers error".
#[derive(Debug)]
pub struct ApiError {
    pub operation: &'static str,
    pub source: Error,
}

impl Error {
    pub fn during(self, operation: &'static str) -> ApiError {
        ApiError {
            operation,
            source: self,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.source.status();
        let body = match &self.source {
            Error::NotFound(what) => ErrorBody {
                error: format!("{} not found", what),
                details: None,
            },
            other => ErrorBody {
                error: self.operation.to_string(),
                details: Some(other.to_string()),
            },
        };
        if status.is_server_error() {
            tracing::error!(operation = self.operation, err = %self.source, "request failed");
        } else {
            tracing::warn!(operation = self.operation, err = %self.source, "request rejected");
        }
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        self.during("Request error").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(Error::not_found("Worker").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::bad_input("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::Unauthorized("No valid token provided".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::upstream("Weather API fetch failed", "timed out").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn upstream_keeps_original_message() {
        let err = Error::upstream("Weather API fetch failed", "connection refused");
        assert_eq!(err.to_string(), "Weather API fetch failed: connection refused");
    }
}
