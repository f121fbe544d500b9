use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Failures while loading the startup snapshot. All of them abort startup.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unsupported file format for {path} (expected .csv or .json)")]
    UnsupportedFormat { path: PathBuf },
    #[error("missing column '{column}' in {path}")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("invalid row in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Per-request failures, turned into a JSON error body at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Computation(String),
}

pub type QueryResult<T> = Result<T, QueryError>;

impl QueryError {
    pub fn no_data() -> Self {
        QueryError::NotFound("no data available".to_string())
    }

    pub fn no_match() -> Self {
        QueryError::NotFound("no data matches the filter criteria".to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            QueryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            QueryError::Computation(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            QueryError::NotFound(_) => "ERR_NOT_FOUND",
            QueryError::Unauthorized(_) => "ERR_UNAUTHORIZED",
            QueryError::Computation(_) => "ERR_COMPUTATION",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = status.as_u16(), code = self.code(), message = %self, "request failed");
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
