//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use inventory::LedgerError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// Missing, unknown or expired bearer token.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but not allowed to see the resource.
    #[error("Forbidden")]
    Forbidden,

    /// Purchase creation error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Product catalog error.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Domain(err) => domain_status(err),
            ApiError::Ledger(err) => ledger_status(err),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        metrics::counter!("api_errors_total", "status" => status.as_str().to_owned()).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::EmptyCart
        | DomainError::InvalidCartItemAmount { .. }
        | DomainError::InvalidCurrency(_)
        | DomainError::AmountOverflow => StatusCode::BAD_REQUEST,
        DomainError::ProductNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::Catalog(_) | DomainError::Bus(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InvalidProduct(_) => StatusCode::BAD_REQUEST,
        err if err.is_storage() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
