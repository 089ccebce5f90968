use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::booking::lifecycle::LifecycleError;
use crate::payments::GatewayError;
use crate::store::StoreError;

/// Error surface of every API handler. Each variant carries a caller-facing
/// message; the HTTP mapping lives in `IntoResponse`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("upstream payment gateway error: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::EquipmentNotFound | LifecycleError::BookingNotFound => {
                Self::NotFound(err.to_string())
            }
            LifecycleError::InvalidDates(_) | LifecycleError::InvalidStatus(_) => {
                Self::Validation(err.to_string())
            }
            LifecycleError::Unavailable => Self::Conflict(err.to_string()),
            LifecycleError::SignatureMismatch => Self::Forbidden(err.to_string()),
            LifecycleError::Gateway(e) => Self::Upstream(e.to_string()),
            LifecycleError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}
